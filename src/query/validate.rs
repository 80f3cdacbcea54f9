//! Collection validator evaluation

use bson::{Bson, Document};
use docql::{JsonSchema, Validator};

use super::filter;
use super::value::{as_f64, type_name, values_equal};

/// Check a document against a validator, describing the first violation
pub fn check(validator: &Validator, doc: &Document) -> Result<(), String> {
    match validator {
        Validator::Query(f) => {
            if filter::matches(f, doc) {
                Ok(())
            } else {
                Err("document does not match the validator query".to_string())
            }
        }
        Validator::JsonSchema(schema) => check_schema(schema, &Bson::Document(doc.clone()), "$"),
    }
}

fn check_schema(schema: &JsonSchema, value: &Bson, at: &str) -> Result<(), String> {
    if !schema.bson_types.is_empty() && !schema.bson_types.iter().any(|t| t.accepts(value)) {
        let expected: Vec<&str> = schema.bson_types.iter().map(|t| t.name()).collect();
        return Err(format!(
            "'{}' must be of type {} but is {}",
            at,
            expected.join(" or "),
            type_name(value)
        ));
    }

    if let Some(allowed) = &schema.enum_values {
        if !allowed.iter().any(|a| values_equal(a, value)) {
            return Err(format!("'{}' value {} is not one of the allowed values", at, value));
        }
    }

    match value {
        Bson::Document(doc) => check_object(schema, doc, at),
        Bson::Array(items) => match &schema.items {
            Some(item_schema) => items
                .iter()
                .enumerate()
                .try_for_each(|(i, item)| check_schema(item_schema, item, &format!("{}.{}", at, i))),
            None => Ok(()),
        },
        Bson::String(s) => {
            let len = s.chars().count();
            if let Some(min) = schema.min_length {
                if len < min {
                    return Err(format!("'{}' must be at least {} characters", at, min));
                }
            }
            if let Some(max) = schema.max_length {
                if len > max {
                    return Err(format!("'{}' must be at most {} characters", at, max));
                }
            }
            if let Some(pattern) = &schema.pattern {
                if !pattern.is_match(s) {
                    return Err(format!("'{}' does not match pattern {}", at, pattern.source()));
                }
            }
            Ok(())
        }
        other => match as_f64(other) {
            Some(n) => {
                if let Some(min) = schema.minimum {
                    if n < min {
                        return Err(format!("'{}' must be at least {}", at, min));
                    }
                }
                if let Some(max) = schema.maximum {
                    if n > max {
                        return Err(format!("'{}' must be at most {}", at, max));
                    }
                }
                Ok(())
            }
            None => Ok(()),
        },
    }
}

fn check_object(schema: &JsonSchema, doc: &Document, at: &str) -> Result<(), String> {
    for field in &schema.required {
        if !doc.contains_key(field) {
            return Err(format!("missing required field '{}'", child(at, field)));
        }
    }
    for (name, property) in &schema.properties {
        if let Some(value) = doc.get(name) {
            check_schema(property, value, &child(at, name))?;
        }
    }
    if schema.additional_properties == Some(false) {
        if let Some(extra) = doc
            .keys()
            .find(|key| *key != "_id" && !schema.properties.iter().any(|(name, _)| name == *key))
        {
            return Err(format!("additional property '{}' is not allowed", child(at, extra)));
        }
    }
    Ok(())
}

fn child(at: &str, name: &str) -> String {
    if at == "$" {
        name.to_string()
    } else {
        format!("{}.{}", at, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn user_validator() -> Validator {
        docql::validator(&doc! {
            "$jsonSchema": {
                "bsonType": "object",
                "required": ["username", "email", "role"],
                "properties": {
                    "username": { "bsonType": "string", "minLength": 3 },
                    "email": { "bsonType": "string", "pattern": "^.+@.+$" },
                    "role": { "enum": ["student", "instructor"] },
                    "grade": { "bsonType": ["double", "null"], "minimum": 0, "maximum": 100 }
                }
            }
        })
        .unwrap()
    }

    #[test]
    fn test_valid_document() {
        let d = doc! { "username": "ada", "email": "ada@example.com", "role": "student", "grade": null };
        assert!(check(&user_validator(), &d).is_ok());
    }

    #[test]
    fn test_violations() {
        let v = user_validator();
        let missing = doc! { "email": "a@b.c", "role": "student" };
        assert!(check(&v, &missing).unwrap_err().contains("username"));

        let wrong_type = doc! { "username": "ada", "email": 42, "role": "student" };
        assert!(check(&v, &wrong_type).unwrap_err().contains("email"));

        let bad_role = doc! { "username": "ada", "email": "a@b.c", "role": "manager" };
        assert!(check(&v, &bad_role).is_err());

        let bad_grade = doc! { "username": "ada", "email": "a@b.c", "role": "student", "grade": 101.0 };
        assert!(check(&v, &bad_grade).unwrap_err().contains("at most"));
    }

    #[test]
    fn test_query_validator() {
        let v = docql::validator(&doc! { "price": { "$gte": 0 } }).unwrap();
        assert!(check(&v, &doc! { "price": 10 }).is_ok());
        assert!(check(&v, &doc! { "price": -1 }).is_err());
    }
}
