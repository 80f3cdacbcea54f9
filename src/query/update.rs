//! Update operator application

use bson::{Bson, Document};
use docql::{Update, UpdateOp};

use super::value::{get_path, remove_path, set_path, type_name, values_equal};
use crate::error::{Error, Result};

fn fail(message: impl Into<String>) -> Error {
    Error::Query { message: message.into() }
}

/// Apply an update in place; returns whether the document changed
///
/// The document is left untouched when any operator fails.
pub fn apply(update: &Update, doc: &mut Document) -> Result<bool> {
    let mut next = doc.clone();
    for op in &update.ops {
        apply_op(op, &mut next)?;
    }

    if doc.get("_id") != next.get("_id") {
        return Err(fail(
            "Performing an update on the path '_id' would modify the immutable field '_id'",
        ));
    }

    let changed = *doc != next;
    if changed {
        *doc = next;
    }
    Ok(changed)
}

fn apply_op(op: &UpdateOp, doc: &mut Document) -> Result<()> {
    match op {
        UpdateOp::Set { path, value } => set_path(doc, path, value.clone()).map_err(fail),
        UpdateOp::Unset { path } => {
            remove_path(doc, path);
            Ok(())
        }
        UpdateOp::Inc { path, by } => {
            let next = match get_path(doc, path) {
                None => by.clone(),
                Some(current) => increment(current, by).ok_or_else(|| {
                    fail(format!(
                        "Cannot apply $inc to a value of non-numeric type {} at '{}'",
                        type_name(current),
                        path
                    ))
                })?,
            };
            set_path(doc, path, next).map_err(fail)
        }
        UpdateOp::Push { path, values } => {
            let mut items = existing_array(doc, path, "$push")?;
            items.extend(values.iter().cloned());
            set_path(doc, path, Bson::Array(items)).map_err(fail)
        }
        UpdateOp::AddToSet { path, values } => {
            let mut items = existing_array(doc, path, "$addToSet")?;
            for value in values {
                if !items.iter().any(|item| values_equal(item, value)) {
                    items.push(value.clone());
                }
            }
            set_path(doc, path, Bson::Array(items)).map_err(fail)
        }
    }
}

fn existing_array(doc: &Document, path: &str, operator: &str) -> Result<Vec<Bson>> {
    match get_path(doc, path) {
        None => Ok(Vec::new()),
        Some(Bson::Array(items)) => Ok(items.clone()),
        Some(other) => Err(fail(format!(
            "The field '{}' must be an array but is of type {}; {} requires an array",
            path,
            type_name(other),
            operator
        ))),
    }
}

fn increment(current: &Bson, by: &Bson) -> Option<Bson> {
    Some(match (current, by) {
        (Bson::Int32(a), Bson::Int32(b)) => match a.checked_add(*b) {
            Some(sum) => Bson::Int32(sum),
            None => Bson::Int64(i64::from(*a) + i64::from(*b)),
        },
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64(i64::from(*a) + b),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a + i64::from(*b)),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a + b),
        (a, b) => Bson::Double(super::value::as_f64(a)? + super::value::as_f64(b)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn run(update: Document, doc: &mut Document) -> Result<bool> {
        apply(&docql::update(&update).unwrap(), doc)
    }

    #[test]
    fn test_set_and_add_to_set() {
        let mut user = doc! { "_id": "u1", "profile": { "skills": ["Python"] } };
        let changed = run(
            doc! {
                "$set": { "profile.bio": "Learner", "is_active": true },
                "$addToSet": { "profile.skills": { "$each": ["Python", "MongoDB"] } }
            },
            &mut user,
        )
        .unwrap();
        assert!(changed);
        assert_eq!(
            user.get_document("profile").unwrap().get_array("skills").unwrap(),
            &vec![Bson::String("Python".into()), Bson::String("MongoDB".into())]
        );
    }

    #[test]
    fn test_noop_update_reports_unchanged() {
        let mut course = doc! { "_id": "c1", "is_published": true };
        assert!(!run(doc! { "$set": { "is_published": true } }, &mut course).unwrap());
    }

    #[test]
    fn test_inc_and_push() {
        let mut lesson = doc! { "_id": "l1", "order": 3 };
        run(doc! { "$inc": { "order": -1 }, "$push": { "history": 3 } }, &mut lesson).unwrap();
        assert_eq!(lesson.get_i32("order").unwrap(), 2);
        assert_eq!(lesson.get_array("history").unwrap().len(), 1);

        let mut bad = doc! { "_id": "l2", "order": "x" };
        assert!(run(doc! { "$inc": { "order": 1 } }, &mut bad).is_err());
        assert_eq!(bad.get_str("order").unwrap(), "x");
    }

    #[test]
    fn test_id_is_immutable() {
        let mut d = doc! { "_id": "a" };
        let err = run(doc! { "$set": { "_id": "b" } }, &mut d).unwrap_err();
        assert!(err.to_string().contains("immutable"));
        assert!(run(doc! { "$set": { "_id": "a" } }, &mut d).is_ok());
    }
}
