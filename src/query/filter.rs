//! Filter evaluation

use bson::{Bson, Document};
use docql::{Condition, ElemMatch, FieldFilter, Filter};
use std::cmp::Ordering;

use super::text;
use super::value::{compare, path_values, type_rank, values_equal};

/// Evaluate a filter against a document
///
/// `$text` clauses never match here; use [`matches_with_text`] with the
/// fields of the collection's text index.
pub fn matches(filter: &Filter, doc: &Document) -> bool {
    matches_with_text(filter, doc, &[])
}

/// Evaluate a filter, resolving `$text` against the given indexed fields
pub fn matches_with_text(filter: &Filter, doc: &Document, text_fields: &[String]) -> bool {
    match filter {
        Filter::All => true,
        Filter::And(items) => items.iter().all(|f| matches_with_text(f, doc, text_fields)),
        Filter::Or(items) => items.iter().any(|f| matches_with_text(f, doc, text_fields)),
        Filter::Nor(items) => !items.iter().any(|f| matches_with_text(f, doc, text_fields)),
        Filter::Field(field) => field_matches(field, doc),
        Filter::Text(search) => {
            !text_fields.is_empty() && text::score(search, doc, text_fields).is_some()
        }
    }
}

fn field_matches(field: &FieldFilter, doc: &Document) -> bool {
    let values = path_values(doc, &field.path);
    condition_matches(&field.condition, &values)
}

/// Evaluate a condition against every value found at a path
fn condition_matches(condition: &Condition, values: &[&Bson]) -> bool {
    match condition {
        Condition::Eq(expected) => eq_matches(expected, values),
        Condition::Ne(expected) => !eq_matches(expected, values),
        Condition::Gt(bound) => any_element(values, |v| ordered(v, bound, |o| o == Ordering::Greater)),
        Condition::Gte(bound) => any_element(values, |v| ordered(v, bound, |o| o != Ordering::Less)),
        Condition::Lt(bound) => any_element(values, |v| ordered(v, bound, |o| o == Ordering::Less)),
        Condition::Lte(bound) => any_element(values, |v| ordered(v, bound, |o| o != Ordering::Greater)),
        Condition::In(candidates) => candidates.iter().any(|c| eq_matches(c, values)),
        Condition::Nin(candidates) => !candidates.iter().any(|c| eq_matches(c, values)),
        Condition::Exists(expected) => values.is_empty() != *expected,
        Condition::Regex(pattern) => any_element(values, |v| match v {
            Bson::String(s) => pattern.is_match(s),
            Bson::Symbol(s) => pattern.is_match(s),
            _ => false,
        }),
        Condition::Size(len) => values
            .iter()
            .any(|v| matches!(v, Bson::Array(items) if items.len() == *len)),
        Condition::All(required) => {
            !required.is_empty() && required.iter().all(|r| eq_matches(r, values))
        }
        Condition::ElemMatch(elem) => values.iter().any(|v| match v {
            Bson::Array(items) => items.iter().any(|item| elem_matches(elem, item)),
            _ => false,
        }),
        Condition::Not(inner) => !condition_matches(inner, values),
        Condition::Conjunction(items) => items.iter().all(|c| condition_matches(c, values)),
    }
}

fn elem_matches(elem: &ElemMatch, item: &Bson) -> bool {
    match elem {
        ElemMatch::Document(filter) => match item {
            Bson::Document(inner) => matches(filter, inner),
            _ => false,
        },
        ElemMatch::Value(condition) => condition_matches(condition, &[item]),
    }
}

/// Equality: null also matches a missing field, arrays match on any element
fn eq_matches(expected: &Bson, values: &[&Bson]) -> bool {
    if matches!(expected, Bson::Null) && values.is_empty() {
        return true;
    }
    values.iter().any(|v| {
        values_equal(v, expected)
            || match v {
                Bson::Array(items) => items.iter().any(|item| values_equal(item, expected)),
                _ => false,
            }
    })
}

/// True if the predicate holds for some value or some element of an array value
fn any_element(values: &[&Bson], predicate: impl Fn(&Bson) -> bool) -> bool {
    values.iter().any(|v| match v {
        Bson::Array(items) => items.iter().any(&predicate) || predicate(v),
        other => predicate(other),
    })
}

/// Range comparison; values of a different type never match
fn ordered(value: &Bson, bound: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    type_rank(value) == type_rank(bound) && accept(compare(value, bound))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn check(filter: Document, doc: &Document) -> bool {
        matches(&docql::filter(&filter).unwrap(), doc)
    }

    #[test]
    fn test_equality_and_ranges() {
        let course = doc! { "price": 99.99, "is_published": true, "category": "Data Science" };
        assert!(check(doc! { "price": { "$gte": 50, "$lte": 200 } }, &course));
        assert!(!check(doc! { "price": { "$gt": 100 } }, &course));
        assert!(check(doc! { "is_published": true, "category": "Data Science" }, &course));
        assert!(!check(doc! { "price": { "$gt": "a" } }, &course));
    }

    #[test]
    fn test_null_matches_missing() {
        let graded = doc! { "grade": 88.0 };
        let ungraded = doc! { "grade": null };
        let absent = doc! {};
        assert!(check(doc! { "grade": { "$ne": null } }, &graded));
        assert!(!check(doc! { "grade": { "$ne": null } }, &ungraded));
        assert!(!check(doc! { "grade": { "$ne": null } }, &absent));
        assert!(check(doc! { "grade": null }, &absent));
    }

    #[test]
    fn test_array_fields() {
        let course = doc! { "tags": ["python", "beginner"] };
        assert!(check(doc! { "tags": "python" }, &course));
        assert!(check(doc! { "tags": { "$all": ["python", "beginner"] } }, &course));
        assert!(check(doc! { "tags": { "$size": 2 } }, &course));
        assert!(!check(doc! { "tags": { "$in": ["rust"] } }, &course));
        assert!(check(doc! { "tags": { "$nin": ["rust"] } }, &course));
    }

    #[test]
    fn test_regex_and_logical() {
        let course = doc! { "title": "Introduction to Python", "level": "beginner" };
        assert!(check(doc! { "title": { "$regex": "python", "$options": "i" } }, &course));
        assert!(check(
            doc! { "$or": [{ "level": "advanced" }, { "title": { "$regex": "^Intro" } }] },
            &course
        ));
        assert!(!check(doc! { "$nor": [{ "level": "beginner" }] }, &course));
        assert!(check(doc! { "title": { "$not": { "$regex": "Rust" } } }, &course));
    }

    #[test]
    fn test_exists_and_elem_match() {
        let d = doc! { "scores": [{ "kind": "quiz", "value": 7 }, { "kind": "exam", "value": 9 }] };
        assert!(check(doc! { "scores": { "$elemMatch": { "kind": "exam", "value": { "$gt": 8 } } } }, &d));
        assert!(!check(doc! { "scores": { "$elemMatch": { "kind": "quiz", "value": { "$gt": 8 } } } }, &d));
        assert!(check(doc! { "scores.kind": "quiz" }, &d));
        assert!(check(doc! { "missing": { "$exists": false } }, &d));
    }

    #[test]
    fn test_text_needs_index_fields() {
        let filter = docql::filter(&doc! { "$text": { "$search": "python" } }).unwrap();
        let course = doc! { "title": "Python Basics" };
        assert!(!matches(&filter, &course));
        assert!(matches_with_text(&filter, &course, &["title".to_string()]));
    }
}
