//! BSON value helpers: dotted paths, ordering, truthiness and numbers

use bson::{Bson, Document};
use std::cmp::Ordering;

// =============================================================================
// Paths
// =============================================================================

/// Value at a dotted path, without array traversal (numeric segments index arrays)
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = doc.get(first)?;
    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Values a query predicate sees at a dotted path
///
/// Arrays of documents along the way are traversed, so `"items.x"` yields the
/// `x` of every element. Leaf arrays are returned as they are; callers decide
/// whether to look inside them.
pub fn path_values<'a>(doc: &'a Document, path: &str) -> Vec<&'a Bson> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    collect_from_doc(doc, &segments, &mut out);
    out
}

fn collect_from_doc<'a>(doc: &'a Document, segments: &[&str], out: &mut Vec<&'a Bson>) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    if let Some(value) = doc.get(*first) {
        collect_from_value(value, rest, out);
    }
}

fn collect_from_value<'a>(value: &'a Bson, segments: &[&str], out: &mut Vec<&'a Bson>) {
    if segments.is_empty() {
        out.push(value);
        return;
    }
    match value {
        Bson::Document(inner) => collect_from_doc(inner, segments, out),
        Bson::Array(items) => {
            if let Ok(index) = segments[0].parse::<usize>() {
                if let Some(item) = items.get(index) {
                    collect_from_value(item, &segments[1..], out);
                }
            }
            for item in items {
                if let Bson::Document(inner) = item {
                    collect_from_doc(inner, segments, out);
                }
            }
        }
        _ => {}
    }
}

/// Aggregation field path: arrays of documents map to arrays of values
pub fn resolve_field_path(doc: &Document, path: &str) -> Option<Bson> {
    let segments: Vec<&str> = path.split('.').collect();
    let (first, rest) = segments.split_first()?;
    resolve_in(doc.get(*first)?, rest)
}

fn resolve_in(value: &Bson, segments: &[&str]) -> Option<Bson> {
    let Some((first, rest)) = segments.split_first() else {
        return Some(value.clone());
    };
    match value {
        Bson::Document(inner) => resolve_in(inner.get(*first)?, rest),
        Bson::Array(items) => Some(Bson::Array(
            items
                .iter()
                .filter_map(|item| match item {
                    Bson::Document(_) | Bson::Array(_) => resolve_in(item, segments),
                    _ => None,
                })
                .collect(),
        )),
        _ => None,
    }
}

/// Set a value at a dotted path, creating intermediate documents
pub fn set_path(doc: &mut Document, path: &str, value: Bson) -> Result<(), String> {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
            Ok(())
        }
        Some((head, tail)) => {
            if !doc.contains_key(head) {
                doc.insert(head, Document::new());
            }
            match doc.get_mut(head) {
                Some(Bson::Document(inner)) => set_path(inner, tail, value),
                Some(Bson::Array(items)) => set_in_array(items, head, tail, value),
                Some(other) => Err(format!(
                    "Cannot create field '{}' in element {{{}: {}}}",
                    tail.split('.').next().unwrap_or(tail),
                    head,
                    other
                )),
                None => Err(format!("Cannot create field '{}'", head)),
            }
        }
    }
}

fn set_in_array(items: &mut Vec<Bson>, head: &str, tail: &str, value: Bson) -> Result<(), String> {
    let (index, rest) = match tail.split_once('.') {
        Some((index, rest)) => (index, Some(rest)),
        None => (tail, None),
    };
    let index: usize = index
        .parse()
        .map_err(|_| format!("Cannot create field '{}' in array '{}'", index, head))?;
    while items.len() <= index {
        items.push(Bson::Null);
    }
    match rest {
        None => {
            items[index] = value;
            Ok(())
        }
        Some(rest) => {
            if !matches!(items[index], Bson::Document(_)) {
                items[index] = Bson::Document(Document::new());
            }
            match &mut items[index] {
                Bson::Document(inner) => set_path(inner, rest, value),
                _ => Err(format!("Cannot create field '{}'", rest)),
            }
        }
    }
}

/// Remove the value at a dotted path, returning it
pub fn remove_path(doc: &mut Document, path: &str) -> Option<Bson> {
    match path.split_once('.') {
        None => doc.remove(path),
        Some((head, tail)) => match doc.get_mut(head)? {
            Bson::Document(inner) => remove_path(inner, tail),
            _ => None,
        },
    }
}

// =============================================================================
// Ordering
// =============================================================================

/// Position of a value's type in the BSON comparison order
pub fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::MinKey => 1,
        Bson::Null | Bson::Undefined => 2,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 3,
        Bson::String(_) | Bson::Symbol(_) => 4,
        Bson::Document(_) => 5,
        Bson::Array(_) => 6,
        Bson::Binary(_) => 7,
        Bson::ObjectId(_) => 8,
        Bson::Boolean(_) => 9,
        Bson::DateTime(_) => 10,
        Bson::Timestamp(_) => 11,
        Bson::RegularExpression(_) => 12,
        Bson::DbPointer(_) => 13,
        Bson::JavaScriptCode(_) => 14,
        Bson::JavaScriptCodeWithScope(_) => 15,
        Bson::MaxKey => 127,
    }
}

/// Total order over BSON values, comparing numbers across types
pub fn compare(a: &Bson, b: &Bson) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }

    match (a, b) {
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Symbol(x), Bson::Symbol(y)) => x.cmp(y),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.cmp(y),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (Bson::Timestamp(x), Bson::Timestamp(y)) => (x.time, x.increment).cmp(&(y.time, y.increment)),
        (Bson::Binary(x), Bson::Binary(y)) => x.bytes.cmp(&y.bytes),
        (Bson::Document(x), Bson::Document(y)) => compare_documents(x, y),
        (Bson::Array(x), Bson::Array(y)) => compare_arrays(x, y),
        (Bson::RegularExpression(x), Bson::RegularExpression(y)) => {
            (&x.pattern, &x.options).cmp(&(&y.pattern, &y.options))
        }
        _ => match (as_f64(a), as_f64(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
    }
}

fn compare_documents(a: &Document, b: &Document) -> Ordering {
    let mut left = a.iter();
    let mut right = b.iter();
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some((ka, va)), Some((kb, vb))) => {
                let ord = type_rank(va)
                    .cmp(&type_rank(vb))
                    .then_with(|| ka.cmp(kb))
                    .then_with(|| compare(va, vb));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn compare_arrays(a: &[Bson], b: &[Bson]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        let ord = compare(x, y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

/// Query equality: numbers compare by value, everything else structurally
pub fn values_equal(a: &Bson, b: &Bson) -> bool {
    type_rank(a) == type_rank(b) && compare(a, b) == Ordering::Equal
}

/// BSON value with a total order, usable as a map key
#[derive(Debug, Clone)]
pub struct OrderedBson(pub Bson);

impl PartialEq for OrderedBson {
    fn eq(&self, other: &Self) -> bool {
        compare(&self.0, &other.0) == Ordering::Equal
    }
}

impl Eq for OrderedBson {}

impl PartialOrd for OrderedBson {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedBson {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(&self.0, &other.0)
    }
}

// =============================================================================
// Scalars
// =============================================================================

pub fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    }
}

pub fn is_number(value: &Bson) -> bool {
    matches!(value, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_))
}

pub fn is_nullish(value: Option<&Bson>) -> bool {
    matches!(value, None | Some(Bson::Null) | Some(Bson::Undefined))
}

/// Aggregation truthiness: false, null, missing and zero are false
pub fn truthy(value: Option<&Bson>) -> bool {
    match value {
        None | Some(Bson::Null) | Some(Bson::Undefined) => false,
        Some(Bson::Boolean(b)) => *b,
        Some(Bson::Int32(n)) => *n != 0,
        Some(Bson::Int64(n)) => *n != 0,
        Some(Bson::Double(f)) => *f != 0.0,
        Some(_) => true,
    }
}

/// Short type name used in error messages
pub fn type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Document(_) => "object",
        Bson::Array(_) => "array",
        Bson::Binary(_) => "binData",
        Bson::ObjectId(_) => "objectId",
        Bson::Boolean(_) => "bool",
        Bson::DateTime(_) => "date",
        Bson::Null => "null",
        Bson::RegularExpression(_) => "regex",
        Bson::Int32(_) => "int",
        Bson::Timestamp(_) => "timestamp",
        Bson::Int64(_) => "long",
        Bson::Decimal128(_) => "decimal",
        Bson::Undefined => "undefined",
        Bson::MinKey => "minKey",
        Bson::MaxKey => "maxKey",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_get_and_set_path() {
        let mut d = doc! { "profile": { "bio": "hi" } };
        assert_eq!(get_path(&d, "profile.bio"), Some(&Bson::String("hi".into())));
        set_path(&mut d, "profile.skills", Bson::Array(vec![])).unwrap();
        set_path(&mut d, "stats.count", Bson::Int32(1)).unwrap();
        assert_eq!(get_path(&d, "stats.count"), Some(&Bson::Int32(1)));
        assert!(set_path(&mut d, "profile.bio.x", Bson::Null).is_err());
    }

    #[test]
    fn test_path_values_traverse_arrays() {
        let d = doc! { "items": [{ "x": 1 }, { "x": 2 }, { "y": 3 }] };
        let values = path_values(&d, "items.x");
        assert_eq!(values, vec![&Bson::Int32(1), &Bson::Int32(2)]);
    }

    #[test]
    fn test_resolve_field_path_maps_arrays() {
        let d = doc! { "enrollments": [{ "student_id": "a" }, { "student_id": "b" }] };
        assert_eq!(
            resolve_field_path(&d, "enrollments.student_id"),
            Some(Bson::Array(vec!["a".into(), "b".into()]))
        );
        assert_eq!(resolve_field_path(&d, "missing"), None);
    }

    #[test]
    fn test_cross_type_numbers() {
        assert!(values_equal(&Bson::Int32(100), &Bson::Double(100.0)));
        assert_eq!(compare(&Bson::Int64(3), &Bson::Double(2.5)), Ordering::Greater);
    }

    #[test]
    fn test_type_order() {
        assert_eq!(compare(&Bson::Null, &Bson::Int32(0)), Ordering::Less);
        assert_eq!(compare(&Bson::Int32(999), &Bson::String("a".into())), Ordering::Less);
        assert_eq!(compare(&Bson::Boolean(true), &Bson::DateTime(bson::DateTime::now())), Ordering::Less);
    }

    #[test]
    fn test_truthy() {
        assert!(!truthy(None));
        assert!(!truthy(Some(&Bson::Int32(0))));
        assert!(truthy(Some(&Bson::String(String::new()))));
    }
}
