//! Aggregation pipeline execution
//!
//! Stages run in order over a vector of rows. The collection scan that
//! feeds the first stage (including `$text` and `$geoNear`) happens in the
//! storage layer; everything after it happens here.

use bson::{Bson, Document};
use docql::{
    Accumulator, AccumulatorOp, Condition, FieldFilter, Filter, Group, Lookup, ProjectItem,
    Projection, SortDirection, SortKey, Stage, Unwind,
};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::expr::{self, Scope};
use super::filter;
use super::value::{compare, get_path, path_values, remove_path, set_path, values_equal, OrderedBson};
use crate::error::{Error, Result};

/// A document flowing through a pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub doc: Document,
    /// Relevance from a leading `$text` match
    pub text_score: Option<f64>,
}

impl Row {
    pub fn new(doc: Document) -> Self {
        Self { doc, text_score: None }
    }

    fn scope(&self) -> Scope<'_> {
        Scope {
            doc: &self.doc,
            text_score: self.text_score,
        }
    }
}

/// Access to other collections for `$lookup`
pub trait LookupSource {
    fn documents(&self, collection: &str) -> Vec<Document>;
}

fn fail(message: impl Into<String>) -> Error {
    Error::Query { message: message.into() }
}

/// Run stages over rows already produced by the first stage's scan
pub fn run(mut rows: Vec<Row>, stages: &[Stage], source: &dyn LookupSource) -> Result<Vec<Row>> {
    for stage in stages {
        rows = run_stage(rows, stage, source)?;
    }
    Ok(rows)
}

fn run_stage(rows: Vec<Row>, stage: &Stage, source: &dyn LookupSource) -> Result<Vec<Row>> {
    match stage {
        Stage::Match(f) => {
            if f.has_text() {
                return Err(fail("$match with $text is only allowed as the first pipeline stage"));
            }
            Ok(rows.into_iter().filter(|row| filter::matches(f, &row.doc)).collect())
        }
        Stage::Project(projection) => rows
            .into_iter()
            .map(|row| {
                let doc = project(projection, &row)?;
                Ok(Row { doc, ..row })
            })
            .collect(),
        Stage::AddFields(fields) => rows
            .into_iter()
            .map(|mut row| {
                for (path, field_expr) in fields {
                    if let Some(value) = expr::evaluate(field_expr, row.scope())? {
                        set_path(&mut row.doc, path, value).map_err(fail)?;
                    }
                }
                Ok(row)
            })
            .collect(),
        Stage::Lookup(lookup) => lookup_rows(rows, lookup, source),
        Stage::Unwind(unwind) => Ok(rows.into_iter().flat_map(|row| unwind_row(row, unwind)).collect()),
        Stage::Group(group) => group_rows(rows, group),
        Stage::Sort(keys) => {
            let mut rows = rows;
            sort_documents(&mut rows, keys, |row| &row.doc);
            Ok(rows)
        }
        Stage::Limit(n) => Ok(rows.into_iter().take(*n).collect()),
        Stage::Skip(n) => Ok(rows.into_iter().skip(*n).collect()),
        Stage::Count(field) => {
            if rows.is_empty() {
                return Ok(Vec::new());
            }
            let mut doc = Document::new();
            doc.insert(field.clone(), Bson::Int32(rows.len() as i32));
            Ok(vec![Row::new(doc)])
        }
        Stage::GeoNear(_) => Err(fail("$geoNear is only valid as the first stage in a pipeline")),
    }
}

// =============================================================================
// $project
// =============================================================================

fn project(projection: &Projection, row: &Row) -> Result<Document> {
    if !projection.inclusive {
        let mut doc = row.doc.clone();
        for (path, _) in &projection.fields {
            remove_path(&mut doc, path);
        }
        if !projection.keep_id {
            doc.remove("_id");
        }
        return Ok(doc);
    }

    let mut out = Document::new();
    let id_listed = projection.fields.iter().any(|(path, _)| path == "_id");
    if projection.keep_id && !id_listed {
        if let Some(id) = row.doc.get("_id") {
            out.insert("_id", id.clone());
        }
    }
    for (path, item) in &projection.fields {
        let value = match item {
            ProjectItem::Include => get_path(&row.doc, path).cloned(),
            ProjectItem::Computed(field_expr) => expr::evaluate(field_expr, row.scope())?,
            ProjectItem::Exclude => None,
        };
        if let Some(value) = value {
            set_path(&mut out, path, value).map_err(fail)?;
        }
    }
    Ok(out)
}

// =============================================================================
// $lookup and $unwind
// =============================================================================

fn lookup_rows(rows: Vec<Row>, lookup: &Lookup, source: &dyn LookupSource) -> Result<Vec<Row>> {
    let foreign = source.documents(&lookup.from);
    rows.into_iter()
        .map(|mut row| {
            let mut local: Vec<Bson> = Vec::new();
            for value in path_values(&row.doc, &lookup.local_field) {
                match value {
                    Bson::Array(items) => local.extend(items.iter().cloned()),
                    other => local.push(other.clone()),
                }
            }
            if local.is_empty() {
                local.push(Bson::Null);
            }

            let matcher = Filter::Field(FieldFilter {
                path: lookup.foreign_field.clone(),
                condition: Condition::In(local),
            });
            let joined: Vec<Bson> = foreign
                .iter()
                .filter(|doc| filter::matches(&matcher, doc))
                .cloned()
                .map(Bson::Document)
                .collect();
            set_path(&mut row.doc, &lookup.as_field, Bson::Array(joined)).map_err(fail)?;
            Ok(row)
        })
        .collect()
}

fn unwind_row(row: Row, unwind: &Unwind) -> Vec<Row> {
    match get_path(&row.doc, &unwind.path).cloned() {
        Some(Bson::Array(items)) if !items.is_empty() => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                let mut doc = row.doc.clone();
                // The path resolved above, so setting it again cannot fail
                let _ = set_path(&mut doc, &unwind.path, item);
                if let Some(index_field) = &unwind.include_array_index {
                    let _ = set_path(&mut doc, index_field, Bson::Int64(i as i64));
                }
                Row { doc, text_score: row.text_score }
            })
            .collect(),
        Some(Bson::Array(_)) | Some(Bson::Null) | None => {
            if !unwind.preserve_null_and_empty {
                return Vec::new();
            }
            let mut doc = row.doc.clone();
            if matches!(get_path(&doc, &unwind.path), Some(Bson::Array(_))) {
                remove_path(&mut doc, &unwind.path);
            }
            if let Some(index_field) = &unwind.include_array_index {
                let _ = set_path(&mut doc, index_field, Bson::Null);
            }
            vec![Row { doc, text_score: row.text_score }]
        }
        Some(_) => {
            let mut row = row;
            if let Some(index_field) = &unwind.include_array_index {
                let _ = set_path(&mut row.doc, index_field, Bson::Null);
            }
            vec![row]
        }
    }
}

// =============================================================================
// $group
// =============================================================================

fn group_rows(rows: Vec<Row>, group: &Group) -> Result<Vec<Row>> {
    // Groups are emitted in the order their key was first seen
    let mut index: BTreeMap<OrderedBson, usize> = BTreeMap::new();
    let mut groups: Vec<(Bson, Vec<Vec<Bson>>)> = Vec::new();

    for row in &rows {
        let key = expr::evaluate(&group.id, row.scope())?.unwrap_or(Bson::Null);
        let slot = match index.get(&OrderedBson(key.clone())) {
            Some(slot) => *slot,
            None => {
                groups.push((key.clone(), vec![Vec::new(); group.accumulators.len()]));
                index.insert(OrderedBson(key), groups.len() - 1);
                groups.len() - 1
            }
        };
        for (i, (_, accumulator)) in group.accumulators.iter().enumerate() {
            if let Some(value) = expr::evaluate(&accumulator.expr, row.scope())? {
                groups[slot].1[i].push(value);
            } else if matches!(accumulator.op, AccumulatorOp::First | AccumulatorOp::Last) {
                groups[slot].1[i].push(Bson::Null);
            }
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, values)| {
            let mut doc = Document::new();
            doc.insert("_id", key);
            for ((name, accumulator), collected) in group.accumulators.iter().zip(values) {
                doc.insert(name.clone(), finish(accumulator, collected));
            }
            Row::new(doc)
        })
        .collect())
}

fn finish(accumulator: &Accumulator, values: Vec<Bson>) -> Bson {
    match accumulator.op {
        AccumulatorOp::Sum => expr::sum(values.into_iter()),
        AccumulatorOp::Avg => {
            let numbers: Vec<f64> = values.iter().filter_map(super::value::as_f64).collect();
            if numbers.is_empty() {
                Bson::Null
            } else {
                Bson::Double(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        AccumulatorOp::Min => present(&values)
            .min_by(|a, b| compare(a, b))
            .cloned()
            .unwrap_or(Bson::Null),
        AccumulatorOp::Max => present(&values)
            .max_by(|a, b| compare(a, b))
            .cloned()
            .unwrap_or(Bson::Null),
        AccumulatorOp::First => values.first().cloned().unwrap_or(Bson::Null),
        AccumulatorOp::Last => values.last().cloned().unwrap_or(Bson::Null),
        AccumulatorOp::Push => Bson::Array(values),
        AccumulatorOp::AddToSet => {
            let mut unique: Vec<Bson> = Vec::new();
            for value in values {
                if !unique.iter().any(|u| values_equal(u, &value)) {
                    unique.push(value);
                }
            }
            Bson::Array(unique)
        }
    }
}

fn present(values: &[Bson]) -> impl Iterator<Item = &Bson> {
    values.iter().filter(|v| !matches!(v, Bson::Null | Bson::Undefined))
}

// =============================================================================
// $sort
// =============================================================================

/// Stable sort by keys; missing values sort as null
pub fn sort_documents<T>(items: &mut [T], keys: &[SortKey], doc_of: impl Fn(&T) -> &Document) {
    items.sort_by(|a, b| {
        let (a, b) = (doc_of(a), doc_of(b));
        for key in keys {
            let left = get_path(a, &key.path).unwrap_or(&Bson::Null);
            let right = get_path(b, &key.path).unwrap_or(&Bson::Null);
            let ord = match key.direction {
                SortDirection::Ascending => compare(left, right),
                SortDirection::Descending => compare(right, left),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use std::collections::HashMap;

    struct Collections(HashMap<&'static str, Vec<Document>>);

    impl LookupSource for Collections {
        fn documents(&self, collection: &str) -> Vec<Document> {
            self.0.get(collection).cloned().unwrap_or_default()
        }
    }

    fn source() -> Collections {
        let mut map = HashMap::new();
        map.insert(
            "courses",
            vec![
                doc! { "_id": "c1", "title": "Python", "instructor_id": "i1", "price": 50.0 },
                doc! { "_id": "c2", "title": "Rust", "instructor_id": "i1", "price": 80.0 },
            ],
        );
        map.insert(
            "users",
            vec![doc! { "_id": "i1", "first_name": "Grace", "last_name": "Hopper" }],
        );
        Collections(map)
    }

    fn run_docs(docs: Vec<Document>, pipeline: Vec<Document>) -> Vec<Document> {
        let stages = docql::pipeline(&pipeline).unwrap();
        let rows = docs.into_iter().map(Row::new).collect();
        run(rows, &stages, &source()).unwrap().into_iter().map(|r| r.doc).collect()
    }

    fn enrollments() -> Vec<Document> {
        vec![
            doc! { "_id": "e1", "student_id": "s1", "course_id": "c1", "status": "completed" },
            doc! { "_id": "e2", "student_id": "s2", "course_id": "c1", "status": "active" },
            doc! { "_id": "e3", "student_id": "s1", "course_id": "c2", "status": "active" },
        ]
    }

    #[test]
    fn test_group_lookup_project_sort() {
        let out = run_docs(
            enrollments(),
            vec![
                doc! { "$group": { "_id": "$course_id", "total_enrollments": { "$sum": 1 } } },
                doc! { "$lookup": { "from": "courses", "localField": "_id", "foreignField": "_id", "as": "course" } },
                doc! { "$unwind": "$course" },
                doc! { "$project": { "_id": 0, "course_id": "$_id", "course_title": "$course.title", "total_enrollments": 1 } },
                doc! { "$sort": { "total_enrollments": -1 } },
            ],
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], doc! { "course_id": "c1", "course_title": "Python", "total_enrollments": 2 });
        assert_eq!(out[1].get_i32("total_enrollments").unwrap(), 1);
    }

    #[test]
    fn test_group_accumulators() {
        let out = run_docs(
            enrollments(),
            vec![doc! { "$group": {
                "_id": null,
                "students": { "$addToSet": "$student_id" },
                "all": { "$push": "$student_id" },
                "first": { "$first": "$_id" },
                "max_course": { "$max": "$course_id" },
            } }],
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get_array("students").unwrap().len(), 2);
        assert_eq!(out[0].get_array("all").unwrap().len(), 3);
        assert_eq!(out[0].get_str("first").unwrap(), "e1");
        assert_eq!(out[0].get_str("max_course").unwrap(), "c2");
    }

    #[test]
    fn test_avg_skips_nulls() {
        let out = run_docs(
            vec![doc! { "g": 80.0 }, doc! { "g": null }, doc! { "g": 90 }],
            vec![doc! { "$group": { "_id": null, "avg": { "$avg": "$g" } } }],
        );
        assert_eq!(out[0].get_f64("avg").unwrap(), 85.0);
    }

    #[test]
    fn test_lookup_without_match_gives_empty_array() {
        let out = run_docs(
            vec![doc! { "_id": "x", "course_id": "nope" }],
            vec![doc! { "$lookup": { "from": "courses", "localField": "course_id", "foreignField": "_id", "as": "course" } }],
        );
        assert_eq!(out[0].get_array("course").unwrap().len(), 0);

        let dropped = run_docs(
            vec![doc! { "_id": "x", "course_id": "nope" }],
            vec![
                doc! { "$lookup": { "from": "courses", "localField": "course_id", "foreignField": "_id", "as": "course" } },
                doc! { "$unwind": "$course" },
            ],
        );
        assert!(dropped.is_empty());
    }

    #[test]
    fn test_unwind_preserve() {
        let out = run_docs(
            vec![doc! { "_id": 1, "tags": [] }, doc! { "_id": 2, "tags": ["a", "b"] }],
            vec![doc! { "$unwind": { "path": "$tags", "preserveNullAndEmptyArrays": true, "includeArrayIndex": "i" } }],
        );
        assert_eq!(out.len(), 3);
        assert!(!out[0].contains_key("tags"));
        assert_eq!(out[2].get_i64("i").unwrap(), 1);
    }

    #[test]
    fn test_skip_limit_count() {
        let out = run_docs(enrollments(), vec![doc! { "$skip": 1 }, doc! { "$limit": 1 }]);
        assert_eq!(out[0].get_str("_id").unwrap(), "e2");

        let out = run_docs(enrollments(), vec![doc! { "$count": "n" }]);
        assert_eq!(out, vec![doc! { "n": 3 }]);
        assert!(run_docs(Vec::new(), vec![doc! { "$count": "n" }]).is_empty());
    }

    #[test]
    fn test_text_match_rejected_after_first_stage() {
        let stages = docql::pipeline(&[
            doc! { "$limit": 5 },
            doc! { "$match": { "$text": { "$search": "python" } } },
        ])
        .unwrap();
        assert!(run(vec![Row::new(doc! {})], &stages, &source()).is_err());
    }

    #[test]
    fn test_exclusion_projection() {
        let out = run_docs(
            vec![doc! { "_id": 1, "a": 1, "b": { "c": 2, "d": 3 } }],
            vec![doc! { "$project": { "a": 0, "b.c": 0 } }],
        );
        assert_eq!(out[0], doc! { "_id": 1, "b": { "d": 3 } });
    }
}
