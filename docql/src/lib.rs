//! DocQL - Document Query Language
//!
//! Typed representation of the BSON query documents used by EduHub:
//! filters, update modifiers, aggregation pipelines, expressions,
//! `$jsonSchema` validators and index key patterns.
//!
//! # Overview
//!
//! ```text
//! // Filters
//! { "price": { "$gte": 50, "$lte": 200 }, "is_published": true }
//! { "$text": { "$search": "python data" } }
//!
//! // Updates
//! { "$set": { "is_published": true }, "$addToSet": { "profile.skills": "Rust" } }
//!
//! // Pipelines
//! [ { "$match": { "grade": { "$ne": null } } },
//!   { "$group": { "_id": "$student_id", "avg": { "$avg": "$grade" } } },
//!   { "$sort": { "avg": -1 } } ]
//! ```
//!
//! Parsing is strict: unknown operators and stages are errors, so a typo
//! in a query fails before it reaches a collection.

mod ast;
mod error;
mod parser;

pub use ast::*;
pub use error::QueryError;

use bson::Document;

/// Parse a query filter document
pub fn filter(doc: &Document) -> Result<Filter, QueryError> {
    parser::parse_filter(doc)
}

/// Parse an update document (`$set`, `$unset`, `$inc`, `$push`, `$addToSet`)
pub fn update(doc: &Document) -> Result<Update, QueryError> {
    parser::parse_update(doc)
}

/// Parse an aggregation pipeline
pub fn pipeline(stages: &[Document]) -> Result<Vec<Stage>, QueryError> {
    parser::parse_pipeline(stages)
}

/// Parse a sort specification such as `{"order": 1}`
pub fn sort(doc: &Document) -> Result<Vec<SortKey>, QueryError> {
    parser::parse_sort(doc)
}

/// Parse an aggregation expression
pub fn expr(value: &bson::Bson) -> Result<Expr, QueryError> {
    parser::parse_expr(value)
}

/// Parse a collection validator: `{"$jsonSchema": ...}` or a query filter
pub fn validator(doc: &Document) -> Result<Validator, QueryError> {
    parser::parse_validator(doc)
}

/// Parse an index key pattern such as `{"title": "text"}`
pub fn index_keys(doc: &Document) -> Result<Vec<IndexKey>, QueryError> {
    parser::parse_index_keys(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_empty_filter_matches_all() {
        assert_eq!(filter(&doc! {}).unwrap(), Filter::All);
    }

    #[test]
    fn test_text_filter() {
        let parsed = filter(&doc! { "$text": { "$search": "python -java" } }).unwrap();
        assert!(parsed.has_text());
        let search = parsed.text_search().unwrap();
        assert_eq!(search.terms, vec!["python".to_string()]);
        assert_eq!(search.excluded, vec!["java".to_string()]);
    }

    #[test]
    fn test_or_filter() {
        let parsed = filter(&doc! { "$or": [{ "role": "student" }, { "role": "instructor" }] }).unwrap();
        assert!(matches!(parsed, Filter::Or(ref items) if items.len() == 2));
        assert!(parsed.conjuncts().is_empty());
    }

    #[test]
    fn test_sort_direction() {
        let keys = sort(&doc! { "year": 1, "month": -1 }).unwrap();
        assert_eq!(keys[0].direction, SortDirection::Ascending);
        assert_eq!(keys[1].direction, SortDirection::Descending);
        assert!(sort(&doc! { "year": 2 }).is_err());
    }

    #[test]
    fn test_geo_near_stage() {
        let stages = pipeline(&[doc! {
            "$geoNear": {
                "near": { "type": "Point", "coordinates": [-74.0060, 40.7128] },
                "distanceField": "distance",
                "spherical": true,
                "query": { "is_published": true }
            }
        }])
        .unwrap();
        match &stages[0] {
            Stage::GeoNear(geo) => {
                assert_eq!(geo.near, (-74.0060, 40.7128));
                assert!(geo.spherical);
                assert!(geo.query.is_some());
            }
            other => panic!("unexpected stage: {:?}", other),
        }
    }

    #[test]
    fn test_query_validator() {
        let parsed = validator(&doc! { "price": { "$gte": 0 } }).unwrap();
        assert!(matches!(parsed, Validator::Query(_)));
    }
}
