//! The EduHub query catalog
//!
//! Every operation is an async method on [`EduHub`](crate::EduHub), split by
//! shape:
//!
//! - `create` / `update` / `delete`: point writes by identifier
//! - `read`: filtered and joined reads
//! - `analytics`: grouped aggregation reports returning [`reports`] rows
//! - `performance`: timed probes with explain output
//! - `bonus`: text search, recommendations, archiving and geo queries

mod analytics;
mod bonus;
mod create;
mod delete;
mod performance;
mod read;
pub mod reports;
mod update;

pub use bonus::{SAMPLE_LOCATIONS, TEXT_INDEX};
pub(crate) use create::avatar_url;
pub use performance::{index_usage, IndexUsage, PerformanceReport, ProbeQuery};

use bson::{doc, Bson, Document};
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::store::UpdateOutcome;
use crate::EduHub;

impl EduHub {
    /// Run a pipeline and deserialize each output document
    pub(crate) async fn aggregate_rows<T: DeserializeOwned>(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> Result<Vec<T>> {
        self.store
            .aggregate(collection, pipeline)
            .await?
            .into_iter()
            .map(|doc| bson::from_document(doc).map_err(Error::from))
            .collect()
    }

    /// Run a find and deserialize each document
    pub(crate) async fn find_typed<T: DeserializeOwned>(
        &self,
        collection: &str,
        filter: Document,
    ) -> Result<Vec<T>> {
        self.store
            .find(collection, filter, crate::store::FindOptions::new())
            .await?
            .into_iter()
            .map(|doc| bson::from_document(doc).map_err(Error::from))
            .collect()
    }

    /// Fetch a document by `_id`, failing with `NotFound`
    pub(crate) async fn require(&self, collection: &str, id: &str) -> Result<Document> {
        self.store
            .find_one(collection, doc! { "_id": id })
            .await?
            .ok_or_else(|| Error::not_found(collection, id))
    }
}

/// Turn a zero-match update into `NotFound`
fn matched(outcome: UpdateOutcome, collection: &str, id: &str) -> Result<UpdateOutcome> {
    if outcome.matched == 0 {
        return Err(Error::not_found(collection, id));
    }
    Ok(outcome)
}

/// A `$limit` value; zero and values past `i64::MAX` are `InvalidInput`
fn positive_limit(limit: usize) -> Result<i64> {
    match i64::try_from(limit) {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(Error::invalid_input(format!("limit must be a positive integer, got {}", limit))),
    }
}

/// An integer field stored as any numeric BSON type
fn int_field(doc: &Document, key: &str) -> Option<i64> {
    match doc.get(key)? {
        Bson::Int32(n) => Some(i64::from(*n)),
        Bson::Int64(n) => Some(*n),
        Bson::Double(f) if f.fract() == 0.0 => Some(*f as i64),
        _ => None,
    }
}

/// Case-insensitive regex filter matching the whole value
fn exact_title(title: &str) -> Document {
    let pattern = format!("^{}$", crate::validation::escape_pattern(title));
    doc! { "title": { "$regex": pattern, "$options": "i" } }
}

/// Case-insensitive regex filter matching a substring
fn partial_title(term: &str) -> Document {
    doc! { "title": { "$regex": crate::validation::escape_pattern(term), "$options": "i" } }
}

fn now() -> bson::DateTime {
    bson::DateTime::now()
}

/// `now + days`; an offset past the representable range is `InvalidInput`
fn days_from_now(days: i64) -> Result<bson::DateTime> {
    chrono::Duration::try_days(days)
        .and_then(|offset| chrono::Utc::now().checked_add_signed(offset))
        .map(bson::DateTime::from_chrono)
        .ok_or_else(|| Error::invalid_input(format!("date offset of {} days is out of range", days)))
}

/// `"$a" " " "$b"` joined as a display name
fn full_name(prefix: &str) -> Bson {
    Bson::Document(doc! {
        "$concat": [format!("${}.first_name", prefix), " ", format!("${}.last_name", prefix)]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_title_escapes() {
        let filter = exact_title("C++ (Intro)");
        let regex = filter.get_document("title").unwrap();
        assert_eq!(regex.get_str("$regex").unwrap(), r"^C\+\+ \(Intro\)$");
        assert_eq!(regex.get_str("$options").unwrap(), "i");
    }

    #[test]
    fn test_int_field() {
        let doc = doc! { "a": 3, "b": 4_i64, "c": 5.0, "d": 5.5, "e": "6" };
        assert_eq!(int_field(&doc, "a"), Some(3));
        assert_eq!(int_field(&doc, "b"), Some(4));
        assert_eq!(int_field(&doc, "c"), Some(5));
        assert_eq!(int_field(&doc, "d"), None);
        assert_eq!(int_field(&doc, "e"), None);
        assert_eq!(int_field(&doc, "missing"), None);
    }

    #[test]
    fn test_days_from_now_out_of_range() {
        assert!(days_from_now(7).is_ok());
        assert!(days_from_now(-30).is_ok());
        assert!(matches!(days_from_now(-120_000_000), Err(Error::InvalidInput { .. })));
        assert!(matches!(days_from_now(i64::MIN), Err(Error::InvalidInput { .. })));
    }

    #[test]
    fn test_positive_limit() {
        assert_eq!(positive_limit(5).unwrap(), 5);
        assert!(matches!(positive_limit(0), Err(Error::InvalidInput { .. })));
    }

    #[test]
    fn test_matched_zero_is_not_found() {
        let outcome = UpdateOutcome { matched: 0, modified: 0 };
        assert!(matches!(matched(outcome, "users", "u1"), Err(Error::NotFound { .. })));
        let outcome = UpdateOutcome { matched: 1, modified: 0 };
        assert_eq!(matched(outcome, "users", "u1").unwrap(), outcome);
    }
}
