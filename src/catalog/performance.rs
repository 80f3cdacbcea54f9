//! Timed query probes with explain output

use bson::{Bson, Document};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;

use super::read::{joined_since_filter, price_range_filter, students_in_course_pipeline};
use crate::error::{Error, Result};
use crate::models::{COURSES, ENROLLMENTS, USERS};
use crate::store::{ExplainTarget, FindOptions};
use crate::EduHub;

/// The canned queries `analyze_query_performance` can measure
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeQuery {
    PriceRange { min: f64, max: f64 },
    JoinedLastMonths(u32),
    StudentsInCourse(String),
}

impl ProbeQuery {
    pub fn label(&self) -> &'static str {
        match self {
            ProbeQuery::PriceRange { .. } => "find_courses_by_price_range",
            ProbeQuery::JoinedLastMonths(_) => "get_users_joined_last_n_months",
            ProbeQuery::StudentsInCourse(_) => "find_students_in_course",
        }
    }
}

/// How the winning plan reached the documents
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexUsage {
    Index(String),
    CollectionScan,
    /// Neither an index scan nor a collection scan, named by its stage
    Other(String),
}

impl fmt::Display for IndexUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexUsage::Index(name) => write!(f, "{}", name),
            IndexUsage::CollectionScan => write!(f, "No (Collection Scan)"),
            IndexUsage::Other(stage) => write!(f, "Complex Plan (Stage: {})", stage),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceReport {
    pub label: &'static str,
    /// Wall-clock time for explain plus the query itself
    pub elapsed: Duration,
    pub result_count: usize,
    pub execution_time_millis: Option<i64>,
    pub docs_examined: Option<i64>,
    pub keys_examined: Option<i64>,
    pub plan: IndexUsage,
}

impl fmt::Display for PerformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn or_na(value: Option<i64>) -> String {
            value.map_or_else(|| "N/A".to_string(), |v| v.to_string())
        }
        writeln!(f, "Query: {} ({} results)", self.label, self.result_count)?;
        writeln!(f, "Client-side execution time: {:.2} ms", self.elapsed.as_secs_f64() * 1000.0)?;
        writeln!(f, "Server execution time: {} ms", or_na(self.execution_time_millis))?;
        writeln!(f, "Documents examined: {}", or_na(self.docs_examined))?;
        writeln!(f, "Keys examined: {}", or_na(self.keys_examined))?;
        write!(f, "Used index: {}", self.plan)
    }
}

/// Depth-first search for the first sub-document stored under `key`
fn find_document<'a>(doc: &'a Document, key: &str) -> Option<&'a Document> {
    if let Ok(found) = doc.get_document(key) {
        return Some(found);
    }
    doc.values().find_map(|value| find_in_value(value, key))
}

fn find_in_value<'a>(value: &'a Bson, key: &str) -> Option<&'a Document> {
    match value {
        Bson::Document(inner) => find_document(inner, key),
        Bson::Array(items) => items.iter().find_map(|item| find_in_value(item, key)),
        _ => None,
    }
}

fn counter(stats: &Document, key: &str) -> Option<i64> {
    match stats.get(key)? {
        Bson::Int32(n) => Some(i64::from(*n)),
        Bson::Int64(n) => Some(*n),
        Bson::Double(f) => Some(*f as i64),
        _ => None,
    }
}

/// Every `stage` node of a plan tree, outermost first
fn stages<'a>(plan: &'a Document, out: &mut Vec<&'a Document>) {
    if plan.contains_key("stage") {
        out.push(plan);
    }
    for value in plan.values() {
        match value {
            Bson::Document(inner) => stages(inner, out),
            Bson::Array(items) => {
                for item in items {
                    if let Bson::Document(inner) = item {
                        stages(inner, out);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Classify the winning plan of an explain document
pub fn index_usage(explain: &Document) -> IndexUsage {
    let Some(plan) = find_document(explain, "winningPlan") else {
        return IndexUsage::Other("unknown".to_string());
    };
    let mut nodes = Vec::new();
    stages(plan, &mut nodes);

    if let Some(scan) = nodes.iter().find(|n| n.get_str("stage").ok() == Some("IXSCAN")) {
        return IndexUsage::Index(scan.get_str("indexName").unwrap_or("unnamed").to_string());
    }
    if nodes.iter().any(|n| n.get_str("stage").ok() == Some("COLLSCAN")) {
        return IndexUsage::CollectionScan;
    }
    IndexUsage::Other(
        nodes
            .first()
            .and_then(|n| n.get_str("stage").ok())
            .unwrap_or("unknown")
            .to_string(),
    )
}

impl EduHub {
    /// Run a probe under a wall-clock timer and summarize its explain plan
    pub async fn analyze_query_performance(&self, probe: &ProbeQuery) -> Result<PerformanceReport> {
        let started = Instant::now();
        let (explain, result_count) = match probe {
            ProbeQuery::PriceRange { min, max } => {
                let filter = price_range_filter(*min, *max)?;
                self.explain_find(COURSES, filter).await?
            }
            ProbeQuery::JoinedLastMonths(months) => self.explain_find(USERS, joined_since_filter(*months)?).await?,
            ProbeQuery::StudentsInCourse(title) => {
                let course = self.find_course_by_title(title).await?;
                let course_id = course.get_str("_id").map_err(|_| Error::not_found(COURSES, title.as_str()))?;
                let pipeline = students_in_course_pipeline(course_id);
                let explain = self
                    .store
                    .explain(ENROLLMENTS, ExplainTarget::Aggregate { pipeline: pipeline.clone() })
                    .await?;
                let count = self.store.aggregate(ENROLLMENTS, pipeline).await?.len();
                (explain, count)
            }
        };
        let elapsed = started.elapsed();

        let stats = find_document(&explain, "executionStats");
        let report = PerformanceReport {
            label: probe.label(),
            elapsed,
            result_count,
            execution_time_millis: stats.and_then(|s| counter(s, "executionTimeMillis")),
            docs_examined: stats.and_then(|s| counter(s, "totalDocsExamined")),
            keys_examined: stats.and_then(|s| counter(s, "totalKeysExamined")),
            plan: index_usage(&explain),
        };
        debug!(label = report.label, plan = %report.plan, "query analyzed");
        Ok(report)
    }

    async fn explain_find(&self, collection: &str, filter: Document) -> Result<(Document, usize)> {
        let explain = self
            .store
            .explain(collection, ExplainTarget::Find { filter: filter.clone() })
            .await?;
        let count = self.store.find(collection, filter, FindOptions::new()).await?.len();
        Ok((explain, count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_index_scan_plan() {
        let explain = doc! {
            "queryPlanner": { "winningPlan": {
                "stage": "FETCH",
                "inputStage": { "stage": "IXSCAN", "indexName": "price_1" },
            } },
            "executionStats": { "executionTimeMillis": 0, "totalDocsExamined": 3, "totalKeysExamined": 3 },
        };
        assert_eq!(index_usage(&explain), IndexUsage::Index("price_1".into()));
        let stats = find_document(&explain, "executionStats").unwrap();
        assert_eq!(counter(stats, "totalDocsExamined"), Some(3));
    }

    #[test]
    fn test_nested_aggregate_plan() {
        let explain = doc! {
            "stages": [
                { "$cursor": {
                    "queryPlanner": { "winningPlan": { "stage": "COLLSCAN" } },
                    "executionStats": { "totalDocsExamined": 15_i64 },
                } },
                { "$lookup": {} },
            ],
        };
        assert_eq!(index_usage(&explain), IndexUsage::CollectionScan);
        let stats = find_document(&explain, "executionStats").unwrap();
        assert_eq!(counter(stats, "totalDocsExamined"), Some(15));
    }

    #[test]
    fn test_other_plan() {
        let explain = doc! { "queryPlanner": { "winningPlan": { "stage": "EOF" } } };
        assert_eq!(index_usage(&explain), IndexUsage::Other("EOF".into()));
        assert_eq!(index_usage(&doc! {}), IndexUsage::Other("unknown".into()));
        assert_eq!(IndexUsage::CollectionScan.to_string(), "No (Collection Scan)");
    }
}
