//! Embedded document store
//!
//! `MemoryStore` keeps every collection in process behind a
//! `tokio::sync::RwLock`. It accepts the same BSON filters, updates and
//! pipelines as the network backend and produces explain output in the
//! server's shape, so the catalog and its reports run unchanged against
//! either store.

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use docql::{GeoNear, Stage};
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::collection::{Access, Collection};
use crate::config::Backend;
use crate::error::{Error, Result};
use crate::query::pipeline::{self, sort_documents, LookupSource, Row};
use crate::query::{filter, geo, value};
use crate::store::{
    CollectionOptions, DocumentStore, ExplainTarget, FindOptions, IndexSpec, UpdateOutcome,
};
use crate::validation::{validate_collection_name, validate_index_name};

/// In-process store selected by a `memory://` URI
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    collections: RwLock<HashMap<String, Collection>>,
}

/// Rows produced by the first stage of a read, with plan statistics
struct Source {
    rows: Vec<Row>,
    consumed: usize,
    access: Access,
    keys_examined: u64,
    docs_examined: u64,
}

struct Collections<'a>(&'a HashMap<String, Collection>);

impl LookupSource for Collections<'_> {
    fn documents(&self, collection: &str) -> Vec<Document> {
        self.0
            .get(collection)
            .map(|c| c.documents().cloned().collect())
            .unwrap_or_default()
    }
}

impl MemoryStore {
    pub fn new(database: String) -> Self {
        info!(database = %database, "opened embedded store");
        Self {
            name: database,
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Collection for a write, created on first use
    fn writable<'a>(
        collections: &'a mut HashMap<String, Collection>,
        name: &str,
    ) -> Result<&'a mut Collection> {
        if !collections.contains_key(name) {
            validate_collection_name(name)?;
            debug!(collection = name, "implicitly created collection");
            collections.insert(name.to_string(), Collection::new(name));
        }
        collections
            .get_mut(name)
            .ok_or_else(|| Error::not_found(name, ""))
    }

    fn namespace(&self, collection: &str) -> String {
        format!("{}.{}", self.name, collection)
    }
}

// =============================================================================
// Read planning
// =============================================================================

/// Produce the input rows for a pipeline from its first stage
fn source_rows(collection: Option<&Collection>, stages: &[Stage]) -> Result<Source> {
    let Some(collection) = collection else {
        return Ok(Source {
            rows: Vec::new(),
            consumed: usize::from(matches!(stages.first(), Some(Stage::Match(_) | Stage::GeoNear(_)))),
            access: Access::CollectionScan,
            keys_examined: 0,
            docs_examined: 0,
        });
    };

    match stages.first() {
        Some(Stage::Match(f)) => {
            let scan = collection.scan(f, None)?;
            let rows = scan
                .matches
                .iter()
                .filter_map(|m| {
                    collection.get(m.seq).map(|doc| Row {
                        doc: doc.clone(),
                        text_score: m.text_score,
                    })
                })
                .collect();
            Ok(Source {
                rows,
                consumed: 1,
                access: scan.access,
                keys_examined: scan.keys_examined,
                docs_examined: scan.docs_examined,
            })
        }
        Some(Stage::GeoNear(near)) => geo_near(collection, near),
        _ => Ok(Source {
            rows: collection.documents().cloned().map(Row::new).collect(),
            consumed: 0,
            access: Access::CollectionScan,
            keys_examined: 0,
            docs_examined: collection.len() as u64,
        }),
    }
}

/// Documents ordered by distance from a point, nearest first
fn geo_near(collection: &Collection, near: &GeoNear) -> Result<Source> {
    let index = collection.geo_index(near.key.as_deref()).ok_or_else(|| Error::Query {
        message: format!(
            "$geoNear requires a 2dsphere index on '{}'",
            near.key.as_deref().unwrap_or(&collection.name)
        ),
    })?;
    let path = match &near.key {
        Some(key) => key.clone(),
        None => index.leading_path().to_string(),
    };

    let mut found: Vec<(f64, Document)> = Vec::new();
    let mut docs_examined = 0;
    for doc in collection.documents() {
        let Some(point) = value::get_path(doc, &path).and_then(geo::point) else {
            continue;
        };
        docs_examined += 1;
        let distance = geo::haversine(near.near, point);
        if near.max_distance.is_some_and(|max| distance > max)
            || near.min_distance.is_some_and(|min| distance < min)
        {
            continue;
        }
        if let Some(query) = &near.query {
            if !filter::matches(query, doc) {
                continue;
            }
        }
        found.push((distance, doc.clone()));
    }
    found.sort_by(|a, b| a.0.total_cmp(&b.0));

    let multiplier = near.distance_multiplier.unwrap_or(1.0);
    let rows = found
        .into_iter()
        .map(|(distance, mut doc)| {
            value::set_path(&mut doc, &near.distance_field, Bson::Double(distance * multiplier))
                .map_err(|message| Error::Query { message })?;
            Ok(Row::new(doc))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Source {
        keys_examined: docs_examined,
        docs_examined,
        rows,
        consumed: 1,
        access: Access::GeoNear {
            index: index.name.clone(),
        },
    })
}

fn winning_plan(access: &Access) -> Document {
    match access {
        Access::CollectionScan => doc! { "stage": "COLLSCAN", "direction": "forward" },
        Access::IndexScan { index, key_pattern } => doc! {
            "stage": "FETCH",
            "inputStage": {
                "stage": "IXSCAN",
                "indexName": index.as_str(),
                "keyPattern": key_pattern.clone(),
                "direction": "forward",
            },
        },
        Access::Text { index } => doc! {
            "stage": "TEXT_MATCH",
            "inputStage": { "stage": "IXSCAN", "indexName": index.as_str() },
        },
        Access::GeoNear { index } => doc! { "stage": "GEO_NEAR_2DSPHERE", "indexName": index.as_str() },
    }
}

fn execution_stats(source: &Source, returned: usize, started: Instant) -> Document {
    doc! {
        "executionSuccess": true,
        "nReturned": returned as i64,
        "executionTimeMillis": started.elapsed().as_millis() as i64,
        "totalKeysExamined": source.keys_examined as i64,
        "totalDocsExamined": source.docs_examined as i64,
        "executionStages": winning_plan(&source.access),
    }
}

// =============================================================================
// DocumentStore
// =============================================================================

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend(&self) -> Backend {
        Backend::Memory
    }

    fn database_name(&self) -> &str {
        &self.name
    }

    async fn list_collection_names(&self) -> Result<Vec<String>> {
        let collections = self.collections.read().await;
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn create_collection(&self, name: &str, options: CollectionOptions) -> Result<()> {
        validate_collection_name(name)?;
        let validator = options
            .validator
            .as_ref()
            .map(docql::validator)
            .transpose()?;

        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            return Err(Error::CollectionExists {
                name: name.to_string(),
            });
        }
        collections.insert(
            name.to_string(),
            Collection::new(name).with_validator(validator, options.validation_level),
        );
        debug!(collection = name, level = options.validation_level.as_str(), "collection created");
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        if self.collections.write().await.remove(name).is_some() {
            debug!(collection = name, "collection dropped");
        }
        Ok(())
    }

    async fn create_index(&self, collection: &str, index: IndexSpec) -> Result<String> {
        validate_index_name(&index.resolved_name()?)?;
        let mut collections = self.collections.write().await;
        Self::writable(&mut collections, collection)?.create_index(&index)
    }

    async fn list_index_names(&self, collection: &str) -> Result<Vec<String>> {
        let collections = self.collections.read().await;
        match collections.get(collection) {
            Some(c) => Ok(c.index_names()),
            None => Err(Error::Query {
                message: format!("ns does not exist: {}", self.namespace(collection)),
            }),
        }
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<Bson> {
        let mut collections = self.collections.write().await;
        Self::writable(&mut collections, collection)?.insert(document)
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> Result<usize> {
        if documents.is_empty() {
            return Ok(0);
        }
        let mut collections = self.collections.write().await;
        let target = Self::writable(&mut collections, collection)?;
        let mut inserted = 0;
        for document in documents {
            target.insert(document)?;
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn find(&self, collection: &str, filter: Document, options: FindOptions) -> Result<Vec<Document>> {
        let parsed = docql::filter(&filter)?;
        let sort = options.sort.as_ref().map(docql::sort).transpose()?;
        let limit = options.limit.map(|l| l.unsigned_abs() as usize).filter(|l| *l > 0);
        let skip = options.skip.unwrap_or(0) as usize;

        let collections = self.collections.read().await;
        let Some(target) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let hint = match (&sort, limit) {
            (None, Some(limit)) => Some(limit + skip),
            _ => None,
        };
        let scan = target.scan(&parsed, hint)?;
        let mut docs: Vec<Document> = scan
            .matches
            .iter()
            .filter_map(|m| target.get(m.seq).cloned())
            .collect();
        if let Some(keys) = &sort {
            sort_documents(&mut docs, keys, |d| d);
        }
        Ok(docs
            .into_iter()
            .skip(skip)
            .take(limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn count_documents(&self, collection: &str, filter: Document) -> Result<u64> {
        let parsed = docql::filter(&filter)?;
        let collections = self.collections.read().await;
        match collections.get(collection) {
            Some(target) => Ok(target.scan(&parsed, None)?.matches.len() as u64),
            None => Ok(0),
        }
    }

    async fn update_one(&self, collection: &str, filter: Document, update: Document) -> Result<UpdateOutcome> {
        let (parsed, changes) = (docql::filter(&filter)?, docql::update(&update)?);
        let mut collections = self.collections.write().await;
        match collections.get_mut(collection) {
            Some(target) => target.update(&parsed, &changes, false),
            None => Ok(UpdateOutcome::default()),
        }
    }

    async fn update_many(&self, collection: &str, filter: Document, update: Document) -> Result<UpdateOutcome> {
        let (parsed, changes) = (docql::filter(&filter)?, docql::update(&update)?);
        let mut collections = self.collections.write().await;
        match collections.get_mut(collection) {
            Some(target) => target.update(&parsed, &changes, true),
            None => Ok(UpdateOutcome::default()),
        }
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> Result<u64> {
        let parsed = docql::filter(&filter)?;
        let mut collections = self.collections.write().await;
        match collections.get_mut(collection) {
            Some(target) => target.delete(&parsed, false),
            None => Ok(0),
        }
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> Result<u64> {
        let parsed = docql::filter(&filter)?;
        let mut collections = self.collections.write().await;
        match collections.get_mut(collection) {
            Some(target) => target.delete(&parsed, true),
            None => Ok(0),
        }
    }

    async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> Result<Vec<Document>> {
        let stages = docql::pipeline(&pipeline)?;
        let collections = self.collections.read().await;
        let source = source_rows(collections.get(collection), &stages)?;
        let rows = pipeline::run(source.rows, &stages[source.consumed..], &Collections(&collections))?;
        Ok(rows.into_iter().map(|row| row.doc).collect())
    }

    async fn explain(&self, collection: &str, target: ExplainTarget) -> Result<Document> {
        let collections = self.collections.read().await;
        let started = Instant::now();
        let namespace = self.namespace(collection);

        match target {
            ExplainTarget::Find { filter } => {
                let stages = vec![Stage::Match(docql::filter(&filter)?)];
                let source = source_rows(collections.get(collection), &stages)?;
                let stats = execution_stats(&source, source.rows.len(), started);
                Ok(doc! {
                    "queryPlanner": {
                        "namespace": namespace,
                        "parsedQuery": filter,
                        "winningPlan": winning_plan(&source.access),
                    },
                    "executionStats": stats,
                    "ok": 1.0,
                })
            }
            ExplainTarget::Aggregate { pipeline } => {
                let stages = docql::pipeline(&pipeline)?;
                let source = source_rows(collections.get(collection), &stages)?;
                let cursor_rows = source.rows.len();
                let cursor = doc! {
                    "$cursor": {
                        "queryPlanner": {
                            "namespace": namespace,
                            "winningPlan": winning_plan(&source.access),
                        },
                        "executionStats": execution_stats(&source, cursor_rows, started),
                    }
                };
                let rest = &stages[source.consumed..];
                let returned = pipeline::run(source.rows, rest, &Collections(&collections))?.len();

                let mut explained = vec![Bson::Document(cursor)];
                for stage in rest {
                    let mut entry = Document::new();
                    entry.insert(stage.name(), Document::new());
                    explained.push(Bson::Document(entry));
                }
                Ok(doc! {
                    "stages": explained,
                    "nReturned": returned as i64,
                    "ok": 1.0,
                })
            }
        }
    }

    async fn close(&self) -> Result<()> {
        info!(database = %self.name, "embedded store closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ValidationLevel;

    async fn store_with_courses() -> MemoryStore {
        let store = MemoryStore::new("test".to_string());
        let courses = vec![
            doc! { "_id": "c1", "title": "Python Basics", "price": 29.99, "is_published": true,
                   "location": { "type": "Point", "coordinates": [-74.0060, 40.7128] } },
            doc! { "_id": "c2", "title": "Advanced Rust", "price": 149.0, "is_published": true,
                   "location": { "type": "Point", "coordinates": [2.3522, 48.8566] } },
            doc! { "_id": "c3", "title": "Data Science", "price": 99.0, "is_published": false,
                   "location": { "type": "Point", "coordinates": [-73.9857, 40.7484] } },
        ];
        store.insert_many("courses", courses).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_create_collection_twice() {
        let store = MemoryStore::new("test".to_string());
        store.create_collection("users", CollectionOptions::default()).await.unwrap();
        let err = store
            .create_collection("users", CollectionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CollectionExists { .. }));
        store.drop_collection("users").await.unwrap();
        store.drop_collection("users").await.unwrap();
        assert!(store.list_collection_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validator_applies_to_inserts() {
        let store = MemoryStore::new("test".to_string());
        let options = CollectionOptions::validated(
            doc! { "$jsonSchema": { "bsonType": "object", "required": ["username"] } },
            ValidationLevel::Moderate,
        );
        store.create_collection("users", options).await.unwrap();
        let err = store.insert_one("users", doc! { "email": "x@y.z" }).await.unwrap_err();
        assert!(matches!(err, Error::ValidationFailure { ref collection, .. } if collection == "users"));
    }

    #[tokio::test]
    async fn test_find_sort_skip_limit() {
        let store = store_with_courses().await;
        let found = store
            .find(
                "courses",
                doc! { "price": { "$gte": 50 } },
                FindOptions::new().sort(doc! { "price": -1 }).limit(1),
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].get_str("_id").unwrap(), "c2");

        let rest = store
            .find("courses", doc! {}, FindOptions::new().sort(doc! { "price": 1 }).skip(1))
            .await
            .unwrap();
        let ids: Vec<&str> = rest.iter().map(|d| d.get_str("_id").unwrap()).collect();
        assert_eq!(ids, vec!["c3", "c2"]);
        assert!(store.find("missing", doc! {}, FindOptions::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_explain_reports_index_use() {
        let store = store_with_courses().await;
        let filter = doc! { "price": { "$gte": 50, "$lte": 200 } };

        let before = store
            .explain("courses", ExplainTarget::Find { filter: filter.clone() })
            .await
            .unwrap();
        let plan = before.get_document("queryPlanner").unwrap().get_document("winningPlan").unwrap();
        assert_eq!(plan.get_str("stage").unwrap(), "COLLSCAN");
        assert_eq!(before.get_document("executionStats").unwrap().get_i64("totalDocsExamined").unwrap(), 3);

        store.create_index("courses", IndexSpec::new(doc! { "price": 1 })).await.unwrap();
        let after = store.explain("courses", ExplainTarget::Find { filter }).await.unwrap();
        let plan = after.get_document("queryPlanner").unwrap().get_document("winningPlan").unwrap();
        let input = plan.get_document("inputStage").unwrap();
        assert_eq!(input.get_str("stage").unwrap(), "IXSCAN");
        assert_eq!(input.get_str("indexName").unwrap(), "price_1");
        let stats = after.get_document("executionStats").unwrap();
        assert_eq!(stats.get_i64("nReturned").unwrap(), 2);
        assert_eq!(stats.get_i64("totalDocsExamined").unwrap(), 2);
    }

    #[tokio::test]
    async fn test_geo_near_orders_by_distance() {
        let store = store_with_courses().await;
        let pipeline = vec![doc! { "$geoNear": {
            "near": { "type": "Point", "coordinates": [-74.0060, 40.7128] },
            "distanceField": "distance",
            "maxDistance": 50_000.0,
            "spherical": true,
            "key": "location",
        } }];
        assert!(store.aggregate("courses", pipeline.clone()).await.is_err());

        store
            .create_index("courses", IndexSpec::new(doc! { "location": "2dsphere" }))
            .await
            .unwrap();
        let near = store.aggregate("courses", pipeline).await.unwrap();
        let ids: Vec<&str> = near.iter().map(|d| d.get_str("_id").unwrap()).collect();
        assert_eq!(ids, vec!["c1", "c3"]);
        assert_eq!(near[0].get_f64("distance").unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_text_search_pipeline() {
        let store = store_with_courses().await;
        store
            .create_index("courses", IndexSpec::new(doc! { "title": "text" }).named("course_text_index"))
            .await
            .unwrap();
        let found = store
            .aggregate(
                "courses",
                vec![
                    doc! { "$match": { "$text": { "$search": "rust" } } },
                    doc! { "$project": { "title": 1, "score": { "$meta": "textScore" } } },
                    doc! { "$sort": { "score": -1 } },
                ],
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].get_str("title").unwrap(), "Advanced Rust");
        assert!(found[0].get_f64("score").unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_update_and_delete_on_missing_collection() {
        let store = MemoryStore::new("test".to_string());
        let outcome = store
            .update_one("nothing", doc! {}, doc! { "$set": { "a": 1 } })
            .await
            .unwrap();
        assert_eq!(outcome.matched, 0);
        assert_eq!(store.delete_many("nothing", doc! {}).await.unwrap(), 0);
        assert!(store.list_index_names("nothing").await.is_err());
    }
}
