//! Document store seam
//!
//! Everything above this module talks to a `DocumentStore`. Two backends
//! implement it:
//!
//! - `MongoStore` wraps the network driver (feature `mongodb`)
//! - `MemoryStore` is the embedded engine from `crate::storage`
//!
//! Both accept the same BSON filters, update documents and pipelines, and
//! both report failures through `crate::Error`.

#[cfg(feature = "mongodb")]
mod mongo;

#[cfg(feature = "mongodb")]
pub use mongo::MongoStore;

pub use crate::storage::MemoryStore;

use async_trait::async_trait;
use bson::{doc, Bson, Document};

use crate::config::{Backend, ConnectionConfig};
use crate::error::Result;

/// How a collection validator treats updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationLevel {
    Off,
    Strict,
    /// Inserts and updates to valid documents are checked; updates to
    /// documents that already fail the validator are not
    #[default]
    Moderate,
}

impl ValidationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationLevel::Off => "off",
            ValidationLevel::Strict => "strict",
            ValidationLevel::Moderate => "moderate",
        }
    }
}

/// Options for `create_collection`
#[derive(Debug, Clone, Default)]
pub struct CollectionOptions {
    pub validator: Option<Document>,
    pub validation_level: ValidationLevel,
}

impl CollectionOptions {
    pub fn validated(validator: Document, level: ValidationLevel) -> Self {
        Self {
            validator: Some(validator),
            validation_level: level,
        }
    }
}

/// An index definition
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub keys: Document,
    pub name: Option<String>,
    pub unique: bool,
    pub default_language: Option<String>,
}

impl IndexSpec {
    pub fn new(keys: Document) -> Self {
        Self {
            keys,
            name: None,
            unique: false,
            default_language: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_language(mut self, language: impl Into<String>) -> Self {
        self.default_language = Some(language.into());
        self
    }

    /// The explicit name, or the one derived from the key pattern
    pub fn resolved_name(&self) -> Result<String> {
        match &self.name {
            Some(name) => Ok(name.clone()),
            None => Ok(docql::default_index_name(&docql::index_keys(&self.keys)?)),
        }
    }
}

/// Options for `find`
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub sort: Option<Document>,
    pub limit: Option<i64>,
    pub skip: Option<u64>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }
}

/// Counts reported by an update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
}

/// The operation an `explain` call plans
#[derive(Debug, Clone)]
pub enum ExplainTarget {
    Find { filter: Document },
    Aggregate { pipeline: Vec<Document> },
}

impl ExplainTarget {
    /// The `explain` command body for this target
    pub fn command(&self, collection: &str) -> Document {
        let inner = match self {
            ExplainTarget::Find { filter } => doc! { "find": collection, "filter": filter.clone() },
            ExplainTarget::Aggregate { pipeline } => doc! {
                "aggregate": collection,
                "pipeline": pipeline.iter().cloned().map(Bson::Document).collect::<Vec<_>>(),
                "cursor": {},
            },
        };
        doc! { "explain": inner, "verbosity": "executionStats" }
    }
}

/// A document database
///
/// # Example
///
/// ```rust,ignore
/// async fn active(store: &dyn DocumentStore) -> Result<Vec<Document>> {
///     store.find("users", doc! { "is_active": true }, FindOptions::new()).await
/// }
/// ```
#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn backend(&self) -> Backend;

    fn database_name(&self) -> &str;

    async fn list_collection_names(&self) -> Result<Vec<String>>;

    /// Create a collection; fails with `CollectionExists` if it is present
    async fn create_collection(&self, name: &str, options: CollectionOptions) -> Result<()>;

    /// Drop a collection; dropping a missing collection is not an error
    async fn drop_collection(&self, name: &str) -> Result<()>;

    /// Create an index and return its name
    async fn create_index(&self, collection: &str, index: IndexSpec) -> Result<String>;

    async fn list_index_names(&self, collection: &str) -> Result<Vec<String>>;

    /// Insert one document and return its `_id`
    async fn insert_one(&self, collection: &str, document: Document) -> Result<Bson>;

    /// Insert documents in order, stopping at the first failure
    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> Result<usize>;

    async fn find(&self, collection: &str, filter: Document, options: FindOptions) -> Result<Vec<Document>>;

    async fn find_one(&self, collection: &str, filter: Document) -> Result<Option<Document>> {
        let mut found = self.find(collection, filter, FindOptions::new().limit(1)).await?;
        Ok(if found.is_empty() { None } else { Some(found.swap_remove(0)) })
    }

    async fn count_documents(&self, collection: &str, filter: Document) -> Result<u64>;

    async fn update_one(&self, collection: &str, filter: Document, update: Document) -> Result<UpdateOutcome>;

    async fn update_many(&self, collection: &str, filter: Document, update: Document) -> Result<UpdateOutcome>;

    /// Delete the first match and return the number removed (0 or 1)
    async fn delete_one(&self, collection: &str, filter: Document) -> Result<u64>;

    async fn delete_many(&self, collection: &str, filter: Document) -> Result<u64>;

    async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> Result<Vec<Document>>;

    /// Plan and run the target, returning explain output with `executionStats`
    async fn explain(&self, collection: &str, target: ExplainTarget) -> Result<Document>;

    async fn close(&self) -> Result<()>;
}

/// Open the store selected by the connection URI
pub async fn open(config: &ConnectionConfig) -> Result<Box<dyn DocumentStore>> {
    match config.backend()? {
        Backend::Memory => Ok(Box::new(MemoryStore::new(config.database.clone()))),
        #[cfg(feature = "mongodb")]
        Backend::Mongo => Ok(Box::new(MongoStore::connect(config).await?)),
        #[cfg(not(feature = "mongodb"))]
        Backend::Mongo => Err(crate::error::Error::Driver {
            message: "built without the `mongodb` feature; use a memory:// URI".to_string(),
        }),
    }
}

/// Extract the `_id` of a document as a string, if it is one
pub fn id_of(document: &Document) -> Option<&str> {
    document.get_str("_id").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_spec_name() {
        let spec = IndexSpec::new(doc! { "student_id": 1, "course_id": 1 });
        assert_eq!(spec.resolved_name().unwrap(), "student_id_1_course_id_1");

        let spec = IndexSpec::new(doc! { "title": "text" }).named("course_text_index");
        assert_eq!(spec.resolved_name().unwrap(), "course_text_index");
    }

    #[test]
    fn test_explain_command() {
        let command = ExplainTarget::Find { filter: doc! { "price": { "$gte": 50 } } }.command("courses");
        assert_eq!(command.get_str("verbosity").unwrap(), "executionStats");
        assert_eq!(command.get_document("explain").unwrap().get_str("find").unwrap(), "courses");
    }

    #[tokio::test]
    async fn test_open_memory() {
        let store = open(&ConnectionConfig::in_memory()).await.unwrap();
        assert_eq!(store.backend(), Backend::Memory);
        assert_eq!(store.database_name(), "eduhub_db");
        store.close().await.unwrap();
    }
}
