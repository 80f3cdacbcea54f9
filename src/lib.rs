//! EduHub - a data-access facade for an online-learning platform
//!
//! Six collections (users, courses, enrollments, lessons, assignments,
//! submissions) with server-side validators, sample data, indexes and a
//! catalog of read, write, aggregation and reporting operations.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           EduHub                                │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │   Catalog   │  │  Fixtures   │  │   Schema Registry       │  │
//! │  │ (queries,   │  │ (seed data, │  │   ($jsonSchema          │  │
//! │  │  reports)   │  │  indexes)   │  │    validators)          │  │
//! │  └──────┬──────┘  └──────┬──────┘  └───────────┬─────────────┘  │
//! │         │                │                     │                │
//! │         ▼                ▼                     ▼                │
//! │  ┌─────────────────────────────────────────────────────────────┐│
//! │  │                  DocumentStore (trait)                      ││
//! │  └──────────────┬───────────────────────────────┬──────────────┘│
//! │                 │                               │               │
//! │                 ▼                               ▼               │
//! │  ┌──────────────────────────┐  ┌──────────────────────────────┐ │
//! │  │       MongoStore         │  │         MemoryStore          │ │
//! │  │  (mongodb:// driver)     │  │  storage + query + docql     │ │
//! │  └──────────────────────────┘  └──────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let mut hub = EduHub::in_memory();
//! hub.prepare().await?;
//! for row in hub.get_enrollments_per_course().await? {
//!     println!("{}: {}", row.course_title, row.total_enrollments);
//! }
//! hub.close().await?;
//! ```

pub mod catalog;
pub mod config;
pub mod demo;
pub mod display;
pub mod error;
pub mod export;
pub mod fixtures;
pub mod models;
pub mod query;
pub mod schema;
pub mod storage;
pub mod store;
pub mod validation;

pub use catalog::reports;
pub use config::ConnectionConfig;
pub use error::{Error, Result};
pub use schema::{Schema, SchemaMode, SchemaRegistry};
pub use store::{DocumentStore, FindOptions, UpdateOutcome};

use bson::doc;
use tracing::info;

use store::{CollectionOptions, MemoryStore, ValidationLevel};

/// The main handle: one open store plus the schemas applied to it
pub struct EduHub {
    store: Box<dyn DocumentStore>,
    schemas: SchemaRegistry,
}

impl EduHub {
    /// Open the store selected by the connection URI
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let store = store::open(config).await?;
        info!(backend = %store.backend(), database = store.database_name(), "store opened");
        Ok(Self::with_store(store))
    }

    /// A fresh embedded store with the default database name
    pub fn in_memory() -> Self {
        Self::with_store(Box::new(MemoryStore::new(config::DEFAULT_DATABASE.to_string())))
    }

    pub fn with_store(store: Box<dyn DocumentStore>) -> Self {
        Self {
            store,
            schemas: SchemaRegistry::eduhub(),
        }
    }

    /// Replace the schema registry (for example with YAML overrides)
    pub fn with_schemas(mut self, schemas: SchemaRegistry) -> Self {
        self.schemas = schemas;
        self
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    /// Create every collection with its validator at moderate level
    ///
    /// `Recreate` drops existing collections first and so destroys their
    /// documents; `CreateMissing` leaves existing collections untouched.
    pub async fn apply_schemas(&self, mode: SchemaMode) -> Result<()> {
        let existing = self.store.list_collection_names().await?;
        for schema in self.schemas.list() {
            let present = existing.iter().any(|name| name == &schema.name);
            match mode {
                SchemaMode::Recreate if present => self.store.drop_collection(&schema.name).await?,
                SchemaMode::CreateMissing if present => continue,
                _ => {}
            }
            let options = CollectionOptions::validated(schema.validator(), ValidationLevel::Moderate);
            self.store.create_collection(&schema.name, options).await?;
            info!(collection = %schema.name, "collection created with validator");
        }
        Ok(())
    }

    /// Schemas, fixture data and indexes, in that order
    pub async fn prepare(&self) -> Result<fixtures::SeedSummary> {
        self.apply_schemas(SchemaMode::Recreate).await?;
        let summary = self.seed_sample_data().await?;
        self.create_all_indexes().await?;
        Ok(summary)
    }

    /// Whether a document with this `_id` exists
    pub async fn document_exists(&self, collection: &str, id: &str) -> Result<bool> {
        Ok(self.store.count_documents(collection, doc! { "_id": id }).await? > 0)
    }

    pub async fn close(&self) -> Result<()> {
        self.store.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_apply_schemas_modes() {
        let hub = EduHub::in_memory();
        hub.apply_schemas(SchemaMode::Recreate).await.unwrap();
        let names = hub.store().list_collection_names().await.unwrap();
        assert_eq!(names.len(), 6);

        hub.store()
            .insert_one(
                models::COURSES,
                doc! {
                    "_id": "c1",
                    "title": "Rust Basics",
                    "description": "Ownership and borrowing",
                    "instructor_id": "i1",
                    "created_at": bson::DateTime::now(),
                    "updated_at": bson::DateTime::now(),
                },
            )
            .await
            .unwrap();

        hub.apply_schemas(SchemaMode::CreateMissing).await.unwrap();
        assert!(hub.document_exists(models::COURSES, "c1").await.unwrap());

        hub.apply_schemas(SchemaMode::Recreate).await.unwrap();
        assert!(!hub.document_exists(models::COURSES, "c1").await.unwrap());
    }
}
