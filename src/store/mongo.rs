//! Network driver backend

use async_trait::async_trait;
use bson::{Bson, Document};
use futures_util::TryStreamExt;
use mongodb::options::{
    CreateCollectionOptions, FindOptions as DriverFindOptions, IndexOptions,
    ValidationLevel as DriverValidationLevel,
};
use mongodb::{Client, Collection, Database, IndexModel};
use tracing::{debug, info};

use super::{
    CollectionOptions, DocumentStore, ExplainTarget, FindOptions, IndexSpec, UpdateOutcome,
    ValidationLevel,
};
use crate::config::{Backend, ConnectionConfig};
use crate::error::{Error, Result};

/// A store backed by a MongoDB deployment
pub struct MongoStore {
    client: Client,
    database: Database,
    name: String,
}

impl MongoStore {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let client = Client::with_uri_str(&config.uri).await?;
        let database = client.database(&config.database);

        // The driver connects lazily; ping so a bad URI fails here
        database.run_command(bson::doc! { "ping": 1 }, None).await?;
        info!(uri = %config.redacted_uri(), database = %config.database, "connected");

        Ok(Self {
            client,
            database,
            name: config.database.clone(),
        })
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.database.collection::<Document>(name)
    }
}

fn driver_level(level: ValidationLevel) -> DriverValidationLevel {
    match level {
        ValidationLevel::Off => DriverValidationLevel::Off,
        ValidationLevel::Strict => DriverValidationLevel::Strict,
        ValidationLevel::Moderate => DriverValidationLevel::Moderate,
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    fn backend(&self) -> Backend {
        Backend::Mongo
    }

    fn database_name(&self) -> &str {
        &self.name
    }

    async fn list_collection_names(&self) -> Result<Vec<String>> {
        Ok(self.database.list_collection_names(None).await?)
    }

    async fn create_collection(&self, name: &str, options: CollectionOptions) -> Result<()> {
        let driver_options = CreateCollectionOptions::builder()
            .validator(options.validator)
            .validation_level(Some(driver_level(options.validation_level)))
            .build();
        self.database
            .create_collection(name, driver_options)
            .await
            .map_err(|e| match Error::from(e) {
                Error::CollectionExists { .. } => Error::CollectionExists {
                    name: name.to_string(),
                },
                other => other,
            })
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        Ok(self.collection(name).drop(None).await?)
    }

    async fn create_index(&self, collection: &str, index: IndexSpec) -> Result<String> {
        let name = index.resolved_name()?;
        let options = IndexOptions::builder()
            .name(Some(name.clone()))
            .unique(index.unique.then_some(true))
            .default_language(index.default_language.clone())
            .build();
        let model = IndexModel::builder().keys(index.keys).options(options).build();
        let created = self
            .collection(collection)
            .create_index(model, None)
            .await
            .map_err(|e| Error::from(e).in_collection(collection))?;
        Ok(created.index_name)
    }

    async fn list_index_names(&self, collection: &str) -> Result<Vec<String>> {
        Ok(self.collection(collection).list_index_names().await?)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<Bson> {
        let result = self
            .collection(collection)
            .insert_one(document, None)
            .await
            .map_err(|e| Error::from(e).in_collection(collection))?;
        Ok(result.inserted_id)
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> Result<usize> {
        if documents.is_empty() {
            return Ok(0);
        }
        let result = self
            .collection(collection)
            .insert_many(documents, None)
            .await
            .map_err(|e| Error::from(e).in_collection(collection))?;
        Ok(result.inserted_ids.len())
    }

    async fn find(&self, collection: &str, filter: Document, options: FindOptions) -> Result<Vec<Document>> {
        let driver_options = DriverFindOptions::builder()
            .sort(options.sort)
            .limit(options.limit)
            .skip(options.skip)
            .build();
        let cursor = self.collection(collection).find(filter, driver_options).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn count_documents(&self, collection: &str, filter: Document) -> Result<u64> {
        Ok(self.collection(collection).count_documents(filter, None).await?)
    }

    async fn update_one(&self, collection: &str, filter: Document, update: Document) -> Result<UpdateOutcome> {
        let result = self
            .collection(collection)
            .update_one(filter, update, None)
            .await
            .map_err(|e| Error::from(e).in_collection(collection))?;
        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }

    async fn update_many(&self, collection: &str, filter: Document, update: Document) -> Result<UpdateOutcome> {
        let result = self
            .collection(collection)
            .update_many(filter, update, None)
            .await
            .map_err(|e| Error::from(e).in_collection(collection))?;
        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> Result<u64> {
        Ok(self.collection(collection).delete_one(filter, None).await?.deleted_count)
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> Result<u64> {
        Ok(self.collection(collection).delete_many(filter, None).await?.deleted_count)
    }

    async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> Result<Vec<Document>> {
        let cursor = self.collection(collection).aggregate(pipeline, None).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn explain(&self, collection: &str, target: ExplainTarget) -> Result<Document> {
        let command = target.command(collection);
        debug!(collection, "explain");
        Ok(self.database.run_command(command, None).await?)
    }

    async fn close(&self) -> Result<()> {
        self.client.clone().shutdown().await;
        info!(database = %self.name, "connection closed");
        Ok(())
    }
}
