//! JSON export of the EduHub collections
//!
//! Writes `{collection: [documents...]}` as pretty-printed relaxed Extended
//! JSON, so dates appear as `{"$date": "..."}` and numbers stay plain.

use bson::{doc, Bson};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::info;

use crate::error::{Error, Result};
use crate::models::COLLECTIONS;
use crate::store::FindOptions;
use crate::EduHub;

impl EduHub {
    /// Snapshot the six collections as one JSON object
    pub async fn export_snapshot(&self) -> Result<Value> {
        let mut out = Map::new();
        for name in COLLECTIONS {
            let docs = self.store.find(name, doc! {}, FindOptions::new()).await?;
            let values = docs
                .into_iter()
                .map(|d| Bson::Document(d).into_relaxed_extjson())
                .collect();
            out.insert(name.to_string(), Value::Array(values));
        }
        Ok(Value::Object(out))
    }

    /// Write the snapshot to `path` and return the number of documents
    pub async fn export_collections(&self, path: &Path) -> Result<usize> {
        let snapshot = self.export_snapshot().await?;
        let count = snapshot
            .as_object()
            .map(|collections| {
                collections
                    .values()
                    .filter_map(Value::as_array)
                    .map(Vec::len)
                    .sum()
            })
            .unwrap_or(0);

        let json = serde_json::to_string_pretty(&snapshot)?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| Error::io(path, e))?;
        info!(path = %path.display(), documents = count, "collections exported");
        Ok(count)
    }
}
