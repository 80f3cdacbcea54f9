//! Connection settings
//!
//! The URI scheme picks the store backend: `mongodb://` and
//! `mongodb+srv://` go to the network driver, `memory://` opens the
//! embedded engine.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_URI: &str = "mongodb://localhost:27017";
pub const DEFAULT_DATABASE: &str = "eduhub_db";
pub const MEMORY_URI: &str = "memory://";

/// Which store implementation serves a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Mongo,
    Memory,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Mongo => write!(f, "mongodb"),
            Backend::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub uri: String,
    pub database: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.to_string(),
            database: DEFAULT_DATABASE.to_string(),
        }
    }
}

impl ConnectionConfig {
    pub fn new(uri: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            database: database.into(),
        }
    }

    /// Embedded engine with the default database name
    pub fn in_memory() -> Self {
        Self::new(MEMORY_URI, DEFAULT_DATABASE)
    }

    pub fn backend(&self) -> Result<Backend> {
        let uri = self.uri.trim();
        if uri.starts_with("memory://") {
            Ok(Backend::Memory)
        } else if uri.starts_with("mongodb://") || uri.starts_with("mongodb+srv://") {
            Ok(Backend::Mongo)
        } else {
            Err(Error::invalid_input(format!(
                "unsupported connection URI '{}' (expected mongodb://, mongodb+srv:// or memory://)",
                self.uri
            )))
        }
    }

    /// URI safe for logging, with any password masked
    pub fn redacted_uri(&self) -> String {
        let Some((scheme, rest)) = self.uri.split_once("://") else {
            return self.uri.clone();
        };
        match rest.split_once('@') {
            Some((credentials, host)) => {
                let user = credentials.split(':').next().unwrap_or_default();
                format!("{}://{}:****@{}", scheme, user, host)
            }
            None => self.uri.clone(),
        }
    }
}
