//! Error types for DocQL parsing

use std::fmt;

/// Error raised while turning a BSON query document into an AST
#[derive(Debug, Clone, PartialEq)]
pub struct QueryError {
    pub message: String,
    /// Dotted location inside the query document, e.g. `$group.average`
    pub path: Option<String>,
}

impl QueryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
        }
    }

    pub fn at(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.path = Some(match self.path.take() {
            Some(inner) => format!("{}.{}", path, inner),
            None => path,
        });
        self
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(path) = &self.path {
            write!(f, " (at {})", path)?;
        }
        Ok(())
    }
}

impl std::error::Error for QueryError {}

impl From<regex::Error> for QueryError {
    fn from(err: regex::Error) -> Self {
        QueryError::new(format!("invalid regular expression: {}", err))
    }
}
