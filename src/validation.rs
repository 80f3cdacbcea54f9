//! Input validation for EduHub
//!
//! Checks collection and index names before they reach a store, and
//! escapes user-supplied search terms before they become regex patterns.

use thiserror::Error;

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid {0} '{1}': {2}")]
    InvalidName(&'static str, String, &'static str),

    #[error("{0} '{1}' is too long (max {2} characters)")]
    TooLong(&'static str, String, usize),

    #[error("{0} cannot be empty")]
    Empty(&'static str),
}

/// Maximum length for collection names (namespace limit minus database name)
pub const MAX_COLLECTION_NAME_LENGTH: usize = 120;

/// Maximum length for index names
pub const MAX_INDEX_NAME_LENGTH: usize = 127;

/// Maximum search term length, in characters
pub const MAX_SEARCH_TERM_LENGTH: usize = 200;

/// Validate a collection name
///
/// Rules:
/// - Must be 1-120 characters
/// - Cannot contain `$` or the NUL character
/// - Cannot start with `system.` (reserved namespace)
/// - Cannot start or end with `.`
pub fn validate_collection_name(name: &str) -> Result<(), ValidationError> {
    const KIND: &str = "collection name";

    if name.is_empty() {
        return Err(ValidationError::Empty(KIND));
    }

    if name.len() > MAX_COLLECTION_NAME_LENGTH {
        return Err(ValidationError::TooLong(KIND, name.to_string(), MAX_COLLECTION_NAME_LENGTH));
    }

    if name.contains('$') {
        return Err(ValidationError::InvalidName(KIND, name.to_string(), "cannot contain '$'"));
    }

    if name.contains('\0') {
        return Err(ValidationError::InvalidName(
            KIND,
            name.to_string(),
            "cannot contain the null character",
        ));
    }

    if name.starts_with("system.") {
        return Err(ValidationError::InvalidName(
            KIND,
            name.to_string(),
            "the 'system.' prefix is reserved",
        ));
    }

    if name.starts_with('.') || name.ends_with('.') {
        return Err(ValidationError::InvalidName(
            KIND,
            name.to_string(),
            "cannot start or end with '.'",
        ));
    }

    Ok(())
}

/// Validate an index name
pub fn validate_index_name(name: &str) -> Result<(), ValidationError> {
    const KIND: &str = "index name";

    if name.is_empty() {
        return Err(ValidationError::Empty(KIND));
    }

    if name.len() > MAX_INDEX_NAME_LENGTH {
        return Err(ValidationError::TooLong(KIND, name.to_string(), MAX_INDEX_NAME_LENGTH));
    }

    if name == "*" {
        return Err(ValidationError::InvalidName(KIND, name.to_string(), "'*' is reserved"));
    }

    Ok(())
}

/// Validate a free-text search term
pub fn validate_search_term(term: &str) -> Result<(), ValidationError> {
    if term.trim().is_empty() {
        return Err(ValidationError::Empty("search term"));
    }
    if term.chars().count() > MAX_SEARCH_TERM_LENGTH {
        return Err(ValidationError::TooLong("search term", term.to_string(), MAX_SEARCH_TERM_LENGTH));
    }
    Ok(())
}

/// Escape a user-supplied substring so it matches literally inside `$regex`
pub fn escape_pattern(term: &str) -> String {
    regex::escape(term)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_collection_names() {
        assert!(validate_collection_name("users").is_ok());
        assert!(validate_collection_name("archived_enrollments").is_ok());
        assert!(validate_collection_name("a.b").is_ok());
    }

    #[test]
    fn test_search_term_bounds() {
        assert!(validate_search_term("python").is_ok());
        assert!(validate_search_term("   ").is_err());
        assert!(validate_search_term(&"é".repeat(MAX_SEARCH_TERM_LENGTH)).is_ok());
        assert!(matches!(
            validate_search_term(&"a".repeat(MAX_SEARCH_TERM_LENGTH + 1)),
            Err(ValidationError::TooLong(..))
        ));
    }

    #[test]
    fn test_reserved_and_invalid() {
        assert!(validate_collection_name("system.profile").is_err());
        assert!(validate_collection_name("price$").is_err());
        assert!(validate_collection_name("bad\0name").is_err());
        assert!(validate_collection_name(".hidden").is_err());
    }

    #[test]
    fn test_empty_and_too_long() {
        assert!(validate_collection_name("").is_err());
        let long_name = "a".repeat(MAX_COLLECTION_NAME_LENGTH + 1);
        assert!(validate_collection_name(&long_name).is_err());
        assert!(validate_index_name("").is_err());
        assert!(validate_index_name("*").is_err());
    }

    #[test]
    fn test_escape_pattern() {
        assert_eq!(escape_pattern("C++ (basics)"), r"C\+\+ \(basics\)");
        let re = regex::Regex::new(&escape_pattern("a.b")).unwrap();
        assert!(re.is_match("a.b"));
        assert!(!re.is_match("axb"));
    }

    #[test]
    fn test_search_term() {
        assert!(validate_search_term("python").is_ok());
        assert!(validate_search_term("   ").is_err());
    }
}
