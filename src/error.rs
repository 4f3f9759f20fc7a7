//! Error types for plainsql.

use thiserror::Error;

/// Boxed error returned by adapter backends.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The main error type for plainsql operations.
#[derive(Debug, Error)]
pub enum PlainError {
    /// Required placeholders have no value in the parameter bag.
    ///
    /// Lists every offender found in one pass: named keys (`id`, `$user`),
    /// `?` for an anonymous count mismatch and `name.key` for object schema keys.
    #[error("Missing query parameters: {}", .0.join(", "))]
    MissingParameters(Vec<String>),

    /// The parameter bag has a key that no placeholder in the template uses.
    #[error("Unexpected query parameter: '{0}'")]
    UnexpectedParameter(String),

    /// An object placeholder (`$` / `@`) got something other than a record
    /// or a sequence of records.
    #[error("Invalid object parameter '{name}': {reason}")]
    InvalidObjectParameter { name: String, reason: String },

    /// A value does not have the shape its placeholder modifier needs.
    #[error("Invalid parameter '{name}': expected {expected}")]
    InvalidParameter { name: String, expected: &'static str },

    /// A placeholder is syntactically valid but cannot be resolved.
    #[error("Malformed placeholder '{placeholder}': {reason}")]
    MalformedPlaceholder {
        placeholder: String,
        reason: &'static str,
    },

    /// The adapter lacks a capability the call needs.
    #[error("Missing adapter: no '{capability}' capability")]
    MissingAdapter { capability: &'static str },

    /// The adapter rejected the resolved SQL.
    #[error("Query execution failed")]
    BackendQueryFailed {
        /// The exact SQL text sent to the adapter.
        query: String,
        #[source]
        source: BoxError,
    },

    /// A query file mixes an unnamed block with `-- name:` blocks.
    #[error(
        "Improperly formatted file '{path}': either use one query per file, or name every query with '-- name: foo'"
    )]
    ImproperlyFormattedFile { path: String },

    /// Two blocks in one file share a name.
    #[error("Duplicate query name: '{0}'")]
    DuplicateQuery(String),

    /// No query with this name was loaded.
    #[error("Unknown query: '{0}'")]
    UnknownQuery(String),

    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Parameters could not be read from JSON.
    #[error("Invalid JSON parameters: {0}")]
    Json(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PlainError {
    /// Create an invalid object parameter error.
    pub fn invalid_object(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidObjectParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid parameter error.
    pub fn invalid(name: impl Into<String>, expected: &'static str) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            expected,
        }
    }

    /// The resolved SQL attached to a backend failure, if any.
    pub fn query(&self) -> Option<&str> {
        match self {
            Self::BackendQueryFailed { query, .. } => Some(query),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for PlainError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

/// Result type alias for plainsql operations.
pub type PlainResult<T> = Result<T, PlainError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_missing_lists_every_parameter() {
        let err = PlainError::MissingParameters(vec!["id".into(), "$user.name".into()]);
        assert_eq!(err.to_string(), "Missing query parameters: id, $user.name");
    }

    #[test]
    fn test_backend_failure_keeps_query_and_cause() {
        let cause: BoxError = "relation \"usr\" does not exist".into();
        let err = PlainError::BackendQueryFailed {
            query: "SELECT * FROM usr".into(),
            source: cause,
        };
        assert_eq!(err.to_string(), "Query execution failed");
        assert_eq!(err.query(), Some("SELECT * FROM usr"));
        assert_eq!(
            err.source().map(|s| s.to_string()),
            Some("relation \"usr\" does not exist".to_string())
        );
    }
}
