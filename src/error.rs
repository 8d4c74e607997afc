//! Unified error handling for the trailmap library.
//!
//! Every fallible operation returns [`TrailError`]. Which layer is allowed to
//! swallow which variant is fixed:
//! - dataset errors bubble up to [`crate::dataset::DatasetService`]
//! - query errors are converted to empty results in [`crate::query::execute`]
//! - map provider errors degrade rendering inside [`crate::markers::MarkerManager`]

use thiserror::Error;

/// Unified error type for trailmap operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrailError {
    /// The dataset file could not be opened or is missing a required relation
    #[error("Dataset load failed: {message}")]
    LoadFailed { message: String },

    /// A query was attempted before the dataset finished loading, or after close
    #[error("Dataset is not ready")]
    NotReady,

    /// The embedded engine rejected or failed a statement
    #[error("Query failed: {message}")]
    QueryFailed { message: String },

    /// A trail id did not resolve to a record
    #[error("Trail '{id}' not found")]
    NotFound { id: String },

    /// A dataset row could not be mapped to a trail record
    #[error("Malformed row: {message}")]
    MalformedRow { message: String },

    /// The map provider failed to create a map or a marker
    #[error("Map provider error: {message}")]
    MapProvider { message: String },

    /// The clustering capability is missing or misconfigured
    #[error("Clustering unavailable: {message}")]
    ClusteringUnavailable { message: String },

    /// Invalid configuration value
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Generic internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl TrailError {
    /// Whether this error poisons the whole session rather than a single query.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TrailError::LoadFailed { .. } | TrailError::NotReady)
    }
}

impl From<rusqlite::Error> for TrailError {
    fn from(err: rusqlite::Error) -> Self {
        TrailError::QueryFailed {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for TrailError {
    fn from(err: serde_json::Error) -> Self {
        TrailError::Config {
            message: err.to_string(),
        }
    }
}

/// Result type alias for trailmap operations.
pub type Result<T> = std::result::Result<T, TrailError>;

/// Extension trait for converting Option to TrailError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a not-found error for the given trail id.
    fn ok_or_not_found(self, id: &str) -> Result<T>;

    /// Convert Option to Result with generic internal error.
    fn ok_or_internal(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, id: &str) -> Result<T> {
        self.ok_or_else(|| TrailError::NotFound { id: id.to_string() })
    }

    fn ok_or_internal(self, message: &str) -> Result<T> {
        self.ok_or_else(|| TrailError::Internal {
            message: message.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TrailError::NotFound {
            id: "T123".to_string(),
        };
        assert_eq!(err.to_string(), "Trail 'T123' not found");

        let err = TrailError::LoadFailed {
            message: "no such file".to_string(),
        };
        assert!(err.to_string().contains("no such file"));
    }

    #[test]
    fn test_option_ext() {
        let none: Option<i32> = None;
        let result = none.ok_or_not_found("T9");
        assert!(matches!(result, Err(TrailError::NotFound { ref id }) if id == "T9"));

        assert_eq!(Some(3).ok_or_internal("unused"), Ok(3));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(TrailError::NotReady.is_fatal());
        assert!(!TrailError::QueryFailed {
            message: "x".into()
        }
        .is_fatal());
    }

    #[test]
    fn test_from_rusqlite() {
        let err: TrailError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, TrailError::QueryFailed { .. }));
    }
}
