//! Error types for traceability and impact analysis.
//!
//! Errors follow a small taxonomy:
//!
//! - **Surfaced**: `NotFound`, `InvalidParameter`, `Persistence`, `Cancelled`
//!   are returned to callers wrapped in a [`RunError`] that carries the run's
//!   correlation id.
//! - **Absorbed**: `ClassifierTimeout` and `ClassifierMalformedResponse` are
//!   produced by classifier adapters and always handled by the heuristic
//!   fallback; the public operations never return them.

use thiserror::Error;

/// The error type for tracelink operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown document, requirement, or record id.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What was looked up (e.g. "document", "requirement", "matrix")
        kind: &'static str,
        /// The id that did not resolve
        id: String,
    },

    /// Bad configuration or arguments, rejected before work starts.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The semantic classifier did not answer in time.
    #[error("Classifier timed out after {0:?}")]
    ClassifierTimeout(std::time::Duration),

    /// The semantic classifier answered with something unusable.
    #[error("Classifier returned a malformed response: {0}")]
    ClassifierMalformedResponse(String),

    /// Reading or writing analysis records failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The run was cancelled cooperatively.
    #[error("Analysis run cancelled")]
    Cancelled,

    /// Configuration file error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a `NotFound` error.
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Stable taxonomy code for the error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "NOT_FOUND",
            Error::InvalidParameter(_) | Error::Config(_) => "INVALID_PARAMETER",
            Error::ClassifierTimeout(_) => "CLASSIFIER_TIMEOUT",
            Error::ClassifierMalformedResponse(_) => "CLASSIFIER_MALFORMED_RESPONSE",
            Error::Persistence(_) | Error::Io(_) | Error::Json(_) => "PERSISTENCE_ERROR",
            Error::Cancelled => "CANCELLED",
        }
    }

    /// Attach a run correlation id.
    #[must_use]
    pub fn with_correlation(self, correlation_id: impl Into<String>) -> RunError {
        RunError {
            correlation_id: correlation_id.into(),
            error: self,
        }
    }
}

impl From<tracelink_store::Error> for Error {
    fn from(e: tracelink_store::Error) -> Self {
        Error::Persistence(e.to_string())
    }
}

/// A failed analysis run as seen by callers.
#[derive(Debug, Error)]
#[error("[{code}] {error} (correlation id {correlation_id})", code = .error.code())]
pub struct RunError {
    /// Correlation id of the failed run
    pub correlation_id: String,

    /// What went wrong
    #[source]
    pub error: Error,
}

impl RunError {
    /// Taxonomy code of the underlying error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.error.code()
    }
}

/// A specialized Result type for tracelink operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_taxonomy() {
        assert_eq!(Error::not_found("requirement", "R1").code(), "NOT_FOUND");
        assert_eq!(
            Error::InvalidParameter("x".into()).code(),
            "INVALID_PARAMETER"
        );
        assert_eq!(Error::Persistence("disk".into()).code(), "PERSISTENCE_ERROR");
        assert_eq!(Error::Cancelled.code(), "CANCELLED");
    }

    #[test]
    fn run_error_display_includes_code_and_correlation() {
        let err = Error::not_found("requirement", "REQ-9").with_correlation("run-abc");
        let text = err.to_string();
        assert!(text.contains("NOT_FOUND"));
        assert!(text.contains("REQ-9"));
        assert!(text.contains("run-abc"));
    }

    #[test]
    fn store_errors_map_to_persistence() {
        let store_err = tracelink_store::Error::InvalidRecord("bad".into());
        assert_eq!(Error::from(store_err).code(), "PERSISTENCE_ERROR");
    }
}
