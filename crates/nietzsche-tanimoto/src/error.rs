//! Error types for the Tanimoto search module.

use thiserror::Error;

/// Errors that can occur while mapping, reducing or finishing a Tanimoto query.
#[derive(Debug, Error)]
pub enum TanimotoError {
    /// A required call argument is absent or has the wrong type.
    #[error("{0} required")]
    MissingArgument(String),

    /// The `threshold` argument is absent, not an integer, or outside `(0, 100]`.
    #[error("threshold is from 1 to 100: {0}")]
    InvalidThreshold(String),

    /// An optional argument (`limit`, `mode`, `rankBy`) carries an unusable value.
    #[error("invalid argument '{name}': {reason}")]
    InvalidArgument { name: String, reason: String },

    /// The call has no child query to resolve the source set from.
    #[error("{0}() requires a child query producing the source set")]
    MissingChild(String),

    /// A delegated evaluation yielded a value of the wrong kind.
    #[error("unexpected value: expected {expected}, got {got}")]
    UnexpectedValue {
        expected: &'static str,
        got: &'static str,
    },

    /// The frame is not part of the index schema.
    #[error("frame not found: {index}/{frame}")]
    FrameNotFound { index: String, frame: String },

    /// The index is unknown to the execution engine.
    #[error("index not found: {0}")]
    IndexNotFound(String),

    /// The caller cancelled the query; no partial result is returned.
    #[error("query cancelled")]
    Cancelled,

    /// An error surfaced verbatim from the storage layer.
    #[error("storage error: {0}")]
    Storage(String),

    /// An error surfaced verbatim from evaluating a delegated call.
    #[error("execution error: {0}")]
    Execution(String),

    /// Serialization / deserialization error.
    #[error("serde error: {0}")]
    Serde(String),
}

impl From<serde_json::Error> for TanimotoError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serde(e.to_string())
    }
}
