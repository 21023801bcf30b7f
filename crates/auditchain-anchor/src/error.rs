//! Error types for anchoring.

use auditchain_core::CoreError;
use thiserror::Error;

/// Errors raised while producing an anchor.
///
/// Verification never returns these: it reports an [`AnchorReason`]
/// instead.
///
/// [`AnchorReason`]: crate::backend::AnchorReason
#[derive(Debug, Error)]
pub enum AnchorError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An immutable object already exists under this key.
    #[error("object already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid object key: {0}")]
    InvalidKey(String),

    /// A backend refused or failed the anchor request.
    #[error("{backend} backend failed: {message}")]
    Backend { backend: String, message: String },

    /// A multi-anchor did not collect enough child receipts.
    #[error("anchor policy {policy} unsatisfied: {succeeded} of {total} backends anchored")]
    PolicyUnsatisfied {
        policy: String,
        succeeded: usize,
        total: usize,
    },

    #[error("invalid anchor configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("blocking task failed: {0}")]
    Join(String),
}

impl From<serde_json::Error> for AnchorError {
    fn from(err: serde_json::Error) -> Self {
        AnchorError::Serialization(err.to_string())
    }
}

/// Result type for anchor operations.
pub type Result<T> = std::result::Result<T, AnchorError>;
