//! Error types for the ledger service.

use auditchain_anchor::AnchorError;
use auditchain_core::CoreError;
use auditchain_store::StoreError;
use thiserror::Error;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Canonicalization, signing or payload-builder error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Anchoring error.
    #[error("anchor error: {0}")]
    Anchor(#[from] AnchorError),

    /// The request was rejected before touching the chain.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The head kept moving under the appender.
    #[error("append gave up after {attempts} attempts: head kept moving")]
    Contention { attempts: u32 },

    /// Checkpoint not found.
    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(String),

    /// Event not found.
    #[error("event not found at seq {0}")]
    EventNotFound(u64),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
