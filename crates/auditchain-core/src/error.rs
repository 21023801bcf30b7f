//! Error types for auditchain core.

use std::fmt::Display;

use thiserror::Error;

/// Input the canonicalizer refuses to interpret.
///
/// These are programmer errors: callers must hand in plain, well-formed data.
/// Every variant carries a JSON-path-like location (`$.payload.items[2]`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CanonicalError {
    #[error("non-finite number at {path}")]
    NonFiniteNumber { path: String },

    #[error("integer {value} at {path} is outside the safe range ±(2^53-1)")]
    UnsafeInteger { path: String, value: String },

    #[error("reserved key {key:?} at {path}")]
    ReservedKey { path: String, key: String },

    #[error("raw byte buffer at {path}")]
    RawBytes { path: String },

    #[error("non-string map key at {path}")]
    NonStringKey { path: String },

    #[error("absent value ({kind}) at {path}")]
    AbsentValue { path: String, kind: &'static str },

    #[error("{0}")]
    Custom(String),
}

impl serde::ser::Error for CanonicalError {
    fn custom<T: Display>(msg: T) -> Self {
        CanonicalError::Custom(msg.to_string())
    }
}

/// Core errors outside of canonicalization.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("canonicalization failed: {0}")]
    Canonical(#[from] CanonicalError),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("payload version {0} is already registered")]
    DuplicatePayloadVersion(u32),

    #[error("no payload builder registered for version {0}")]
    UnknownPayloadVersion(u32),

    #[error("malformed checkpoint: {0}")]
    MalformedCheckpoint(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
