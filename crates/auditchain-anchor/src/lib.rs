//! # auditchain anchor
//!
//! External witnesses for signed checkpoints. Every backend implements
//! [`AnchorBackend`]: it turns a checkpoint into an [`AnchorReceipt`] and can
//! later re-verify that receipt from its own fields.
//!
//! ## Backends
//!
//! - [`LogOnlyAnchor`] - structured log line only (default)
//! - [`WormAnchor`] - immutable object behind an [`ObjectStore`]
//! - [`TimestampAnchor`] - token from a [`TimestampAuthority`]
//! - [`MultiAnchor`] - several of the above under an `all`/`any` policy
//!
//! [`AnchorReceipt`]: auditchain_core::AnchorReceipt

pub mod backend;
pub mod config;
pub mod error;
pub mod log_only;
pub mod multi;
pub mod timestamp;
pub mod worm;

pub use backend::{AnchorBackend, AnchorReason, AnchorVerification};
pub use config::{build_anchor, AnchorConfig};
pub use error::{AnchorError, Result};
pub use log_only::{LogOnlyAnchor, LOG_ONLY_BACKEND};
pub use multi::{MultiAnchor, MultiPolicy, MultiProof, MULTI_BACKEND};
pub use timestamp::{
    imprint_of, LocalTimestampAuthority, TimestampAnchor, TimestampAuthority, TimestampProof,
    TimestampToken, TIMESTAMP_BACKEND,
};
pub use worm::{
    FsObjectStore, MemoryObjectStore, ObjectRetention, ObjectStore, RetentionMode, WormAnchor,
    WormProof, WORM_BACKEND,
};

/// Current time as RFC 3339 UTC with millisecond precision.
pub(crate) fn now_ts() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
