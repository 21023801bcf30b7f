//! # auditchain
//!
//! Tamper-evident audit ledger service.
//!
//! This crate ties the chain primitives, storage and anchoring together:
//!
//! - [`Ledger`] - append, verify, checkpoint, anchor and export
//! - [`LedgerConfig`] - checkpoint interval, batch bounds, anchor backend
//! - [`api`] - JSON request/response shapes for an HTTP front end
//!
//! ## Usage
//!
//! ```rust,ignore
//! use auditchain::{EventDraft, Keypair, Ledger, LedgerConfig, MemoryStore, VerifyOptions};
//!
//! let ledger = Ledger::new(MemoryStore::new(), Keypair::generate(), LedgerConfig::default())?;
//!
//! let event = ledger
//!     .append(EventDraft::new("export.created", "user-42").export_id("exp-7"))
//!     .await?;
//! assert_eq!(event.seq, 1);
//!
//! let report = ledger.verify(VerifyOptions::default()).await?;
//! assert!(report.is_ok());
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod ledger;
pub mod verify;

pub use api::{AppendRequest, VerifyRequest, VerifyResponse};
pub use config::LedgerConfig;
pub use error::{LedgerError, Result};
pub use ledger::{CheckpointAudit, CheckpointCheck, Ledger, ReconcileReport};
pub use verify::{VerifyOptions, VerifyReport};

// Re-export commonly used types
pub use auditchain_anchor::{AnchorBackend, AnchorConfig, AnchorVerification};
pub use auditchain_core::{
    AnchorReceipt, AuditEvent, AuditHead, BreakReason, ChainBreak, ChainStatus, Checkpoint,
    CheckpointVerdict, EventDraft, ForensicPack, KeyId, KeyRing, Keypair, PublicKey,
};
pub use auditchain_store::{LedgerStore, MemoryStore, SqliteStore};

/// Re-export the underlying crates.
pub use auditchain_anchor as anchor;
pub use auditchain_core as core;
pub use auditchain_store as store;

/// Current time as RFC 3339 UTC with millisecond precision.
pub(crate) fn now_ts() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
