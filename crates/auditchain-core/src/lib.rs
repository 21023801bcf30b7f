//! # auditchain core
//!
//! Pure primitives for the audit ledger: canonicalization, payload builders,
//! chain replay and signed checkpoints.
//!
//! This crate contains no I/O, no storage, no networking. It is pure computation
//! over the chain's data structures.
//!
//! ## Key Types
//!
//! - [`AuditEvent`] - One immutable link of the hash chain
//! - [`AuditHead`] - The `(lastSeq, lastHash)` singleton
//! - [`PayloadRegistry`] - Versioned builders of the hashed event shape
//! - [`Checkpoint`] - A signed summary of the chain position
//! - [`ForensicPack`] - Self-contained export for offline verification
//!
//! ## Canonicalization
//!
//! Everything that is hashed or signed goes through [`canonical::canonicalize`]:
//! sorted keys, no whitespace, and a refusal to coerce anything ambiguous.

pub mod anchor;
pub mod canonical;
pub mod chain;
pub mod checkpoint;
pub mod crypto;
pub mod error;
pub mod event;
pub mod pack;
pub mod payload;
pub mod types;

pub use anchor::{AnchorPayload, AnchorReceipt, ANCHOR_PAYLOAD_KIND};
pub use canonical::{canonicalize, canonicalize_serialize, hash_canonical};
pub use chain::{replay, BreakReason, ChainBreak, ChainCursor, ChainScan, ChainStatus};
pub use checkpoint::{
    checkpoint_link_hash, verify_checkpoint, verify_checkpoint_hash, verify_checkpoint_link,
    Checkpoint, CheckpointPayload, CheckpointSigner, CheckpointVerdict, KeyRing, PublishedKey,
    SIGNATURE_ALG,
};
pub use crypto::{sha256_hex, KeyId, Keypair, PublicKey, Signature};
pub use error::{CanonicalError, CoreError};
pub use event::{AuditEvent, EventDraft};
pub use pack::{
    ForensicPack, PackManifest, PackSegment, PackSystem, PackVerification, CANONICALIZATION,
    PACK_FORMAT,
};
pub use payload::{PayloadBuilder, PayloadRegistry, CURRENT_PAYLOAD_VERSION};
pub use types::{AuditHead, GENESIS_HASH, SCHEMA_VERSION};
