//! # auditchain-verify
//!
//! Offline verification of auditchain forensic packs.
//!
//! Everything here is computed from the pack alone: canonical JSON, SHA-256,
//! event replay, checkpoint signatures and linkage, checked in that order up
//! to the first failure. Nothing is shared with the ledger's own
//! implementation, so a bug in one shows up as a disagreement with the other.
//!
//! ```rust,ignore
//! let keys = TrustedKeys::from_files(&["checkpoint-key.pem"])?;
//! let report = verify_pack_file("pack.json", &keys)?;
//! print!("{report}");
//! ```

pub mod canon;
pub mod chain;
pub mod checkpoints;
pub mod error;
pub mod keys;
pub mod pack;
pub mod report;

use std::path::Path;

use serde_json::Value;

pub use error::{Result, VerifyError};
pub use keys::{key_id, parse_public_key, TrustedKeys};
pub use pack::{verify_pack, PACK_FORMAT};
pub use report::{Check, Outcome, Report};

/// Parse and verify a pack document.
pub fn verify_pack_str(json: &str, keys: &TrustedKeys) -> Result<Report> {
    let pack: Value = serde_json::from_str(json)?;
    if !pack.is_object() {
        return Err(VerifyError::NotAnObject);
    }
    Ok(verify_pack(&pack, keys))
}

/// Read, parse and verify a pack file.
pub fn verify_pack_file(path: impl AsRef<Path>, keys: &TrustedKeys) -> Result<Report> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|source| VerifyError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    verify_pack_str(&json, keys)
}
