//! Forensic pack: a self-contained export of a chain segment.
//!
//! A pack carries everything an offline verifier needs to re-derive the chain
//! without talking to the live service. `packHash` covers the canonical form
//! of every other field.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical::{hash_canonical, to_canonical_value};
use crate::chain::{ChainBreak, ChainStatus};
use crate::checkpoint::{Checkpoint, PublishedKey};
use crate::error::Result;
use crate::event::AuditEvent;
use crate::types::AuditHead;

/// Value of the `format` field.
pub const PACK_FORMAT: &str = "auditchain.forensic-pack/v1";

/// Name of the canonical serialization recorded in the manifest.
pub const CANONICALIZATION: &str = "json-sorted-keys/utf16";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackSegment {
    pub from_seq: u64,
    pub to_seq: u64,
    pub count: u64,
}

/// Verification result of the live service at export time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackVerification {
    pub status: ChainStatus,
    pub checked: u64,
    pub partial: bool,
    #[serde(rename = "break")]
    pub chain_break: Option<ChainBreak>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackManifest {
    pub canonicalization: String,
    pub hash_alg: String,
    pub signature_alg: String,
    pub genesis_hash: String,
    pub schema_version: u32,
    pub payload_versions: Vec<u32>,
    pub checkpoint_interval: u64,
    pub public_keys: Vec<PublishedKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackSystem {
    pub generator: String,
    pub version: String,
}

/// An exported chain segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForensicPack {
    pub format: String,
    pub exported_at: String,
    pub segment: PackSegment,
    pub head_at_export_time: AuditHead,
    pub verification: PackVerification,
    pub manifest: PackManifest,
    pub system: PackSystem,
    pub events: Vec<AuditEvent>,
    pub checkpoints: Vec<Checkpoint>,
    pub pack_hash: String,
}

impl ForensicPack {
    /// SHA-256 of the canonical pack without its `packHash` field.
    pub fn compute_hash(&self) -> Result<String> {
        let mut value = to_canonical_value(self)?;
        if let Value::Object(map) = &mut value {
            map.remove("packHash");
        }
        Ok(hash_canonical(&value)?)
    }

    /// Fill in `pack_hash`.
    pub fn seal(mut self) -> Result<Self> {
        self.pack_hash = self.compute_hash()?;
        Ok(self)
    }

    /// Whether the stored `pack_hash` matches the content.
    pub fn is_sealed(&self) -> bool {
        self.compute_hash().map_or(false, |h| h == self.pack_hash)
    }
}
