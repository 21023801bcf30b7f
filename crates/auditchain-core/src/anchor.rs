//! Anchor receipts: external witnesses of a checkpoint.
//!
//! The backends that produce receipts live in `auditchain-anchor`. The types
//! are here because the store persists them and the ledger exports them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical::{canonicalize_serialize, hash_canonical, to_canonical_value};
use crate::checkpoint::Checkpoint;
use crate::crypto::sha256_hex;
use crate::error::Result;

/// Value of the `kind` field of every anchor payload.
pub const ANCHOR_PAYLOAD_KIND: &str = "audit_checkpoint_anchor";

/// What an anchor commits to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorPayload {
    pub kind: String,
    pub checkpoint_id: String,
    pub seq: u64,
    pub checkpoint_hash: String,
    /// SHA-256 of the checkpoint's signed payload string.
    pub signed_payload_hash: String,
    pub public_key_id: String,
    pub anchored_at: String,
}

impl AnchorPayload {
    /// Describe `checkpoint` as anchored at `anchored_at`.
    pub fn for_checkpoint(checkpoint: &Checkpoint, anchored_at: impl Into<String>) -> Self {
        Self {
            kind: ANCHOR_PAYLOAD_KIND.to_string(),
            checkpoint_id: checkpoint.id.clone(),
            seq: checkpoint.seq,
            checkpoint_hash: checkpoint.hash.clone(),
            signed_payload_hash: sha256_hex(checkpoint.signed_payload.as_bytes()),
            public_key_id: checkpoint.public_key_id.clone(),
            anchored_at: anchored_at.into(),
        }
    }

    /// Canonical JSON of the payload.
    pub fn canonical(&self) -> Result<String> {
        Ok(canonicalize_serialize(self)?)
    }

    /// SHA-256 of the canonical payload.
    pub fn anchor_hash(&self) -> Result<String> {
        Ok(hash_canonical(&to_canonical_value(self)?)?)
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(to_canonical_value(self)?)
    }
}

/// An external witness binding a checkpoint to a point in time or an
/// immutable medium.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorReceipt {
    /// Backend name, e.g. `log_only`, `worm`, `timestamp`, `multi`.
    pub anchor_type: String,
    pub anchor_id: String,
    pub anchor_hash: String,
    pub anchor_payload: Value,
    /// Backend-specific evidence.
    pub proof: Value,
}

impl AnchorReceipt {
    /// Parse `anchor_payload` back into its typed form.
    pub fn payload(&self) -> Option<AnchorPayload> {
        serde_json::from_value(self.anchor_payload.clone()).ok()
    }

    /// SHA-256 of the canonical `anchor_payload` as stored on the receipt.
    pub fn recompute_hash(&self) -> Result<String> {
        Ok(hash_canonical(&self.anchor_payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::CheckpointSigner;
    use crate::crypto::Keypair;
    use crate::event::EventDraft;
    use crate::payload::PayloadRegistry;
    use crate::types::AuditHead;

    #[test]
    fn test_anchor_payload_hash() {
        let event = EventDraft::new("A", "u")
            .seal(
                &AuditHead::genesis(),
                "2026-01-01T00:00:00.000Z",
                &PayloadRegistry::standard(),
            )
            .unwrap();
        let cp = CheckpointSigner::new(Keypair::from_seed(&[3; 32]))
            .sign("cp-1", &event, "2026-01-01T00:00:00.000Z", None)
            .unwrap();

        let payload = AnchorPayload::for_checkpoint(&cp, "2026-01-01T00:00:01.000Z");
        assert_eq!(payload.kind, ANCHOR_PAYLOAD_KIND);
        assert_eq!(payload.checkpoint_hash, event.hash);

        let hash = payload.anchor_hash().unwrap();
        assert_eq!(hash, sha256_hex(payload.canonical().unwrap().as_bytes()));

        let receipt = AnchorReceipt {
            anchor_type: "log_only".into(),
            anchor_id: "a-1".into(),
            anchor_hash: hash.clone(),
            anchor_payload: payload.to_value().unwrap(),
            proof: Value::Null,
        };
        assert_eq!(receipt.recompute_hash().unwrap(), hash);
        assert_eq!(receipt.payload(), Some(payload));
    }
}
