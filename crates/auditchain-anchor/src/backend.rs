//! The anchor backend capability.

use std::fmt;

use async_trait::async_trait;
use auditchain_core::{AnchorPayload, AnchorReceipt, Checkpoint};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Closed set of anchor verification outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorReason {
    Ok,
    AnchorHashMismatch,
    ProofBodyMismatch,
    ImprintMismatch,
    TokenInvalid,
    MalformedProof,
    UnknownBackend,
    PolicyUnsatisfied,
}

impl AnchorReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::AnchorHashMismatch => "anchor_hash_mismatch",
            Self::ProofBodyMismatch => "proof_body_mismatch",
            Self::ImprintMismatch => "imprint_mismatch",
            Self::TokenInvalid => "token_invalid",
            Self::MalformedProof => "malformed_proof",
            Self::UnknownBackend => "unknown_backend",
            Self::PolicyUnsatisfied => "policy_unsatisfied",
        }
    }
}

impl fmt::Display for AnchorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of re-verifying a receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorVerification {
    pub valid: bool,
    pub reason: AnchorReason,
}

impl AnchorVerification {
    pub fn ok() -> Self {
        Self {
            valid: true,
            reason: AnchorReason::Ok,
        }
    }

    pub fn invalid(reason: AnchorReason) -> Self {
        Self {
            valid: false,
            reason,
        }
    }
}

/// An external witness for checkpoints.
///
/// Implementations must be thread-safe (Send + Sync). A receipt produced by
/// `anchor` must verify from its own fields alone, and any change to its
/// `anchor_hash` must make `verify` fail.
#[async_trait]
pub trait AnchorBackend: Send + Sync {
    /// Backend name, recorded as the receipt's `anchor_type`.
    fn name(&self) -> &str;

    /// Witness an already-built anchor payload.
    async fn anchor_payload(&self, payload: &AnchorPayload) -> Result<AnchorReceipt>;

    /// Witness `checkpoint` as of now.
    async fn anchor(&self, checkpoint: &Checkpoint) -> Result<AnchorReceipt> {
        let payload = AnchorPayload::for_checkpoint(checkpoint, crate::now_ts());
        self.anchor_payload(&payload).await
    }

    /// Re-verify a receipt produced by this backend.
    async fn verify(&self, receipt: &AnchorReceipt) -> AnchorVerification;
}

/// Checks shared by every backend: the receipt was produced by `backend`
/// and its `anchor_hash` is the hash of its `anchor_payload`.
pub(crate) fn check_receipt_hash(backend: &str, receipt: &AnchorReceipt) -> Option<AnchorVerification> {
    if receipt.anchor_type != backend {
        return Some(AnchorVerification::invalid(AnchorReason::UnknownBackend));
    }
    match receipt.recompute_hash() {
        Ok(hash) if hash == receipt.anchor_hash => None,
        Ok(_) => Some(AnchorVerification::invalid(AnchorReason::AnchorHashMismatch)),
        Err(_) => Some(AnchorVerification::invalid(AnchorReason::MalformedProof)),
    }
}

/// A receipt skeleton for `payload`, with the proof left for the backend.
pub(crate) fn new_receipt(backend: &str, payload: &AnchorPayload) -> Result<AnchorReceipt> {
    Ok(AnchorReceipt {
        anchor_type: backend.to_string(),
        anchor_id: uuid::Uuid::new_v4().to_string(),
        anchor_hash: payload.anchor_hash()?,
        anchor_payload: payload.to_value()?,
        proof: serde_json::Value::Null,
    })
}
