//! Log-only anchoring: the receipt is its own witness.
//!
//! This is the weakest guarantee and the default fallback. The anchor hash is
//! written to the log stream, which is the only external record.

use async_trait::async_trait;
use auditchain_core::{AnchorPayload, AnchorReceipt};
use serde_json::json;

use crate::backend::{check_receipt_hash, new_receipt, AnchorBackend, AnchorVerification};
use crate::error::Result;

pub const LOG_ONLY_BACKEND: &str = "log_only";

#[derive(Debug, Clone, Default)]
pub struct LogOnlyAnchor;

impl LogOnlyAnchor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AnchorBackend for LogOnlyAnchor {
    fn name(&self) -> &str {
        LOG_ONLY_BACKEND
    }

    async fn anchor_payload(&self, payload: &AnchorPayload) -> Result<AnchorReceipt> {
        let mut receipt = new_receipt(LOG_ONLY_BACKEND, payload)?;
        receipt.proof = json!({ "method": "log", "loggedAt": payload.anchored_at });

        tracing::info!(
            backend = LOG_ONLY_BACKEND,
            checkpoint_id = %payload.checkpoint_id,
            seq = payload.seq,
            anchor_hash = %receipt.anchor_hash,
            "checkpoint anchored"
        );
        Ok(receipt)
    }

    async fn verify(&self, receipt: &AnchorReceipt) -> AnchorVerification {
        check_receipt_hash(LOG_ONLY_BACKEND, receipt).unwrap_or_else(AnchorVerification::ok)
    }
}
