//! Composite anchoring across several backends.

use std::fmt;

use async_trait::async_trait;
use auditchain_core::{AnchorPayload, AnchorReceipt};
use serde::{Deserialize, Serialize};

use crate::backend::{
    check_receipt_hash, new_receipt, AnchorBackend, AnchorReason, AnchorVerification,
};
use crate::error::{AnchorError, Result};

pub const MULTI_BACKEND: &str = "multi";

/// How many children must succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiPolicy {
    /// Every child must anchor and verify.
    #[default]
    All,
    /// At least one child must anchor and verify.
    Any,
}

impl MultiPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Any => "any",
        }
    }
}

impl fmt::Display for MultiPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiProof {
    pub policy: MultiPolicy,
    pub receipts: Vec<AnchorReceipt>,
}

/// Anchors the same payload with every child backend.
pub struct MultiAnchor {
    backends: Vec<Box<dyn AnchorBackend>>,
    policy: MultiPolicy,
}

impl MultiAnchor {
    pub fn new(backends: Vec<Box<dyn AnchorBackend>>, policy: MultiPolicy) -> Self {
        Self { backends, policy }
    }

    pub fn policy(&self) -> MultiPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    fn child(&self, name: &str) -> Option<&dyn AnchorBackend> {
        self.backends
            .iter()
            .find(|b| b.name() == name)
            .map(|b| b.as_ref())
    }

    async fn verify_child(&self, parent_hash: &str, child: &AnchorReceipt) -> AnchorVerification {
        if child.anchor_hash != parent_hash {
            return AnchorVerification::invalid(AnchorReason::AnchorHashMismatch);
        }
        match self.child(&child.anchor_type) {
            Some(backend) => backend.verify(child).await,
            None => AnchorVerification::invalid(AnchorReason::UnknownBackend),
        }
    }
}

#[async_trait]
impl AnchorBackend for MultiAnchor {
    fn name(&self) -> &str {
        MULTI_BACKEND
    }

    async fn anchor_payload(&self, payload: &AnchorPayload) -> Result<AnchorReceipt> {
        let mut receipt = new_receipt(MULTI_BACKEND, payload)?;
        let mut receipts = Vec::with_capacity(self.backends.len());

        for backend in &self.backends {
            match backend.anchor_payload(payload).await {
                Ok(child) => receipts.push(child),
                Err(err) => {
                    tracing::warn!(
                        backend = backend.name(),
                        checkpoint_id = %payload.checkpoint_id,
                        error = %err,
                        "child anchor failed"
                    );
                }
            }
        }

        let satisfied = match self.policy {
            MultiPolicy::All => receipts.len() == self.backends.len() && !receipts.is_empty(),
            MultiPolicy::Any => !receipts.is_empty(),
        };
        if !satisfied {
            return Err(AnchorError::PolicyUnsatisfied {
                policy: self.policy.to_string(),
                succeeded: receipts.len(),
                total: self.backends.len(),
            });
        }

        receipt.proof = serde_json::to_value(MultiProof {
            policy: self.policy,
            receipts,
        })?;
        Ok(receipt)
    }

    async fn verify(&self, receipt: &AnchorReceipt) -> AnchorVerification {
        if let Some(failed) = check_receipt_hash(MULTI_BACKEND, receipt) {
            return failed;
        }
        let Ok(proof) = serde_json::from_value::<MultiProof>(receipt.proof.clone()) else {
            return AnchorVerification::invalid(AnchorReason::MalformedProof);
        };

        let mut results = Vec::with_capacity(proof.receipts.len());
        for child in &proof.receipts {
            results.push(self.verify_child(&receipt.anchor_hash, child).await);
        }

        match self.policy {
            MultiPolicy::All => {
                if let Some(failed) = results.iter().find(|r| !r.valid) {
                    return *failed;
                }
                let covered = self
                    .backends
                    .iter()
                    .all(|b| proof.receipts.iter().any(|r| r.anchor_type == b.name()));
                if covered && !results.is_empty() {
                    AnchorVerification::ok()
                } else {
                    AnchorVerification::invalid(AnchorReason::PolicyUnsatisfied)
                }
            }
            MultiPolicy::Any => {
                if results.iter().any(|r| r.valid) {
                    AnchorVerification::ok()
                } else {
                    AnchorVerification::invalid(AnchorReason::PolicyUnsatisfied)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_only::LogOnlyAnchor;
    use crate::testing::sample_checkpoint;
    use crate::timestamp::{LocalTimestampAuthority, TimestampAnchor};
    use crate::worm::{MemoryObjectStore, RetentionMode, WormAnchor};

    /// A backend that always fails to anchor.
    struct Offline;

    #[async_trait]
    impl AnchorBackend for Offline {
        fn name(&self) -> &str {
            "offline"
        }

        async fn anchor_payload(&self, _payload: &AnchorPayload) -> Result<AnchorReceipt> {
            Err(AnchorError::Backend {
                backend: "offline".into(),
                message: "unreachable".into(),
            })
        }

        async fn verify(&self, _receipt: &AnchorReceipt) -> AnchorVerification {
            AnchorVerification::invalid(AnchorReason::TokenInvalid)
        }
    }

    fn three(policy: MultiPolicy) -> MultiAnchor {
        MultiAnchor::new(
            vec![
                Box::new(LogOnlyAnchor::new()),
                Box::new(WormAnchor::new(
                    MemoryObjectStore::new(),
                    RetentionMode::Governance,
                    7,
                )),
                Box::new(TimestampAnchor::new(LocalTimestampAuthority::generate())),
            ],
            policy,
        )
    }

    #[tokio::test]
    async fn test_all_children_share_anchor_hash() {
        let multi = three(MultiPolicy::All);
        let receipt = multi.anchor(&sample_checkpoint()).await.unwrap();
        let proof: MultiProof = serde_json::from_value(receipt.proof.clone()).unwrap();

        assert_eq!(proof.receipts.len(), 3);
        assert!(proof
            .receipts
            .iter()
            .all(|r| r.anchor_hash == receipt.anchor_hash));
        assert!(multi.verify(&receipt).await.valid);
    }

    #[tokio::test]
    async fn test_mutated_anchor_hash_is_invalid() {
        let multi = three(MultiPolicy::Any);
        let mut receipt = multi.anchor(&sample_checkpoint()).await.unwrap();
        receipt.anchor_hash = "4".repeat(64);
        assert!(!multi.verify(&receipt).await.valid);
    }

    #[tokio::test]
    async fn test_child_hash_mutation() {
        let multi = three(MultiPolicy::All);
        let mut receipt = multi.anchor(&sample_checkpoint()).await.unwrap();
        receipt.proof["receipts"][1]["anchorHash"] = serde_json::Value::String("5".repeat(64));
        assert_eq!(
            multi.verify(&receipt).await.reason,
            AnchorReason::AnchorHashMismatch
        );
    }

    #[tokio::test]
    async fn test_all_policy_fails_on_offline_child() {
        let multi = MultiAnchor::new(
            vec![Box::new(LogOnlyAnchor::new()), Box::new(Offline)],
            MultiPolicy::All,
        );
        let err = multi.anchor(&sample_checkpoint()).await.unwrap_err();
        assert!(matches!(
            err,
            AnchorError::PolicyUnsatisfied {
                succeeded: 1,
                total: 2,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_any_policy_tolerates_offline_child() {
        let multi = MultiAnchor::new(
            vec![Box::new(Offline), Box::new(LogOnlyAnchor::new())],
            MultiPolicy::Any,
        );
        let receipt = multi.anchor(&sample_checkpoint()).await.unwrap();
        assert!(multi.verify(&receipt).await.valid);
    }

    #[tokio::test]
    async fn test_all_policy_requires_every_backend() {
        let multi = three(MultiPolicy::All);
        let mut receipt = multi.anchor(&sample_checkpoint()).await.unwrap();
        let mut proof: MultiProof = serde_json::from_value(receipt.proof.clone()).unwrap();
        proof.receipts.truncate(1);
        receipt.proof = serde_json::to_value(proof).unwrap();
        assert_eq!(
            multi.verify(&receipt).await.reason,
            AnchorReason::PolicyUnsatisfied
        );
    }
}
