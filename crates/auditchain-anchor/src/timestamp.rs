//! Timestamp-authority anchoring.
//!
//! The anchor hash is submitted to a timestamp authority as a message imprint
//! (`sha256` over the UTF-8 bytes of the hex anchor hash). The returned token
//! proves the imprint existed at `gen_time`. The receipt carries both, so a
//! verifier can check the token covers exactly this anchor hash.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use auditchain_core::{sha256_hex, AnchorPayload, AnchorReceipt, Keypair, PublicKey, Signature};
use serde::{Deserialize, Serialize};

use crate::backend::{
    check_receipt_hash, new_receipt, AnchorBackend, AnchorReason, AnchorVerification,
};
use crate::error::{AnchorError, Result};

pub const TIMESTAMP_BACKEND: &str = "timestamp";

/// A signed statement that `imprint` existed at `gen_time`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimestampToken {
    pub authority: String,
    pub serial: String,
    pub gen_time: String,
    pub imprint: String,
    pub hash_alg: String,
    /// Hex public key of the authority.
    pub authority_key: String,
    /// Hex signature over `imprint|gen_time|serial`.
    pub signature: String,
}

impl TimestampToken {
    /// The exact bytes the authority signs.
    pub fn signed_message(&self) -> String {
        format!("{}|{}|{}", self.imprint, self.gen_time, self.serial)
    }
}

/// A third-party timestamping service.
#[async_trait]
pub trait TimestampAuthority: Send + Sync {
    fn name(&self) -> &str;

    /// Request a token over a hex SHA-256 imprint.
    async fn timestamp(&self, imprint: &str) -> Result<TimestampToken>;

    /// Whether `token` was issued by this authority and is intact.
    fn verify_token(&self, token: &TimestampToken) -> bool;
}

/// An Ed25519 timestamp authority running in-process.
pub struct LocalTimestampAuthority {
    keypair: Keypair,
    serial: AtomicU64,
}

impl LocalTimestampAuthority {
    pub fn new(keypair: Keypair) -> Self {
        Self {
            keypair,
            serial: AtomicU64::new(0),
        }
    }

    /// An authority with a fresh random key.
    pub fn generate() -> Self {
        Self::new(Keypair::generate())
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }
}

#[async_trait]
impl TimestampAuthority for LocalTimestampAuthority {
    fn name(&self) -> &str {
        "local-ed25519"
    }

    async fn timestamp(&self, imprint: &str) -> Result<TimestampToken> {
        if imprint.len() != 64 || !imprint.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(AnchorError::Backend {
                backend: TIMESTAMP_BACKEND.to_string(),
                message: format!("imprint is not a sha256 hex digest: {imprint}"),
            });
        }
        let serial = self.serial.fetch_add(1, Ordering::SeqCst) + 1;
        let mut token = TimestampToken {
            authority: self.name().to_string(),
            serial: serial.to_string(),
            gen_time: crate::now_ts(),
            imprint: imprint.to_string(),
            hash_alg: "sha256".to_string(),
            authority_key: self.public_key().to_hex(),
            signature: String::new(),
        };
        token.signature = self.keypair.sign(token.signed_message().as_bytes()).to_hex();
        Ok(token)
    }

    fn verify_token(&self, token: &TimestampToken) -> bool {
        if token.authority_key != self.public_key().to_hex() {
            return false;
        }
        let Ok(signature) = Signature::from_hex(&token.signature) else {
            return false;
        };
        self.public_key()
            .verify(token.signed_message().as_bytes(), &signature)
            .is_ok()
    }
}

/// Evidence carried by a timestamp receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimestampProof {
    pub imprint: String,
    pub hash_alg: String,
    pub token: TimestampToken,
}

/// The message imprint of an anchor hash.
pub fn imprint_of(anchor_hash: &str) -> String {
    sha256_hex(anchor_hash.as_bytes())
}

/// Anchors checkpoints with a timestamp authority.
pub struct TimestampAnchor<A: TimestampAuthority> {
    authority: A,
}

impl<A: TimestampAuthority> TimestampAnchor<A> {
    pub fn new(authority: A) -> Self {
        Self { authority }
    }

    pub fn authority(&self) -> &A {
        &self.authority
    }
}

#[async_trait]
impl<A: TimestampAuthority> AnchorBackend for TimestampAnchor<A> {
    fn name(&self) -> &str {
        TIMESTAMP_BACKEND
    }

    async fn anchor_payload(&self, payload: &AnchorPayload) -> Result<AnchorReceipt> {
        let mut receipt = new_receipt(TIMESTAMP_BACKEND, payload)?;
        let imprint = imprint_of(&receipt.anchor_hash);
        let token = self.authority.timestamp(&imprint).await?;

        tracing::info!(
            backend = TIMESTAMP_BACKEND,
            checkpoint_id = %payload.checkpoint_id,
            seq = payload.seq,
            authority = %token.authority,
            serial = %token.serial,
            "checkpoint anchored"
        );

        receipt.proof = serde_json::to_value(TimestampProof {
            imprint,
            hash_alg: "sha256".to_string(),
            token,
        })?;
        Ok(receipt)
    }

    async fn verify(&self, receipt: &AnchorReceipt) -> AnchorVerification {
        if let Some(failed) = check_receipt_hash(TIMESTAMP_BACKEND, receipt) {
            return failed;
        }
        let Ok(proof) = serde_json::from_value::<TimestampProof>(receipt.proof.clone()) else {
            return AnchorVerification::invalid(AnchorReason::MalformedProof);
        };

        if proof.imprint != imprint_of(&receipt.anchor_hash) || proof.token.imprint != proof.imprint
        {
            return AnchorVerification::invalid(AnchorReason::ImprintMismatch);
        }
        if !self.authority.verify_token(&proof.token) {
            return AnchorVerification::invalid(AnchorReason::TokenInvalid);
        }
        AnchorVerification::ok()
    }
}
