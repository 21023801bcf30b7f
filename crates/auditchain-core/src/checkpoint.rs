//! Signed checkpoints over the event chain.
//!
//! Every `interval` events the ledger signs a small summary of the chain
//! position. Checkpoints link to each other through `prev_checkpoint_hash`,
//! forming a second hash chain that covers checkpoints alone. The signed
//! payload is stored verbatim next to the signature so it can be re-verified
//! byte for byte.
//!
//! Signing keys rotate. Each checkpoint names the key that signed it, and
//! verification goes through a [`KeyRing`] so older checkpoints stay
//! verifiable after a rotation.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical::{canonicalize, canonicalize_serialize};
use crate::crypto::{sha256_hex, KeyId, Keypair, PublicKey, Signature};
use crate::error::{CoreError, Result};
use crate::event::AuditEvent;

/// Signature algorithm recorded on every checkpoint.
pub const SIGNATURE_ALG: &str = "ed25519";

/// Hex characters of the previous signed payload hash kept in the link.
pub const CHECKPOINT_LINK_HEX_LEN: usize = 32;

/// The exact object that is canonicalized and signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointPayload {
    pub seq: u64,
    pub event_hash_at_seq: String,
    pub ts: String,
    pub prev_checkpoint_id: Option<String>,
    pub prev_checkpoint_hash: Option<String>,
    pub events_since_last_checkpoint: u64,
    pub signing_key_id: String,
}

/// A stored checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub id: String,
    pub seq: u64,
    /// Hash of the event at `seq`.
    pub hash: String,
    pub ts: String,
    pub prev_checkpoint_id: Option<String>,
    pub prev_checkpoint_hash: Option<String>,
    pub signature_alg: String,
    pub public_key_id: String,
    /// Lowercase hex of the 64 signature bytes.
    pub signature: String,
    /// Canonical JSON of [`CheckpointPayload`], exactly as signed.
    pub signed_payload: String,
    pub event_count: u64,
}

impl Checkpoint {
    /// Parse the stored signed payload.
    pub fn payload(&self) -> Result<CheckpointPayload> {
        serde_json::from_str(&self.signed_payload)
            .map_err(|e| CoreError::MalformedCheckpoint(e.to_string()))
    }

    /// The value the next checkpoint stores as `prev_checkpoint_hash`.
    pub fn link_hash(&self) -> Result<String> {
        checkpoint_link_hash(&self.signed_payload)
    }
}

/// First 32 hex chars of SHA-256 over the canonical form of a signed payload.
pub fn checkpoint_link_hash(signed_payload: &str) -> Result<String> {
    let value: Value = serde_json::from_str(signed_payload)
        .map_err(|e| CoreError::MalformedCheckpoint(e.to_string()))?;
    let mut digest = sha256_hex(canonicalize(&value)?.as_bytes());
    digest.truncate(CHECKPOINT_LINK_HEX_LEN);
    Ok(digest)
}

/// A public key as published in a forensic pack manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedKey {
    pub key_id: String,
    pub algorithm: String,
    pub public_key_pem: String,
}

/// Key id to public key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRing {
    keys: BTreeMap<KeyId, PublicKey>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ring from public keys.
    pub fn from_keys(keys: impl IntoIterator<Item = PublicKey>) -> Self {
        let mut ring = Self::new();
        for key in keys {
            ring.insert(key);
        }
        ring
    }

    /// Add a key under its derived id.
    pub fn insert(&mut self, key: PublicKey) -> KeyId {
        let id = key.key_id();
        self.keys.insert(id.clone(), key);
        id
    }

    pub fn get(&self, key_id: &str) -> Option<&PublicKey> {
        self.keys.get(&KeyId::from(key_id))
    }

    pub fn contains(&self, key_id: &str) -> bool {
        self.get(key_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&KeyId, &PublicKey)> {
        self.keys.iter()
    }

    /// Every key as SPKI PEM, ordered by key id.
    pub fn to_pem_entries(&self) -> Result<Vec<PublishedKey>> {
        self.keys
            .iter()
            .map(|(id, key)| {
                Ok(PublishedKey {
                    key_id: id.to_string(),
                    algorithm: SIGNATURE_ALG.to_string(),
                    public_key_pem: key.to_pem()?,
                })
            })
            .collect()
    }
}

/// Signs checkpoints with the active key and remembers every key it has used.
pub struct CheckpointSigner {
    active: Keypair,
    active_id: KeyId,
    ring: KeyRing,
}

impl CheckpointSigner {
    pub fn new(keypair: Keypair) -> Self {
        let mut ring = KeyRing::new();
        let active_id = ring.insert(keypair.public_key());
        Self {
            active: keypair,
            active_id,
            ring,
        }
    }

    /// Make `keypair` the active key. Retired public keys stay in the ring.
    pub fn rotate(&mut self, keypair: Keypair) -> KeyId {
        self.active_id = self.ring.insert(keypair.public_key());
        self.active = keypair;
        self.active_id.clone()
    }

    /// Add a retired public key so checkpoints it signed stay verifiable.
    pub fn trust(&mut self, key: PublicKey) -> KeyId {
        self.ring.insert(key)
    }

    pub fn active_key_id(&self) -> &KeyId {
        &self.active_id
    }

    pub fn public_key(&self) -> PublicKey {
        self.active.public_key()
    }

    /// Public keys of every key this signer has held.
    pub fn key_ring(&self) -> &KeyRing {
        &self.ring
    }

    /// Sign a checkpoint at `event`, linked to `previous`.
    pub fn sign(
        &self,
        id: impl Into<String>,
        event: &AuditEvent,
        ts: impl Into<String>,
        previous: Option<&Checkpoint>,
    ) -> Result<Checkpoint> {
        let prev_checkpoint_hash = previous.map(Checkpoint::link_hash).transpose()?;
        let payload = CheckpointPayload {
            seq: event.seq,
            event_hash_at_seq: event.hash.clone(),
            ts: ts.into(),
            prev_checkpoint_id: previous.map(|p| p.id.clone()),
            prev_checkpoint_hash,
            events_since_last_checkpoint: event.seq - previous.map_or(0, |p| p.seq.min(event.seq)),
            signing_key_id: self.active_id.to_string(),
        };

        let signed_payload = canonicalize_serialize(&payload)?;
        let signature = self.active.sign(signed_payload.as_bytes());

        Ok(Checkpoint {
            id: id.into(),
            seq: payload.seq,
            hash: payload.event_hash_at_seq,
            ts: payload.ts,
            prev_checkpoint_id: payload.prev_checkpoint_id,
            prev_checkpoint_hash: payload.prev_checkpoint_hash,
            signature_alg: SIGNATURE_ALG.to_string(),
            public_key_id: payload.signing_key_id,
            signature: signature.to_hex(),
            signed_payload,
            event_count: payload.events_since_last_checkpoint,
        })
    }
}

impl fmt::Debug for CheckpointSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckpointSigner")
            .field("active", &self.active_id)
            .field("keys", &self.ring.len())
            .finish()
    }
}

/// Outcome of checking one checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum CheckpointVerdict {
    Valid,
    UnknownKey { key_id: String },
    BadSignature,
    PayloadMismatch { field: String },
    HashMismatch { expected: String, found: String },
    ChainMismatch { field: String, expected: String, found: String },
}

impl CheckpointVerdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::UnknownKey { .. } => "unknown_key",
            Self::BadSignature => "bad_signature",
            Self::PayloadMismatch { .. } => "payload_mismatch",
            Self::HashMismatch { .. } => "hash_mismatch",
            Self::ChainMismatch { .. } => "chain_mismatch",
        }
    }
}

impl fmt::Display for CheckpointVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check the signature of `checkpoint` and that its signed payload agrees
/// with the record.
pub fn verify_checkpoint(checkpoint: &Checkpoint, ring: &KeyRing) -> CheckpointVerdict {
    let Some(key) = ring.get(&checkpoint.public_key_id) else {
        return CheckpointVerdict::UnknownKey {
            key_id: checkpoint.public_key_id.clone(),
        };
    };

    if checkpoint.signature_alg != SIGNATURE_ALG {
        return CheckpointVerdict::BadSignature;
    }
    let Ok(signature) = Signature::from_hex(&checkpoint.signature) else {
        return CheckpointVerdict::BadSignature;
    };
    if key
        .verify(checkpoint.signed_payload.as_bytes(), &signature)
        .is_err()
    {
        return CheckpointVerdict::BadSignature;
    }

    let Ok(payload) = checkpoint.payload() else {
        return mismatch("signedPayload");
    };
    if payload.seq != checkpoint.seq {
        return mismatch("seq");
    }
    if payload.event_hash_at_seq != checkpoint.hash {
        return mismatch("hash");
    }
    if payload.ts != checkpoint.ts {
        return mismatch("ts");
    }
    if payload.prev_checkpoint_id != checkpoint.prev_checkpoint_id {
        return mismatch("prevCheckpointId");
    }
    if payload.prev_checkpoint_hash != checkpoint.prev_checkpoint_hash {
        return mismatch("prevCheckpointHash");
    }
    if payload.events_since_last_checkpoint != checkpoint.event_count {
        return mismatch("eventCount");
    }
    if payload.signing_key_id != checkpoint.public_key_id {
        return mismatch("publicKeyId");
    }

    CheckpointVerdict::Valid
}

fn mismatch(field: &str) -> CheckpointVerdict {
    CheckpointVerdict::PayloadMismatch {
        field: field.to_string(),
    }
}

/// Check that `checkpoint` covers the event hash stored at its seq.
pub fn verify_checkpoint_hash(checkpoint: &Checkpoint, event_hash: &str) -> CheckpointVerdict {
    if checkpoint.hash == event_hash {
        CheckpointVerdict::Valid
    } else {
        CheckpointVerdict::HashMismatch {
            expected: event_hash.to_string(),
            found: checkpoint.hash.clone(),
        }
    }
}

/// Check the link from `checkpoint` back to `previous`.
///
/// `previous = None` means `checkpoint` is the first of the chain and must
/// not link anywhere.
pub fn verify_checkpoint_link(
    checkpoint: &Checkpoint,
    previous: Option<&Checkpoint>,
) -> CheckpointVerdict {
    let expected_id = previous.map(|p| p.id.clone());
    if checkpoint.prev_checkpoint_id != expected_id {
        return CheckpointVerdict::ChainMismatch {
            field: "prevCheckpointId".to_string(),
            expected: expected_id.unwrap_or_else(|| "null".to_string()),
            found: checkpoint
                .prev_checkpoint_id
                .clone()
                .unwrap_or_else(|| "null".to_string()),
        };
    }

    let expected_hash = match previous.map(Checkpoint::link_hash).transpose() {
        Ok(hash) => hash,
        Err(err) => Some(format!("<{err}>")),
    };
    if checkpoint.prev_checkpoint_hash != expected_hash {
        return CheckpointVerdict::ChainMismatch {
            field: "prevCheckpointHash".to_string(),
            expected: expected_hash.unwrap_or_else(|| "null".to_string()),
            found: checkpoint
                .prev_checkpoint_hash
                .clone()
                .unwrap_or_else(|| "null".to_string()),
        };
    }

    CheckpointVerdict::Valid
}
