//! Checkpoint checks: signature, signed payload, event hash and linkage.

use serde_json::Value;

use crate::canon::{canonical, digest};
use crate::keys::{signature_valid, TrustedKeys};

pub const SIGNATURE_ALG: &str = "ed25519";

/// Hex characters of the link hash between consecutive checkpoints.
pub const LINK_HEX_LEN: usize = 32;

fn field<'a>(checkpoint: &'a Value, name: &str) -> &'a Value {
    checkpoint.get(name).unwrap_or(&Value::Null)
}

fn label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Link hash of a checkpoint: the first 32 hex characters of the digest of
/// its re-canonicalized signed payload.
pub fn link_hash(signed_payload: &str) -> Result<String, String> {
    let parsed: Value = serde_json::from_str(signed_payload).map_err(|e| e.to_string())?;
    let mut hash = digest(&parsed).map_err(|e| e.to_string())?;
    hash.truncate(LINK_HEX_LEN);
    Ok(hash)
}

/// Outcome of a signature check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureCheck {
    Valid { key_id: String },
    /// No keys were supplied.
    Skipped,
    /// Keys were supplied but none has this id.
    UnknownKey { key_id: String },
    Invalid { key_id: String },
}

pub fn check_signature(checkpoint: &Value, keys: &TrustedKeys) -> SignatureCheck {
    let key_id = label(field(checkpoint, "publicKeyId"));
    if keys.is_empty() {
        return SignatureCheck::Skipped;
    }
    let Some(key) = keys.get(&key_id) else {
        return SignatureCheck::UnknownKey { key_id };
    };
    let alg_ok = field(checkpoint, "signatureAlg").as_str() == Some(SIGNATURE_ALG);
    let (Some(payload), Some(signature)) = (
        field(checkpoint, "signedPayload").as_str(),
        field(checkpoint, "signature").as_str(),
    ) else {
        return SignatureCheck::Invalid { key_id };
    };
    if alg_ok && signature_valid(key, payload.as_bytes(), signature) {
        SignatureCheck::Valid { key_id }
    } else {
        SignatureCheck::Invalid { key_id }
    }
}

/// The signed payload must be canonical and agree with the record's fields.
pub fn check_payload(checkpoint: &Value) -> Result<(), String> {
    let raw = field(checkpoint, "signedPayload")
        .as_str()
        .ok_or("signedPayload missing")?;
    let payload: Value =
        serde_json::from_str(raw).map_err(|e| format!("signedPayload unreadable: {e}"))?;
    if canonical(&payload).map_err(|e| e.to_string())? != raw {
        return Err("signedPayload is not canonical".into());
    }

    let pairs = [
        ("seq", "seq"),
        ("event_hash_at_seq", "hash"),
        ("ts", "ts"),
        ("prev_checkpoint_id", "prevCheckpointId"),
        ("prev_checkpoint_hash", "prevCheckpointHash"),
        ("events_since_last_checkpoint", "eventCount"),
        ("signing_key_id", "publicKeyId"),
    ];
    for (signed, record) in pairs {
        let signed_value = payload.get(signed).unwrap_or(&Value::Null);
        let record_value = field(checkpoint, record);
        if signed_value != record_value {
            return Err(format!(
                "{record}: signed {}, recorded {}",
                label(signed_value),
                label(record_value)
            ));
        }
    }
    Ok(())
}

/// `checkpoint` must point at `previous`. The first checkpoint in a pack
/// trusts its own link.
pub fn check_link(checkpoint: &Value, previous: Option<&Value>) -> Result<(), String> {
    let Some(previous) = previous else {
        return Ok(());
    };

    let expected_id = field(previous, "id");
    let found_id = field(checkpoint, "prevCheckpointId");
    if expected_id != found_id {
        return Err(format!(
            "prevCheckpointId: expected {}, found {}",
            label(expected_id),
            label(found_id)
        ));
    }

    let previous_payload = field(previous, "signedPayload")
        .as_str()
        .ok_or("previous signedPayload missing")?;
    let expected_hash = link_hash(previous_payload)?;
    let found_hash = label(field(checkpoint, "prevCheckpointHash"));
    if expected_hash != found_hash {
        return Err(format!(
            "prevCheckpointHash: expected {expected_hash}, found {found_hash}"
        ));
    }
    Ok(())
}
