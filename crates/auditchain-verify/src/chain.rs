//! Event chain replay over raw pack JSON.

use serde_json::{json, Value};

use crate::canon::digest;

pub const GENESIS: &str = "GENESIS";

/// Payload versions this verifier can rebuild.
pub const KNOWN_PAYLOAD_VERSIONS: &[u64] = &[1];

/// First violation in the replayed events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Break {
    pub seq: u64,
    pub reason: &'static str,
    pub expected: String,
    pub found: String,
}

impl std::fmt::Display for Break {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} at seq {}: expected {}, found {}",
            self.reason, self.seq, self.expected, self.found
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Replay {
    pub checked: u64,
    /// `(seq, hash)` of the last event that passed.
    pub last: Option<(u64, String)>,
    pub failure: Option<Break>,
}

/// The hashed shape of `event` for its stored payload version.
pub fn hashed_shape(event: &Value) -> Option<Value> {
    match event.get("payloadVersion").and_then(Value::as_u64) {
        Some(1) => Some(shape_v1(event)),
        _ => None,
    }
}

fn shape_v1(event: &Value) -> Value {
    let field = |name: &str| event.get(name).cloned().unwrap_or(Value::Null);
    json!({
        "_v": 1,
        "schemaVersion": field("schemaVersion"),
        "seq": field("seq"),
        "ts": field("ts"),
        "action": field("action"),
        "actor": field("actor"),
        "receiptId": field("receiptId"),
        "exportId": field("exportId"),
        "savedViewId": field("savedViewId"),
        "payload": field("payload"),
        "ip": field("ip"),
        "userAgent": field("userAgent"),
        "prevHash": field("prevHash"),
    })
}

fn text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "missing".to_string(),
    }
}

/// Replay `events` expecting the first at `start_seq`.
///
/// `expected_prev = None` trusts the first event's own `prevHash`.
pub fn replay(events: &[Value], start_seq: u64, expected_prev: Option<String>) -> Replay {
    let mut replay = Replay::default();
    let mut next_seq = start_seq;
    let mut expected_prev = expected_prev;

    for event in events {
        if let Some(failure) = check(event, next_seq, expected_prev.as_deref()) {
            tracing::debug!(%failure, "chain replay stopped");
            replay.failure = Some(failure);
            return replay;
        }
        let hash = text(event.get("hash"));
        replay.checked += 1;
        replay.last = Some((next_seq, hash.clone()));
        next_seq += 1;
        expected_prev = Some(hash);
    }
    replay
}

fn check(event: &Value, seq: u64, expected_prev: Option<&str>) -> Option<Break> {
    let stored_seq = event.get("seq").and_then(Value::as_u64);
    if stored_seq != Some(seq) {
        return Some(Break {
            seq,
            reason: "seq_gap",
            expected: seq.to_string(),
            found: text(event.get("seq")),
        });
    }

    let prev = text(event.get("prevHash"));
    if let Some(expected_prev) = expected_prev {
        if prev != expected_prev {
            return Some(Break {
                seq,
                reason: "prevHash_mismatch",
                expected: expected_prev.to_string(),
                found: prev,
            });
        }
    }

    let Some(shape) = hashed_shape(event) else {
        return Some(Break {
            seq,
            reason: "unknown_payload_version",
            expected: KNOWN_PAYLOAD_VERSIONS
                .iter()
                .map(u64::to_string)
                .collect::<Vec<_>>()
                .join(","),
            found: text(event.get("payloadVersion")),
        });
    };

    if shape.get("_v") != event.get("payloadVersion") {
        return Some(Break {
            seq,
            reason: "version_mismatch",
            expected: text(event.get("payloadVersion")),
            found: text(shape.get("_v")),
        });
    }

    let stored_hash = text(event.get("hash"));
    match digest(&shape) {
        Ok(recomputed) if recomputed == stored_hash => None,
        Ok(recomputed) => Some(Break {
            seq,
            reason: "hash_mismatch",
            expected: recomputed,
            found: stored_hash,
        }),
        Err(err) => Some(Break {
            seq,
            reason: "hash_mismatch",
            expected: stored_hash,
            found: err.to_string(),
        }),
    }
}
