//! Golden vectors for canonical encoding and event hashing.
//!
//! Both the ledger and the offline verifier must reproduce these byte for
//! byte. A change to any expected value means stored hashes no longer verify.

use auditchain_core::{AuditEvent, GENESIS_HASH};
use serde_json::{json, Value};

/// A JSON input with its expected canonical form and SHA-256.
#[derive(Debug, Clone)]
pub struct CanonicalVector {
    pub name: &'static str,
    /// JSON text, parsed with `serde_json` before canonicalizing.
    pub input: &'static str,
    pub canonical: &'static str,
    pub sha256: &'static str,
}

pub fn canonical_vectors() -> Vec<CanonicalVector> {
    vec![
        CanonicalVector {
            name: "empty object",
            input: "{}",
            canonical: "{}",
            sha256: "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a",
        },
        CanonicalVector {
            name: "nested keys sorted, arrays kept",
            input: r#"{ "b": [3, 1, {"d": null, "c": true}], "a": "x" }"#,
            canonical: r#"{"a":"x","b":[3,1,{"c":true,"d":null}]}"#,
            sha256: "8ea802f1f476481d8ef78f33eeccc8d11fca9397dc4dc4a547ec7b50b15a9c42",
        },
        CanonicalVector {
            name: "string escapes",
            input: r#"{"s": "line\nbreak \"q\" back\\slash \u0001 tab\t"}"#,
            canonical: r#"{"s":"line\nbreak \"q\" back\\slash \u0001 tab\t"}"#,
            sha256: "a7f68582a5832d33145e33122a96b9e2fddbaf90cfc63ea990077731774670e4",
        },
        CanonicalVector {
            name: "non-ascii passes through",
            input: r#"{"name": "café ☕"}"#,
            canonical: "{\"name\":\"caf\u{e9} \u{2615}\"}",
            sha256: "269ba9abc5ed04611faee6ffcd5b410b2365340d568be4c39b44adb5150b4f9f",
        },
        CanonicalVector {
            name: "keys in utf-16 order",
            input: "{\"\u{ff61}\": 1, \"\u{1f600}\": 2}",
            canonical: "{\"\u{1f600}\":2,\"\u{ff61}\":1}",
            sha256: "c265de3d33291482eef3c7c19e4a939f9e712cd9ce0c5bd3422e1b7651368fb8",
        },
        CanonicalVector {
            name: "integral float renders as integer",
            input: r#"{"w": 1.0, "i": -42, "f": 1.5}"#,
            canonical: r#"{"f":1.5,"i":-42,"w":1}"#,
            sha256: "f8f86749b20d730decdba82bb2fe4328494f863f77681398476b5ae5b4cfeec0",
        },
    ]
}

/// Inputs that must be rejected by every canonicalizer.
pub fn rejected_inputs() -> Vec<(&'static str, Value)> {
    vec![
        ("unsafe integer", json!({"n": 9_007_199_254_740_992u64})),
        ("unsafe negative integer", json!({"n": -9_007_199_254_740_992i64})),
        ("float beyond the safe range", json!({"f": 1.0e17})),
        ("__proto__ key", json!({"__proto__": 1})),
        ("nested constructor key", json!({"a": [{"constructor": null}]})),
        ("prototype key", json!({"prototype": {}})),
    ]
}

pub const VECTOR_TS: &str = "2026-01-14T12:00:00.000Z";

/// Two linked events with known hashes.
pub fn event_vectors() -> Vec<AuditEvent> {
    let first = AuditEvent {
        seq: 1,
        ts: VECTOR_TS.to_string(),
        action: "receipt.viewed".to_string(),
        actor: "user-1".to_string(),
        receipt_id: Some("r-1".to_string()),
        export_id: None,
        saved_view_id: None,
        payload: json!({"page": 2}),
        ip: Some("10.0.0.1".to_string()),
        user_agent: None,
        prev_hash: GENESIS_HASH.to_string(),
        hash: "39657055661b21f95219420d6e54169b215c9b05fce458aa8d3feac99ba88289".to_string(),
        schema_version: 1,
        payload_version: 1,
    };
    let second = AuditEvent {
        seq: 2,
        action: "export.created".to_string(),
        receipt_id: None,
        export_id: Some("x-9".to_string()),
        payload: json!({}),
        ip: None,
        prev_hash: first.hash.clone(),
        hash: "57da200d5bfe5a2507ece529321c436e7147213d0cb8e1894fda7b4150bd48a2".to_string(),
        ..first.clone()
    };
    vec![first, second]
}

#[cfg(test)]
mod tests {
    use super::*;
    use auditchain_core::{canonicalize, hash_canonical, PayloadRegistry};

    #[test]
    fn test_core_matches_canonical_vectors() {
        for vector in canonical_vectors() {
            let value: Value = serde_json::from_str(vector.input).unwrap();
            assert_eq!(canonicalize(&value).unwrap(), vector.canonical, "{}", vector.name);
            assert_eq!(hash_canonical(&value).unwrap(), vector.sha256, "{}", vector.name);
        }
    }

    #[test]
    fn test_verifier_matches_canonical_vectors() {
        for vector in canonical_vectors() {
            let value: Value = serde_json::from_str(vector.input).unwrap();
            assert_eq!(
                auditchain_verify::canon::canonical(&value).unwrap(),
                vector.canonical,
                "{}",
                vector.name
            );
            assert_eq!(
                auditchain_verify::canon::digest(&value).unwrap(),
                vector.sha256,
                "{}",
                vector.name
            );
        }
    }

    #[test]
    fn test_both_reject_the_same_inputs() {
        for (name, value) in rejected_inputs() {
            assert!(canonicalize(&value).is_err(), "core accepted {name}");
            assert!(
                auditchain_verify::canon::canonical(&value).is_err(),
                "verifier accepted {name}"
            );
        }
    }

    #[test]
    fn test_event_vectors() {
        let registry = PayloadRegistry::standard();
        for event in event_vectors() {
            assert_eq!(registry.hash_event(&event).unwrap(), event.hash, "seq {}", event.seq);

            let raw = serde_json::to_value(&event).unwrap();
            let shape = auditchain_verify::chain::hashed_shape(&raw).unwrap();
            assert_eq!(auditchain_verify::canon::digest(&shape).unwrap(), event.hash);
        }
    }
}
