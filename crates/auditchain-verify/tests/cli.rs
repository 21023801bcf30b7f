//! Runs the `auditchain-verify` binary against packs built in-test.

use std::path::{Path, PathBuf};
use std::process::Command;

use auditchain_verify::canon::{canonical, digest};
use auditchain_verify::chain::{hashed_shape, GENESIS};
use auditchain_verify::checkpoints::link_hash;
use auditchain_verify::{key_id, verify_pack, Outcome, TrustedKeys};
use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::EncodePublicKey;
use ed25519_dalek::{Signer, SigningKey};
use serde_json::{json, Value};

fn signing_key() -> SigningKey {
    SigningKey::from_bytes(&[42; 32])
}

/// A sealed pack of `n` events with a checkpoint every `interval`.
fn build_pack(n: u64, interval: u64) -> Value {
    let key = signing_key();
    let kid = key_id(&key.verifying_key());

    let mut events = Vec::new();
    let mut prev = GENESIS.to_string();
    for seq in 1..=n {
        let mut event = json!({
            "seq": seq,
            "ts": "2026-03-01T12:00:00.000Z",
            "action": format!("A{seq}"),
            "actor": "u1",
            "receiptId": null,
            "exportId": null,
            "savedViewId": null,
            "payload": {"n": seq, "note": "café"},
            "ip": "10.0.0.1",
            "userAgent": null,
            "prevHash": prev,
            "hash": "",
            "schemaVersion": 1,
            "payloadVersion": 1,
        });
        let hash = digest(&hashed_shape(&event).unwrap()).unwrap();
        event["hash"] = json!(hash);
        prev = hash;
        events.push(event);
    }

    let mut checkpoints: Vec<Value> = Vec::new();
    for seq in (interval..=n).step_by(interval as usize) {
        let previous = checkpoints.last();
        let prev_id = previous.map_or(Value::Null, |p| p["id"].clone());
        let prev_hash = previous.map_or(Value::Null, |p| {
            json!(link_hash(p["signedPayload"].as_str().unwrap()).unwrap())
        });
        let event_hash = events[(seq - 1) as usize]["hash"].clone();
        let signed = canonical(&json!({
            "seq": seq,
            "event_hash_at_seq": event_hash,
            "ts": "2026-03-01T12:00:01.000Z",
            "prev_checkpoint_id": prev_id,
            "prev_checkpoint_hash": prev_hash,
            "events_since_last_checkpoint": interval,
            "signing_key_id": kid,
        }))
        .unwrap();
        checkpoints.push(json!({
            "id": format!("cp-{seq}"),
            "seq": seq,
            "hash": event_hash,
            "ts": "2026-03-01T12:00:01.000Z",
            "prevCheckpointId": prev_id,
            "prevCheckpointHash": prev_hash,
            "signatureAlg": "ed25519",
            "publicKeyId": kid,
            "signature": hex::encode(key.sign(signed.as_bytes()).to_bytes()),
            "signedPayload": signed,
            "eventCount": interval,
        }));
    }

    let last_hash = events.last().map_or(json!(GENESIS), |e| e["hash"].clone());
    let mut pack = json!({
        "format": "auditchain.forensic-pack/v1",
        "exportedAt": "2026-03-01T12:00:02.000Z",
        "segment": {"fromSeq": 1, "toSeq": n, "count": n},
        "headAtExportTime": {"lastSeq": n, "lastHash": last_hash},
        "verification": {"status": "LINKED", "checked": n, "partial": false, "break": null},
        "manifest": {"canonicalization": "json-sorted-keys/utf16"},
        "system": {"generator": "test", "version": "0"},
        "events": events,
        "checkpoints": checkpoints,
    });
    reseal(&mut pack);
    pack
}

fn reseal(pack: &mut Value) {
    if let Some(map) = pack.as_object_mut() {
        map.remove("packHash");
    }
    let hash = digest(pack).unwrap();
    pack["packHash"] = json!(hash);
}

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn public_pem() -> String {
    signing_key()
        .verifying_key()
        .to_public_key_pem(LineEnding::LF)
        .unwrap()
}

fn run(args: &[&Path]) -> (i32, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_auditchain-verify"))
        .args(args)
        .output()
        .unwrap();
    (
        output.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&output.stdout).into_owned(),
    )
}

#[test]
fn test_clean_pack_passes() {
    let dir = tempfile::tempdir().unwrap();
    let pack = write(dir.path(), "pack.json", &build_pack(6, 3).to_string());
    let key = write(dir.path(), "key.pem", &public_pem());

    let (code, stdout) = run(&[Path::new("verify"), &pack, Path::new("--public-key"), &key]);
    assert_eq!(code, 0, "{stdout}");
    assert!(stdout.contains("RESULT: PASS"));
    assert!(stdout.contains("[PASS   ] checkpoint cp-6 signature"));
}

#[test]
fn test_without_key_signatures_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let pack = write(dir.path(), "pack.json", &build_pack(4, 2).to_string());

    let (code, stdout) = run(&[Path::new("verify"), &pack]);
    assert_eq!(code, 0, "{stdout}");
    assert!(stdout.contains("SKIPPED"));
}

#[test]
fn test_flipped_event_hash_fails_naming_seq() {
    let dir = tempfile::tempdir().unwrap();
    let mut pack = build_pack(5, 5);
    pack["events"][2]["payload"]["n"] = json!(1000);
    reseal(&mut pack);
    let pack = write(dir.path(), "pack.json", &pack.to_string());

    let (code, stdout) = run(&[Path::new("verify"), &pack]);
    assert_eq!(code, 1);
    assert!(stdout.contains("hash_mismatch at seq 3"), "{stdout}");
    assert!(stdout.contains("RESULT: FAIL"));
}

#[test]
fn test_chain_failure_stops_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut pack = build_pack(6, 1);
    pack["events"][1]["actor"] = json!("mallory");
    reseal(&mut pack);
    let pack = write(dir.path(), "pack.json", &pack.to_string());
    let key = write(dir.path(), "key.pem", &public_pem());

    let (code, stdout) = run(&[Path::new("verify"), &pack, Path::new("--public-key"), &key]);
    assert_eq!(code, 1);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 5, "{stdout}");
    assert!(lines[3].starts_with("[FAIL   ] event chain: hash_mismatch at seq 2"), "{stdout}");
    assert_eq!(lines[4], "RESULT: FAIL");
    assert!(!stdout.contains("checkpoint"), "{stdout}");
}

#[test]
fn test_wrong_key_is_unverifiable() {
    let dir = tempfile::tempdir().unwrap();
    let pack = write(dir.path(), "pack.json", &build_pack(2, 2).to_string());
    let other = SigningKey::from_bytes(&[1; 32]).verifying_key();
    let key = write(dir.path(), "other.hex", &hex::encode(other.as_bytes()));

    let (code, stdout) = run(&[Path::new("verify"), &pack, Path::new("--public-key"), &key]);
    assert_eq!(code, 1);
    assert!(stdout.contains("unverifiable"));
}

#[test]
fn test_usage_errors_exit_one() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _) = run(&[Path::new("verify")]);
    assert_eq!(code, 1);

    let (code, _) = run(&[Path::new("verify"), &dir.path().join("missing.json")]);
    assert_eq!(code, 1);

    let garbage = write(dir.path(), "garbage.json", "{not json");
    let (code, _) = run(&[Path::new("verify"), &garbage]);
    assert_eq!(code, 1);

    let (code, _) = run(&[Path::new("--help")]);
    assert_eq!(code, 0);
}

#[test]
fn test_json_output() {
    let dir = tempfile::tempdir().unwrap();
    let pack = write(dir.path(), "pack.json", &build_pack(1, 1).to_string());
    let (code, stdout) = run(&[Path::new("verify"), &pack, Path::new("--json")]);
    assert_eq!(code, 0);
    let report: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["result"], "PASS");
}

// ─────────────────────────────────────────────────────────────────────────────
// Library-level checks
// ─────────────────────────────────────────────────────────────────────────────

fn trusted() -> TrustedKeys {
    let mut keys = TrustedKeys::new();
    keys.insert(signing_key().verifying_key());
    keys
}

#[test]
fn test_pack_hash_tamper() {
    let mut pack = build_pack(3, 3);
    pack["exportedAt"] = json!("2030-01-01T00:00:00.000Z");
    let report = verify_pack(&pack, &trusted());
    let failure = report.first_failure().unwrap();
    assert_eq!(failure.name, "pack hash");
}

#[test]
fn test_checkpoint_tamper_and_link() {
    let mut pack = build_pack(6, 2);
    pack["checkpoints"][1]["hash"] = json!("0".repeat(64));
    reseal(&mut pack);
    let report = verify_pack(&pack, &trusted());
    let failure = report.first_failure().unwrap();
    assert_eq!(failure.name, "checkpoint cp-4");
    assert!(failure.detail.starts_with("payload_mismatch"));

    let mut pack = build_pack(6, 2);
    let removed = pack["checkpoints"].as_array_mut().unwrap().remove(1);
    assert_eq!(removed["id"], "cp-4");
    reseal(&mut pack);
    let report = verify_pack(&pack, &trusted());
    let failure = report.first_failure().unwrap();
    assert_eq!(failure.name, "checkpoint cp-6");
    assert!(failure.detail.starts_with("chain_mismatch"));
}

#[test]
fn test_truncated_tail_stops_at_segment() {
    let mut pack = build_pack(4, 4);
    pack["events"].as_array_mut().unwrap().pop();
    reseal(&mut pack);
    let report = verify_pack(&pack, &trusted());
    assert!(!report.passed());

    let names: Vec<&str> = report.checks.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["format", "pack hash", "segment"]);
    assert_eq!(report.failures().count(), 1);
}

#[test]
fn test_rewritten_head_fails_head_check() {
    let mut pack = build_pack(4, 2);
    pack["headAtExportTime"]["lastHash"] = json!("a".repeat(64));
    reseal(&mut pack);
    let report = verify_pack(&pack, &trusted());

    let failure = report.first_failure().unwrap();
    assert_eq!(failure.name, "head");
    assert!(failure.detail.starts_with("head_mismatch"));
    assert_eq!(failure.seq, Some(4));
    assert_eq!(report.checks.last().unwrap().name, "head");
}

#[test]
fn test_honest_short_segment_skips_head() {
    let mut pack = build_pack(4, 4);
    pack["events"].as_array_mut().unwrap().pop();
    pack["segment"]["count"] = json!(3);
    pack["segment"]["toSeq"] = json!(3);
    reseal(&mut pack);
    let report = verify_pack(&pack, &trusted());

    // cp-4 lies outside the segment, so only its signature is checked.
    assert!(report.passed(), "{report}");
    let head = report.checks.iter().find(|c| c.name == "head").unwrap();
    assert_eq!(head.outcome, Outcome::Skipped);
}

#[test]
fn test_mid_chain_segment() {
    let mut pack = build_pack(6, 3);
    let events: Vec<Value> = pack["events"].as_array().unwrap()[3..].to_vec();
    pack["events"] = json!(events);
    pack["segment"] = json!({"fromSeq": 4, "toSeq": 6, "count": 3});
    reseal(&mut pack);

    let report = verify_pack(&pack, &trusted());
    assert!(report.passed(), "{report}");
}
