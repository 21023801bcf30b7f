//! The ledger exports, the offline verifier checks. Neither shares code with
//! the other beyond the JSON in between.

use auditchain_core::{ChainStatus, Keypair};
use auditchain_testkit::generators::event_draft;
use auditchain_testkit::{keys_from_manifest, LedgerFixture};
use auditchain_verify::canon::digest;
use auditchain_verify::{verify_pack, verify_pack_str, Outcome, TrustedKeys};
use proptest::prelude::*;
use serde_json::{json, Value};

fn reseal(pack: &mut Value) {
    if let Some(map) = pack.as_object_mut() {
        map.remove("packHash");
    }
    let hash = digest(pack).unwrap();
    pack["packHash"] = json!(hash);
}

#[tokio::test]
async fn test_exported_pack_passes_offline() {
    let fixture = LedgerFixture::new(3);
    fixture.append_n(10).await.unwrap();

    let json = fixture.export_json(None, None).await.unwrap();
    let report = verify_pack_str(&json, &fixture.trusted_keys().await).unwrap();
    assert!(report.passed(), "{report}");
    assert!(report.checks.iter().all(|c| c.outcome == Outcome::Pass), "{report}");
    // format, pack hash, segment, chain, head, then 3 checkpoints x 2
    assert_eq!(report.checks.len(), 11);
}

#[tokio::test]
async fn test_pack_hash_agrees() {
    let fixture = LedgerFixture::new(2);
    fixture.append_n(4).await.unwrap();

    let pack = fixture.ledger.export_pack(None, None).await.unwrap();
    let mut value = serde_json::to_value(&pack).unwrap();
    value.as_object_mut().unwrap().remove("packHash");
    assert_eq!(digest(&value).unwrap(), pack.pack_hash);
}

#[tokio::test]
async fn test_store_tamper_found_by_both() {
    let fixture = LedgerFixture::new(5);
    fixture.append_n(8).await.unwrap();
    fixture
        .store()
        .tamper_event(4, |e| e.payload = json!({"i": 4000}))
        .unwrap();

    let live = fixture.ledger.verify_all().await.unwrap();
    assert_eq!(live.first_bad_seq(), Some(4));

    let json = fixture.export_json(None, None).await.unwrap();
    let report = verify_pack_str(&json, &fixture.trusted_keys().await).unwrap();
    assert!(!report.passed());
    let chain = report.first_failure().unwrap();
    assert_eq!(chain.name, "event chain");
    assert_eq!(chain.seq, Some(4));
    assert!(chain.detail.starts_with("hash_mismatch at seq 4"));
}

#[tokio::test]
async fn test_edited_pack_fails_offline() {
    let fixture = LedgerFixture::new(4);
    fixture.append_n(6).await.unwrap();
    let keys = fixture.trusted_keys().await;
    let original: Value =
        serde_json::from_str(&fixture.export_json(None, None).await.unwrap()).unwrap();

    // Edited without resealing.
    let mut pack = original.clone();
    pack["events"][1]["actor"] = json!("mallory");
    let report = verify_pack(&pack, &keys);
    assert_eq!(report.first_failure().unwrap().name, "pack hash");

    // Edited and resealed.
    reseal(&mut pack);
    let report = verify_pack(&pack, &keys);
    assert_eq!(report.first_failure().unwrap().seq, Some(2));

    // Re-hashed event, but the next link no longer matches.
    let mut pack = original.clone();
    pack["events"][1]["actor"] = json!("mallory");
    let shape = auditchain_verify::chain::hashed_shape(&pack["events"][1]).unwrap();
    pack["events"][1]["hash"] = json!(digest(&shape).unwrap());
    reseal(&mut pack);
    let report = verify_pack(&pack, &keys);
    let chain = report.first_failure().unwrap();
    assert_eq!(chain.seq, Some(3));
    assert!(chain.detail.starts_with("prevHash_mismatch"));

    // A forged signature.
    let mut pack = original;
    let signature = pack["checkpoints"][0]["signature"].as_str().unwrap().to_string();
    let flipped = if signature.starts_with('0') { "1" } else { "0" };
    pack["checkpoints"][0]["signature"] = json!(format!("{flipped}{}", &signature[1..]));
    reseal(&mut pack);
    let report = verify_pack(&pack, &keys);
    let failure = report.first_failure().unwrap();
    assert!(failure.name.ends_with("signature"));
    assert!(failure.detail.starts_with("bad signature"));
}

#[tokio::test]
async fn test_rotated_keys_travel_in_manifest() {
    let fixture = LedgerFixture::new(2);
    fixture.append_n(4).await.unwrap();
    fixture.ledger.rotate_key(Keypair::from_seed(&[8; 32])).await;
    fixture.append_n(4).await.unwrap();

    let pack: Value =
        serde_json::from_str(&fixture.export_json(None, None).await.unwrap()).unwrap();
    let keys = keys_from_manifest(&pack).unwrap();
    assert_eq!(keys.len(), 2);
    let report = verify_pack(&pack, &keys);
    assert!(report.passed(), "{report}");

    // Only the retired key: the newer checkpoints cannot be checked.
    let mut old_only = TrustedKeys::new();
    let old = Keypair::from_seed(&auditchain_testkit::FIXTURE_SEED).public_key();
    old_only.add_text(&old.to_hex()).unwrap();
    let report = verify_pack(&pack, &old_only);
    let failure = report.first_failure().unwrap();
    assert!(failure.name.ends_with(" signature"));
    assert!(failure.detail.starts_with("unverifiable"));
    assert_eq!(failure.seq, Some(6));
}

#[tokio::test]
async fn test_segment_export_passes_offline() {
    let fixture = LedgerFixture::new(3);
    fixture.append_n(9).await.unwrap();

    let json = fixture.export_json(Some(4), Some(7)).await.unwrap();
    let report = verify_pack_str(&json, &fixture.trusted_keys().await).unwrap();
    assert!(report.passed(), "{report}");
    let head = report.checks.iter().find(|c| c.name == "head").unwrap();
    assert_eq!(head.outcome, Outcome::Skipped);
}

#[tokio::test]
async fn test_empty_ledger_pack() {
    let fixture = LedgerFixture::new(3);
    let pack = fixture.ledger.export_pack(None, None).await.unwrap();
    assert_eq!(pack.verification.status, ChainStatus::Empty);

    let json = serde_json::to_string(&pack).unwrap();
    let report = verify_pack_str(&json, &TrustedKeys::new()).unwrap();
    assert!(report.passed(), "{report}");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn test_arbitrary_events_verify_offline(drafts in prop::collection::vec(event_draft(), 1..8)) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let report = runtime.block_on(async {
            let fixture = LedgerFixture::new(3);
            for draft in drafts {
                fixture.ledger.append(draft).await.unwrap();
            }
            let json = fixture.export_json(None, None).await.unwrap();
            verify_pack_str(&json, &fixture.trusted_keys().await).unwrap()
        });
        prop_assert!(report.passed(), "{}", report);
    }
}
