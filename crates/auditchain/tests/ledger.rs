//! End-to-end tests of the ledger over the in-memory and SQLite stores.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use auditchain::anchor::{AnchorReason, LogOnlyAnchor};
use auditchain::store::StoreError;
use auditchain::{
    AnchorConfig, AnchorReceipt, AuditEvent, AuditHead, BreakReason, ChainStatus, Checkpoint,
    CheckpointVerdict, EventDraft, KeyRing, Keypair, Ledger, LedgerConfig, LedgerError,
    LedgerStore, MemoryStore, SqliteStore, VerifyOptions,
};
use serde_json::json;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config(interval: u64) -> LedgerConfig {
    LedgerConfig {
        checkpoint_interval: interval,
        ..LedgerConfig::default()
    }
}

fn memory_ledger(interval: u64) -> Ledger<MemoryStore> {
    init_tracing();
    Ledger::new(MemoryStore::new(), Keypair::from_seed(&[1; 32]), config(interval)).unwrap()
}

async fn append_n<S: LedgerStore>(ledger: &Ledger<S>, n: u64) -> Vec<AuditEvent> {
    let mut events = Vec::new();
    for i in 0..n {
        let draft = EventDraft::new(format!("action.{i}"), "u1").payload(json!({ "i": i }));
        events.push(ledger.append(draft).await.unwrap());
    }
    events
}

// ─────────────────────────────────────────────────────────────────────────────
// Append and verify
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_three_event_scenario() {
    let ledger = memory_ledger(3);

    let e1 = ledger.append(EventDraft::new("A1", "u1")).await.unwrap();
    let e2 = ledger.append(EventDraft::new("A2", "u2")).await.unwrap();
    let e3 = ledger.append(EventDraft::new("A3", "u1")).await.unwrap();

    assert_eq!((e1.seq, e2.seq, e3.seq), (1, 2, 3));
    assert_eq!(e1.prev_hash, "GENESIS");
    assert_eq!(e2.prev_hash, e1.hash);
    assert_eq!(e3.prev_hash, e2.hash);

    let report = ledger.verify(VerifyOptions::range(1, 3)).await.unwrap();
    assert_eq!(report.status, ChainStatus::Linked);
    assert_eq!(report.checked, 3);
    assert!(report.chain_break.is_none());
    assert!(!report.partial);
    assert_eq!(report.expected_head, Some(e3.as_head()));

    let checkpoints = ledger.checkpoints().await.unwrap();
    assert_eq!(checkpoints.len(), 1);
    assert_eq!(checkpoints[0].seq, 3);
    assert_eq!(checkpoints[0].hash, e3.hash);
    assert_eq!(checkpoints[0].prev_checkpoint_id, None);
}

#[tokio::test]
async fn test_empty_and_genesis() {
    let ledger = memory_ledger(0);

    let report = ledger.verify(VerifyOptions::default()).await.unwrap();
    assert_eq!(report.status, ChainStatus::Empty);
    assert_eq!(report.total_events, 0);

    ledger.append(EventDraft::new("first", "u1")).await.unwrap();
    let report = ledger.verify(VerifyOptions::default()).await.unwrap();
    assert_eq!(report.status, ChainStatus::Genesis);
    assert_eq!(report.checked, 1);
}

#[tokio::test]
async fn test_rejects_blank_input() {
    let ledger = memory_ledger(0);

    let err = ledger.append(EventDraft::new("  ", "u1")).await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidInput(_)));
    let err = ledger.append(EventDraft::new("a", "")).await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidInput(_)));

    assert!(ledger.head().await.unwrap().is_genesis());
}

#[tokio::test]
async fn test_concurrent_appends() {
    let ledger = Arc::new(memory_ledger(5));

    let mut handles = Vec::new();
    for i in 0..20 {
        let ledger = Arc::clone(&ledger);
        handles.push(tokio::spawn(async move {
            ledger
                .append(EventDraft::new("concurrent", format!("u{i}")))
                .await
                .unwrap()
                .seq
        }));
    }

    let mut seqs = Vec::new();
    for handle in handles {
        seqs.push(handle.await.unwrap());
    }
    seqs.sort_unstable();
    assert_eq!(seqs, (1..=20).collect::<Vec<_>>());

    let report = ledger.verify_all().await.unwrap();
    assert_eq!(report.status, ChainStatus::Linked);
    assert_eq!(report.checked, 20);
    assert_eq!(ledger.checkpoints().await.unwrap().len(), 4);
}

// ─────────────────────────────────────────────────────────────────────────────
// Tamper classification
// ─────────────────────────────────────────────────────────────────────────────

async fn tampered<F>(f: F) -> auditchain::VerifyReport
where
    F: FnOnce(&MemoryStore),
{
    let ledger = memory_ledger(0);
    append_n(&ledger, 5).await;
    f(ledger.store());
    ledger.verify(VerifyOptions::default()).await.unwrap()
}

#[tokio::test]
async fn test_payload_tamper() {
    let report = tampered(|store| {
        store
            .tamper_event(3, |e| e.payload = json!({ "i": 99 }))
            .unwrap()
    })
    .await;
    let chain_break = report.chain_break.unwrap();
    assert_eq!(report.status, ChainStatus::Broken);
    assert_eq!(chain_break.seq, 3);
    assert_eq!(chain_break.reason, BreakReason::HashMismatch);
    assert_eq!(report.checked, 2);
}

#[tokio::test]
async fn test_stored_hash_tamper() {
    let report = tampered(|store| {
        store
            .tamper_event(2, |e| e.hash = "0".repeat(64))
            .unwrap()
    })
    .await;
    let chain_break = report.chain_break.unwrap();
    assert_eq!(chain_break.seq, 2);
    assert_eq!(chain_break.reason, BreakReason::HashMismatch);
    assert_eq!(chain_break.found, "0".repeat(64));
}

#[tokio::test]
async fn test_prev_hash_tamper() {
    let report = tampered(|store| {
        store
            .tamper_event(4, |e| e.prev_hash = "f".repeat(64))
            .unwrap()
    })
    .await;
    let chain_break = report.chain_break.unwrap();
    assert_eq!(chain_break.seq, 4);
    assert_eq!(chain_break.reason, BreakReason::PrevHashMismatch);
}

#[tokio::test]
async fn test_seq_tamper_and_deletion() {
    let report = tampered(|store| store.tamper_event(2, |e| e.seq = 7).unwrap()).await;
    let chain_break = report.chain_break.unwrap();
    assert_eq!(chain_break.seq, 2);
    assert_eq!(chain_break.reason, BreakReason::SeqGap);

    let report = tampered(|store| {
        store.remove_event(3).unwrap();
    })
    .await;
    let chain_break = report.chain_break.unwrap();
    assert_eq!(chain_break.seq, 3);
    assert_eq!(chain_break.reason, BreakReason::SeqGap);
}

#[tokio::test]
async fn test_version_tamper() {
    let report = tampered(|store| store.tamper_event(1, |e| e.payload_version = 9).unwrap()).await;
    let chain_break = report.chain_break.unwrap();
    assert_eq!(chain_break.seq, 1);
    assert_eq!(chain_break.reason, BreakReason::UnknownPayloadVersion);
    assert_eq!(report.status, ChainStatus::Broken);
}

#[tokio::test]
async fn test_head_tamper() {
    let report = tampered(|store| store.set_head(AuditHead::new(5, "a".repeat(64))).unwrap()).await;
    let chain_break = report.chain_break.unwrap();
    assert_eq!(chain_break.reason, BreakReason::HeadMismatch);
    assert_eq!(chain_break.seq, 5);
    assert_eq!(report.checked, 5);

    let report = tampered(|store| {
        store.remove_event(5).unwrap();
    })
    .await;
    let chain_break = report.chain_break.unwrap();
    assert_eq!(chain_break.reason, BreakReason::HeadMismatch);
    assert_eq!(report.expected_head.unwrap().last_seq, 4);
}

// ─────────────────────────────────────────────────────────────────────────────
// Ranges and pagination
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_limit_partial_and_strict() {
    let ledger = memory_ledger(0);
    append_n(&ledger, 5).await;

    let report = ledger.verify(VerifyOptions::default().limit(2)).await.unwrap();
    assert!(report.partial);
    assert!(report.is_ok());
    assert_eq!(report.status, ChainStatus::Linked);
    assert_eq!(report.checked, 2);

    let report = ledger
        .verify(VerifyOptions::default().limit(2).strict())
        .await
        .unwrap();
    let chain_break = report.chain_break.unwrap();
    assert_eq!(report.status, ChainStatus::Broken);
    assert_eq!(chain_break.reason, BreakReason::PartialCoverage);
    assert_eq!(chain_break.seq, 3);
    assert_eq!(chain_break.expected, "5");
    assert_eq!(chain_break.found, "2");

    // Limit 0 means the configured maximum.
    let report = ledger.verify(VerifyOptions::default().limit(0).strict()).await.unwrap();
    assert!(report.is_ok());
    assert_eq!(report.checked, 5);
}

#[tokio::test]
async fn test_mid_chain_range() {
    let ledger = memory_ledger(0);
    append_n(&ledger, 6).await;

    let report = ledger.verify(VerifyOptions::range(3, 4)).await.unwrap();
    assert!(report.partial);
    assert!(report.is_ok());
    assert_eq!(report.checked, 2);

    // Range end past the head is clamped.
    let report = ledger.verify(VerifyOptions::range(1, 100)).await.unwrap();
    assert!(!report.partial);
    assert_eq!(report.to_seq, 6);
    assert_eq!(report.checked, 6);
}

#[tokio::test]
async fn test_deleted_range_tail() {
    let ledger = memory_ledger(0);
    append_n(&ledger, 6).await;
    ledger.store().remove_event(4).unwrap();

    let report = ledger.verify(VerifyOptions::range(1, 4)).await.unwrap();
    let chain_break = report.chain_break.clone().unwrap();
    assert_eq!(report.status, ChainStatus::Broken);
    assert_eq!(chain_break.reason, BreakReason::SeqGap);
    assert_eq!(chain_break.seq, 4);
    assert_eq!(chain_break.expected, "4");
    assert_eq!(chain_break.found, "missing");
    assert_eq!(report.checked, 3);

    // Strict mode reports the gap, not partial coverage.
    let report = ledger
        .verify(VerifyOptions::range(1, 4).strict())
        .await
        .unwrap();
    let chain_break = report.chain_break.unwrap();
    assert_eq!(chain_break.reason, BreakReason::SeqGap);
    assert_eq!(chain_break.seq, 4);

    // The untouched prefix still verifies.
    let report = ledger.verify(VerifyOptions::range(1, 3)).await.unwrap();
    assert!(report.is_ok());
}

#[tokio::test]
async fn test_deleted_tail_of_late_range() {
    let ledger = memory_ledger(0);
    append_n(&ledger, 8).await;
    ledger.store().remove_event(6).unwrap();

    for options in [VerifyOptions::range(3, 6), VerifyOptions::range(3, 6).strict()] {
        let report = ledger.verify(options).await.unwrap();
        let chain_break = report.chain_break.unwrap();
        assert_eq!(chain_break.reason, BreakReason::SeqGap);
        assert_eq!(chain_break.seq, 6);
        assert_eq!(chain_break.found, "missing");
    }

    // The whole range gone.
    ledger.store().remove_event(7).unwrap();
    ledger.store().remove_event(8).unwrap();
    let report = ledger.verify(VerifyOptions::range(7, 8)).await.unwrap();
    assert_eq!(report.first_bad_seq(), Some(7));
    assert_eq!(report.checked, 0);
}

#[tokio::test]
async fn test_deleted_tail_of_exported_segment() {
    let ledger = Ledger::new(
        MemoryStore::new(),
        Keypair::from_seed(&[1; 32]),
        LedgerConfig {
            checkpoint_interval: 0,
            max_verify_batch: 2,
            ..LedgerConfig::default()
        },
    )
    .unwrap();
    append_n(&ledger, 7).await;
    ledger.store().remove_event(5).unwrap();

    // Pages of two: 2-3, then a short page holding only 4.
    let pack = ledger.export_pack(Some(2), Some(5)).await.unwrap();
    let chain_break = pack.verification.chain_break.unwrap();
    assert_eq!(pack.verification.status, ChainStatus::Broken);
    assert_eq!(chain_break.reason, BreakReason::SeqGap);
    assert_eq!(chain_break.seq, 5);
    assert_eq!(chain_break.found, "missing");
    assert_eq!(pack.verification.checked, 3);
    assert_eq!(pack.events.len(), 3);
}

#[tokio::test]
async fn test_batch_bound_and_stitching() {
    init_tracing();
    let ledger = Ledger::new(
        MemoryStore::new(),
        Keypair::from_seed(&[1; 32]),
        LedgerConfig {
            checkpoint_interval: 0,
            max_verify_batch: 2,
            ..LedgerConfig::default()
        },
    )
    .unwrap();
    append_n(&ledger, 5).await;

    let page = ledger.verify(VerifyOptions::default().limit(50)).await.unwrap();
    assert_eq!(page.checked, 2);
    assert!(page.partial);

    let all = ledger.verify_all().await.unwrap();
    assert_eq!(all.status, ChainStatus::Linked);
    assert_eq!(all.checked, 5);
    assert!(!all.partial);

    // Seq 3 starts the second page; it must still link to seq 2.
    ledger
        .store()
        .tamper_event(3, |e| e.prev_hash = "9".repeat(64))
        .unwrap();
    let all = ledger.verify_all().await.unwrap();
    let chain_break = all.chain_break.unwrap();
    assert_eq!(chain_break.seq, 3);
    assert_eq!(chain_break.reason, BreakReason::PrevHashMismatch);
    assert_eq!(all.checked, 2);
}

// ─────────────────────────────────────────────────────────────────────────────
// Checkpoints
// ─────────────────────────────────────────────────────────────────────────────

/// Wraps a [`MemoryStore`] and fails selected operations on demand.
#[derive(Default)]
struct FaultyStore {
    inner: MemoryStore,
    fail_checkpoints: AtomicBool,
    always_moved: AtomicBool,
}

impl FaultyStore {
    fn injected() -> StoreError {
        StoreError::InvalidData("injected failure".into())
    }
}

#[async_trait]
impl LedgerStore for FaultyStore {
    async fn get_head(&self) -> auditchain::store::Result<AuditHead> {
        self.inner.get_head().await
    }

    async fn insert_event_atomic(
        &self,
        event: &AuditEvent,
        new_head: &AuditHead,
    ) -> auditchain::store::Result<()> {
        if self.always_moved.load(Ordering::SeqCst) {
            return Err(StoreError::HeadMoved {
                expected: AuditHead::genesis(),
                found: AuditHead::new(1, "x"),
            });
        }
        self.inner.insert_event_atomic(event, new_head).await
    }

    async fn get_event(&self, seq: u64) -> auditchain::store::Result<Option<AuditEvent>> {
        self.inner.get_event(seq).await
    }

    async fn list_events_in_range(
        &self,
        from: u64,
        to: u64,
        limit: usize,
    ) -> auditchain::store::Result<Vec<AuditEvent>> {
        self.inner.list_events_in_range(from, to, limit).await
    }

    async fn count_events(&self) -> auditchain::store::Result<u64> {
        self.inner.count_events().await
    }

    async fn insert_checkpoint(&self, checkpoint: &Checkpoint) -> auditchain::store::Result<()> {
        if self.fail_checkpoints.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.insert_checkpoint(checkpoint).await
    }

    async fn list_checkpoints(&self) -> auditchain::store::Result<Vec<Checkpoint>> {
        self.inner.list_checkpoints().await
    }

    async fn latest_checkpoint(&self) -> auditchain::store::Result<Option<Checkpoint>> {
        self.inner.latest_checkpoint().await
    }

    async fn get_checkpoint(&self, id: &str) -> auditchain::store::Result<Option<Checkpoint>> {
        self.inner.get_checkpoint(id).await
    }

    async fn insert_anchor_receipt(
        &self,
        checkpoint_id: &str,
        receipt: &AnchorReceipt,
    ) -> auditchain::store::Result<()> {
        self.inner.insert_anchor_receipt(checkpoint_id, receipt).await
    }

    async fn list_anchor_receipts(
        &self,
        checkpoint_id: &str,
    ) -> auditchain::store::Result<Vec<AnchorReceipt>> {
        self.inner.list_anchor_receipts(checkpoint_id).await
    }
}

fn faulty_ledger(interval: u64) -> Ledger<FaultyStore> {
    init_tracing();
    Ledger::new(FaultyStore::default(), Keypair::from_seed(&[2; 32]), config(interval)).unwrap()
}

#[tokio::test]
async fn test_contention_gives_up() {
    let ledger = faulty_ledger(0);
    ledger.store().always_moved.store(true, Ordering::SeqCst);

    let err = ledger.append(EventDraft::new("a", "u")).await.unwrap_err();
    assert!(matches!(err, LedgerError::Contention { attempts: 6 }));
    assert!(ledger.head().await.unwrap().is_genesis());
}

#[tokio::test]
async fn test_checkpoint_failure_keeps_event() {
    let ledger = faulty_ledger(2);
    ledger.store().fail_checkpoints.store(true, Ordering::SeqCst);

    let events = append_n(&ledger, 2).await;
    assert_eq!(events[1].seq, 2);
    assert_eq!(ledger.head().await.unwrap(), events[1].as_head());
    assert!(ledger.checkpoints().await.unwrap().is_empty());

    ledger.store().fail_checkpoints.store(false, Ordering::SeqCst);
    append_n(&ledger, 1).await;

    let report = ledger.reconcile_checkpoints().await.unwrap();
    assert_eq!(report.created.len(), 1);
    assert_eq!(report.created[0].seq, 2);
    assert!(report.unfillable.is_empty());

    // Nothing left to do.
    let again = ledger.reconcile_checkpoints().await.unwrap();
    assert!(again.created.is_empty());
}

#[tokio::test]
async fn test_reconcile_reports_earlier_holes() {
    let ledger = faulty_ledger(2);
    ledger.store().fail_checkpoints.store(true, Ordering::SeqCst);
    append_n(&ledger, 2).await;
    ledger.store().fail_checkpoints.store(false, Ordering::SeqCst);
    append_n(&ledger, 5).await;

    // Checkpoints at 4 and 6 exist; 2 was lost before them.
    let seqs: Vec<u64> = ledger.checkpoints().await.unwrap().iter().map(|c| c.seq).collect();
    assert_eq!(seqs, vec![4, 6]);

    let report = ledger.reconcile_checkpoints().await.unwrap();
    assert!(report.created.is_empty());
    assert_eq!(report.unfillable, vec![2]);
}

#[tokio::test]
async fn test_checkpoints_chain_across_rotation() {
    let ledger = memory_ledger(2);
    append_n(&ledger, 2).await;
    let first_key = ledger.active_key_id().await;

    let second_key = ledger.rotate_key(Keypair::from_seed(&[3; 32])).await;
    assert_ne!(first_key, second_key);
    append_n(&ledger, 2).await;

    let checkpoints = ledger.checkpoints().await.unwrap();
    assert_eq!(checkpoints.len(), 2);
    assert_eq!(checkpoints[0].public_key_id, first_key.to_string());
    assert_eq!(checkpoints[1].public_key_id, second_key.to_string());
    assert_eq!(
        checkpoints[1].prev_checkpoint_id.as_deref(),
        Some(checkpoints[0].id.as_str())
    );
    assert_eq!(checkpoints[1].event_count, 2);

    let audit = ledger.verify_checkpoints(&ledger.key_ring().await).await.unwrap();
    assert!(audit.all_valid());

    // Only the new key: the old checkpoint is unverifiable, not skipped.
    let ring = KeyRing::from_keys([Keypair::from_seed(&[3; 32]).public_key()]);
    let audit = ledger.verify_checkpoints(&ring).await.unwrap();
    let failures: Vec<_> = audit.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].seq, 2);
    assert!(matches!(
        failures[0].verdict,
        CheckpointVerdict::UnknownKey { .. }
    ));
}

#[tokio::test]
async fn test_checkpoint_tampering_detected() {
    let ledger = memory_ledger(2);
    append_n(&ledger, 4).await;
    let ring = ledger.key_ring().await;
    let checkpoints = ledger.checkpoints().await.unwrap();

    // Corrupting the event under a checkpoint.
    ledger
        .store()
        .tamper_event(2, |e| e.hash = "1".repeat(64))
        .unwrap();
    let audit = ledger.verify_checkpoints(&ring).await.unwrap();
    assert!(matches!(
        audit.checks[0].verdict,
        CheckpointVerdict::HashMismatch { .. }
    ));

    // Corrupting the checkpoint record itself.
    ledger
        .store()
        .tamper_checkpoint(&checkpoints[1].id, |c| c.hash = "2".repeat(64))
        .unwrap();
    let audit = ledger.verify_checkpoints(&ring).await.unwrap();
    assert!(matches!(
        audit.checks[1].verdict,
        CheckpointVerdict::PayloadMismatch { .. }
    ));
}

#[tokio::test]
async fn test_checkpoint_head() {
    let ledger = memory_ledger(0);
    assert!(matches!(
        ledger.checkpoint_head().await,
        Err(LedgerError::InvalidInput(_))
    ));

    append_n(&ledger, 3).await;
    let checkpoint = ledger.checkpoint_head().await.unwrap();
    assert_eq!(checkpoint.seq, 3);

    // Idempotent at the same head.
    let again = ledger.checkpoint_head().await.unwrap();
    assert_eq!(again.id, checkpoint.id);
}

// ─────────────────────────────────────────────────────────────────────────────
// Anchoring
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_anchor_on_checkpoint() {
    init_tracing();
    let ledger = Ledger::new(
        MemoryStore::new(),
        Keypair::from_seed(&[4; 32]),
        LedgerConfig {
            checkpoint_interval: 2,
            anchor_on_checkpoint: true,
            anchor: AnchorConfig::Timestamp {
                authority_seed_hex: Some("22".repeat(32)),
            },
            ..LedgerConfig::default()
        },
    )
    .unwrap();
    append_n(&ledger, 2).await;

    let checkpoint = &ledger.checkpoints().await.unwrap()[0];
    let receipts = ledger.anchor_receipts(&checkpoint.id).await.unwrap();
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].anchor_type, "timestamp");
    assert!(ledger.verify_anchor(&receipts[0]).await.valid);

    let mut forged = receipts[0].clone();
    forged.anchor_hash = "3".repeat(64);
    assert!(!ledger.verify_anchor(&forged).await.valid);
}

#[tokio::test]
async fn test_anchor_detects_later_checkpoint_tamper() {
    init_tracing();
    let ledger = Ledger::with_parts(
        Arc::new(MemoryStore::new()),
        Keypair::from_seed(&[5; 32]),
        config(1),
        Box::new(LogOnlyAnchor::new()),
    );
    append_n(&ledger, 1).await;
    let checkpoint = ledger.checkpoints().await.unwrap().remove(0);

    ledger.anchor_checkpoint(&checkpoint.id).await.unwrap();
    let results = ledger.verify_checkpoint_anchors(&checkpoint.id).await.unwrap();
    assert!(results.iter().all(|r| r.valid));

    ledger
        .store()
        .tamper_checkpoint(&checkpoint.id, |c| c.hash = "4".repeat(64))
        .unwrap();
    let results = ledger.verify_checkpoint_anchors(&checkpoint.id).await.unwrap();
    assert_eq!(results[0].reason, AnchorReason::AnchorHashMismatch);

    assert!(matches!(
        ledger.anchor_checkpoint("no-such-checkpoint").await,
        Err(LedgerError::CheckpointNotFound(_))
    ));
}

// ─────────────────────────────────────────────────────────────────────────────
// Export
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_export_pack() {
    let ledger = memory_ledger(2);
    append_n(&ledger, 5).await;

    let pack = ledger.export_pack(None, None).await.unwrap();
    assert_eq!(pack.format, "auditchain.forensic-pack/v1");
    assert!(pack.is_sealed());
    assert_eq!(pack.pack_hash, pack.compute_hash().unwrap());
    assert_eq!(pack.segment.from_seq, 1);
    assert_eq!(pack.segment.to_seq, 5);
    assert_eq!(pack.segment.count, 5);
    assert_eq!(pack.events.len(), 5);
    assert_eq!(pack.checkpoints.len(), 2);
    assert_eq!(pack.head_at_export_time.last_seq, 5);
    assert_eq!(pack.verification.status, ChainStatus::Linked);
    assert!(!pack.verification.partial);

    let key_id = ledger.active_key_id().await.to_string();
    let published = &pack.manifest.public_keys;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].key_id, key_id);
    assert!(published[0].public_key_pem.starts_with("-----BEGIN PUBLIC KEY-----"));

    let json = serde_json::to_value(&pack).unwrap();
    assert!(json.get("packHash").is_some());
    assert!(json["verification"].get("break").is_some());
}

#[tokio::test]
async fn test_export_segment() {
    let ledger = memory_ledger(2);
    append_n(&ledger, 6).await;

    let pack = ledger.export_pack(Some(3), Some(4)).await.unwrap();
    assert_eq!(pack.events.first().unwrap().seq, 3);
    assert_eq!(pack.events.last().unwrap().seq, 4);
    assert!(pack.verification.partial);
    // Every checkpoint up to the head travels with the segment.
    assert_eq!(pack.checkpoints.len(), 3);
}

// ─────────────────────────────────────────────────────────────────────────────
// SQLite
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_sqlite_ledger_survives_reopen() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.db");

    {
        let ledger =
            Ledger::new(SqliteStore::open(&path).unwrap(), Keypair::from_seed(&[6; 32]), config(3))
                .unwrap();
        append_n(&ledger, 4).await;
    }

    let ledger =
        Ledger::new(SqliteStore::open(&path).unwrap(), Keypair::from_seed(&[6; 32]), config(3))
            .unwrap();
    let event = ledger.append(EventDraft::new("after.reopen", "u9")).await.unwrap();
    assert_eq!(event.seq, 5);

    let report = ledger.verify_all().await.unwrap();
    assert_eq!(report.status, ChainStatus::Linked);
    assert_eq!(report.checked, 5);

    let audit = ledger.verify_checkpoints(&ledger.key_ring().await).await.unwrap();
    assert_eq!(audit.checks.len(), 1);
    assert!(audit.all_valid());
}
