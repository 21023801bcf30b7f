//! The Ledger: unified API for the audit chain.
//!
//! The Ledger brings together storage, checkpoint signing and anchoring into
//! one interface. It is the only writer of chain state.

use std::collections::BTreeSet;
use std::sync::Arc;

use auditchain_anchor::{build_anchor, AnchorBackend, AnchorReason, AnchorVerification};
use auditchain_core::{
    replay, verify_checkpoint, verify_checkpoint_hash, verify_checkpoint_link, AnchorPayload,
    AnchorReceipt, AuditEvent, AuditHead, ChainCursor, Checkpoint, CheckpointSigner,
    CheckpointVerdict, EventDraft, ForensicPack, KeyId, KeyRing, Keypair, PackManifest,
    PackSegment, PackSystem, PackVerification, PayloadRegistry, PublicKey, CANONICALIZATION,
    GENESIS_HASH, PACK_FORMAT, SCHEMA_VERSION, SIGNATURE_ALG,
};
use auditchain_store::{LedgerStore, StoreError, StoreExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::now_ts;
use crate::verify::{conclude, Coverage, Range, VerifyOptions, VerifyReport};

/// The main Ledger struct.
///
/// Provides a unified API for:
/// - Appending events to the hash chain
/// - Verifying ranges of the chain, or all of it
/// - Creating, reconciling and auditing signed checkpoints
/// - Anchoring checkpoints with an external witness
/// - Exporting forensic packs for offline verification
pub struct Ledger<S: LedgerStore> {
    /// The storage backend.
    store: Arc<S>,
    /// Builders of the hashed event shape.
    registry: PayloadRegistry,
    /// Checkpoint signer. Written only on key rotation.
    signer: RwLock<CheckpointSigner>,
    /// External witness for checkpoints.
    anchor: Box<dyn AnchorBackend>,
    /// Configuration.
    config: LedgerConfig,
    /// Serializes appends and checkpoint creation.
    append_lock: Mutex<()>,
}

impl<S: LedgerStore> Ledger<S> {
    /// Create a ledger, building the anchor backend from `config.anchor`.
    pub fn new(store: S, signing_key: Keypair, config: LedgerConfig) -> Result<Self> {
        let anchor = build_anchor(&config.anchor)?;
        Ok(Self::with_parts(Arc::new(store), signing_key, config, anchor))
    }

    /// Create a ledger from already-built parts.
    pub fn with_parts(
        store: Arc<S>,
        signing_key: Keypair,
        config: LedgerConfig,
        anchor: Box<dyn AnchorBackend>,
    ) -> Self {
        Self {
            store,
            registry: PayloadRegistry::standard(),
            signer: RwLock::new(CheckpointSigner::new(signing_key)),
            anchor,
            config,
            append_lock: Mutex::new(()),
        }
    }

    /// Replace the payload registry.
    pub fn with_registry(mut self, registry: PayloadRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn registry(&self) -> &PayloadRegistry {
        &self.registry
    }

    pub fn anchor_backend(&self) -> &dyn AnchorBackend {
        self.anchor.as_ref()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Append
    // ─────────────────────────────────────────────────────────────────────────

    /// Append an event to the chain.
    ///
    /// The event is committed before any checkpoint work starts; a failed
    /// checkpoint is logged and left for [`Ledger::reconcile_checkpoints`].
    pub async fn append(&self, draft: EventDraft) -> Result<AuditEvent> {
        validate_draft(&draft)?;
        let _guard = self.append_lock.lock().await;

        let event = self.commit(&draft).await?;
        tracing::debug!(
            seq = event.seq,
            hash = %event.hash,
            action = %event.action,
            "event appended"
        );

        let interval = self.config.checkpoint_interval;
        if interval > 0 && event.seq % interval == 0 {
            let previous = self.store.latest_checkpoint().await;
            let created = match previous {
                Ok(previous) => self.sign_and_store(&event, previous.as_ref()).await,
                Err(err) => Err(err.into()),
            };
            if let Err(err) = created {
                tracing::warn!(seq = event.seq, error = %err, "checkpoint creation failed");
            }
        }

        Ok(event)
    }

    /// Seal `draft` against the current head and swap the head, rebuilding
    /// when another writer got there first.
    async fn commit(&self, draft: &EventDraft) -> Result<AuditEvent> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let head = self.store.get_head().await?;
            let event = draft.seal(&head, now_ts(), &self.registry)?;

            match self.store.insert_event_atomic(&event, &event.as_head()).await {
                Ok(()) => return Ok(event),
                Err(StoreError::HeadMoved { .. }) if attempts <= self.config.append_retries => {
                    tracing::warn!(seq = event.seq, attempt = attempts, "head moved, retrying append");
                }
                Err(StoreError::HeadMoved { .. }) => {
                    return Err(LedgerError::Contention { attempts });
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Query
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn head(&self) -> Result<AuditHead> {
        Ok(self.store.get_head().await?)
    }

    pub async fn get_event(&self, seq: u64) -> Result<Option<AuditEvent>> {
        Ok(self.store.get_event(seq).await?)
    }

    pub async fn checkpoints(&self) -> Result<Vec<Checkpoint>> {
        Ok(self.store.list_checkpoints().await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Verification
    // ─────────────────────────────────────────────────────────────────────────

    /// Verify one bounded page of the chain.
    ///
    /// Reads the head first, then at most `limit` events of the range. Never
    /// writes, so it can run alongside appends.
    pub async fn verify(&self, options: VerifyOptions) -> Result<VerifyReport> {
        let head = self.store.get_head().await?;
        let range = Range::resolve(&head, options.from_seq, options.to_seq);
        let max = self.config.max_verify_batch.max(1);
        let limit = match options.limit {
            None | Some(0) => max,
            Some(limit) => limit.min(max),
        };

        let mut coverage = Coverage {
            covered_to: range.to,
            ..Coverage::default()
        };
        if !range.is_empty() {
            let events = self
                .store
                .list_events_in_range(range.from, range.to, limit)
                .await?;
            let short = events.len() < limit;
            if !short {
                if let Some(last) = events.last() {
                    coverage.covered_to = last.seq.min(range.to);
                }
            }
            coverage.extend(replay(&events, ChainCursor::at(range.from), &self.registry));
            if short {
                coverage.close_short(range, &head);
            }
        }

        Ok(conclude(head, range, coverage, options.strict))
    }

    /// Verify the whole chain, page by page.
    ///
    /// Each page resumes at the last verified seq + 1 and must link to the
    /// previous page's last hash.
    pub async fn verify_all(&self) -> Result<VerifyReport> {
        self.verify_stitched(None, None).await
    }

    async fn verify_stitched(&self, from_seq: Option<u64>, to_seq: Option<u64>) -> Result<VerifyReport> {
        let head = self.store.get_head().await?;
        let range = Range::resolve(&head, from_seq, to_seq);
        let page_size = self.config.max_verify_batch.max(1);

        let mut coverage = Coverage {
            covered_to: range.to,
            ..Coverage::default()
        };
        let mut cursor = ChainCursor::at(range.from);
        while !range.is_empty() && cursor.next_seq <= range.to {
            let page = self
                .store
                .list_events_in_range(cursor.next_seq, range.to, page_size)
                .await?;
            if page.is_empty() {
                break;
            }
            let short = page.len() < page_size;
            let scan = replay(&page, cursor.clone(), &self.registry);
            let next = scan.next_cursor();
            coverage.extend(scan);

            match next {
                Some(next) if !short => cursor = next,
                _ => break,
            }
        }
        if !range.is_empty() {
            coverage.close_short(range, &head);
        }

        Ok(conclude(head, range, coverage, false))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Checkpoints
    // ─────────────────────────────────────────────────────────────────────────

    /// Sign a checkpoint at the current head, unless one already exists there.
    pub async fn checkpoint_head(&self) -> Result<Checkpoint> {
        let _guard = self.append_lock.lock().await;

        let head = self.store.get_head().await?;
        if head.is_genesis() {
            return Err(LedgerError::InvalidInput("no events to checkpoint".into()));
        }
        let previous = self.store.latest_checkpoint().await?;
        if let Some(previous) = previous.as_ref().filter(|c| c.seq == head.last_seq) {
            return Ok(previous.clone());
        }

        let event = self
            .store
            .get_event(head.last_seq)
            .await?
            .ok_or(LedgerError::EventNotFound(head.last_seq))?;
        self.sign_and_store(&event, previous.as_ref()).await
    }

    async fn sign_and_store(
        &self,
        event: &AuditEvent,
        previous: Option<&Checkpoint>,
    ) -> Result<Checkpoint> {
        let checkpoint = {
            let signer = self.signer.read().await;
            signer.sign(Uuid::new_v4().to_string(), event, now_ts(), previous)?
        };
        self.store.insert_checkpoint(&checkpoint).await?;

        tracing::info!(
            checkpoint_id = %checkpoint.id,
            seq = checkpoint.seq,
            key_id = %checkpoint.public_key_id,
            "checkpoint signed"
        );

        if self.config.anchor_on_checkpoint {
            if let Err(err) = self.anchor_and_record(&checkpoint).await {
                tracing::warn!(
                    checkpoint_id = %checkpoint.id,
                    backend = self.anchor.name(),
                    error = %err,
                    "checkpoint anchoring failed"
                );
            }
        }

        Ok(checkpoint)
    }

    /// Backfill checkpoints missed after the latest existing one.
    ///
    /// Holes before the latest checkpoint are reported in
    /// [`ReconcileReport::unfillable`]; filling them would fork the
    /// checkpoint chain.
    pub async fn reconcile_checkpoints(&self) -> Result<ReconcileReport> {
        let interval = self.config.checkpoint_interval;
        if interval == 0 {
            return Ok(ReconcileReport::default());
        }
        let _guard = self.append_lock.lock().await;

        let head = self.store.get_head().await?;
        let existing = self.store.list_checkpoints().await?;
        let mut previous = existing.iter().max_by_key(|c| c.seq).cloned();
        let after = previous.as_ref().map_or(0, |c| c.seq);

        let seen: BTreeSet<u64> = existing.iter().map(|c| c.seq).collect();
        let unfillable = (1..=after / interval)
            .map(|k| k * interval)
            .filter(|seq| !seen.contains(seq))
            .collect();

        let mut created = Vec::new();
        let mut seq = (after / interval + 1) * interval;
        while seq <= head.last_seq {
            let event = self
                .store
                .get_event(seq)
                .await?
                .ok_or(LedgerError::EventNotFound(seq))?;
            let checkpoint = self.sign_and_store(&event, previous.as_ref()).await?;
            previous = Some(checkpoint.clone());
            created.push(checkpoint);
            seq += interval;
        }

        if !created.is_empty() {
            tracing::info!(created = created.len(), head = head.last_seq, "checkpoints reconciled");
        }
        Ok(ReconcileReport {
            created,
            unfillable,
        })
    }

    /// Check every stored checkpoint: signature, payload, event hash and
    /// linkage to the checkpoint before it.
    pub async fn verify_checkpoints(&self, ring: &KeyRing) -> Result<CheckpointAudit> {
        let checkpoints = self.store.list_checkpoints().await?;
        let mut checks = Vec::with_capacity(checkpoints.len());
        let mut previous: Option<&Checkpoint> = None;

        for checkpoint in &checkpoints {
            let mut verdict = verify_checkpoint(checkpoint, ring);
            if verdict.is_valid() {
                verdict = match self.store.event_hash_at(checkpoint.seq).await? {
                    Some(hash) => verify_checkpoint_hash(checkpoint, &hash),
                    None => CheckpointVerdict::HashMismatch {
                        expected: "missing event".to_string(),
                        found: checkpoint.hash.clone(),
                    },
                };
            }
            if verdict.is_valid() {
                verdict = verify_checkpoint_link(checkpoint, previous);
            }
            if !verdict.is_valid() {
                tracing::warn!(
                    checkpoint_id = %checkpoint.id,
                    seq = checkpoint.seq,
                    verdict = verdict.as_str(),
                    "checkpoint failed verification"
                );
            }

            checks.push(CheckpointCheck {
                checkpoint_id: checkpoint.id.clone(),
                seq: checkpoint.seq,
                key_id: checkpoint.public_key_id.clone(),
                verdict,
            });
            previous = Some(checkpoint);
        }

        Ok(CheckpointAudit { checks })
    }

    /// Public keys of every signing key this ledger has held or trusts.
    pub async fn key_ring(&self) -> KeyRing {
        self.signer.read().await.key_ring().clone()
    }

    pub async fn active_key_id(&self) -> KeyId {
        self.signer.read().await.active_key_id().clone()
    }

    /// Switch to a new signing key. Earlier checkpoints stay verifiable.
    pub async fn rotate_key(&self, keypair: Keypair) -> KeyId {
        let key_id = self.signer.write().await.rotate(keypair);
        tracing::info!(key_id = %key_id, "checkpoint signing key rotated");
        key_id
    }

    /// Trust a retired public key, e.g. one used before a restart.
    pub async fn trust_key(&self, key: PublicKey) -> KeyId {
        self.signer.write().await.trust(key)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Anchoring
    // ─────────────────────────────────────────────────────────────────────────

    /// Anchor a stored checkpoint and persist the receipt.
    pub async fn anchor_checkpoint(&self, checkpoint_id: &str) -> Result<AnchorReceipt> {
        let checkpoint = self
            .store
            .get_checkpoint(checkpoint_id)
            .await?
            .ok_or_else(|| LedgerError::CheckpointNotFound(checkpoint_id.to_string()))?;
        self.anchor_and_record(&checkpoint).await
    }

    async fn anchor_and_record(&self, checkpoint: &Checkpoint) -> Result<AnchorReceipt> {
        let receipt = self.anchor.anchor(checkpoint).await?;
        self.store
            .insert_anchor_receipt(&checkpoint.id, &receipt)
            .await?;
        tracing::info!(
            checkpoint_id = %checkpoint.id,
            backend = %receipt.anchor_type,
            anchor_hash = %receipt.anchor_hash,
            "anchor receipt stored"
        );
        Ok(receipt)
    }

    pub async fn anchor_receipts(&self, checkpoint_id: &str) -> Result<Vec<AnchorReceipt>> {
        Ok(self.store.list_anchor_receipts(checkpoint_id).await?)
    }

    /// Verify a receipt with the configured backend.
    pub async fn verify_anchor(&self, receipt: &AnchorReceipt) -> AnchorVerification {
        self.anchor.verify(receipt).await
    }

    /// Verify every receipt stored for a checkpoint, and that each one still
    /// describes the checkpoint as it is stored now.
    pub async fn verify_checkpoint_anchors(
        &self,
        checkpoint_id: &str,
    ) -> Result<Vec<AnchorVerification>> {
        let checkpoint = self
            .store
            .get_checkpoint(checkpoint_id)
            .await?
            .ok_or_else(|| LedgerError::CheckpointNotFound(checkpoint_id.to_string()))?;

        let mut results = Vec::new();
        for receipt in self.store.list_anchor_receipts(checkpoint_id).await? {
            let verification = self.anchor.verify(&receipt).await;
            if !verification.valid {
                results.push(verification);
                continue;
            }
            let describes_checkpoint = receipt
                .payload()
                .map(|p| AnchorPayload::for_checkpoint(&checkpoint, p.anchored_at))
                .and_then(|p| p.anchor_hash().ok())
                .is_some_and(|hash| hash == receipt.anchor_hash);
            results.push(if describes_checkpoint {
                verification
            } else {
                AnchorVerification::invalid(AnchorReason::AnchorHashMismatch)
            });
        }
        Ok(results)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Export
    // ─────────────────────────────────────────────────────────────────────────

    /// Export `[from_seq, to_seq]` (default: everything) as a sealed forensic
    /// pack.
    ///
    /// The pack carries every checkpoint up to the head so the offline
    /// verifier can follow the checkpoint chain from its start.
    pub async fn export_pack(
        &self,
        from_seq: Option<u64>,
        to_seq: Option<u64>,
    ) -> Result<ForensicPack> {
        let report = self.verify_stitched(from_seq, to_seq).await?;
        let events = if report.from_seq > report.to_seq {
            Vec::new()
        } else {
            self.store
                .load_events(report.from_seq, report.to_seq, self.config.max_verify_batch)
                .await?
        };
        let head_seq = report.head.last_seq;
        let checkpoints = self
            .store
            .list_checkpoints()
            .await?
            .into_iter()
            .filter(|c| c.seq <= head_seq)
            .collect();
        let public_keys = self.signer.read().await.key_ring().to_pem_entries()?;

        let pack = ForensicPack {
            format: PACK_FORMAT.to_string(),
            exported_at: now_ts(),
            segment: PackSegment {
                from_seq: report.from_seq,
                to_seq: report.to_seq,
                count: events.len() as u64,
            },
            head_at_export_time: report.head,
            verification: PackVerification {
                status: report.status,
                checked: report.checked,
                partial: report.partial,
                chain_break: report.chain_break,
            },
            manifest: PackManifest {
                canonicalization: CANONICALIZATION.to_string(),
                hash_alg: "sha256".to_string(),
                signature_alg: SIGNATURE_ALG.to_string(),
                genesis_hash: GENESIS_HASH.to_string(),
                schema_version: SCHEMA_VERSION,
                payload_versions: self.registry.versions(),
                checkpoint_interval: self.config.checkpoint_interval,
                public_keys,
            },
            system: PackSystem {
                generator: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            events,
            checkpoints,
            pack_hash: String::new(),
        }
        .seal()?;

        tracing::info!(
            from_seq = pack.segment.from_seq,
            to_seq = pack.segment.to_seq,
            pack_hash = %pack.pack_hash,
            "forensic pack exported"
        );
        Ok(pack)
    }
}

fn validate_draft(draft: &EventDraft) -> Result<()> {
    if draft.action.trim().is_empty() {
        return Err(LedgerError::InvalidInput("action must not be empty".into()));
    }
    if draft.actor.trim().is_empty() {
        return Err(LedgerError::InvalidInput("actor must not be empty".into()));
    }
    Ok(())
}

/// Result of [`Ledger::reconcile_checkpoints`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Checkpoints signed by this call, in seq order.
    pub created: Vec<Checkpoint>,
    /// Interval positions before the latest checkpoint that have none.
    pub unfillable: Vec<u64>,
}

/// Verdict for one stored checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointCheck {
    pub checkpoint_id: String,
    pub seq: u64,
    pub key_id: String,
    pub verdict: CheckpointVerdict,
}

/// Result of [`Ledger::verify_checkpoints`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointAudit {
    pub checks: Vec<CheckpointCheck>,
}

impl CheckpointAudit {
    pub fn all_valid(&self) -> bool {
        self.checks.iter().all(|c| c.verdict.is_valid())
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckpointCheck> {
        self.checks.iter().filter(|c| !c.verdict.is_valid())
    }
}
