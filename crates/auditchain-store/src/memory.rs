//! In-memory implementation of the LedgerStore trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence. It also exposes
//! tampering hooks so forensic tests can corrupt stored records the way an
//! attacker with database access would.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use auditchain_core::{AnchorReceipt, AuditEvent, AuditHead, Checkpoint};

use crate::error::{Result, StoreError};
use crate::traits::{check_append, LedgerStore};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    head: AuditHead,

    /// Events keyed by the seq they were appended at.
    events: BTreeMap<u64, AuditEvent>,

    /// Checkpoints keyed by seq.
    checkpoints: BTreeMap<u64, Checkpoint>,

    /// Anchor receipts per checkpoint id.
    anchors: BTreeMap<String, Vec<AnchorReceipt>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tampering hooks (bypass every invariant)
    // ─────────────────────────────────────────────────────────────────────────

    /// Mutate the stored event at `seq` in place.
    pub fn tamper_event<F>(&self, seq: u64, f: F) -> Result<()>
    where
        F: FnOnce(&mut AuditEvent),
    {
        let mut inner = self.write()?;
        let event = inner
            .events
            .get_mut(&seq)
            .ok_or_else(|| StoreError::NotFound(format!("event {seq}")))?;
        f(event);
        Ok(())
    }

    /// Delete the stored event at `seq`.
    pub fn remove_event(&self, seq: u64) -> Result<Option<AuditEvent>> {
        Ok(self.write()?.events.remove(&seq))
    }

    /// Mutate the stored checkpoint with `id` in place.
    pub fn tamper_checkpoint<F>(&self, id: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut Checkpoint),
    {
        let mut inner = self.write()?;
        let checkpoint = inner
            .checkpoints
            .values_mut()
            .find(|cp| cp.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("checkpoint {id}")))?;
        f(checkpoint);
        Ok(())
    }

    /// Overwrite the head record.
    pub fn set_head(&self, head: AuditHead) -> Result<()> {
        self.write()?.head = head;
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn get_head(&self) -> Result<AuditHead> {
        Ok(self.read()?.head.clone())
    }

    async fn insert_event_atomic(&self, event: &AuditEvent, new_head: &AuditHead) -> Result<()> {
        let mut inner = self.write()?;
        check_append(&inner.head, event, new_head)?;

        if inner.events.contains_key(&event.seq) {
            return Err(StoreError::Duplicate {
                kind: "event",
                key: event.seq.to_string(),
            });
        }

        inner.events.insert(event.seq, event.clone());
        inner.head = new_head.clone();
        Ok(())
    }

    async fn get_event(&self, seq: u64) -> Result<Option<AuditEvent>> {
        Ok(self.read()?.events.get(&seq).cloned())
    }

    async fn list_events_in_range(
        &self,
        from: u64,
        to: u64,
        limit: usize,
    ) -> Result<Vec<AuditEvent>> {
        if from > to {
            return Ok(Vec::new());
        }
        let inner = self.read()?;
        Ok(inner
            .events
            .range(from..=to)
            .take(limit)
            .map(|(_, event)| event.clone())
            .collect())
    }

    async fn count_events(&self) -> Result<u64> {
        Ok(self.read()?.events.len() as u64)
    }

    async fn insert_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        let mut inner = self.write()?;
        if inner.checkpoints.contains_key(&checkpoint.seq) {
            return Err(StoreError::Duplicate {
                kind: "checkpoint seq",
                key: checkpoint.seq.to_string(),
            });
        }
        if inner.checkpoints.values().any(|cp| cp.id == checkpoint.id) {
            return Err(StoreError::Duplicate {
                kind: "checkpoint id",
                key: checkpoint.id.clone(),
            });
        }
        inner.checkpoints.insert(checkpoint.seq, checkpoint.clone());
        Ok(())
    }

    async fn list_checkpoints(&self) -> Result<Vec<Checkpoint>> {
        Ok(self.read()?.checkpoints.values().cloned().collect())
    }

    async fn latest_checkpoint(&self) -> Result<Option<Checkpoint>> {
        Ok(self.read()?.checkpoints.values().next_back().cloned())
    }

    async fn get_checkpoint(&self, id: &str) -> Result<Option<Checkpoint>> {
        let inner = self.read()?;
        Ok(inner.checkpoints.values().find(|cp| cp.id == id).cloned())
    }

    async fn insert_anchor_receipt(
        &self,
        checkpoint_id: &str,
        receipt: &AnchorReceipt,
    ) -> Result<()> {
        let mut inner = self.write()?;
        if !inner.checkpoints.values().any(|cp| cp.id == checkpoint_id) {
            return Err(StoreError::NotFound(format!("checkpoint {checkpoint_id}")));
        }
        inner
            .anchors
            .entry(checkpoint_id.to_string())
            .or_default()
            .push(receipt.clone());
        Ok(())
    }

    async fn list_anchor_receipts(&self, checkpoint_id: &str) -> Result<Vec<AnchorReceipt>> {
        Ok(self
            .read()?
            .anchors
            .get(checkpoint_id)
            .cloned()
            .unwrap_or_default())
    }
}
