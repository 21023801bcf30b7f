//! LedgerStore trait: the persistence contract of the audit ledger.
//!
//! The ledger only needs an atomic append against the head record and
//! ordered range reads. Implementations include SQLite (primary) and
//! in-memory (for tests and embedding).

use async_trait::async_trait;
use auditchain_core::{AnchorReceipt, AuditEvent, AuditHead, Checkpoint};

use crate::error::{Result, StoreError};

/// The LedgerStore trait: async interface for chain persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
///
/// # Design Notes
///
/// - **Atomic append**: `insert_event_atomic` inserts the event and moves the
///   head in one unit, and only if the head is still the one the event was
///   built on. Otherwise it returns [`StoreError::HeadMoved`] and writes nothing.
/// - **Append-only**: there is no update or delete for events or checkpoints.
/// - **Ordered reads**: range reads return ascending `seq`.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Chain Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the head record. An empty store returns `(0, "GENESIS")`.
    async fn get_head(&self) -> Result<AuditHead>;

    /// Insert `event` and set the head to `new_head`, atomically.
    ///
    /// The head must still be `(event.seq - 1, event.prev_hash)` when the
    /// write happens, and `new_head` must be `(event.seq, event.hash)`.
    async fn insert_event_atomic(&self, event: &AuditEvent, new_head: &AuditHead) -> Result<()>;

    /// Get the event at `seq`.
    async fn get_event(&self, seq: u64) -> Result<Option<AuditEvent>>;

    /// Events with `from <= seq <= to`, ascending, at most `limit`.
    async fn list_events_in_range(&self, from: u64, to: u64, limit: usize)
        -> Result<Vec<AuditEvent>>;

    /// Number of stored events.
    async fn count_events(&self) -> Result<u64>;

    // ─────────────────────────────────────────────────────────────────────────
    // Checkpoint Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a checkpoint. A second checkpoint with the same id or seq is
    /// rejected with [`StoreError::Duplicate`].
    async fn insert_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// Every checkpoint, ascending by seq.
    async fn list_checkpoints(&self) -> Result<Vec<Checkpoint>>;

    /// The checkpoint with the highest seq.
    async fn latest_checkpoint(&self) -> Result<Option<Checkpoint>>;

    /// Get a checkpoint by id.
    async fn get_checkpoint(&self, id: &str) -> Result<Option<Checkpoint>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Anchor Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Persist an anchor receipt for a checkpoint.
    async fn insert_anchor_receipt(&self, checkpoint_id: &str, receipt: &AnchorReceipt)
        -> Result<()>;

    /// Anchor receipts of a checkpoint, in insertion order.
    async fn list_anchor_receipts(&self, checkpoint_id: &str) -> Result<Vec<AnchorReceipt>>;
}

/// Check an append against the current head.
pub(crate) fn check_append(
    current: &AuditHead,
    event: &AuditEvent,
    new_head: &AuditHead,
) -> Result<()> {
    if *new_head != event.as_head() {
        return Err(StoreError::InvalidData(format!(
            "new head {:?} does not match event {}",
            new_head, event.seq
        )));
    }
    if event.seq == 0 {
        return Err(StoreError::InvalidData("event seq must be positive".into()));
    }
    if current.next_seq() != event.seq || current.prev_hash() != event.prev_hash {
        let expected = if event.seq == 1 {
            AuditHead::genesis()
        } else {
            AuditHead::new(event.seq - 1, event.prev_hash.clone())
        };
        return Err(StoreError::HeadMoved {
            expected,
            found: current.clone(),
        });
    }
    Ok(())
}

/// Extension trait for common store patterns.
pub trait StoreExt: LedgerStore {
    /// Every event in `[from, to]`, read in pages of `page_size`.
    fn load_events(
        &self,
        from: u64,
        to: u64,
        page_size: usize,
    ) -> impl std::future::Future<Output = Result<Vec<AuditEvent>>> + Send;

    /// Hash of the event at `seq`, if it exists.
    fn event_hash_at(
        &self,
        seq: u64,
    ) -> impl std::future::Future<Output = Result<Option<String>>> + Send;
}

impl<S: LedgerStore + ?Sized> StoreExt for S {
    async fn load_events(&self, from: u64, to: u64, page_size: usize) -> Result<Vec<AuditEvent>> {
        let page_size = page_size.max(1);
        let mut events = Vec::new();
        let mut next = from.max(1);

        while next <= to {
            let page = self.list_events_in_range(next, to, page_size).await?;
            let Some(last) = page.last() else {
                break;
            };
            // A tampered seq below `next` would otherwise loop forever.
            if last.seq < next {
                events.extend(page);
                break;
            }
            next = last.seq + 1;
            let short = page.len() < page_size;
            events.extend(page);
            if short {
                break;
            }
        }

        Ok(events)
    }

    async fn event_hash_at(&self, seq: u64) -> Result<Option<String>> {
        Ok(self.get_event(seq).await?.map(|event| event.hash))
    }
}
