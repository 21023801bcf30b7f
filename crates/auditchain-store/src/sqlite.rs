//! SQLite implementation of the LedgerStore trait.
//!
//! This is the primary storage backend for the audit ledger. It uses
//! rusqlite with bundled SQLite, wrapped in async via tokio::spawn_blocking.
//! The head compare-and-swap runs inside a `BEGIN IMMEDIATE` transaction, so
//! two processes sharing one database file cannot both claim a seq.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use serde_json::Value;

use auditchain_core::{AnchorReceipt, AuditEvent, AuditHead, Checkpoint};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{check_append, LedgerStore};

/// How long a writer waits for another process's lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const EVENT_COLUMNS: &str = "seq, ts, action, actor, receipt_id, export_id, saved_view_id, \
     payload, ip, user_agent, prev_hash, hash, schema_version, payload_version";

const CHECKPOINT_COLUMNS: &str = "id, seq, hash, ts, prev_checkpoint_id, prev_checkpoint_hash, \
     signature_alg, public_key_id, signature, signed_payload, event_count";

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(mut conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::LockPoisoned(format!("mutex poisoned: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Join(format!("spawn_blocking failed: {}", e)))?
    }
}

fn read_head(conn: &Connection) -> Result<AuditHead> {
    let head = conn.query_row(
        "SELECT last_seq, last_hash FROM audit_head WHERE id = 1",
        [],
        |row| Ok(AuditHead::new(row.get::<_, i64>(0)? as u64, row.get::<_, String>(1)?)),
    )?;
    Ok(head)
}

fn json_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Value> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEvent> {
    Ok(AuditEvent {
        seq: row.get::<_, i64>(0)? as u64,
        ts: row.get(1)?,
        action: row.get(2)?,
        actor: row.get(3)?,
        receipt_id: row.get(4)?,
        export_id: row.get(5)?,
        saved_view_id: row.get(6)?,
        payload: json_column(row, 7)?,
        ip: row.get(8)?,
        user_agent: row.get(9)?,
        prev_hash: row.get(10)?,
        hash: row.get(11)?,
        schema_version: row.get(12)?,
        payload_version: row.get(13)?,
    })
}

fn row_to_checkpoint(row: &rusqlite::Row<'_>) -> rusqlite::Result<Checkpoint> {
    Ok(Checkpoint {
        id: row.get(0)?,
        seq: row.get::<_, i64>(1)? as u64,
        hash: row.get(2)?,
        ts: row.get(3)?,
        prev_checkpoint_id: row.get(4)?,
        prev_checkpoint_hash: row.get(5)?,
        signature_alg: row.get(6)?,
        public_key_id: row.get(7)?,
        signature: row.get(8)?,
        signed_payload: row.get(9)?,
        event_count: row.get::<_, i64>(10)? as u64,
    })
}

fn row_to_anchor(row: &rusqlite::Row<'_>) -> rusqlite::Result<AnchorReceipt> {
    Ok(AnchorReceipt {
        anchor_type: row.get(0)?,
        anchor_id: row.get(1)?,
        anchor_hash: row.get(2)?,
        anchor_payload: json_column(row, 3)?,
        proof: json_column(row, 4)?,
    })
}

/// Map a constraint violation to [`StoreError::Duplicate`].
fn duplicate_on_conflict(err: rusqlite::Error, kind: &'static str, key: String) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            StoreError::Duplicate { kind, key }
        }
        other => StoreError::Database(other),
    }
}

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn get_head(&self) -> Result<AuditHead> {
        self.call(|conn| read_head(conn)).await
    }

    async fn insert_event_atomic(&self, event: &AuditEvent, new_head: &AuditHead) -> Result<()> {
        let event = event.clone();
        let new_head = new_head.clone();
        let payload = serde_json::to_string(&event.payload)?;

        self.call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let current = read_head(&tx)?;
            check_append(&current, &event, &new_head)?;

            tx.execute(
                &format!(
                    "INSERT INTO audit_events ({EVENT_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
                ),
                params![
                    event.seq as i64,
                    event.ts,
                    event.action,
                    event.actor,
                    event.receipt_id,
                    event.export_id,
                    event.saved_view_id,
                    payload,
                    event.ip,
                    event.user_agent,
                    event.prev_hash,
                    event.hash,
                    event.schema_version,
                    event.payload_version,
                ],
            )
            .map_err(|e| duplicate_on_conflict(e, "event", event.seq.to_string()))?;

            tx.execute(
                "UPDATE audit_head SET last_seq = ?1, last_hash = ?2 WHERE id = 1",
                params![new_head.last_seq as i64, new_head.last_hash],
            )?;

            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get_event(&self, seq: u64) -> Result<Option<AuditEvent>> {
        self.call(move |conn| {
            let event = conn
                .query_row(
                    &format!("SELECT {EVENT_COLUMNS} FROM audit_events WHERE seq = ?1"),
                    params![seq as i64],
                    row_to_event,
                )
                .optional()?;
            Ok(event)
        })
        .await
    }

    async fn list_events_in_range(
        &self,
        from: u64,
        to: u64,
        limit: usize,
    ) -> Result<Vec<AuditEvent>> {
        if from > to || limit == 0 {
            return Ok(Vec::new());
        }
        self.call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EVENT_COLUMNS} FROM audit_events \
                 WHERE seq >= ?1 AND seq <= ?2 ORDER BY seq ASC LIMIT ?3"
            ))?;
            let events = stmt
                .query_map(
                    params![from as i64, to.min(i64::MAX as u64) as i64, limit as i64],
                    row_to_event,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(events)
        })
        .await
    }

    async fn count_events(&self) -> Result<u64> {
        self.call(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM audit_events", [], |row| {
                row.get(0)
            })?;
            Ok(count as u64)
        })
        .await
    }

    async fn insert_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        let cp = checkpoint.clone();
        self.call(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO audit_checkpoints ({CHECKPOINT_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                ),
                params![
                    cp.id,
                    cp.seq as i64,
                    cp.hash,
                    cp.ts,
                    cp.prev_checkpoint_id,
                    cp.prev_checkpoint_hash,
                    cp.signature_alg,
                    cp.public_key_id,
                    cp.signature,
                    cp.signed_payload,
                    cp.event_count as i64,
                ],
            )
            .map_err(|e| duplicate_on_conflict(e, "checkpoint", format!("{}@{}", cp.id, cp.seq)))?;
            Ok(())
        })
        .await
    }

    async fn list_checkpoints(&self) -> Result<Vec<Checkpoint>> {
        self.call(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CHECKPOINT_COLUMNS} FROM audit_checkpoints ORDER BY seq ASC"
            ))?;
            let checkpoints = stmt
                .query_map([], row_to_checkpoint)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(checkpoints)
        })
        .await
    }

    async fn latest_checkpoint(&self) -> Result<Option<Checkpoint>> {
        self.call(|conn| {
            let checkpoint = conn
                .query_row(
                    &format!(
                        "SELECT {CHECKPOINT_COLUMNS} FROM audit_checkpoints \
                         ORDER BY seq DESC LIMIT 1"
                    ),
                    [],
                    row_to_checkpoint,
                )
                .optional()?;
            Ok(checkpoint)
        })
        .await
    }

    async fn get_checkpoint(&self, id: &str) -> Result<Option<Checkpoint>> {
        let id = id.to_string();
        self.call(move |conn| {
            let checkpoint = conn
                .query_row(
                    &format!("SELECT {CHECKPOINT_COLUMNS} FROM audit_checkpoints WHERE id = ?1"),
                    params![id],
                    row_to_checkpoint,
                )
                .optional()?;
            Ok(checkpoint)
        })
        .await
    }

    async fn insert_anchor_receipt(
        &self,
        checkpoint_id: &str,
        receipt: &AnchorReceipt,
    ) -> Result<()> {
        let checkpoint_id = checkpoint_id.to_string();
        let receipt = receipt.clone();
        let anchor_payload = serde_json::to_string(&receipt.anchor_payload)?;
        let proof = serde_json::to_string(&receipt.proof)?;

        self.call(move |conn| {
            let exists: Option<String> = conn
                .query_row(
                    "SELECT id FROM audit_checkpoints WHERE id = ?1",
                    params![checkpoint_id],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_none() {
                return Err(StoreError::NotFound(format!("checkpoint {checkpoint_id}")));
            }

            conn.execute(
                "INSERT INTO anchor_receipts \
                 (checkpoint_id, anchor_type, anchor_id, anchor_hash, anchor_payload, proof) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    checkpoint_id,
                    receipt.anchor_type,
                    receipt.anchor_id,
                    receipt.anchor_hash,
                    anchor_payload,
                    proof,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_anchor_receipts(&self, checkpoint_id: &str) -> Result<Vec<AnchorReceipt>> {
        let checkpoint_id = checkpoint_id.to_string();
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT anchor_type, anchor_id, anchor_hash, anchor_payload, proof \
                 FROM anchor_receipts WHERE checkpoint_id = ?1 ORDER BY id ASC",
            )?;
            let receipts = stmt
                .query_map(params![checkpoint_id], row_to_anchor)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(receipts)
        })
        .await
    }
}
