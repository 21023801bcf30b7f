//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {current} is newer than supported version {CURRENT_VERSION}"
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
            tracing::debug!(version, "applied schema migration");
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Events: append-only, one row per seq
        CREATE TABLE audit_events (
            seq INTEGER PRIMARY KEY,            -- 1-indexed, no gaps
            ts TEXT NOT NULL,                   -- RFC 3339, millisecond precision
            action TEXT NOT NULL,
            actor TEXT NOT NULL,
            receipt_id TEXT,
            export_id TEXT,
            saved_view_id TEXT,
            payload TEXT NOT NULL,              -- JSON
            ip TEXT,
            user_agent TEXT,
            prev_hash TEXT NOT NULL,
            hash TEXT NOT NULL,
            schema_version INTEGER NOT NULL,
            payload_version INTEGER NOT NULL
        );

        -- Head: exactly one row
        CREATE TABLE audit_head (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            last_seq INTEGER NOT NULL,
            last_hash TEXT NOT NULL
        );
        INSERT INTO audit_head (id, last_seq, last_hash) VALUES (1, 0, 'GENESIS');

        -- Signed checkpoints
        CREATE TABLE audit_checkpoints (
            id TEXT PRIMARY KEY,
            seq INTEGER NOT NULL UNIQUE,
            hash TEXT NOT NULL,
            ts TEXT NOT NULL,
            prev_checkpoint_id TEXT,
            prev_checkpoint_hash TEXT,
            signature_alg TEXT NOT NULL,
            public_key_id TEXT NOT NULL,
            signature TEXT NOT NULL,
            signed_payload TEXT NOT NULL,      -- verbatim signed bytes
            event_count INTEGER NOT NULL
        );

        -- External witnesses of checkpoints
        CREATE TABLE anchor_receipts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            checkpoint_id TEXT NOT NULL REFERENCES audit_checkpoints(id),
            anchor_type TEXT NOT NULL,
            anchor_id TEXT NOT NULL,
            anchor_hash TEXT NOT NULL,
            anchor_payload TEXT NOT NULL,      -- JSON
            proof TEXT NOT NULL                -- JSON
        );

        CREATE INDEX idx_anchor_receipts_checkpoint ON anchor_receipts(checkpoint_id);
        CREATE INDEX idx_audit_events_actor ON audit_events(actor);
        CREATE INDEX idx_audit_events_action ON audit_events(action);
        "#,
    )?;

    Ok(())
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
