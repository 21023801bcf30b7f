//! Ledger fixtures shared by the cross-implementation tests.

use std::sync::Arc;

use auditchain::anchor::LogOnlyAnchor;
use auditchain::{Ledger, LedgerConfig, Result};
use auditchain_core::{AuditEvent, EventDraft, Keypair};
use auditchain_store::MemoryStore;
use auditchain_verify::TrustedKeys;
use serde_json::{json, Value};

/// Seed of the fixture's checkpoint signing key.
pub const FIXTURE_SEED: [u8; 32] = [7; 32];

/// An in-memory ledger with a deterministic signing key.
pub struct LedgerFixture {
    pub ledger: Ledger<MemoryStore>,
    store: Arc<MemoryStore>,
}

impl LedgerFixture {
    /// Ledger checkpointing every `checkpoint_interval` events.
    pub fn new(checkpoint_interval: u64) -> Self {
        Self::with_config(LedgerConfig {
            checkpoint_interval,
            ..LedgerConfig::default()
        })
    }

    pub fn with_config(config: LedgerConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let ledger = Ledger::with_parts(
            Arc::clone(&store),
            Keypair::from_seed(&FIXTURE_SEED),
            config,
            Box::new(LogOnlyAnchor::new()),
        );
        Self { ledger, store }
    }

    /// Direct store access, for tampering.
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Append `n` varied events.
    pub async fn append_n(&self, n: u64) -> Result<Vec<AuditEvent>> {
        let mut events = Vec::with_capacity(n as usize);
        for i in 1..=n {
            events.push(self.ledger.append(sample_draft(i)).await?);
        }
        Ok(events)
    }

    /// Export a pack and render it as the JSON document a user would receive.
    pub async fn export_json(&self, from_seq: Option<u64>, to_seq: Option<u64>) -> Result<String> {
        let pack = self.ledger.export_pack(from_seq, to_seq).await?;
        Ok(serde_json::to_string_pretty(&pack).unwrap_or_default())
    }

    /// The ledger's signing keys as the offline verifier would load them.
    pub async fn trusted_keys(&self) -> TrustedKeys {
        let mut keys = TrustedKeys::new();
        for (_, key) in self.ledger.key_ring().await.iter() {
            if let Ok(pem) = key.to_pem() {
                let _ = keys.add_text(&pem);
            }
        }
        keys
    }
}

/// A draft whose optional fields vary with `i`.
pub fn sample_draft(i: u64) -> EventDraft {
    let draft = EventDraft::new(ACTIONS[(i as usize) % ACTIONS.len()], format!("user-{}", i % 3))
        .payload(json!({"i": i, "note": "résumé", "ratio": i as f64 / 4.0}));
    match i % 4 {
        0 => draft.receipt_id(format!("r-{i}")).ip("10.0.0.1"),
        1 => draft.export_id(format!("x-{i}")),
        2 => draft.saved_view_id(format!("v-{i}")).user_agent("Mozilla/5.0"),
        _ => draft,
    }
}

const ACTIONS: &[&str] = &["receipt.viewed", "export.created", "view.saved", "user.login"];

/// Trusted keys read back from a pack's manifest.
pub fn keys_from_manifest(pack: &Value) -> auditchain_verify::Result<TrustedKeys> {
    let mut keys = TrustedKeys::new();
    let entries = pack
        .pointer("/manifest/publicKeys")
        .and_then(Value::as_array)
        .map_or(&[][..], Vec::as_slice);
    for entry in entries {
        if let Some(pem) = entry.get("publicKeyPem").and_then(Value::as_str) {
            keys.add_text(pem)?;
        }
    }
    Ok(keys)
}
