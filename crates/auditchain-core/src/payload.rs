//! Versioned payload builders.
//!
//! A builder turns the fixed fields of an event into the exact object that is
//! canonicalized and hashed. Builders are frozen once shipped: a new hashed
//! shape gets a new version number, and old events keep verifying against the
//! builder of their stored version.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::canonical::hash_canonical;
use crate::error::{CoreError, Result};
use crate::event::AuditEvent;

/// Version written into new events.
pub const CURRENT_PAYLOAD_VERSION: u32 = 1;

/// A pure function from event fields to the hashed shape.
pub type PayloadBuilder = fn(&AuditEvent) -> Value;

/// Version 1 shape.
///
/// FROZEN: changing any key, value or nesting here breaks every stored hash.
pub fn build_v1(event: &AuditEvent) -> Value {
    json!({
        "_v": 1,
        "schemaVersion": event.schema_version,
        "seq": event.seq,
        "ts": event.ts,
        "action": event.action,
        "actor": event.actor,
        "receiptId": event.receipt_id,
        "exportId": event.export_id,
        "savedViewId": event.saved_view_id,
        "payload": event.payload,
        "ip": event.ip,
        "userAgent": event.user_agent,
        "prevHash": event.prev_hash,
    })
}

/// Registry of payload builders keyed by version.
#[derive(Clone)]
pub struct PayloadRegistry {
    builders: BTreeMap<u32, PayloadBuilder>,
}

impl PayloadRegistry {
    /// A registry with no builders.
    pub fn empty() -> Self {
        Self {
            builders: BTreeMap::new(),
        }
    }

    /// A registry holding every shipped builder.
    pub fn standard() -> Self {
        let mut builders = BTreeMap::new();
        builders.insert(1, build_v1 as PayloadBuilder);
        Self { builders }
    }

    /// Register a builder. A version can only be registered once.
    pub fn register(&mut self, version: u32, builder: PayloadBuilder) -> Result<()> {
        if self.builders.contains_key(&version) {
            return Err(CoreError::DuplicatePayloadVersion(version));
        }
        self.builders.insert(version, builder);
        Ok(())
    }

    pub fn get(&self, version: u32) -> Option<PayloadBuilder> {
        self.builders.get(&version).copied()
    }

    pub fn contains(&self, version: u32) -> bool {
        self.builders.contains_key(&version)
    }

    /// Registered versions in ascending order.
    pub fn versions(&self) -> Vec<u32> {
        self.builders.keys().copied().collect()
    }

    /// Build the hashed shape for `event` using its stored version.
    pub fn build(&self, event: &AuditEvent) -> Result<Value> {
        let builder = self
            .get(event.payload_version)
            .ok_or(CoreError::UnknownPayloadVersion(event.payload_version))?;
        Ok(builder(event))
    }

    /// SHA-256 of the canonical built shape of `event`.
    pub fn hash_event(&self, event: &AuditEvent) -> Result<String> {
        let built = self.build(event)?;
        Ok(hash_canonical(&built)?)
    }
}

impl Default for PayloadRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for PayloadRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadRegistry")
            .field("versions", &self.versions())
            .finish()
    }
}
