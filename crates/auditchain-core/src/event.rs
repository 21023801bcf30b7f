//! AuditEvent: one immutable link of the chain.
//!
//! An event is created exactly once, inside the append protocol, and is never
//! updated or deleted. Everything that goes into its hash is listed in the
//! payload builder for its `payload_version`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::payload::{PayloadRegistry, CURRENT_PAYLOAD_VERSION};
use crate::types::{AuditHead, SCHEMA_VERSION};

/// A stored audit event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    /// Position in the chain (1-indexed, no gaps).
    pub seq: u64,

    /// RFC 3339 UTC timestamp with millisecond precision.
    pub ts: String,

    pub action: String,
    pub actor: String,
    pub receipt_id: Option<String>,
    pub export_id: Option<String>,
    pub saved_view_id: Option<String>,

    /// Opaque structured data supplied by the caller.
    pub payload: Value,

    pub ip: Option<String>,
    pub user_agent: Option<String>,

    /// Hash of the previous event, or `GENESIS` for seq 1.
    pub prev_hash: String,

    /// Lowercase hex SHA-256 of the canonical built payload.
    pub hash: String,

    pub schema_version: u32,
    pub payload_version: u32,
}

impl AuditEvent {
    /// Whether this is the first event of the chain.
    pub fn is_first(&self) -> bool {
        self.seq == 1
    }

    /// The head this event produces once appended.
    pub fn as_head(&self) -> AuditHead {
        AuditHead::new(self.seq, self.hash.clone())
    }
}

/// The caller-supplied part of an event, before the chain position is known.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    pub action: String,
    pub actor: String,
    pub receipt_id: Option<String>,
    pub export_id: Option<String>,
    pub saved_view_id: Option<String>,
    pub payload: Value,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl EventDraft {
    /// Start a draft for `action` performed by `actor`.
    pub fn new(action: impl Into<String>, actor: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            actor: actor.into(),
            receipt_id: None,
            export_id: None,
            saved_view_id: None,
            payload: Value::Object(Map::new()),
            ip: None,
            user_agent: None,
        }
    }

    pub fn receipt_id(mut self, id: impl Into<String>) -> Self {
        self.receipt_id = Some(id.into());
        self
    }

    pub fn export_id(mut self, id: impl Into<String>) -> Self {
        self.export_id = Some(id.into());
        self
    }

    pub fn saved_view_id(mut self, id: impl Into<String>) -> Self {
        self.saved_view_id = Some(id.into());
        self
    }

    /// Set the payload.
    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Place the draft after `head` and hash it with the current payload version.
    pub fn seal(
        &self,
        head: &AuditHead,
        ts: impl Into<String>,
        registry: &PayloadRegistry,
    ) -> Result<AuditEvent> {
        let mut event = AuditEvent {
            seq: head.next_seq(),
            ts: ts.into(),
            action: self.action.clone(),
            actor: self.actor.clone(),
            receipt_id: self.receipt_id.clone(),
            export_id: self.export_id.clone(),
            saved_view_id: self.saved_view_id.clone(),
            payload: self.payload.clone(),
            ip: self.ip.clone(),
            user_agent: self.user_agent.clone(),
            prev_hash: head.prev_hash().to_string(),
            hash: String::new(),
            schema_version: SCHEMA_VERSION,
            payload_version: CURRENT_PAYLOAD_VERSION,
        };
        event.hash = registry.hash_event(&event)?;
        Ok(event)
    }
}
