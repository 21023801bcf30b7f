//! Request and response shapes for an HTTP front end.
//!
//! Routing and authentication live elsewhere; these types only fix the JSON
//! contract.

use auditchain_core::{AuditEvent, AuditHead, ChainBreak, ChainStatus, EventDraft};
use auditchain_store::LedgerStore;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::ledger::Ledger;
use crate::verify::{VerifyOptions, VerifyReport};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendRequest {
    pub action: String,
    pub actor: String,
    #[serde(default)]
    pub receipt_id: Option<String>,
    #[serde(default)]
    pub export_id: Option<String>,
    #[serde(default)]
    pub saved_view_id: Option<String>,
    #[serde(default = "empty_object")]
    pub payload: Value,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl From<AppendRequest> for EventDraft {
    fn from(req: AppendRequest) -> Self {
        EventDraft {
            action: req.action,
            actor: req.actor,
            receipt_id: req.receipt_id,
            export_id: req.export_id,
            saved_view_id: req.saved_view_id,
            payload: req.payload,
            ip: req.ip,
            user_agent: req.user_agent,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub from_seq: Option<u64>,
    #[serde(default)]
    pub to_seq: Option<u64>,
    #[serde(default)]
    pub strict: bool,
}

impl From<VerifyRequest> for VerifyOptions {
    fn from(req: VerifyRequest) -> Self {
        VerifyOptions {
            from_seq: req.from_seq,
            to_seq: req.to_seq,
            limit: req.limit,
            strict: req.strict,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub ok: bool,
    pub status: ChainStatus,
    pub checked: u64,
    /// Same as `checked`; kept for older clients.
    pub checked_events: u64,
    pub total_events: u64,
    pub partial: bool,
    pub head: AuditHead,
    pub expected_head: Option<AuditHead>,
    pub first_bad_seq: Option<u64>,
    #[serde(rename = "break")]
    pub chain_break: Option<ChainBreak>,
}

impl From<VerifyReport> for VerifyResponse {
    fn from(report: VerifyReport) -> Self {
        Self {
            ok: report.is_ok(),
            status: report.status,
            checked: report.checked,
            checked_events: report.checked,
            total_events: report.total_events,
            partial: report.partial,
            first_bad_seq: report.first_bad_seq(),
            head: report.head,
            expected_head: report.expected_head,
            chain_break: report.chain_break,
        }
    }
}

impl<S: LedgerStore> Ledger<S> {
    /// `POST /audit/events`
    pub async fn handle_append(&self, req: AppendRequest) -> Result<AuditEvent> {
        self.append(req.into()).await
    }

    /// `GET /audit/verify`
    pub async fn handle_verify(&self, req: VerifyRequest) -> Result<VerifyResponse> {
        Ok(self.verify(req.into()).await?.into())
    }
}
