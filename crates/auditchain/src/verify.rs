//! Range options and results of store-driven chain verification.

use auditchain_core::{AuditHead, BreakReason, ChainBreak, ChainScan, ChainStatus};
use serde::{Deserialize, Serialize};

/// Which part of the chain to verify.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyOptions {
    /// First sequence number to check. Defaults to 1.
    pub from_seq: Option<u64>,
    /// Last sequence number to check. Defaults to, and is clamped at, the head.
    pub to_seq: Option<u64>,
    /// Page size. `None` and `Some(0)` mean the configured maximum.
    pub limit: Option<usize>,
    /// Report incomplete coverage as a break.
    pub strict: bool,
}

impl VerifyOptions {
    pub fn range(from_seq: u64, to_seq: u64) -> Self {
        Self {
            from_seq: Some(from_seq),
            to_seq: Some(to_seq),
            ..Self::default()
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }
}

/// Result of a verification call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyReport {
    pub status: ChainStatus,
    pub checked: u64,
    pub total_events: u64,
    pub partial: bool,
    pub from_seq: u64,
    pub to_seq: u64,
    /// Live head, read before any event was fetched.
    pub head: AuditHead,
    /// `(seq, hash)` of the last event that verified.
    pub expected_head: Option<AuditHead>,
    #[serde(rename = "break")]
    pub chain_break: Option<ChainBreak>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.chain_break.is_none()
    }

    pub fn first_bad_seq(&self) -> Option<u64> {
        self.chain_break.as_ref().map(|b| b.seq)
    }
}

/// Resolved `[from, to]` range against a head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Range {
    pub from: u64,
    pub to: u64,
}

impl Range {
    pub fn resolve(head: &AuditHead, from_seq: Option<u64>, to_seq: Option<u64>) -> Self {
        let from = from_seq.unwrap_or(1).max(1);
        let to = to_seq.map_or(head.last_seq, |to| to.min(head.last_seq));
        Self { from, to }
    }

    pub fn is_empty(&self) -> bool {
        self.from > self.to
    }
}

/// Accumulated replay over one or more pages.
#[derive(Debug, Clone, Default)]
pub(crate) struct Coverage {
    pub scan: ChainScan,
    /// Highest sequence number the scan can vouch for reaching.
    pub covered_to: u64,
}

impl Coverage {
    /// Fold the next page's scan into this one.
    pub fn extend(&mut self, page: ChainScan) {
        if self.scan.first_seq.is_none() {
            self.scan.first_seq = page.first_seq;
        }
        self.scan.checked += page.checked;
        if page.last_verified.is_some() {
            self.scan.last_verified = page.last_verified;
        }
        self.scan.chain_break = page.chain_break;
    }

    /// Close the scan after a page that came back short of `range.to`.
    ///
    /// The store had nothing more to give, so every seq between the last
    /// verified event and `range.to` is missing. A range spanning the whole
    /// chain leaves this to the head comparison.
    pub fn close_short(&mut self, range: Range, head: &AuditHead) {
        let spans_chain = range.from == 1 && range.to == head.last_seq;
        if self.scan.chain_break.is_some() || spans_chain {
            return;
        }
        let reached = self
            .scan
            .last_verified
            .as_ref()
            .map_or(range.from - 1, |h| h.last_seq);
        if reached < range.to {
            let missing = reached + 1;
            self.scan.chain_break = Some(ChainBreak::new(
                missing,
                BreakReason::SeqGap,
                missing.to_string(),
                "missing",
            ));
            self.covered_to = reached;
        }
    }
}

/// Apply coverage and head checks to a finished scan.
pub(crate) fn conclude(head: AuditHead, range: Range, coverage: Coverage, strict: bool) -> VerifyReport {
    let total = head.last_seq;
    let Coverage { scan, covered_to } = coverage;
    let partial = range.from > 1 || covered_to < total;

    let mut chain_break = scan.chain_break;
    if chain_break.is_none() {
        if partial {
            if strict {
                let first_uncovered = if range.from > 1 { 1 } else { covered_to + 1 };
                chain_break = Some(ChainBreak::new(
                    first_uncovered,
                    BreakReason::PartialCoverage,
                    total.to_string(),
                    scan.checked.to_string(),
                ));
            }
        } else {
            let reached = scan.last_verified.clone().unwrap_or_else(AuditHead::genesis);
            if reached != head {
                chain_break = Some(ChainBreak::new(
                    head.last_seq,
                    BreakReason::HeadMismatch,
                    head_label(&head),
                    head_label(&reached),
                ));
            }
        }
    }

    VerifyReport {
        status: ChainStatus::classify(scan.checked, scan.first_seq, chain_break.is_some()),
        checked: scan.checked,
        total_events: total,
        partial,
        from_seq: range.from,
        to_seq: range.to,
        head,
        expected_head: scan.last_verified,
        chain_break,
    }
}

fn head_label(head: &AuditHead) -> String {
    format!("{}:{}", head.last_seq, head.last_hash)
}
