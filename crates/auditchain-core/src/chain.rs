//! Pure chain replay and break classification.
//!
//! Replay walks a batch of events in ascending order and stops at the first
//! violation. It performs no I/O: the service feeds it pages read from a store,
//! and the cursor carries the chain state from one page to the next.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::CoreError;
use crate::event::AuditEvent;
use crate::payload::PayloadRegistry;
use crate::types::{AuditHead, GENESIS_HASH};

/// Closed set of reasons a chain is considered broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BreakReason {
    #[serde(rename = "seq_gap")]
    SeqGap,
    #[serde(rename = "prevHash_mismatch")]
    PrevHashMismatch,
    #[serde(rename = "unknown_payload_version")]
    UnknownPayloadVersion,
    #[serde(rename = "version_mismatch")]
    VersionMismatch,
    #[serde(rename = "hash_mismatch")]
    HashMismatch,
    #[serde(rename = "partial_coverage")]
    PartialCoverage,
    #[serde(rename = "head_mismatch")]
    HeadMismatch,
}

impl BreakReason {
    /// Wire name of the reason.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SeqGap => "seq_gap",
            Self::PrevHashMismatch => "prevHash_mismatch",
            Self::UnknownPayloadVersion => "unknown_payload_version",
            Self::VersionMismatch => "version_mismatch",
            Self::HashMismatch => "hash_mismatch",
            Self::PartialCoverage => "partial_coverage",
            Self::HeadMismatch => "head_mismatch",
        }
    }
}

impl fmt::Display for BreakReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The first violation found in a range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainBreak {
    pub seq: u64,
    pub reason: BreakReason,
    pub expected: String,
    pub found: String,
}

impl ChainBreak {
    pub fn new(
        seq: u64,
        reason: BreakReason,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self {
            seq,
            reason,
            expected: expected.into(),
            found: found.into(),
        }
    }
}

impl fmt::Display for ChainBreak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at seq {} (expected {}, found {})",
            self.reason, self.seq, self.expected, self.found
        )
    }
}

/// Verification state of a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChainStatus {
    Empty,
    Genesis,
    Linked,
    Broken,
}

impl ChainStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "EMPTY",
            Self::Genesis => "GENESIS",
            Self::Linked => "LINKED",
            Self::Broken => "BROKEN",
        }
    }

    /// Classify a finished scan.
    pub fn classify(checked: u64, first_seq: Option<u64>, broken: bool) -> Self {
        if broken {
            Self::Broken
        } else if checked == 0 {
            Self::Empty
        } else if checked == 1 && first_seq == Some(1) {
            Self::Genesis
        } else {
            Self::Linked
        }
    }
}

impl fmt::Display for ChainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a replay starts: the next sequence number and the `prevHash` it
/// must carry.
///
/// `expected_prev_hash = None` means the first event's own `prevHash` is
/// trusted as the boundary. That is only the case for a scan that starts in
/// the middle of the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainCursor {
    pub next_seq: u64,
    pub expected_prev_hash: Option<String>,
}

impl ChainCursor {
    /// Start of the chain.
    pub fn genesis() -> Self {
        Self {
            next_seq: 1,
            expected_prev_hash: Some(GENESIS_HASH.to_string()),
        }
    }

    /// Start a scan at `from_seq`.
    pub fn at(from_seq: u64) -> Self {
        if from_seq <= 1 {
            Self::genesis()
        } else {
            Self {
                next_seq: from_seq,
                expected_prev_hash: None,
            }
        }
    }

    /// Continue right after a verified `(seq, hash)`.
    pub fn after(verified: &AuditHead) -> Self {
        if verified.is_genesis() {
            return Self::genesis();
        }
        Self {
            next_seq: verified.last_seq + 1,
            expected_prev_hash: Some(verified.last_hash.clone()),
        }
    }
}

/// Outcome of replaying one batch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChainScan {
    /// Events that passed every check.
    pub checked: u64,

    /// Sequence number of the first event looked at.
    pub first_seq: Option<u64>,

    /// `(seq, hash)` of the last event that passed.
    pub last_verified: Option<AuditHead>,

    /// First violation, if any. Replay stops there.
    pub chain_break: Option<ChainBreak>,
}

impl ChainScan {
    pub fn is_broken(&self) -> bool {
        self.chain_break.is_some()
    }

    pub fn status(&self) -> ChainStatus {
        ChainStatus::classify(self.checked, self.first_seq, self.is_broken())
    }

    /// Cursor for the page after this one, if the scan ended cleanly.
    pub fn next_cursor(&self) -> Option<ChainCursor> {
        if self.is_broken() {
            return None;
        }
        self.last_verified.as_ref().map(ChainCursor::after)
    }
}

/// Replay `events` from `cursor`, checking in order: sequence continuity,
/// `prevHash` linkage, builder availability, declared builder version and
/// the recomputed hash.
pub fn replay(events: &[AuditEvent], cursor: ChainCursor, registry: &PayloadRegistry) -> ChainScan {
    let mut scan = ChainScan::default();
    let mut next_seq = cursor.next_seq;
    let mut expected_prev = cursor.expected_prev_hash;

    for event in events {
        if scan.first_seq.is_none() {
            scan.first_seq = Some(event.seq);
        }
        if let Some(chain_break) = check_event(event, next_seq, expected_prev.as_deref(), registry) {
            scan.chain_break = Some(chain_break);
            return scan;
        }
        scan.checked += 1;
        scan.last_verified = Some(event.as_head());
        next_seq = event.seq + 1;
        expected_prev = Some(event.hash.clone());
    }

    scan
}

/// Check one event against the expected chain position.
pub fn check_event(
    event: &AuditEvent,
    expected_seq: u64,
    expected_prev: Option<&str>,
    registry: &PayloadRegistry,
) -> Option<ChainBreak> {
    if event.seq != expected_seq {
        return Some(ChainBreak::new(
            expected_seq,
            BreakReason::SeqGap,
            expected_seq.to_string(),
            event.seq.to_string(),
        ));
    }

    if let Some(expected_prev) = expected_prev {
        if event.prev_hash != expected_prev {
            return Some(ChainBreak::new(
                event.seq,
                BreakReason::PrevHashMismatch,
                expected_prev,
                event.prev_hash.clone(),
            ));
        }
    }

    let rebuilt = match registry.build(event) {
        Ok(rebuilt) => rebuilt,
        Err(_) => {
            let registered = registry
                .versions()
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(",");
            return Some(ChainBreak::new(
                event.seq,
                BreakReason::UnknownPayloadVersion,
                registered,
                event.payload_version.to_string(),
            ));
        }
    };

    let declared = rebuilt.get("_v").and_then(Value::as_u64);
    if declared != Some(u64::from(event.payload_version)) {
        return Some(ChainBreak::new(
            event.seq,
            BreakReason::VersionMismatch,
            event.payload_version.to_string(),
            declared.map_or_else(|| "missing".to_string(), |v| v.to_string()),
        ));
    }

    match crate::canonical::hash_canonical(&rebuilt) {
        Ok(recomputed) if recomputed == event.hash => None,
        Ok(recomputed) => Some(ChainBreak::new(
            event.seq,
            BreakReason::HashMismatch,
            recomputed,
            event.hash.clone(),
        )),
        Err(err) => Some(ChainBreak::new(
            event.seq,
            BreakReason::HashMismatch,
            event.hash.clone(),
            CoreError::from(err).to_string(),
        )),
    }
}
