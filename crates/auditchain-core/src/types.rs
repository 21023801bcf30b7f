//! Chain-wide constants and the head record.

use serde::{Deserialize, Serialize};
use std::fmt;

/// `prevHash` of the first event in the chain.
pub const GENESIS_HASH: &str = "GENESIS";

/// Version of the stored event record layout.
pub const SCHEMA_VERSION: u32 = 1;

/// The singleton chain head: sequence and hash of the last appended event.
///
/// The empty chain has head `(0, "GENESIS")`, so `prev_hash()` of the head is
/// always the `prevHash` the next event must carry.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditHead {
    pub last_seq: u64,
    pub last_hash: String,
}

impl AuditHead {
    /// The head of an empty chain.
    pub fn genesis() -> Self {
        Self {
            last_seq: 0,
            last_hash: GENESIS_HASH.to_string(),
        }
    }

    pub fn new(last_seq: u64, last_hash: impl Into<String>) -> Self {
        Self {
            last_seq,
            last_hash: last_hash.into(),
        }
    }

    /// Whether no event has been appended yet.
    pub fn is_genesis(&self) -> bool {
        self.last_seq == 0
    }

    /// The sequence number the next event will receive.
    pub fn next_seq(&self) -> u64 {
        self.last_seq + 1
    }

    /// The `prevHash` the next event must carry.
    pub fn prev_hash(&self) -> &str {
        if self.is_genesis() {
            GENESIS_HASH
        } else {
            &self.last_hash
        }
    }
}

impl Default for AuditHead {
    fn default() -> Self {
        Self::genesis()
    }
}

impl fmt::Debug for AuditHead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.last_hash.get(..16).unwrap_or(&self.last_hash);
        write!(f, "AuditHead({}, {})", self.last_seq, short)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_head() {
        let head = AuditHead::genesis();
        assert!(head.is_genesis());
        assert_eq!(head.next_seq(), 1);
        assert_eq!(head.prev_hash(), GENESIS_HASH);
    }

    #[test]
    fn test_head_serializes_camel_case() {
        let head = AuditHead::new(3, "ab");
        assert_eq!(
            serde_json::to_string(&head).unwrap(),
            r#"{"lastSeq":3,"lastHash":"ab"}"#
        );
    }
}
