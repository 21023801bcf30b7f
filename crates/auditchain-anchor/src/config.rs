//! Backend selection from configuration.

use std::path::PathBuf;

use auditchain_core::Keypair;
use serde::{Deserialize, Serialize};

use crate::backend::AnchorBackend;
use crate::error::{AnchorError, Result};
use crate::log_only::LogOnlyAnchor;
use crate::multi::{MultiAnchor, MultiPolicy};
use crate::timestamp::{LocalTimestampAuthority, TimestampAnchor};
use crate::worm::{FsObjectStore, RetentionMode, WormAnchor, DEFAULT_RETENTION_DAYS};

/// Which anchor backend to run.
///
/// ```json
/// {"type": "multi", "policy": "any", "backends": [
///     {"type": "log_only"},
///     {"type": "worm", "root": "/var/lib/anchors", "retention_mode": "compliance"}
/// ]}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnchorConfig {
    #[default]
    LogOnly,
    Worm {
        root: PathBuf,
        #[serde(default)]
        retention_mode: RetentionMode,
        #[serde(default = "default_retention_days")]
        retention_days: u32,
    },
    Timestamp {
        /// Hex seed of the local authority key; a random key if absent.
        #[serde(default)]
        authority_seed_hex: Option<String>,
    },
    Multi {
        #[serde(default)]
        policy: MultiPolicy,
        backends: Vec<AnchorConfig>,
    },
}

fn default_retention_days() -> u32 {
    DEFAULT_RETENTION_DAYS
}

/// Build the backend described by `config`.
pub fn build_anchor(config: &AnchorConfig) -> Result<Box<dyn AnchorBackend>> {
    match config {
        AnchorConfig::LogOnly => Ok(Box::new(LogOnlyAnchor::new())),
        AnchorConfig::Worm {
            root,
            retention_mode,
            retention_days,
        } => {
            if *retention_days == 0 {
                return Err(AnchorError::Config("retention_days must be positive".into()));
            }
            Ok(Box::new(WormAnchor::new(
                FsObjectStore::new(root.clone()),
                *retention_mode,
                *retention_days,
            )))
        }
        AnchorConfig::Timestamp { authority_seed_hex } => {
            let keypair = match authority_seed_hex {
                Some(seed) => Keypair::from_seed_hex(seed)?,
                None => Keypair::generate(),
            };
            Ok(Box::new(TimestampAnchor::new(LocalTimestampAuthority::new(
                keypair,
            ))))
        }
        AnchorConfig::Multi { policy, backends } => {
            if backends.is_empty() {
                return Err(AnchorError::Config("multi anchor needs at least one backend".into()));
            }
            let children = backends
                .iter()
                .map(build_anchor)
                .collect::<Result<Vec<_>>>()?;
            Ok(Box::new(MultiAnchor::new(children, *policy)))
        }
    }
}
