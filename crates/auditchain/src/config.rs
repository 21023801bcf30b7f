//! Ledger configuration.

use std::path::Path;

use auditchain_anchor::AnchorConfig;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};

pub const ENV_CHECKPOINT_INTERVAL: &str = "AUDITCHAIN_CHECKPOINT_INTERVAL";
pub const ENV_MAX_VERIFY_BATCH: &str = "AUDITCHAIN_MAX_VERIFY_BATCH";
pub const ENV_ANCHOR_ON_CHECKPOINT: &str = "AUDITCHAIN_ANCHOR_ON_CHECKPOINT";

/// Configuration for the [`Ledger`](crate::Ledger).
///
/// Missing fields take their defaults, so `{}` is a valid document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Sign a checkpoint every this many events. 0 disables checkpoints.
    pub checkpoint_interval: u64,
    /// Upper bound on events fetched by a single verification call.
    pub max_verify_batch: usize,
    /// How often an append is rebuilt after losing the head race.
    pub append_retries: u32,
    /// Anchor every checkpoint as soon as it is created.
    pub anchor_on_checkpoint: bool,
    /// Anchor backend.
    pub anchor: AnchorConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: 100,
            max_verify_batch: 1000,
            append_retries: 5,
            anchor_on_checkpoint: false,
            anchor: AnchorConfig::default(),
        }
    }
}

impl LedgerConfig {
    /// Parse a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| LedgerError::Config(e.to_string()))?;
        config.validate()
    }

    /// Read and parse a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| LedgerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    /// Apply `AUDITCHAIN_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any variable lookup.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_CHECKPOINT_INTERVAL) {
            self.checkpoint_interval = parse_var(ENV_CHECKPOINT_INTERVAL, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_VERIFY_BATCH) {
            self.max_verify_batch = parse_var(ENV_MAX_VERIFY_BATCH, &value)?;
        }
        if let Some(value) = lookup(ENV_ANCHOR_ON_CHECKPOINT) {
            self.anchor_on_checkpoint = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                other => {
                    return Err(LedgerError::Config(format!(
                        "{ENV_ANCHOR_ON_CHECKPOINT}: not a boolean: {other}"
                    )))
                }
            };
        }
        self.validate()
    }

    fn validate(self) -> Result<Self> {
        if self.max_verify_batch == 0 {
            return Err(LedgerError::Config("max_verify_batch must be positive".into()));
        }
        Ok(self)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| LedgerError::Config(format!("{name}: {e}")))
}
