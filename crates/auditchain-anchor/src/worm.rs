//! WORM object-store anchoring.
//!
//! Each anchor is written once as an immutable object whose body is the
//! canonical anchor payload, under a retention lock. The receipt copies the
//! body, its hash, the key and the retention terms, so it stays verifiable
//! even if the store is gone.

use std::collections::HashMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use auditchain_core::{sha256_hex, AnchorPayload, AnchorReceipt};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::backend::{
    check_receipt_hash, new_receipt, AnchorBackend, AnchorReason, AnchorVerification,
};
use crate::error::{AnchorError, Result};

pub const WORM_BACKEND: &str = "worm";

/// Default retention period of anchor objects.
pub const DEFAULT_RETENTION_DAYS: u32 = 2555;

/// Object-lock retention mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionMode {
    /// Privileged principals may still shorten or lift the lock.
    #[default]
    Governance,
    /// Nobody can shorten the lock until it expires.
    Compliance,
}

impl RetentionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Governance => "governance",
            Self::Compliance => "compliance",
        }
    }
}

impl fmt::Display for RetentionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRetention {
    pub mode: RetentionMode,
    pub retain_until: String,
}

/// Write-once object storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` under `key`. An existing key is never overwritten.
    async fn put_immutable(&self, key: &str, body: &[u8], retention: &ObjectRetention)
        -> Result<()>;

    /// Read an object back.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Human-readable location of the store, recorded in proofs.
    fn location(&self) -> String;
}

/// Reject keys that would escape the store root.
fn validate_key(key: &str) -> Result<()> {
    let path = Path::new(key);
    let escapes = key.is_empty()
        || path.is_absolute()
        || path
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
    if escapes {
        return Err(AnchorError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Filesystem object store.
///
/// Objects are created with `create_new`, made read-only, and get a
/// `.retention.json` sidecar describing the lock.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn write_new(path: &Path, bytes: &[u8]) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => AnchorError::AlreadyExists(path.display().to_string()),
                _ => AnchorError::Io(e),
            })?;
        file.write_all(bytes)?;
        file.sync_all()?;

        let mut permissions = file.metadata()?.permissions();
        permissions.set_readonly(true);
        fs::set_permissions(path, permissions)?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put_immutable(
        &self,
        key: &str,
        body: &[u8],
        retention: &ObjectRetention,
    ) -> Result<()> {
        validate_key(key)?;
        let path = self.root.join(key);
        let sidecar = self.root.join(format!("{key}.retention.json"));
        let body = body.to_vec();
        let retention = serde_json::to_vec(retention)?;

        tokio::task::spawn_blocking(move || {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            Self::write_new(&path, &body)?;
            Self::write_new(&sidecar, &retention)
        })
        .await
        .map_err(|e| AnchorError::Join(e.to_string()))?
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        let path = self.root.join(key);
        tokio::task::spawn_blocking(move || match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AnchorError::Io(e)),
        })
        .await
        .map_err(|e| AnchorError::Join(e.to_string()))?
    }

    fn location(&self) -> String {
        format!("file://{}", self.root.display())
    }
}

/// In-memory object store for tests.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, (Vec<u8>, ObjectRetention)>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retention terms of a stored object.
    pub async fn retention(&self, key: &str) -> Option<ObjectRetention> {
        self.objects.read().await.get(key).map(|(_, r)| r.clone())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_immutable(
        &self,
        key: &str,
        body: &[u8],
        retention: &ObjectRetention,
    ) -> Result<()> {
        validate_key(key)?;
        let mut objects = self.objects.write().await;
        if objects.contains_key(key) {
            return Err(AnchorError::AlreadyExists(key.to_string()));
        }
        objects.insert(key.to_string(), (body.to_vec(), retention.clone()));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.objects.read().await.get(key).map(|(b, _)| b.clone()))
    }

    fn location(&self) -> String {
        "memory://".to_string()
    }
}

/// Evidence carried by a WORM receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WormProof {
    pub location: String,
    pub object_key: String,
    pub object_body: String,
    pub object_body_hash: String,
    pub retention_mode: RetentionMode,
    pub retain_until: String,
}

/// Anchors checkpoints as immutable objects.
pub struct WormAnchor<O: ObjectStore> {
    store: O,
    mode: RetentionMode,
    retention_days: u32,
    prefix: String,
}

impl<O: ObjectStore> WormAnchor<O> {
    pub fn new(store: O, mode: RetentionMode, retention_days: u32) -> Self {
        Self {
            store,
            mode,
            retention_days,
            prefix: "audit-anchors".to_string(),
        }
    }

    /// Key prefix for anchor objects.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn store(&self) -> &O {
        &self.store
    }

    fn retain_until(&self, anchored_at: &str) -> String {
        let start = DateTime::parse_from_rfc3339(anchored_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        (start + Duration::days(i64::from(self.retention_days)))
            .to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

#[async_trait]
impl<O: ObjectStore> AnchorBackend for WormAnchor<O> {
    fn name(&self) -> &str {
        WORM_BACKEND
    }

    async fn anchor_payload(&self, payload: &AnchorPayload) -> Result<AnchorReceipt> {
        let mut receipt = new_receipt(WORM_BACKEND, payload)?;
        let body = payload.canonical()?;
        let key = format!(
            "{}/{:012}-{}.json",
            self.prefix, payload.seq, payload.checkpoint_id
        );
        let retention = ObjectRetention {
            mode: self.mode,
            retain_until: self.retain_until(&payload.anchored_at),
        };

        self.store
            .put_immutable(&key, body.as_bytes(), &retention)
            .await?;

        let proof = WormProof {
            location: self.store.location(),
            object_key: key,
            object_body_hash: sha256_hex(body.as_bytes()),
            object_body: body,
            retention_mode: retention.mode,
            retain_until: retention.retain_until,
        };
        receipt.proof = serde_json::to_value(&proof)?;

        tracing::info!(
            backend = WORM_BACKEND,
            checkpoint_id = %payload.checkpoint_id,
            seq = payload.seq,
            object_key = %proof.object_key,
            retention_mode = %proof.retention_mode,
            "checkpoint anchored"
        );
        Ok(receipt)
    }

    async fn verify(&self, receipt: &AnchorReceipt) -> AnchorVerification {
        if let Some(failed) = check_receipt_hash(WORM_BACKEND, receipt) {
            return failed;
        }
        let Ok(proof) = serde_json::from_value::<WormProof>(receipt.proof.clone()) else {
            return AnchorVerification::invalid(AnchorReason::MalformedProof);
        };

        let body_hash = sha256_hex(proof.object_body.as_bytes());
        if body_hash != proof.object_body_hash || body_hash != receipt.anchor_hash {
            return AnchorVerification::invalid(AnchorReason::ProofBodyMismatch);
        }
        match auditchain_core::canonicalize(&receipt.anchor_payload) {
            Ok(canonical) if canonical == proof.object_body => AnchorVerification::ok(),
            Ok(_) => AnchorVerification::invalid(AnchorReason::ProofBodyMismatch),
            Err(_) => AnchorVerification::invalid(AnchorReason::MalformedProof),
        }
    }
}
