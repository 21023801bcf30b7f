//! Trusted public keys supplied on the command line.

use std::collections::BTreeMap;
use std::path::Path;

use ed25519_dalek::pkcs8::DecodePublicKey;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use crate::canon::sha256_hex;
use crate::error::{Result, VerifyError};

/// First 16 hex characters of SHA-256 over the raw 32-byte key.
pub fn key_id(key: &VerifyingKey) -> String {
    let mut id = sha256_hex(key.as_bytes());
    id.truncate(16);
    id
}

/// Parse an SPKI PEM public key, or 64 hex characters of raw key.
pub fn parse_public_key(text: &str) -> Result<VerifyingKey> {
    let text = text.trim();
    if text.starts_with("-----BEGIN") {
        return VerifyingKey::from_public_key_pem(text)
            .map_err(|e| VerifyError::InvalidKey(e.to_string()));
    }
    let bytes: [u8; 32] = hex::decode(text)
        .map_err(|e| VerifyError::InvalidKey(e.to_string()))?
        .try_into()
        .map_err(|_| VerifyError::InvalidKey("expected 32 key bytes".into()))?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| VerifyError::InvalidKey(e.to_string()))
}

/// Key id to verifying key.
#[derive(Debug, Clone, Default)]
pub struct TrustedKeys {
    keys: BTreeMap<String, VerifyingKey>,
}

impl TrustedKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load one key per file.
    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut keys = Self::new();
        for path in paths {
            let path = path.as_ref();
            let text = std::fs::read_to_string(path).map_err(|source| VerifyError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let id = keys.add_text(&text)?;
            tracing::debug!(key_id = %id, path = %path.display(), "loaded public key");
        }
        Ok(keys)
    }

    pub fn insert(&mut self, key: VerifyingKey) -> String {
        let id = key_id(&key);
        self.keys.insert(id.clone(), key);
        id
    }

    pub fn add_text(&mut self, text: &str) -> Result<String> {
        Ok(self.insert(parse_public_key(text)?))
    }

    pub fn get(&self, key_id: &str) -> Option<&VerifyingKey> {
        self.keys.get(key_id)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }
}

/// Whether `signature_hex` is a valid signature of `message` under `key`.
pub fn signature_valid(key: &VerifyingKey, message: &[u8], signature_hex: &str) -> bool {
    let Ok(bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&bytes) else {
        return false;
    };
    key.verify(message, &signature).is_ok()
}
