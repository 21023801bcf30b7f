//! Errors that stop a verification run before it produces a report.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("pack is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("pack is not an object")]
    NotAnObject,

    #[error("invalid public key: {0}")]
    InvalidKey(String),
}

pub type Result<T> = std::result::Result<T, VerifyError>;
