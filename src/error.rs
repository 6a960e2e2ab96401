// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::path::PathBuf;

/// Errors surfaced by the archive and deal pipeline.
///
/// The variants map one-to-one onto the failure kinds callers are expected to
/// branch on. None of them are retried internally.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },
    #[error("failed to pack {}: {reason}", path.display())]
    Packing { path: PathBuf, reason: String },
    #[error("chain unavailable: {0}")]
    ChainUnavailable(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
    #[error("encoding error: {0}")]
    Encoding(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn not_found(kind: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    pub fn packing(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Packing {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn validation(reason: impl ToString) -> Self {
        Self::Validation(reason.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Errors that are safe to retry without changing the input.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ChainUnavailable(_) | Self::Io(_) | Self::Store(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Encoding(e.to_string())
    }
}

impl From<cid::Error> for Error {
    fn from(e: cid::Error) -> Self {
        Self::Validation(format!("invalid CID: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_the_key() {
        let err = Error::not_found("deal", "deal-1-abc");
        assert_eq!(err.to_string(), "deal not found: deal-1-abc");
        assert!(err.is_not_found());
        assert!(!err.is_transient());
    }

    #[test]
    fn chain_errors_are_transient() {
        assert!(Error::ChainUnavailable("timeout".into()).is_transient());
        assert!(!Error::validation("bad address").is_transient());
    }
}
