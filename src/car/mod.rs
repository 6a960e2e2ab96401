// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub mod builder;
pub mod pack;
pub mod store;
pub mod stream;

pub use builder::CarArchiveBuilder;
pub use pack::{DagPacker, PackedArchive, PackedEntry, Packer};
pub use store::{CarStore, CleanupReport, StoredArchive};
pub use stream::{ArchiveSummary, CarBlock, CarStream, verify_archive};

use crate::piece::{PaddedPieceSize, padded_piece_size, piece_cid_for};
use chrono::{DateTime, Utc};
use cid::Cid;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use std::path::PathBuf;
use url::Url;

/// Role of a CID within a packed archive.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CidType {
    Root,
    File,
    Directory,
}

/// A persisted archive. Immutable once created.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveRecord {
    #[serde_as(as = "DisplayFromStr")]
    pub root_cid: Cid,
    #[serde_as(as = "DisplayFromStr")]
    pub piece_cid: Cid,
    pub archive_path: PathBuf,
    pub archive_file_name: String,
    pub download_url: Url,
    pub archive_size_bytes: u64,
    pub original_size_bytes: u64,
    pub piece_size_bytes: PaddedPieceSize,
    pub original_file_name: String,
    pub created_at: DateTime<Utc>,
}

impl ArchiveRecord {
    pub fn new(
        packed: &PackedArchive,
        stored: StoredArchive,
        original_file_name: impl Into<String>,
    ) -> Self {
        Self {
            root_cid: packed.root,
            piece_cid: piece_cid_for(&packed.bytes),
            archive_path: stored.archive_path,
            archive_file_name: stored.file_name,
            download_url: stored.download_url,
            archive_size_bytes: packed.archive_size(),
            original_size_bytes: packed.original_size,
            piece_size_bytes: padded_piece_size(packed.archive_size()),
            original_file_name: original_file_name.into(),
            created_at: Utc::now(),
        }
    }

    /// `archive_size / original_size`, or `None` for empty sources.
    pub fn compression_ratio(&self) -> Option<f64> {
        (self.original_size_bytes > 0)
            .then(|| self.archive_size_bytes as f64 / self.original_size_bytes as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr as _;

    #[test]
    fn cid_type_names() {
        assert_eq!(CidType::Directory.to_string(), "directory");
        assert_eq!(CidType::from_str("root").unwrap(), CidType::Root);
        assert!(CidType::from_str("symlink").is_err());
    }
}
