// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Index of every CID produced by packing, with archive-level statistics.

mod details;
mod memory;
mod sqlite;

pub use details::{CidBase, CidConversion, CidDetails, CidValidation, convert_cid};
pub use memory::MemoryCidCatalog;
pub use sqlite::SqliteCidCatalog;

use crate::car::{ArchiveRecord, CidType, PackedEntry};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cid::Cid;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};

/// Default page size for searches and listings.
pub const DEFAULT_PAGE_SIZE: usize = 50;

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CidCatalogEntry {
    #[serde_as(as = "DisplayFromStr")]
    pub cid: Cid,
    pub cid_type: CidType,
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub parent_cid: Option<Cid>,
    pub source_path: Option<String>,
    pub size_bytes: Option<u64>,
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub archive_root: Option<Cid>,
    pub created_at: DateTime<Utc>,
}

impl CidCatalogEntry {
    /// The root entry recorded for an archive.
    pub fn root_of(archive: &ArchiveRecord) -> Self {
        Self {
            cid: archive.root_cid,
            cid_type: CidType::Root,
            parent_cid: None,
            source_path: Some(archive.original_file_name.clone()),
            size_bytes: Some(archive.original_size_bytes),
            archive_root: Some(archive.root_cid),
            created_at: archive.created_at,
        }
    }

    /// An entry for a node packed into the archive rooted at `root`.
    pub fn packed(root: Cid, entry: &PackedEntry, created_at: DateTime<Utc>) -> Self {
        Self {
            cid: entry.cid,
            cid_type: entry.kind,
            parent_cid: Some(entry.parent),
            source_path: Some(entry.path.display().to_string()),
            size_bytes: Some(entry.size),
            archive_root: Some(root),
            created_at,
        }
    }

    /// `needle` must already be [`fold`]ed.
    fn matches(&self, needle: &str) -> bool {
        fold(&self.cid.to_string()).contains(needle)
            || self
                .source_path
                .as_deref()
                .is_some_and(|p| fold(p).contains(needle))
    }
}

/// Case folding shared by every catalog backend's search.
fn fold(text: &str) -> String {
    text.to_lowercase()
}

/// Result of [`CidCatalog::lookup`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CidInfo {
    pub entry: CidCatalogEntry,
    pub archive: Option<ArchiveRecord>,
    pub details: CidDetails,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogStatistics {
    pub total_archives: u64,
    pub total_original_bytes: u64,
    pub total_archive_bytes: u64,
    /// Mean `archive / original` size over archives with content, `0.0` when
    /// there are none.
    pub average_compression_ratio: f64,
    /// Catalog entries, roots included. A CID packed into two archives counts
    /// twice.
    pub total_cids: u64,
    pub file_cids: u64,
    pub directory_cids: u64,
    pub last_archived_at: Option<DateTime<Utc>>,
}

impl CatalogStatistics {
    pub fn from_archives<'a>(archives: impl IntoIterator<Item = &'a ArchiveRecord>) -> Self {
        let mut stats = Self::default();
        let mut ratios = 0.0;
        let mut counted = 0u64;
        for archive in archives {
            stats.total_archives += 1;
            stats.total_original_bytes += archive.original_size_bytes;
            stats.total_archive_bytes += archive.archive_size_bytes;
            stats.last_archived_at = stats.last_archived_at.max(Some(archive.created_at));
            if let Some(ratio) = archive.compression_ratio() {
                ratios += ratio;
                counted += 1;
            }
        }
        if counted > 0 {
            stats.average_compression_ratio = ratios / counted as f64;
        }
        stats
    }

    /// Adds the per-type entry counts to archive-level statistics.
    pub fn with_entries<'a>(mut self, entries: impl IntoIterator<Item = &'a CidCatalogEntry>) -> Self {
        for entry in entries {
            self.total_cids += 1;
            match entry.cid_type {
                CidType::File => self.file_cids += 1,
                CidType::Directory => self.directory_cids += 1,
                CidType::Root => {}
            }
        }
        self
    }
}

/// Searchable catalog of archives and the CIDs they contain.
#[async_trait]
pub trait CidCatalog: Send + Sync {
    /// Stores `archive` and its root entry. Indexing the same root again
    /// returns the existing root entry.
    async fn index_archive(&self, archive: &ArchiveRecord) -> Result<CidCatalogEntry>;

    /// Stores a freshly packed archive together with every entry in it, all or
    /// nothing. A root that is already cataloged keeps its original record,
    /// which is returned.
    async fn index_packed(
        &self,
        archive: &ArchiveRecord,
        entries: &[PackedEntry],
    ) -> Result<ArchiveRecord>;

    /// Adds a non-root entry. Re-adding the same CID for the same archive is a
    /// no-op.
    async fn index(&self, entry: CidCatalogEntry) -> Result<()>;

    async fn lookup(&self, cid: &Cid) -> Result<CidInfo>;

    /// Case-insensitive substring search over CIDs and source paths, newest
    /// first.
    async fn search(&self, term: &str, limit: usize, offset: usize)
    -> Result<Vec<CidCatalogEntry>>;

    async fn statistics(&self) -> Result<CatalogStatistics>;

    async fn archive(&self, root: &Cid) -> Result<ArchiveRecord>;

    /// Archives, newest first.
    async fn list_archives(&self, limit: usize, offset: usize) -> Result<Vec<ArchiveRecord>>;
}
