// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::{CatalogStatistics, CidCatalog, CidCatalogEntry, CidDetails, CidInfo, fold};
use crate::car::{ArchiveRecord, CidType, PackedEntry};
use crate::error::{Error, Result};
use async_trait::async_trait;
use cid::Cid;
use indexmap::IndexMap;
use parking_lot::RwLock;

#[derive(Debug, Default)]
struct Inner {
    archives: IndexMap<Cid, ArchiveRecord>,
    // keyed by (cid, archive root); insertion order breaks timestamp ties
    entries: IndexMap<(Cid, Option<Cid>), CidCatalogEntry>,
}

/// Process-local catalog.
#[derive(Debug, Default)]
pub struct MemoryCidCatalog {
    inner: RwLock<Inner>,
}

impl MemoryCidCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    fn insert_archive(&mut self, archive: &ArchiveRecord) -> CidCatalogEntry {
        let root = CidCatalogEntry::root_of(archive);
        self.archives
            .entry(archive.root_cid)
            .or_insert_with(|| archive.clone());
        self.entries
            .entry((root.cid, root.archive_root))
            .or_insert(root)
            .clone()
    }
}

/// Newest first, later insertions first among equal timestamps.
fn newest_first<'a, T: 'a>(
    items: impl DoubleEndedIterator<Item = &'a T>,
    created_at: impl Fn(&T) -> chrono::DateTime<chrono::Utc>,
) -> Vec<&'a T> {
    let mut items: Vec<_> = items.rev().collect();
    items.sort_by_key(|item| std::cmp::Reverse(created_at(item)));
    items
}

#[async_trait]
impl CidCatalog for MemoryCidCatalog {
    async fn index_archive(&self, archive: &ArchiveRecord) -> Result<CidCatalogEntry> {
        Ok(self.inner.write().insert_archive(archive))
    }

    async fn index_packed(
        &self,
        archive: &ArchiveRecord,
        entries: &[PackedEntry],
    ) -> Result<ArchiveRecord> {
        let mut inner = self.inner.write();
        let root = inner.insert_archive(archive);
        for entry in entries {
            let entry = CidCatalogEntry::packed(archive.root_cid, entry, root.created_at);
            inner
                .entries
                .entry((entry.cid, entry.archive_root))
                .or_insert(entry);
        }
        inner
            .archives
            .get(&archive.root_cid)
            .cloned()
            .ok_or_else(|| Error::not_found("archive", archive.root_cid))
    }

    async fn index(&self, entry: CidCatalogEntry) -> Result<()> {
        if entry.cid_type == CidType::Root {
            return Err(Error::validation(
                "root entries are created when the archive is indexed",
            ));
        }
        let mut inner = self.inner.write();
        if let Some(root) = entry.archive_root
            && !inner.archives.contains_key(&root)
        {
            return Err(Error::not_found("archive", root));
        }
        inner
            .entries
            .entry((entry.cid, entry.archive_root))
            .or_insert(entry);
        Ok(())
    }

    async fn lookup(&self, cid: &Cid) -> Result<CidInfo> {
        let inner = self.inner.read();
        let mut matching = inner.entries.values().filter(|e| e.cid == *cid);
        let first = matching
            .clone()
            .find(|e| e.cid_type == CidType::Root)
            .or_else(|| matching.next())
            .ok_or_else(|| Error::not_found("CID", cid))?;
        Ok(CidInfo {
            entry: first.clone(),
            archive: first
                .archive_root
                .and_then(|root| inner.archives.get(&root))
                .cloned(),
            details: CidDetails::from(cid),
        })
    }

    async fn search(
        &self,
        term: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CidCatalogEntry>> {
        let needle = fold(term.trim());
        let inner = self.inner.read();
        let hits = inner.entries.values().filter(|e| e.matches(&needle));
        Ok(newest_first(hits, |e| e.created_at)
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn statistics(&self) -> Result<CatalogStatistics> {
        let inner = self.inner.read();
        Ok(CatalogStatistics::from_archives(inner.archives.values())
            .with_entries(inner.entries.values()))
    }

    async fn archive(&self, root: &Cid) -> Result<ArchiveRecord> {
        self.inner
            .read()
            .archives
            .get(root)
            .cloned()
            .ok_or_else(|| Error::not_found("archive", root))
    }

    async fn list_archives(&self, limit: usize, offset: usize) -> Result<Vec<ArchiveRecord>> {
        let inner = self.inner.read();
        Ok(newest_first(inner.archives.values(), |a| a.created_at)
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::exercise;

    #[tokio::test]
    async fn memory_catalog() {
        exercise(&MemoryCidCatalog::new()).await;
    }
}
