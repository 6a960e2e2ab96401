// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::{CatalogStatistics, CidCatalog, CidCatalogEntry, CidDetails, CidInfo, fold};
use crate::car::{ArchiveRecord, CidType, PackedEntry};
use crate::error::{Error, Result};
use crate::piece::PaddedPieceSize;
use crate::utils::sqlite::{self, Schema};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cid::Cid;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr as _;

const SCHEMA: Schema = Schema {
    name: "catalog",
    ddls: &[
        "CREATE TABLE IF NOT EXISTS archives (
            root_cid TEXT PRIMARY KEY NOT NULL,
            piece_cid TEXT NOT NULL,
            archive_path TEXT NOT NULL,
            archive_file_name TEXT NOT NULL,
            download_url TEXT NOT NULL,
            archive_size INTEGER NOT NULL,
            original_size INTEGER NOT NULL,
            piece_size INTEGER NOT NULL,
            original_file_name TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS cid_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            cid TEXT NOT NULL,
            cid_type TEXT NOT NULL,
            parent_cid TEXT,
            source_path TEXT,
            source_path_folded TEXT,
            size_bytes INTEGER,
            archive_root TEXT REFERENCES archives (root_cid),
            created_at TEXT NOT NULL
        )",
        "CREATE UNIQUE INDEX IF NOT EXISTS cid_entries_cid_archive
            ON cid_entries (cid, IFNULL(archive_root, ''))",
        "CREATE UNIQUE INDEX IF NOT EXISTS cid_entries_one_root
            ON cid_entries (archive_root) WHERE cid_type = 'root'",
        "CREATE INDEX IF NOT EXISTS cid_entries_created_at ON cid_entries (created_at)",
    ],
    migrations: &["ALTER TABLE cid_entries ADD COLUMN source_path_folded TEXT"],
};

/// Catalog backed by a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteCidCatalog {
    db: SqlitePool,
}

impl SqliteCidCatalog {
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        Self::with_pool(sqlite::open_file(path).await?).await
    }

    pub async fn open_memory() -> anyhow::Result<Self> {
        Self::with_pool(sqlite::open_memory().await?).await
    }

    pub async fn with_pool(db: SqlitePool) -> anyhow::Result<Self> {
        SCHEMA.init(&db).await?;
        Ok(Self { db })
    }

    async fn root_entry(&self, root: &Cid) -> Result<Option<CidCatalogEntry>> {
        sqlx::query_as::<_, EntryRow>(
            "SELECT * FROM cid_entries WHERE archive_root = ? AND cid_type = 'root'",
        )
        .bind(root.to_string())
        .fetch_optional(&self.db)
        .await?
        .map(CidCatalogEntry::try_from)
        .transpose()
    }

    async fn fetch_archive(&self, root: &Cid) -> Result<Option<ArchiveRecord>> {
        sqlx::query_as::<_, ArchiveRow>("SELECT * FROM archives WHERE root_cid = ?")
            .bind(root.to_string())
            .fetch_optional(&self.db)
            .await?
            .map(ArchiveRecord::try_from)
            .transpose()
    }

    async fn insert_entry(
        tx: &mut sqlx::SqliteConnection,
        entry: &CidCatalogEntry,
    ) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO cid_entries (
                cid, cid_type, parent_cid, source_path, source_path_folded,
                size_bytes, archive_root, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.cid.to_string())
        .bind(entry.cid_type.as_ref())
        .bind(entry.parent_cid.map(|c| c.to_string()))
        .bind(entry.source_path.as_deref())
        .bind(entry.source_path.as_deref().map(fold))
        .bind(entry.size_bytes.map(to_i64).transpose()?)
        .bind(entry.archive_root.map(|c| c.to_string()))
        .bind(entry.created_at)
        .execute(tx)
        .await?;
        Ok(())
    }

    /// Inserts `archive` and its root entry unless the root is already known.
    async fn insert_archive(
        tx: &mut sqlx::SqliteConnection,
        archive: &ArchiveRecord,
    ) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO archives (
                root_cid, piece_cid, archive_path, archive_file_name, download_url,
                archive_size, original_size, piece_size, original_file_name, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(archive.root_cid.to_string())
        .bind(archive.piece_cid.to_string())
        .bind(archive.archive_path.to_string_lossy().into_owned())
        .bind(&archive.archive_file_name)
        .bind(archive.download_url.as_str())
        .bind(to_i64(archive.archive_size_bytes)?)
        .bind(to_i64(archive.original_size_bytes)?)
        .bind(to_i64(archive.piece_size_bytes.get())?)
        .bind(&archive.original_file_name)
        .bind(archive.created_at)
        .execute(&mut *tx)
        .await?;
        Self::insert_entry(tx, &CidCatalogEntry::root_of(archive)).await
    }
}

#[async_trait]
impl CidCatalog for SqliteCidCatalog {
    async fn index_archive(&self, archive: &ArchiveRecord) -> Result<CidCatalogEntry> {
        let mut tx = self.db.begin().await?;
        Self::insert_archive(tx.as_mut(), archive).await?;
        tx.commit().await?;

        self.root_entry(&archive.root_cid)
            .await?
            .ok_or_else(|| Error::not_found("archive", archive.root_cid))
    }

    async fn index_packed(
        &self,
        archive: &ArchiveRecord,
        entries: &[PackedEntry],
    ) -> Result<ArchiveRecord> {
        let mut tx = self.db.begin().await?;
        Self::insert_archive(tx.as_mut(), archive).await?;
        let stored: ArchiveRecord =
            sqlx::query_as::<_, ArchiveRow>("SELECT * FROM archives WHERE root_cid = ?")
                .bind(archive.root_cid.to_string())
                .fetch_one(tx.as_mut())
                .await?
                .try_into()?;
        for entry in entries {
            let entry = CidCatalogEntry::packed(stored.root_cid, entry, stored.created_at);
            Self::insert_entry(tx.as_mut(), &entry).await?;
        }
        tx.commit().await?;
        Ok(stored)
    }

    async fn index(&self, entry: CidCatalogEntry) -> Result<()> {
        if entry.cid_type == CidType::Root {
            return Err(Error::validation(
                "root entries are created when the archive is indexed",
            ));
        }
        if let Some(root) = entry.archive_root
            && self.fetch_archive(&root).await?.is_none()
        {
            return Err(Error::not_found("archive", root));
        }
        let mut conn = self.db.acquire().await?;
        Self::insert_entry(&mut conn, &entry).await
    }

    async fn lookup(&self, cid: &Cid) -> Result<CidInfo> {
        let entry: CidCatalogEntry = sqlx::query_as::<_, EntryRow>(
            "SELECT * FROM cid_entries WHERE cid = ?
            ORDER BY cid_type = 'root' DESC, id LIMIT 1",
        )
        .bind(cid.to_string())
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| Error::not_found("CID", cid))?
        .try_into()?;
        let archive = match entry.archive_root {
            Some(root) => self.fetch_archive(&root).await?,
            None => None,
        };
        Ok(CidInfo {
            entry,
            archive,
            details: CidDetails::from(cid),
        })
    }

    async fn search(
        &self,
        term: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CidCatalogEntry>> {
        // CIDs are ASCII; rows written before `source_path_folded` existed
        // fall back to SQLite's ASCII-only lower()
        sqlx::query_as::<_, EntryRow>(
            "SELECT * FROM cid_entries
            WHERE instr(lower(cid), ?1) > 0
                OR instr(IFNULL(source_path_folded, lower(IFNULL(source_path, ''))), ?1) > 0
            ORDER BY created_at DESC, id DESC
            LIMIT ?2 OFFSET ?3",
        )
        .bind(fold(term.trim()))
        .bind(to_i64(limit as u64)?)
        .bind(to_i64(offset as u64)?)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(CidCatalogEntry::try_from)
        .collect()
    }

    async fn statistics(&self) -> Result<CatalogStatistics> {
        let (total_archives, total_original_bytes, total_archive_bytes, average_compression_ratio): (
            i64,
            i64,
            i64,
            f64,
        ) = sqlx::query_as(
            "SELECT
                COUNT(*),
                COALESCE(SUM(original_size), 0),
                COALESCE(SUM(archive_size), 0),
                COALESCE(AVG(CASE WHEN original_size > 0
                    THEN CAST(archive_size AS REAL) / original_size END), 0.0)
            FROM archives",
        )
        .fetch_one(&self.db)
        .await?;
        let (total_cids, file_cids, directory_cids): (i64, i64, i64) = sqlx::query_as(
            "SELECT
                COUNT(*),
                COALESCE(SUM(cid_type = 'file'), 0),
                COALESCE(SUM(cid_type = 'directory'), 0)
            FROM cid_entries",
        )
        .fetch_one(&self.db)
        .await?;
        let last_archived_at = sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT created_at FROM archives ORDER BY created_at DESC LIMIT 1",
        )
        .fetch_optional(&self.db)
        .await?;
        let corrupt = |_| Error::Encoding("negative catalog totals".into());
        Ok(CatalogStatistics {
            total_archives: total_archives.try_into().map_err(corrupt)?,
            total_original_bytes: total_original_bytes.try_into().map_err(corrupt)?,
            total_archive_bytes: total_archive_bytes.try_into().map_err(corrupt)?,
            average_compression_ratio,
            total_cids: total_cids.try_into().map_err(corrupt)?,
            file_cids: file_cids.try_into().map_err(corrupt)?,
            directory_cids: directory_cids.try_into().map_err(corrupt)?,
            last_archived_at,
        })
    }

    async fn archive(&self, root: &Cid) -> Result<ArchiveRecord> {
        self.fetch_archive(root)
            .await?
            .ok_or_else(|| Error::not_found("archive", root))
    }

    async fn list_archives(&self, limit: usize, offset: usize) -> Result<Vec<ArchiveRecord>> {
        sqlx::query_as::<_, ArchiveRow>(
            "SELECT * FROM archives ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
        )
        .bind(to_i64(limit as u64)?)
        .bind(to_i64(offset as u64)?)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(ArchiveRecord::try_from)
        .collect()
    }
}

fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| Error::validation(format!("{value} does not fit in a database integer")))
}

fn parse_cid(text: &str, what: &str) -> Result<Cid> {
    Cid::from_str(text).map_err(|e| Error::Encoding(format!("invalid stored {what} {text:?}: {e}")))
}

#[derive(sqlx::FromRow)]
struct EntryRow {
    cid: String,
    cid_type: String,
    parent_cid: Option<String>,
    source_path: Option<String>,
    size_bytes: Option<i64>,
    archive_root: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<EntryRow> for CidCatalogEntry {
    type Error = Error;

    fn try_from(row: EntryRow) -> Result<Self> {
        Ok(Self {
            cid: parse_cid(&row.cid, "CID")?,
            cid_type: CidType::from_str(&row.cid_type)
                .map_err(|_| Error::Encoding(format!("invalid stored CID type {:?}", row.cid_type)))?,
            parent_cid: row
                .parent_cid
                .as_deref()
                .map(|c| parse_cid(c, "parent CID"))
                .transpose()?,
            source_path: row.source_path,
            size_bytes: row
                .size_bytes
                .map(u64::try_from)
                .transpose()
                .map_err(|_| Error::Encoding("negative entry size".into()))?,
            archive_root: row
                .archive_root
                .as_deref()
                .map(|c| parse_cid(c, "archive root"))
                .transpose()?,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ArchiveRow {
    root_cid: String,
    piece_cid: String,
    archive_path: String,
    archive_file_name: String,
    download_url: String,
    archive_size: i64,
    original_size: i64,
    piece_size: i64,
    original_file_name: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ArchiveRow> for ArchiveRecord {
    type Error = Error;

    fn try_from(row: ArchiveRow) -> Result<Self> {
        let corrupt = |what: &str| Error::Encoding(format!("archive {}: invalid {what}", row.root_cid));
        Ok(Self {
            root_cid: parse_cid(&row.root_cid, "root CID")?,
            piece_cid: parse_cid(&row.piece_cid, "piece CID")?,
            download_url: row
                .download_url
                .parse()
                .map_err(|_| corrupt("download URL"))?,
            archive_size_bytes: u64::try_from(row.archive_size)
                .map_err(|_| corrupt("archive size"))?,
            original_size_bytes: u64::try_from(row.original_size)
                .map_err(|_| corrupt("original size"))?,
            piece_size_bytes: u64::try_from(row.piece_size)
                .ok()
                .and_then(PaddedPieceSize::new)
                .ok_or_else(|| corrupt("piece size"))?,
            archive_path: PathBuf::from(row.archive_path),
            archive_file_name: row.archive_file_name,
            original_file_name: row.original_file_name,
            created_at: row.created_at,
        })
    }
}
