// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! SQLite plumbing shared by the deal registry and the CID catalog.

use anyhow::Context as _;
use sqlx::{
    SqlitePool,
    sqlite::{
        SqliteAutoVacuum, SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous,
    },
};
use std::{cmp::Ordering, path::Path, str::FromStr as _, time::Instant};

/// Opens or creates a database at the specified path
pub async fn open_file(file: &Path) -> anyhow::Result<SqlitePool> {
    if let Some(dir) = file.parent()
        && !dir.as_os_str().is_empty()
        && !dir.is_dir()
    {
        std::fs::create_dir_all(dir)?;
    }
    let options = SqliteConnectOptions::new()
        .filename(file)
        .create_if_missing(true);
    Ok(open(options).await?)
}

/// Opens a fresh in-memory database. Connections of the returned pool share
/// it; separate calls never do.
pub async fn open_memory() -> sqlx::Result<SqlitePool> {
    // each parse of `sqlite::memory:` names a new shared-cache database
    open(SqliteConnectOptions::from_str("sqlite::memory:")?).await
}

pub async fn open(options: SqliteConnectOptions) -> sqlx::Result<SqlitePool> {
    let options = options
        .synchronous(SqliteSynchronous::Normal)
        .pragma("temp_store", "memory")
        .auto_vacuum(SqliteAutoVacuum::None)
        .journal_mode(SqliteJournalMode::Wal)
        .pragma("journal_size_limit", "0") // always reset journal and wal files
        .foreign_keys(true)
        .read_only(false);
    SqlitePool::connect_with(options).await
}

/// Versioned table layout of one database.
///
/// `ddls` create the latest layout on a fresh database. `migrations[i]` takes an
/// existing database from version `i + 1` to `i + 2`, so the current version is
/// `migrations.len() + 1`.
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    pub name: &'static str,
    pub ddls: &'static [&'static str],
    pub migrations: &'static [&'static str],
}

impl Schema {
    pub fn version(&self) -> u64 {
        self.migrations.len() as u64 + 1
    }

    /// Creates the tables on a fresh database, or brings an older one up to
    /// [`Schema::version`]. A database newer than this binary is rejected.
    pub async fn init(&self, db: &SqlitePool) -> anyhow::Result<()> {
        let Self { name, .. } = *self;
        let has_meta = sqlx::query(
            "SELECT name FROM sqlite_master WHERE type='table' AND name='_meta'",
        )
        .fetch_optional(db)
        .await
        .with_context(|| format!("error looking for {name} database _meta table"))?
        .is_some();
        if !has_meta {
            self.create(db).await?;
        }

        let found_version: u64 = sqlx::query_scalar::<_, Option<i64>>("SELECT max(version) FROM _meta")
            .fetch_one(db)
            .await?
            .with_context(|| format!("invalid {name} database version: no version found"))?
            .try_into()?;
        anyhow::ensure!(found_version > 0, "schema version should be 1 based");

        match found_version.cmp(&self.version()) {
            Ordering::Greater => anyhow::bail!(
                "invalid {name} database version: version {found_version} is greater than the number of migrations {}",
                self.version()
            ),
            Ordering::Equal => Ok(()),
            Ordering::Less => self.migrate(db, found_version).await,
        }
    }

    async fn create(&self, db: &SqlitePool) -> sqlx::Result<()> {
        let mut tx = db.begin().await?;
        sqlx::query("CREATE TABLE IF NOT EXISTS _meta (version UINT64 NOT NULL UNIQUE)")
            .execute(tx.as_mut())
            .await?;
        for version in 1..=self.version() {
            sqlx::query("INSERT OR IGNORE INTO _meta (version) VALUES (?)")
                .bind(version as i64)
                .execute(tx.as_mut())
                .await?;
        }
        for ddl in self.ddls {
            sqlx::query(ddl).execute(tx.as_mut()).await?;
        }
        tx.commit().await
    }

    async fn migrate(&self, db: &SqlitePool, found_version: u64) -> anyhow::Result<()> {
        let name = self.name;
        for (i, migration) in self
            .migrations
            .iter()
            .enumerate()
            .skip(found_version as usize - 1)
        {
            let to_version = i as i64 + 2;
            tracing::info!("Migrating {name} database to version {to_version}");
            let now = Instant::now();
            let mut tx = db.begin().await?;
            sqlx::query(migration).execute(tx.as_mut()).await?;
            sqlx::query("INSERT OR IGNORE INTO _meta (version) VALUES (?)")
                .bind(to_version)
                .execute(tx.as_mut())
                .await?;
            tx.commit().await?;
            tracing::info!(
                "Migrated {name} database to version {to_version} in {}",
                humantime::format_duration(now.elapsed())
            );
        }
        if let Err(e) = sqlx::query("VACUUM").execute(db).await {
            tracing::warn!("error vacuuming {name} database: {e}")
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const V1: Schema = Schema {
        name: "test",
        ddls: &["CREATE TABLE items (id INTEGER PRIMARY KEY)"],
        migrations: &[],
    };

    const V2: Schema = Schema {
        name: "test",
        ddls: &["CREATE TABLE items (id INTEGER PRIMARY KEY, label TEXT)"],
        migrations: &["ALTER TABLE items ADD COLUMN label TEXT"],
    };

    async fn version(db: &SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT max(version) FROM _meta")
            .fetch_one(db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn fresh_database_gets_latest_version() {
        let db = open_memory().await.unwrap();
        V2.init(&db).await.unwrap();
        assert_eq!(version(&db).await, 2);
        sqlx::query("INSERT INTO items (id, label) VALUES (1, 'x')")
            .execute(&db)
            .await
            .unwrap();
        // init is idempotent
        V2.init(&db).await.unwrap();
    }

    #[tokio::test]
    async fn older_database_is_migrated() {
        let db = open_memory().await.unwrap();
        V1.init(&db).await.unwrap();
        assert_eq!(version(&db).await, 1);
        V2.init(&db).await.unwrap();
        assert_eq!(version(&db).await, 2);
        sqlx::query("INSERT INTO items (id, label) VALUES (1, 'x')")
            .execute(&db)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn newer_database_is_rejected() {
        let db = open_memory().await.unwrap();
        V2.init(&db).await.unwrap();
        assert!(V1.init(&db).await.is_err());
    }

    #[tokio::test]
    async fn open_file_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("filstore.db");
        let db = open_file(&path).await.unwrap();
        V1.init(&db).await.unwrap();
        assert!(path.exists());
    }
}
