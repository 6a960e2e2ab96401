// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::{DealFilter, DealRegistry, Transition, conflicting_chain_deal_id, conflicting_submission};
use crate::deal::{AttoFil, DealArchive, DealRecord, DealState, NewDeal, new_deal_id};
use crate::error::{Error, Result};
use crate::piece::PaddedPieceSize;
use crate::utils::sqlite::{self, Schema};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cid::Cid;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::path::Path;
use std::str::FromStr as _;

const SCHEMA: Schema = Schema {
    name: "deals",
    ddls: &[
        "CREATE TABLE IF NOT EXISTS deals (
            deal_id TEXT PRIMARY KEY NOT NULL,
            root_cid TEXT NOT NULL,
            piece_cid TEXT NOT NULL,
            piece_size INTEGER NOT NULL,
            archive_size INTEGER NOT NULL,
            download_url TEXT NOT NULL,
            client_address TEXT NOT NULL,
            provider_id TEXT NOT NULL,
            verified INTEGER NOT NULL,
            label TEXT NOT NULL,
            start_epoch INTEGER NOT NULL,
            end_epoch INTEGER NOT NULL,
            storage_price_per_epoch TEXT NOT NULL,
            status TEXT NOT NULL,
            status_rank INTEGER NOT NULL,
            transaction_hash TEXT,
            chain_deal_id INTEGER,
            created_at TEXT NOT NULL,
            submitted_at TEXT,
            updated_at TEXT NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS deals_created_at ON deals (created_at)",
        "CREATE INDEX IF NOT EXISTS deals_status_rank ON deals (status_rank)",
    ],
    migrations: &[],
};

/// Deal registry backed by a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteDealRegistry {
    db: SqlitePool,
}

impl SqliteDealRegistry {
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

    async fn fetch(&self, deal_id: &str) -> Result<Option<DealRecord>> {
        sqlx::query_as::<_, DealRow>("SELECT * FROM deals WHERE deal_id = ?")
            .bind(deal_id)
            .fetch_optional(&self.db)
            .await?
            .map(DealRecord::try_from)
            .transpose()
    }
}

#[async_trait]
impl DealRegistry for SqliteDealRegistry {
    async fn create(&self, deal: NewDeal) -> Result<DealRecord> {
        let now = Utc::now();
        let record = DealRecord::new(new_deal_id(now), deal, now);
        let DealRecord {
            deal_id,
            archive,
            client_address,
            provider_id,
            verified,
            label,
            start_epoch,
            end_epoch,
            storage_price_per_epoch,
            status,
            created_at,
            updated_at,
            ..
        } = &record;
        sqlx::query(
            "INSERT INTO deals (
                deal_id, root_cid, piece_cid, piece_size, archive_size, download_url,
                client_address, provider_id, verified, label, start_epoch, end_epoch,
                storage_price_per_epoch, status, status_rank, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(deal_id)
        .bind(archive.root_cid.to_string())
        .bind(archive.piece_cid.to_string())
        .bind(to_i64(archive.piece_size.get())?)
        .bind(to_i64(archive.archive_size)?)
        .bind(archive.download_url.as_str())
        .bind(client_address)
        .bind(provider_id)
        .bind(verified)
        .bind(label)
        .bind(start_epoch)
        .bind(end_epoch)
        .bind(storage_price_per_epoch.to_string())
        .bind(status.to_string())
        .bind(i64::from(status.rank()))
        .bind(created_at)
        .bind(updated_at)
        .execute(&self.db)
        .await?;
        Ok(record)
    }

    async fn get(&self, deal_id: &str) -> Result<DealRecord> {
        self.fetch(deal_id)
            .await?
            .ok_or_else(|| Error::not_found("deal", deal_id))
    }

    async fn list(&self, filter: &DealFilter) -> Result<Vec<DealRecord>> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM deals WHERE 1 = 1");
        if let Some(status) = filter.status {
            query
                .push(" AND status_rank = ")
                .push_bind(i64::from(status.rank()));
        }
        if let Some(client) = &filter.client {
            query.push(" AND client_address = ").push_bind(client.clone());
        }
        if let Some(provider) = &filter.provider {
            query.push(" AND provider_id = ").push_bind(provider.clone());
        }
        query
            .push(" ORDER BY created_at, rowid LIMIT ")
            .push_bind(filter.limit.map_or(-1, |l| l as i64))
            .push(" OFFSET ")
            .push_bind(filter.offset as i64);
        query
            .build_query_as::<DealRow>()
            .fetch_all(&self.db)
            .await?
            .into_iter()
            .map(DealRecord::try_from)
            .collect()
    }

    async fn record_submission(
        &self,
        deal_id: &str,
        transaction_hash: &str,
        chain_deal_id: Option<u64>,
        at: DateTime<Utc>,
    ) -> Result<DealRecord> {
        // one statement, so the hash and the chain id land together or not at all
        sqlx::query(
            "UPDATE deals SET
                updated_at = CASE
                    WHEN transaction_hash IS NULL OR (?3 IS NOT NULL AND chain_deal_id IS NULL)
                    THEN ?2 ELSE updated_at END,
                transaction_hash = IFNULL(transaction_hash, ?1),
                submitted_at = IFNULL(submitted_at, ?2),
                chain_deal_id = IFNULL(chain_deal_id, ?3)
            WHERE deal_id = ?4
                AND (transaction_hash IS NULL OR transaction_hash = ?1)
                AND (?3 IS NULL OR chain_deal_id IS NULL OR chain_deal_id = ?3)",
        )
        .bind(transaction_hash)
        .bind(at)
        .bind(chain_deal_id.map(to_i64).transpose()?)
        .bind(deal_id)
        .execute(&self.db)
        .await?;
        let deal = self.get(deal_id).await?;
        if let Some(new) = chain_deal_id
            && deal.chain_deal_id != Some(new)
        {
            return Err(conflicting_chain_deal_id(&deal, new));
        }
        if deal.transaction_hash.as_deref() != Some(transaction_hash) {
            return Err(conflicting_submission(&deal, transaction_hash));
        }
        Ok(deal)
    }

    async fn advance(
        &self,
        deal_id: &str,
        state: DealState,
        at: DateTime<Utc>,
    ) -> Result<Transition> {
        // ranks at or above `Active` are terminal
        let result = sqlx::query(
            "UPDATE deals SET status = ?, status_rank = ?, updated_at = ?
            WHERE deal_id = ? AND transaction_hash IS NOT NULL
                AND status_rank < ? AND status_rank < ?",
        )
        .bind(state.to_string())
        .bind(i64::from(state.rank()))
        .bind(at)
        .bind(deal_id)
        .bind(i64::from(state.rank()))
        .bind(i64::from(DealState::Active.rank()))
        .execute(&self.db)
        .await?;
        Ok(Transition {
            record: self.get(deal_id).await?,
            advanced: result.rows_affected() > 0,
        })
    }

    async fn set_chain_deal_id(
        &self,
        deal_id: &str,
        chain_deal_id: u64,
        at: DateTime<Utc>,
    ) -> Result<DealRecord> {
        sqlx::query(
            "UPDATE deals SET chain_deal_id = ?, updated_at = ?
            WHERE deal_id = ? AND chain_deal_id IS NULL",
        )
        .bind(to_i64(chain_deal_id)?)
        .bind(at)
        .bind(deal_id)
        .execute(&self.db)
        .await?;
        let deal = self.get(deal_id).await?;
        match deal.chain_deal_id {
            Some(existing) if existing == chain_deal_id => Ok(deal),
            _ => Err(conflicting_chain_deal_id(&deal, chain_deal_id)),
        }
    }
}

fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| Error::validation(format!("{value} does not fit in a database integer")))
}

#[derive(sqlx::FromRow)]
struct DealRow {
    deal_id: String,
    root_cid: String,
    piece_cid: String,
    piece_size: i64,
    archive_size: i64,
    download_url: String,
    client_address: String,
    provider_id: String,
    verified: bool,
    label: String,
    start_epoch: i64,
    end_epoch: i64,
    storage_price_per_epoch: String,
    status_rank: i64,
    transaction_hash: Option<String>,
    chain_deal_id: Option<i64>,
    created_at: DateTime<Utc>,
    submitted_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DealRow> for DealRecord {
    type Error = Error;

    fn try_from(row: DealRow) -> Result<Self> {
        let corrupt = |what: &str| Error::Encoding(format!("deal {}: invalid {what}", row.deal_id));
        let piece_size = u64::try_from(row.piece_size)
            .ok()
            .and_then(PaddedPieceSize::new)
            .ok_or_else(|| corrupt("piece size"))?;
        let status = u8::try_from(row.status_rank)
            .ok()
            .and_then(DealState::from_rank)
            .ok_or_else(|| corrupt("status"))?;
        let archive = DealArchive {
            root_cid: Cid::from_str(&row.root_cid).map_err(|_| corrupt("root CID"))?,
            piece_cid: Cid::from_str(&row.piece_cid).map_err(|_| corrupt("piece CID"))?,
            piece_size,
            archive_size: u64::try_from(row.archive_size).map_err(|_| corrupt("archive size"))?,
            download_url: row
                .download_url
                .parse()
                .map_err(|_| corrupt("download URL"))?,
        };
        let storage_price_per_epoch = AttoFil::from_str(&row.storage_price_per_epoch)
            .map_err(|_| corrupt("storage price"))?;
        let chain_deal_id = row
            .chain_deal_id
            .map(u64::try_from)
            .transpose()
            .map_err(|_| corrupt("chain deal id"))?;
        Ok(Self {
            archive,
            storage_price_per_epoch,
            status,
            chain_deal_id,
            deal_id: row.deal_id,
            client_address: row.client_address,
            provider_id: row.provider_id,
            verified: row.verified,
            label: row.label,
            start_epoch: row.start_epoch,
            end_epoch: row.end_epoch,
            transaction_hash: row.transaction_hash,
            created_at: row.created_at,
            submitted_at: row.submitted_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deal::registry::tests::{exercise, exercise_concurrent_advances};
    use crate::deal::tests::new_deal;
    use std::sync::Arc;

    #[tokio::test]
    async fn sqlite_registry() {
        exercise(&SqliteDealRegistry::open_memory().await.unwrap()).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn sqlite_registry_concurrent_advances() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SqliteDealRegistry::open(&dir.path().join("deals.db"))
            .await
            .unwrap();
        exercise_concurrent_advances(Arc::new(registry)).await;
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deals.db");
        let created = {
            let registry = SqliteDealRegistry::open(&path).await.unwrap();
            let mut deal = new_deal("t1alice", "t017840");
            deal.storage_price_per_epoch = u128::from(u64::MAX) * 4;
            registry.create(deal).await.unwrap()
        };
        let registry = SqliteDealRegistry::open(&path).await.unwrap();
        assert_eq!(registry.get(&created.deal_id).await.unwrap(), created);
    }
}
