// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod memory;
mod sqlite;

pub use memory::MemoryDealRegistry;
pub use sqlite::SqliteDealRegistry;

use super::{DealRecord, DealState, NewDeal};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Persistent store of deal records.
///
/// Every mutation is atomic per record. In particular [`DealRegistry::advance`]
/// compares and updates the status in one step, so concurrent callers can
/// never move a deal backwards.
#[async_trait]
pub trait DealRegistry: Send + Sync {
    /// Registers a new deal in [`DealState::Proposed`] under a fresh id.
    async fn create(&self, deal: NewDeal) -> Result<DealRecord>;

    async fn get(&self, deal_id: &str) -> Result<DealRecord>;

    /// Deals matching `filter`, oldest first.
    async fn list(&self, filter: &DealFilter) -> Result<Vec<DealRecord>>;

    /// Stores the transaction hash of the signed proposal, and the on-chain
    /// deal id when it is already known, in one step. Recording the same
    /// values again is a no-op; a different hash or chain id is rejected and
    /// nothing is written.
    async fn record_submission(
        &self,
        deal_id: &str,
        transaction_hash: &str,
        chain_deal_id: Option<u64>,
        at: DateTime<Utc>,
    ) -> Result<DealRecord>;

    /// Moves the deal to `state` if that is a forward move from its current
    /// state and the deal has been submitted. Otherwise the record is returned
    /// unchanged.
    async fn advance(&self, deal_id: &str, state: DealState, at: DateTime<Utc>)
    -> Result<Transition>;

    /// Links the deal to its on-chain id. Set once, like the transaction hash.
    async fn set_chain_deal_id(
        &self,
        deal_id: &str,
        chain_deal_id: u64,
        at: DateTime<Utc>,
    ) -> Result<DealRecord>;
}

/// Result of [`DealRegistry::advance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub record: DealRecord,
    pub advanced: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DealFilter {
    pub status: Option<DealState>,
    pub client: Option<String>,
    pub provider: Option<String>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl DealFilter {
    pub fn matches(&self, deal: &DealRecord) -> bool {
        self.status.is_none_or(|s| s == deal.status)
            && self
                .client
                .as_ref()
                .is_none_or(|c| *c == deal.client_address)
            && self
                .provider
                .as_ref()
                .is_none_or(|p| *p == deal.provider_id)
    }
}

fn conflicting_submission(deal: &DealRecord, transaction_hash: &str) -> Error {
    Error::validation(format!(
        "deal {} was already submitted with transaction {}, not {transaction_hash}",
        deal.deal_id,
        deal.transaction_hash.as_deref().unwrap_or_default(),
    ))
}

fn conflicting_chain_deal_id(deal: &DealRecord, chain_deal_id: u64) -> Error {
    Error::validation(format!(
        "deal {} is already linked to chain deal {}, not {chain_deal_id}",
        deal.deal_id,
        deal.chain_deal_id.unwrap_or_default(),
    ))
}
