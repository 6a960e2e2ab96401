// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::{DealFilter, DealRegistry, Transition, conflicting_chain_deal_id, conflicting_submission};
use crate::deal::{DealRecord, DealState, NewDeal, new_deal_id};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use indexmap::map::Entry;
use parking_lot::RwLock;

/// Process-local registry. Records are kept in creation order.
#[derive(Debug, Default)]
pub struct MemoryDealRegistry {
    deals: RwLock<IndexMap<String, DealRecord>>,
}

impl MemoryDealRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn update<T>(
        &self,
        deal_id: &str,
        f: impl FnOnce(&mut DealRecord) -> Result<T>,
    ) -> Result<T> {
        let mut deals = self.deals.write();
        let deal = deals
            .get_mut(deal_id)
            .ok_or_else(|| Error::not_found("deal", deal_id))?;
        f(deal)
    }
}

#[async_trait]
impl DealRegistry for MemoryDealRegistry {
    async fn create(&self, deal: NewDeal) -> Result<DealRecord> {
        let now = Utc::now();
        let mut deals = self.deals.write();
        loop {
            if let Entry::Vacant(slot) = deals.entry(new_deal_id(now)) {
                let record = DealRecord::new(slot.key().clone(), deal, now);
                return Ok(slot.insert(record).clone());
            }
        }
    }

    async fn get(&self, deal_id: &str) -> Result<DealRecord> {
        self.deals
            .read()
            .get(deal_id)
            .cloned()
            .ok_or_else(|| Error::not_found("deal", deal_id))
    }

    async fn list(&self, filter: &DealFilter) -> Result<Vec<DealRecord>> {
        Ok(self
            .deals
            .read()
            .values()
            .filter(|d| filter.matches(d))
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn record_submission(
        &self,
        deal_id: &str,
        transaction_hash: &str,
        chain_deal_id: Option<u64>,
        at: DateTime<Utc>,
    ) -> Result<DealRecord> {
        self.update(deal_id, |deal| {
            if deal
                .transaction_hash
                .as_deref()
                .is_some_and(|existing| existing != transaction_hash)
            {
                return Err(conflicting_submission(deal, transaction_hash));
            }
            if let Some(new) = chain_deal_id
                && deal.chain_deal_id.is_some_and(|existing| existing != new)
            {
                return Err(conflicting_chain_deal_id(deal, new));
            }
            let mut changed = false;
            if deal.transaction_hash.is_none() {
                deal.transaction_hash = Some(transaction_hash.into());
                deal.submitted_at = Some(at);
                changed = true;
            }
            if deal.chain_deal_id.is_none() && chain_deal_id.is_some() {
                deal.chain_deal_id = chain_deal_id;
                changed = true;
            }
            if changed {
                deal.updated_at = at;
            }
            Ok(deal.clone())
        })
    }

    async fn advance(
        &self,
        deal_id: &str,
        state: DealState,
        at: DateTime<Utc>,
    ) -> Result<Transition> {
        self.update(deal_id, |deal| {
            let advanced = deal.is_submitted() && deal.status.can_advance_to(state);
            if advanced {
                deal.status = state;
                deal.updated_at = at;
            }
            Ok(Transition {
                record: deal.clone(),
                advanced,
            })
        })
    }

    async fn set_chain_deal_id(
        &self,
        deal_id: &str,
        chain_deal_id: u64,
        at: DateTime<Utc>,
    ) -> Result<DealRecord> {
        self.update(deal_id, |deal| {
            match deal.chain_deal_id {
                None => {
                    deal.chain_deal_id = Some(chain_deal_id);
                    deal.updated_at = at;
                }
                Some(existing) if existing == chain_deal_id => {}
                Some(_) => return Err(conflicting_chain_deal_id(deal, chain_deal_id)),
            }
            Ok(deal.clone())
        })
    }
}
