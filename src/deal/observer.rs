// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Sources of truth for how far a deal has progressed.

use super::{DealRecord, DealState};
use crate::error::Result;
use crate::rpc_client::{ChainHead, MarketDeals};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{DurationSeconds, serde_as};
use smart_default::SmartDefault;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Reports the state a deal is observed to be in. The tracker never lets an
/// observation move a deal backwards, so observers need not be monotonic.
#[async_trait]
pub trait DealObserver: Send + Sync {
    async fn observe(&self, deal: &DealRecord, now: DateTime<Utc>) -> Result<DealState>;
}

/// Time since submission after which a simulated deal reaches each state.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, SmartDefault, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationThresholds {
    #[default(Duration::from_secs(5 * 60))]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub waiting_for_data: Duration,
    #[default(Duration::from_secs(60 * 60))]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub sealing: Duration,
    #[default(Duration::from_secs(24 * 60 * 60))]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub active: Duration,
}

/// Advances deals on a fixed schedule measured from their submission. Deals
/// that were never submitted stay where they are.
#[derive(Debug, Clone, Default)]
pub struct SimulatedObserver {
    thresholds: SimulationThresholds,
}

impl SimulatedObserver {
    pub fn new(thresholds: SimulationThresholds) -> Self {
        Self { thresholds }
    }
}

#[async_trait]
impl DealObserver for SimulatedObserver {
    async fn observe(&self, deal: &DealRecord, now: DateTime<Utc>) -> Result<DealState> {
        let Some(submitted_at) = deal.submitted_at else {
            return Ok(deal.status);
        };
        // clock skew may put `now` before the submission
        let elapsed = (now - submitted_at).to_std().unwrap_or_default();
        let SimulationThresholds {
            waiting_for_data,
            sealing,
            active,
        } = self.thresholds;
        Ok(if elapsed >= active {
            DealState::Active
        } else if elapsed >= sealing {
            DealState::Sealing
        } else if elapsed >= waiting_for_data {
            DealState::WaitingForData
        } else {
            DealState::Proposed
        })
    }
}

/// Reads deal progress from the storage market actor.
#[derive(Clone)]
pub struct ChainObserver {
    chain: Arc<dyn ChainHead>,
    market: Arc<dyn MarketDeals>,
}

impl ChainObserver {
    pub fn new(chain: Arc<dyn ChainHead>, market: Arc<dyn MarketDeals>) -> Self {
        Self { chain, market }
    }
}

#[async_trait]
impl DealObserver for ChainObserver {
    async fn observe(&self, deal: &DealRecord, _now: DateTime<Utc>) -> Result<DealState> {
        let mut observed = deal.status;
        if let Some(chain_deal_id) = deal.chain_deal_id {
            match self.market.market_storage_deal(chain_deal_id).await? {
                Some(market) if market.state.slash_epoch >= 0 => return Ok(DealState::Failed),
                Some(market) if market.state.sector_start_epoch > 0 => {
                    return Ok(DealState::Active);
                }
                Some(_) => observed = DealState::Sealing,
                None => debug!("deal {chain_deal_id} not yet published"),
            }
        }
        let head = self.chain.chain_head_height().await?;
        if head > deal.start_epoch {
            debug!(
                deal_id = %deal.deal_id,
                head,
                start_epoch = deal.start_epoch,
                "deal missed its start epoch"
            );
            return Ok(DealState::Failed);
        }
        Ok(observed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deal::new_deal_id;
    use crate::deal::tests::new_deal;
    use crate::rpc_client::{LotusClient, MarketDealState, DEFAULT_TIMEOUT};
    use crate::test_utils::{MockLotus, StaticChainHead, spawn_mock_lotus};
    use rstest::rstest;

    fn submitted(at: DateTime<Utc>) -> DealRecord {
        let mut deal = DealRecord::new(new_deal_id(at), new_deal("t1abc", "t017840"), at);
        deal.transaction_hash = Some("0xabc".into());
        deal.submitted_at = Some(at);
        deal
    }

    #[rstest]
    #[case(0, DealState::Proposed)]
    #[case(4 * 60, DealState::Proposed)]
    #[case(5 * 60, DealState::WaitingForData)]
    #[case(59 * 60, DealState::WaitingForData)]
    #[case(60 * 60, DealState::Sealing)]
    #[case(24 * 60 * 60, DealState::Active)]
    #[case(-60, DealState::Proposed)]
    #[tokio::test]
    async fn simulated_schedule(#[case] elapsed_secs: i64, #[case] expected: DealState) {
        let start = Utc::now();
        let deal = submitted(start);
        let now = start + chrono::Duration::seconds(elapsed_secs);
        let state = SimulatedObserver::default().observe(&deal, now).await.unwrap();
        assert_eq!(state, expected);
    }

    #[tokio::test]
    async fn unsubmitted_deals_do_not_move() {
        let start = Utc::now();
        let deal = DealRecord::new(new_deal_id(start), new_deal("t1abc", "t017840"), start);
        let later = start + chrono::Duration::days(30);
        let state = SimulatedObserver::default().observe(&deal, later).await.unwrap();
        assert_eq!(state, DealState::Proposed);
    }

    async fn chain_observer(mock: MockLotus, height: i64) -> ChainObserver {
        let lotus = Arc::new(LotusClient::new(spawn_mock_lotus(mock).await, None, DEFAULT_TIMEOUT).unwrap());
        ChainObserver::new(Arc::new(StaticChainHead::new(height)), lotus)
    }

    fn market(sector_start_epoch: i64, slash_epoch: i64) -> MarketDealState {
        MarketDealState {
            sector_start_epoch,
            last_updated_epoch: -1,
            slash_epoch,
        }
    }

    #[tokio::test]
    async fn chain_states() {
        let mock = MockLotus::with_height(0)
            .with_market_deal(1, market(-1, -1))
            .with_market_deal(2, market(3000, -1))
            .with_market_deal(3, market(3000, 3500));
        let observer = chain_observer(mock, 1000).await;
        let mut deal = submitted(Utc::now());

        // not published yet
        assert_eq!(observer.observe(&deal, Utc::now()).await.unwrap(), DealState::Proposed);

        for (id, expected) in [
            (1, DealState::Sealing),
            (2, DealState::Active),
            (3, DealState::Failed),
            (99, DealState::Proposed),
        ] {
            deal.chain_deal_id = Some(id);
            assert_eq!(observer.observe(&deal, Utc::now()).await.unwrap(), expected, "deal {id}");
        }
    }

    #[tokio::test]
    async fn missed_start_epoch_fails_the_deal() {
        let mock = MockLotus::with_height(0).with_market_deal(1, market(-1, -1));
        let observer = chain_observer(mock, 5000).await;
        let mut deal = submitted(Utc::now());
        assert_eq!(deal.start_epoch, 3880);
        assert_eq!(observer.observe(&deal, Utc::now()).await.unwrap(), DealState::Failed);
        deal.chain_deal_id = Some(1);
        assert_eq!(observer.observe(&deal, Utc::now()).await.unwrap(), DealState::Failed);
    }

    #[tokio::test]
    async fn market_errors_surface() {
        let observer = chain_observer(MockLotus::failing("lotus is down"), 0).await;
        let mut deal = submitted(Utc::now());
        deal.chain_deal_id = Some(1);
        assert!(observer.observe(&deal, Utc::now()).await.is_err());
    }
}
