// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::{DealFilter, DealObserver, DealRecord, DealRegistry, DealStatus};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shortest period [`DealLifecycleTracker::run_sweeper`] ticks at.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Advances deals through their lifecycle using a [`DealObserver`], on demand
/// and on a periodic sweep.
#[derive(Clone)]
pub struct DealLifecycleTracker {
    registry: Arc<dyn DealRegistry>,
    observer: Arc<dyn DealObserver>,
}

impl DealLifecycleTracker {
    pub fn new(registry: Arc<dyn DealRegistry>, observer: Arc<dyn DealObserver>) -> Self {
        Self { registry, observer }
    }

    pub fn registry(&self) -> &Arc<dyn DealRegistry> {
        &self.registry
    }

    pub async fn status(&self, deal_id: &str) -> Result<DealStatus> {
        self.status_at(deal_id, Utc::now()).await
    }

    /// Current status of a deal as of `now`, advancing it first if the
    /// observer reports progress. An observer failure is logged and the stored
    /// state is returned.
    pub async fn status_at(&self, deal_id: &str, now: DateTime<Utc>) -> Result<DealStatus> {
        let deal = self.registry.get(deal_id).await?;
        let deal = match self.refresh(deal.clone(), now).await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                warn!("failed to observe deal {deal_id}, reporting stored state: {e}");
                deal
            }
        };
        Ok(DealStatus::from(&deal))
    }

    /// Records the transaction hash of the signed, broadcast proposal, along
    /// with the market deal id if the caller already has it.
    pub async fn submit(
        &self,
        deal_id: &str,
        transaction_hash: &str,
        chain_deal_id: Option<u64>,
    ) -> Result<DealRecord> {
        let transaction_hash = transaction_hash.trim();
        if transaction_hash.is_empty() {
            return Err(Error::validation("transaction hash must not be empty"));
        }
        let deal = self
            .registry
            .record_submission(deal_id, transaction_hash, chain_deal_id, Utc::now())
            .await?;
        info!("deal {deal_id} submitted in transaction {transaction_hash}");
        Ok(deal)
    }

    /// Advances every open deal once. Failures are logged and left for the
    /// next sweep. Returns the number of deals that changed state.
    pub async fn sweep(&self) -> Result<usize> {
        self.sweep_at(Utc::now()).await
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let deals = self.registry.list(&DealFilter::default()).await?;
        let mut advanced = 0;
        for deal in deals.into_iter().filter(|d| !d.status.is_terminal()) {
            let deal_id = deal.deal_id.clone();
            let before = deal.status;
            match self.refresh(deal, now).await {
                Ok(after) if after.status != before => advanced += 1,
                Ok(_) => {}
                Err(e) => warn!("failed to advance deal {deal_id}, retrying next sweep: {e}"),
            }
        }
        if advanced > 0 {
            info!("advanced {advanced} deal(s)");
        }
        Ok(advanced)
    }

    /// Sweeps every `interval` until `cancel` fires. Intervals shorter than
    /// [`MIN_SWEEP_INTERVAL`] are raised to it.
    pub async fn run_sweeper(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval.max(MIN_SWEEP_INTERVAL));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep().await {
                        warn!("deal sweep failed: {e}");
                    }
                }
            }
        }
        debug!("deal sweeper stopped");
    }

    async fn refresh(&self, deal: DealRecord, now: DateTime<Utc>) -> Result<DealRecord> {
        if deal.status.is_terminal() || !deal.is_submitted() {
            return Ok(deal);
        }
        let observed = self.observer.observe(&deal, now).await?;
        if !deal.status.can_advance_to(observed) {
            return Ok(deal);
        }
        let transition = self.registry.advance(&deal.deal_id, observed, now).await?;
        if transition.advanced {
            info!(
                "deal {} moved from {} to {}",
                deal.deal_id, deal.status, transition.record.status
            );
        }
        Ok(transition.record)
    }
}
