// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::car::{CarArchiveBuilder, CarStore};
use crate::catalog::{CidCatalog, MemoryCidCatalog, SqliteCidCatalog};
use crate::cli_shared::cli::{Config, ObserverKind, StoreBackend};
use crate::deal::{
    ChainObserver, DealLifecycleTracker, DealObserver, DealProposalBuilder, DealRegistry,
    MemoryDealRegistry, SimulatedObserver, SqliteDealRegistry,
};
use crate::pipeline::Pipeline;
use crate::rpc_client::LotusClient;
use crate::server::ServerState;
use anyhow::Context as _;
use std::sync::Arc;

/// Everything a subcommand may need, built from the configuration.
pub struct Context {
    pub config: Config,
    pub store: CarStore,
    pub catalog: Arc<dyn CidCatalog>,
    pub registry: Arc<dyn DealRegistry>,
    pub lotus: Arc<LotusClient>,
}

impl Context {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = CarStore::new(
            config.car_dir(),
            config.server.public_url.clone(),
            &config.server.mount,
        )?;
        let (catalog, registry): (Arc<dyn CidCatalog>, Arc<dyn DealRegistry>) =
            match config.store.backend {
                StoreBackend::Memory => (
                    Arc::new(MemoryCidCatalog::new()),
                    Arc::new(MemoryDealRegistry::new()),
                ),
                StoreBackend::Sqlite => {
                    let catalog_db = config.catalog_db_path();
                    let deals_db = config.deals_db_path();
                    (
                        Arc::new(SqliteCidCatalog::open(&catalog_db).await.with_context(
                            || format!("failed to open catalog at {}", catalog_db.display()),
                        )?),
                        Arc::new(SqliteDealRegistry::open(&deals_db).await.with_context(
                            || format!("failed to open deal registry at {}", deals_db.display()),
                        )?),
                    )
                }
            };
        let lotus = Arc::new(LotusClient::new(
            config.chain.rpc_url.clone(),
            config.chain.token.clone(),
            config.chain.timeout,
        )?);
        Ok(Self {
            config,
            store,
            catalog,
            registry,
            lotus,
        })
    }

    pub fn pipeline(&self) -> anyhow::Result<Pipeline> {
        let proposals = DealProposalBuilder::new(self.lotus.clone(), self.config.deal.clone())?;
        Ok(Pipeline::new(
            CarArchiveBuilder::default(),
            self.store.clone(),
            self.catalog.clone(),
            proposals,
            self.registry.clone(),
        ))
    }

    pub fn observer(&self) -> Arc<dyn DealObserver> {
        match self.config.tracker.observer {
            ObserverKind::Simulated => {
                Arc::new(SimulatedObserver::new(self.config.tracker.thresholds))
            }
            ObserverKind::Chain => {
                Arc::new(ChainObserver::new(self.lotus.clone(), self.lotus.clone()))
            }
        }
    }

    pub fn tracker(&self) -> DealLifecycleTracker {
        DealLifecycleTracker::new(self.registry.clone(), self.observer())
    }

    pub fn server_state(&self) -> Arc<ServerState> {
        Arc::new(ServerState {
            store: self.store.clone(),
            tracker: self.tracker(),
            catalog: self.catalog.clone(),
        })
    }

    /// The client address from the command line, or the configured one.
    pub fn client_address(&self, from_cli: Option<String>) -> anyhow::Result<String> {
        from_cli
            .or_else(|| self.config.client.address.clone())
            .context("no client address: pass --client or set client.address in the config")
    }
}
