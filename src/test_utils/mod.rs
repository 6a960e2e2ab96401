// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Fixtures shared by unit tests: an in-process Lotus JSON-RPC mock and
//! chain-head stubs.

use crate::error::{Error, Result};
use crate::rpc_client::{CHAIN_HEAD, ChainEpoch, ChainHead, MarketDealState, STATE_MARKET_STORAGE_DEAL};
use async_trait::async_trait;
use axum::{Json, Router, extract::State, routing::post};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use url::Url;

/// Canned responses for the Lotus methods the crate calls.
#[derive(Debug, Clone, Default)]
pub struct MockLotus {
    height: ChainEpoch,
    delay: Option<Duration>,
    failure: Option<String>,
    deals: HashMap<u64, MarketDealState>,
    without_market: bool,
}

impl MockLotus {
    pub fn with_height(height: ChainEpoch) -> Self {
        Self {
            height,
            ..Default::default()
        }
    }

    /// Every call answers with a JSON-RPC error carrying `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_market_deal(mut self, deal_id: u64, state: MarketDealState) -> Self {
        self.deals.insert(deal_id, state);
        self
    }

    /// Answers market queries as an unknown method, like a node without the
    /// market API enabled.
    pub fn without_market(mut self) -> Self {
        self.without_market = true;
        self
    }
}

/// Serves `mock` on an ephemeral local port and returns its RPC endpoint.
pub async fn spawn_mock_lotus(mock: MockLotus) -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new()
        .route("/rpc/v1", post(handle_rpc))
        .with_state(Arc::new(mock));
    tokio::spawn(async move { axum::serve(listener, app).await });
    format!("http://{addr}/rpc/v1").parse().unwrap()
}

async fn handle_rpc(State(mock): State<Arc<MockLotus>>, Json(request): Json<Value>) -> Json<Value> {
    if let Some(delay) = mock.delay {
        tokio::time::sleep(delay).await;
    }
    let id = request["id"].clone();
    let error = |code: i64, message: String| {
        json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } })
    };
    if let Some(message) = &mock.failure {
        return Json(error(1, message.clone()));
    }
    let response = match request["method"].as_str() {
        Some(CHAIN_HEAD) => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": { "Cids": [], "Blocks": [], "Height": mock.height },
        }),
        Some(STATE_MARKET_STORAGE_DEAL) if !mock.without_market => {
            let deal_id = request["params"][0].as_u64().unwrap_or_default();
            match mock.deals.get(&deal_id) {
                Some(state) => json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": { "Proposal": {}, "State": state },
                }),
                None => error(1, format!("deal {deal_id} not found")),
            }
        }
        other => error(-32601, format!("method {other:?} not found")),
    };
    Json(response)
}

/// Chain head fixed at a single height.
#[derive(Debug, Default)]
pub struct StaticChainHead(AtomicI64);

impl StaticChainHead {
    pub fn new(height: ChainEpoch) -> Self {
        Self(AtomicI64::new(height))
    }

    pub fn set(&self, height: ChainEpoch) {
        self.0.store(height, Ordering::Relaxed);
    }
}

#[async_trait]
impl ChainHead for StaticChainHead {
    async fn chain_head_height(&self) -> Result<ChainEpoch> {
        Ok(self.0.load(Ordering::Relaxed))
    }
}

/// Chain head that never answers.
#[derive(Debug, Default)]
pub struct StalledChainHead;

#[async_trait]
impl ChainHead for StalledChainHead {
    async fn chain_head_height(&self) -> Result<ChainEpoch> {
        futures::future::pending().await
    }
}

/// Chain head that always errors.
#[derive(Debug, Default)]
pub struct FailingChainHead;

#[async_trait]
impl ChainHead for FailingChainHead {
    async fn chain_head_height(&self) -> Result<ChainEpoch> {
        Err(Error::ChainUnavailable("connection refused".into()))
    }
}
