// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Minimal Lotus JSON-RPC client covering the chain reads the deal pipeline
//! depends on.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use url::Url;

pub const CHAIN_HEAD: &str = "Filecoin.ChainHead";
pub const STATE_MARKET_STORAGE_DEAL: &str = "Filecoin.StateMarketStorageDeal";

pub const DEFAULT_RPC_URL: &str = "https://api.calibration.node.glif.io/rpc/v1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// JSON-RPC 2.0 "method not found".
const METHOD_NOT_FOUND: i64 = -32601;

/// Chain time, in epochs of roughly 30 seconds.
pub type ChainEpoch = i64;

/// Source of the current chain height.
#[async_trait]
pub trait ChainHead: Send + Sync {
    async fn chain_head_height(&self) -> Result<ChainEpoch>;
}

/// Read access to on-chain storage market deals.
#[async_trait]
pub trait MarketDeals: Send + Sync {
    /// Returns `None` if the chain does not know the deal.
    async fn market_storage_deal(&self, deal_id: u64) -> Result<Option<MarketDeal>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MarketDeal {
    pub state: MarketDealState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MarketDealState {
    pub sector_start_epoch: ChainEpoch,
    pub last_updated_epoch: ChainEpoch,
    pub slash_epoch: ChainEpoch,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TipsetHeight {
    height: ChainEpoch,
}

#[derive(Serialize)]
struct JsonRpcRequest<'a, P> {
    jsonrpc: &'static str,
    method: &'a str,
    params: P,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse<R> {
    result: Option<R>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

/// HTTP client for a Lotus-compatible node.
#[derive(Debug)]
pub struct LotusClient {
    http: reqwest::Client,
    url: Url,
    token: Option<String>,
    next_id: AtomicU64,
}

impl LotusClient {
    pub fn new(url: Url, token: Option<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::ChainUnavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            url,
            token,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn call<P: Serialize + Send, R: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> Result<Option<R>, RpcFailure> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };
        let mut builder = self.http.post(self.url.clone()).json(&request);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        let response = builder
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| RpcFailure::Transport(e.to_string()))?;
        let body: JsonRpcResponse<R> = response
            .json()
            .await
            .map_err(|e| RpcFailure::Transport(format!("invalid response: {e}")))?;
        match (body.result, body.error) {
            (_, Some(error)) => Err(RpcFailure::Call(error)),
            (result, None) => Ok(result),
        }
    }
}

enum RpcFailure {
    Transport(String),
    Call(JsonRpcError),
}

impl RpcFailure {
    fn into_error(self, method: &str) -> Error {
        match self {
            Self::Transport(e) => Error::ChainUnavailable(format!("{method}: {e}")),
            Self::Call(JsonRpcError { code, message }) => {
                Error::ChainUnavailable(format!("{method} failed ({code}): {message}"))
            }
        }
    }
}

#[async_trait]
impl ChainHead for LotusClient {
    async fn chain_head_height(&self) -> Result<ChainEpoch> {
        let head: Option<TipsetHeight> = self
            .call(CHAIN_HEAD, serde_json::json!([]))
            .await
            .map_err(|e| e.into_error(CHAIN_HEAD))?;
        let height = head
            .ok_or_else(|| Error::ChainUnavailable(format!("{CHAIN_HEAD}: empty result")))?
            .height;
        tracing::debug!("current epoch: {height}");
        Ok(height)
    }
}

#[async_trait]
impl MarketDeals for LotusClient {
    async fn market_storage_deal(&self, deal_id: u64) -> Result<Option<MarketDeal>> {
        // the trailing null selects the heaviest tipset
        match self
            .call(STATE_MARKET_STORAGE_DEAL, (deal_id, ()))
            .await
        {
            Ok(deal) => Ok(deal),
            // Lotus reports an unpublished deal as "deal <id> not found ..."
            Err(RpcFailure::Call(e))
                if e.code != METHOD_NOT_FOUND
                    && e.message.contains(&format!("deal {deal_id} not found")) =>
            {
                Ok(None)
            }
            Err(e) => Err(e.into_error(STATE_MARKET_STORAGE_DEAL)),
        }
    }
}
