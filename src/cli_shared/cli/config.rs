// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::deal::proposal::DealSettings;
use crate::deal::SimulationThresholds;
use crate::rpc_client::{DEFAULT_RPC_URL, DEFAULT_TIMEOUT};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_with::{DurationSeconds, serde_as};
use smart_default::SmartDefault;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

const DATABASE_DIR_NAME: &str = "db";
const DEALS_DB_FILE_NAME: &str = "deals.db";
const CATALOG_DB_FILE_NAME: &str = "catalog.db";
const CAR_DIR_NAME: &str = "car";

fn default_data_dir() -> PathBuf {
    ProjectDirs::from("io", "ChainSafe", "filstore")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".filstore"))
}

fn parse_default_url(url: &str) -> Url {
    Url::parse(url).unwrap_or_else(|e| unreachable!("invalid built-in URL {url}: {e}"))
}

#[derive(Debug, Clone, PartialEq, Eq, SmartDefault, Serialize, Deserialize)]
#[serde(default)]
pub struct Client {
    #[default(default_data_dir())]
    pub data_dir: PathBuf,
    /// Wallet address deals are proposed from, unless given on the command
    /// line.
    pub address: Option<String>,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, SmartDefault, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    #[default(parse_default_url(DEFAULT_RPC_URL))]
    pub rpc_url: Url,
    /// Bearer token for authenticated Lotus endpoints.
    pub token: Option<String>,
    #[default(DEFAULT_TIMEOUT)]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ObserverKind {
    /// Advance deals on a fixed schedule after submission.
    #[default]
    Simulated,
    /// Follow published deals on chain.
    Chain,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, SmartDefault, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub observer: ObserverKind,
    pub thresholds: SimulationThresholds,
    #[default(Duration::from_secs(60))]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub sweep_interval: Duration,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local, lost on exit.
    Memory,
    #[default]
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Directory holding the deal and catalog databases, `<data_dir>/db`
    /// when unset.
    pub database_dir: Option<PathBuf>,
    /// Archive directory, `<data_dir>/car` when unset.
    pub car_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, SmartDefault, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL providers use to reach the archive server.
    #[default(parse_default_url("http://localhost:3001"))]
    pub public_url: Url,
    #[default("car".into())]
    pub mount: String,
    #[default(SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 3001))]
    pub listen: SocketAddr,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Hourly rotated log files are written here when set.
    pub log_dir: Option<PathBuf>,
    /// Emit JSON lines on the console instead of human-readable output.
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub client: Client,
    pub chain: ChainConfig,
    pub deal: DealSettings,
    pub tracker: TrackerConfig,
    pub store: StoreConfig,
    pub server: ServerConfig,
    pub log: LogConfig,
}

impl Config {
    pub fn database_dir(&self) -> PathBuf {
        self.store
            .database_dir
            .clone()
            .unwrap_or_else(|| self.client.data_dir.join(DATABASE_DIR_NAME))
    }

    pub fn deals_db_path(&self) -> PathBuf {
        self.database_dir().join(DEALS_DB_FILE_NAME)
    }

    pub fn catalog_db_path(&self) -> PathBuf {
        self.database_dir().join(CATALOG_DB_FILE_NAME)
    }

    pub fn car_dir(&self) -> PathBuf {
        self.store
            .car_dir
            .clone()
            .unwrap_or_else(|| self.client.data_dir.join(CAR_DIR_NAME))
    }

    /// Settings serde accepts but the daemon cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.tracker.sweep_interval.is_zero(),
            "tracker.sweep_interval must be at least one second"
        );
        Ok(())
    }
}
