// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Storage deals: proposal, persistence and lifecycle tracking.

pub mod observer;
pub mod proposal;
pub mod registry;
pub mod tracker;

pub use observer::{ChainObserver, DealObserver, SimulatedObserver, SimulationThresholds};
pub use proposal::{DealProposalBuilder, PricingPolicy, ProposalOptions, UnsignedDealProposal};
pub use registry::{DealFilter, DealRegistry, MemoryDealRegistry, SqliteDealRegistry, Transition};
pub use tracker::DealLifecycleTracker;

use crate::car::ArchiveRecord;
use crate::piece::PaddedPieceSize;
use crate::rpc_client::ChainEpoch;
use chrono::{DateTime, Utc};
use cid::Cid;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use url::Url;

/// Amount of FIL in its smallest denomination.
pub type AttoFil = u128;

/// Lifecycle of a storage deal. States only move forward; `Active` and
/// `Failed` are final.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum DealState {
    #[serde(rename = "StorageDealProposed")]
    #[strum(to_string = "StorageDealProposed", serialize = "proposed")]
    Proposed,
    #[serde(rename = "StorageDealWaitingForData")]
    #[strum(to_string = "StorageDealWaitingForData", serialize = "waiting-for-data")]
    WaitingForData,
    #[serde(rename = "StorageDealSealing")]
    #[strum(to_string = "StorageDealSealing", serialize = "sealing")]
    Sealing,
    #[serde(rename = "StorageDealActive")]
    #[strum(to_string = "StorageDealActive", serialize = "active")]
    Active,
    #[serde(rename = "StorageDealFailing")]
    #[strum(to_string = "StorageDealFailing", serialize = "failed")]
    Failed,
}

impl DealState {
    /// Position in the forward-only order. `Failed` ranks above everything so
    /// that any open deal may still fail.
    pub const fn rank(self) -> u8 {
        match self {
            Self::Proposed => 0,
            Self::WaitingForData => 1,
            Self::Sealing => 2,
            Self::Active => 3,
            Self::Failed => 4,
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Active | Self::Failed)
    }

    pub const fn can_advance_to(self, next: Self) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    pub const fn progress_percent(self) -> u8 {
        match self {
            Self::Proposed => 25,
            Self::WaitingForData => 50,
            Self::Sealing => 75,
            Self::Active => 100,
            Self::Failed => 0,
        }
    }

    pub const fn human_message(self) -> &'static str {
        match self {
            Self::Proposed => "Deal proposed to provider",
            Self::WaitingForData => "Provider downloading data...",
            Self::Sealing => "Provider sealing data into sectors",
            Self::Active => "Deal active! Data is stored on Filecoin",
            Self::Failed => "Deal failed before activation",
        }
    }

    /// Inverse of [`DealState::rank`], used when reading stored rows.
    pub const fn from_rank(rank: u8) -> Option<Self> {
        Some(match rank {
            0 => Self::Proposed,
            1 => Self::WaitingForData,
            2 => Self::Sealing,
            3 => Self::Active,
            4 => Self::Failed,
            _ => return None,
        })
    }
}

/// The identifying fields of an archive, copied into each deal made for it.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealArchive {
    #[serde_as(as = "DisplayFromStr")]
    pub root_cid: Cid,
    #[serde_as(as = "DisplayFromStr")]
    pub piece_cid: Cid,
    pub piece_size: PaddedPieceSize,
    pub archive_size: u64,
    pub download_url: Url,
}

impl From<&ArchiveRecord> for DealArchive {
    fn from(archive: &ArchiveRecord) -> Self {
        Self {
            root_cid: archive.root_cid,
            piece_cid: archive.piece_cid,
            piece_size: archive.piece_size_bytes,
            archive_size: archive.archive_size_bytes,
            download_url: archive.download_url.clone(),
        }
    }
}

/// Everything needed to register a proposed deal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDeal {
    pub archive: DealArchive,
    pub client_address: String,
    pub provider_id: String,
    pub verified: bool,
    pub label: String,
    pub start_epoch: ChainEpoch,
    pub end_epoch: ChainEpoch,
    pub storage_price_per_epoch: AttoFil,
}

impl From<&UnsignedDealProposal> for NewDeal {
    fn from(proposal: &UnsignedDealProposal) -> Self {
        Self {
            archive: proposal.archive(),
            client_address: proposal.client.clone(),
            provider_id: proposal.provider.clone(),
            verified: proposal.verified_deal,
            label: proposal.label.clone(),
            start_epoch: proposal.start_epoch,
            end_epoch: proposal.end_epoch,
            storage_price_per_epoch: proposal.storage_price_per_epoch,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealRecord {
    pub deal_id: String,
    pub archive: DealArchive,
    pub client_address: String,
    pub provider_id: String,
    pub verified: bool,
    pub label: String,
    pub start_epoch: ChainEpoch,
    pub end_epoch: ChainEpoch,
    #[serde_as(as = "DisplayFromStr")]
    pub storage_price_per_epoch: AttoFil,
    pub status: DealState,
    pub transaction_hash: Option<String>,
    pub chain_deal_id: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl DealRecord {
    pub fn new(deal_id: String, deal: NewDeal, now: DateTime<Utc>) -> Self {
        let NewDeal {
            archive,
            client_address,
            provider_id,
            verified,
            label,
            start_epoch,
            end_epoch,
            storage_price_per_epoch,
        } = deal;
        Self {
            deal_id,
            archive,
            client_address,
            provider_id,
            verified,
            label,
            start_epoch,
            end_epoch,
            storage_price_per_epoch,
            status: DealState::Proposed,
            transaction_hash: None,
            chain_deal_id: None,
            created_at: now,
            submitted_at: None,
            updated_at: now,
        }
    }

    pub fn is_submitted(&self) -> bool {
        self.transaction_hash.is_some()
    }
}

/// Generates a deal identifier: `deal-<unix-millis>-<random>`.
pub fn new_deal_id(now: DateTime<Utc>) -> String {
    format!(
        "deal-{}-{}",
        now.timestamp_millis(),
        uuid::Uuid::new_v4().simple()
    )
}

/// Status snapshot returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealStatus {
    pub deal_id: String,
    pub state: DealState,
    pub human_message: String,
    pub progress_percent: u8,
    pub last_updated: DateTime<Utc>,
}

impl From<&DealRecord> for DealStatus {
    fn from(record: &DealRecord) -> Self {
        Self {
            deal_id: record.deal_id.clone(),
            state: record.status,
            human_message: record.status.human_message().into(),
            progress_percent: record.status.progress_percent(),
            last_updated: record.updated_at,
        }
    }
}
