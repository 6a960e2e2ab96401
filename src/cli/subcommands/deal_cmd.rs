// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::print_json;
use crate::catalog::CidDetails;
use crate::cli::Context;
use crate::deal::{DealFilter, DealState, ProposalOptions};
use anyhow::Context as _;
use clap::Subcommand;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Debug, clap::Args)]
pub struct ProposeCommand {
    /// Pack this file or directory first, then propose it
    #[arg(required_unless_present = "root", conflicts_with = "root")]
    source: Option<PathBuf>,
    /// Propose an archive that was packed before
    #[arg(long)]
    root: Option<String>,
    /// Wrap a packed source in a directory node named after it
    #[arg(long, requires = "source")]
    wrap: bool,
    /// Client wallet address, defaults to `client.address`
    #[arg(long)]
    client: Option<String>,
    /// Storage provider, defaults to `deal.provider_id`
    #[arg(long)]
    provider: Option<String>,
    /// Request a verified (DataCap) deal
    #[arg(long)]
    verified: bool,
}

impl ProposeCommand {
    pub async fn run(self, ctx: Context) -> anyhow::Result<()> {
        let client = ctx.client_address(self.client)?;
        let options = ProposalOptions {
            verified: self.verified,
            provider_id: self.provider,
        };
        let pipeline = ctx.pipeline()?;
        let proposed = match (self.root, self.source) {
            (Some(root), _) => {
                let (root, _) = CidDetails::parse(&root)?;
                pipeline.propose(&root, &client, &options).await?
            }
            (None, Some(source)) => pipeline
                .pack_and_propose(&source, self.wrap, &client, &options)
                .await
                .with_context(|| format!("failed to propose {}", source.display()))?,
            (None, None) => anyhow::bail!("either a source or --root is required"),
        };
        print_json(&proposed)
    }
}

#[derive(Debug, clap::Args)]
pub struct SubmitCommand {
    deal_id: String,
    /// Hash of the transaction that published the signed proposal
    transaction_hash: String,
    /// Deal id assigned by the storage market, once known
    #[arg(long)]
    chain_deal_id: Option<u64>,
}

impl SubmitCommand {
    pub async fn run(self, ctx: Context) -> anyhow::Result<()> {
        let deal = ctx
            .tracker()
            .submit(&self.deal_id, &self.transaction_hash, self.chain_deal_id)
            .await?;
        print_json(&deal)
    }
}

#[derive(Debug, clap::Args)]
pub struct StatusCommand {
    deal_id: String,
}

impl StatusCommand {
    pub async fn run(self, ctx: Context) -> anyhow::Result<()> {
        print_json(&ctx.tracker().status(&self.deal_id).await?)
    }
}

#[derive(Debug, Subcommand)]
pub enum DealCommands {
    /// List registered deals, oldest first
    List {
        /// Only deals in this state, e.g. `sealing` or `StorageDealSealing`
        #[arg(long)]
        status: Option<DealState>,
        #[arg(long)]
        client: Option<String>,
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
}

impl DealCommands {
    pub async fn run(self, ctx: Context) -> anyhow::Result<()> {
        match self {
            Self::List {
                status,
                client,
                provider,
                limit,
                offset,
            } => {
                let filter = DealFilter {
                    status,
                    client,
                    provider,
                    limit,
                    offset,
                };
                print_json(&ctx.registry.list(&filter).await?)
            }
        }
    }
}

#[derive(Debug, clap::Args)]
pub struct SweepCommand {
    /// Keep sweeping every `tracker.sweep_interval` until interrupted
    #[arg(long)]
    pub watch: bool,
}

impl SweepCommand {
    pub async fn run(self, ctx: Context) -> anyhow::Result<()> {
        let tracker = ctx.tracker();
        if !self.watch {
            let advanced = tracker.sweep().await?;
            return print_json(&serde_json::json!({ "advanced": advanced }));
        }
        let cancel = CancellationToken::new();
        let sweeper = {
            let cancel = cancel.clone();
            let interval = ctx.config.tracker.sweep_interval;
            tokio::spawn(async move { tracker.run_sweeper(interval, cancel).await })
        };
        tokio::signal::ctrl_c().await?;
        cancel.cancel();
        sweeper.await?;
        Ok(())
    }
}
