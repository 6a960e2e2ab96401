// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::print_json;
use crate::catalog::{CidBase, CidDetails, CidValidation, DEFAULT_PAGE_SIZE, convert_cid};
use crate::cli::Context;
use clap::Subcommand;

#[derive(Debug, Subcommand)]
pub enum CidCommands {
    /// Show what the catalog knows about a CID
    Lookup { cid: String },
    /// Decode a CID without consulting the catalog
    Inspect { cid: String },
    /// Report whether a string is a valid CID
    Validate { cid: String },
    /// Re-encode a CID in another version or multibase
    Convert {
        cid: String,
        /// Target CID version, 0 or 1
        #[arg(long)]
        to_version: Option<u64>,
        /// Target multibase, e.g. base32, base58btc, base64
        #[arg(long)]
        base: Option<CidBase>,
    },
    /// Search CIDs and source paths, newest first
    Search {
        term: String,
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Archive and CID totals
    Stats,
}

impl CidCommands {
    pub async fn run(self, ctx: Context) -> anyhow::Result<()> {
        match self {
            Self::Lookup { cid } => {
                let (cid, _) = CidDetails::parse(&cid)?;
                print_json(&ctx.catalog.lookup(&cid).await?)
            }
            Self::Inspect { cid } => print_json(&CidDetails::parse(&cid)?.1),
            Self::Validate { cid } => print_json(&CidValidation::check(&cid)),
            Self::Convert {
                cid,
                to_version,
                base,
            } => print_json(&convert_cid(&cid, to_version, base)?),
            Self::Search {
                term,
                limit,
                offset,
            } => print_json(&ctx.catalog.search(&term, limit, offset).await?),
            Self::Stats => print_json(&ctx.catalog.statistics().await?),
        }
    }
}
