// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::print_json;
use crate::car::verify_archive;
use crate::catalog::{CidDetails, DEFAULT_PAGE_SIZE};
use crate::cli::Context;
use anyhow::Context as _;
use clap::Subcommand;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Subcommand)]
pub enum ArchiveCommands {
    /// List cataloged archives, newest first
    List {
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Check that an archive parses and every block matches its CID
    Verify {
        /// Root CID of a stored archive, or a path to a CAR file
        archive: String,
    },
    /// Delete archives not modified within the given age
    Cleanup {
        /// e.g. `7d`, `12h`
        #[arg(long, value_parser = humantime::parse_duration, default_value = "7d")]
        older_than: Duration,
    },
}

impl ArchiveCommands {
    pub async fn run(self, ctx: Context) -> anyhow::Result<()> {
        match self {
            Self::List { limit, offset } => {
                print_json(&ctx.catalog.list_archives(limit, offset).await?)
            }
            Self::Verify { archive } => {
                let path = match CidDetails::parse(&archive) {
                    Ok((root, _)) => ctx.store.path_for(&root),
                    Err(_) => PathBuf::from(&archive),
                };
                let summary = verify_archive(&path)
                    .await
                    .with_context(|| format!("archive {} is invalid", path.display()))?;
                print_json(&summary)
            }
            Self::Cleanup { older_than } => print_json(&ctx.store.cleanup(older_than).await?),
        }
    }
}
