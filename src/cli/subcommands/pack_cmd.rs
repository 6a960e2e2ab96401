// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::print_json;
use crate::cli::Context;
use anyhow::Context as _;
use std::path::PathBuf;

#[derive(Debug, clap::Args)]
pub struct PackCommand {
    /// File or directory to pack
    source: PathBuf,
    /// Wrap the source in a directory node named after it
    #[arg(long)]
    wrap: bool,
}

impl PackCommand {
    pub async fn run(self, ctx: Context) -> anyhow::Result<()> {
        let archive = ctx
            .pipeline()?
            .pack(&self.source, self.wrap)
            .await
            .with_context(|| format!("failed to pack {}", self.source.display()))?;
        print_json(&archive)
    }
}
