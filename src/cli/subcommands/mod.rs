// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod archive_cmd;
mod cids_cmd;
mod config_cmd;
mod deal_cmd;
mod pack_cmd;
mod serve_cmd;

pub(super) use self::{
    archive_cmd::ArchiveCommands,
    cids_cmd::CidCommands,
    config_cmd::ConfigCommands,
    deal_cmd::{DealCommands, ProposeCommand, StatusCommand, SubmitCommand, SweepCommand},
    pack_cmd::PackCommand,
    serve_cmd::ServeCommand,
};
use crate::cli::Context;
use clap::Parser;
use serde::Serialize;
use std::io::Write as _;
use std::path::PathBuf;

/// CLI structure generated when interacting with the filstore binary
#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"), bin_name = "filstore", author = env!("CARGO_PKG_AUTHORS"), version = env!("CARGO_PKG_VERSION"), about = env!("CARGO_PKG_DESCRIPTION"))]
pub struct Cli {
    /// Path to a TOML configuration file, overrides `FILSTORE_CONFIG`
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub cmd: Subcommand,
}

/// filstore sub-commands available.
#[derive(clap::Subcommand, Debug)]
pub enum Subcommand {
    /// Pack a file or directory into a CAR archive and catalog its CIDs
    Pack(PackCommand),

    /// Build an unsigned deal proposal and register it
    Propose(ProposeCommand),

    /// Record the transaction hash of a signed proposal
    Submit(SubmitCommand),

    /// Print the current status of a deal
    Status(StatusCommand),

    /// Inspect registered deals
    #[command(subcommand)]
    Deals(DealCommands),

    /// Query the CID catalog
    #[command(subcommand)]
    Cids(CidCommands),

    /// Manage generated archives
    #[command(subcommand)]
    Archives(ArchiveCommands),

    /// Advance every open deal
    Sweep(SweepCommand),

    /// Serve archives and deal status over HTTP
    Serve(ServeCommand),

    /// Manage configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

impl Subcommand {
    /// Commands that keep running and log like a service.
    pub fn is_long_running(&self) -> bool {
        match self {
            Self::Serve(_) => true,
            Self::Sweep(cmd) => cmd.watch,
            _ => false,
        }
    }

    pub async fn run(self, ctx: Context) -> anyhow::Result<()> {
        match self {
            Self::Pack(cmd) => cmd.run(ctx).await,
            Self::Propose(cmd) => cmd.run(ctx).await,
            Self::Submit(cmd) => cmd.run(ctx).await,
            Self::Status(cmd) => cmd.run(ctx).await,
            Self::Deals(cmd) => cmd.run(ctx).await,
            Self::Cids(cmd) => cmd.run(ctx).await,
            Self::Archives(cmd) => cmd.run(ctx).await,
            Self::Sweep(cmd) => cmd.run(ctx).await,
            Self::Serve(cmd) => cmd.run(ctx).await,
            Self::Config(cmd) => cmd.run(&ctx.config, &mut std::io::stdout()),
        }
    }
}

/// Prints `obj` as pretty JSON on stdout.
pub(super) fn print_json<T: Serialize>(obj: &T) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, obj)?;
    writeln!(stdout)?;
    Ok(())
}
