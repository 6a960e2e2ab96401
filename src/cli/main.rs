// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::ffi::OsString;

use crate::cli::Context;
use crate::cli::subcommands::{Cli, Subcommand};
use crate::cli_shared::{logger, read_config};
use clap::Parser;
use tracing::debug;

pub fn main<ArgT>(args: impl IntoIterator<Item = ArgT>) -> anyhow::Result<()>
where
    ArgT: Into<OsString> + Clone,
{
    // Capture Cli inputs
    let Cli { config, cmd } = Cli::parse_from(args);
    let (config_path, config) = read_config(config.as_deref())?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async {
            if cmd.is_long_running() {
                logger::setup_logger(&config.log);
            } else {
                logger::setup_minimal_logger();
            }
            if let Some(path) = &config_path {
                debug!("using configuration from {}", path.to_path_buf().display());
            }
            // Run command
            match cmd {
                Subcommand::Config(cmd) => cmd.run(&config, &mut std::io::stdout()),
                cmd => cmd.run(Context::new(config).await?).await,
            }
        })
}
