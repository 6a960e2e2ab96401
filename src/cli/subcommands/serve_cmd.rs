// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::cli::Context;
use anyhow::Context as _;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, clap::Args)]
pub struct ServeCommand {
    /// Listen address, defaults to `server.listen`
    #[arg(long)]
    listen: Option<SocketAddr>,
    /// Do not advance deals in the background
    #[arg(long)]
    no_sweeper: bool,
}

impl ServeCommand {
    pub async fn run(self, ctx: Context) -> anyhow::Result<()> {
        let listen = self.listen.unwrap_or(ctx.config.server.listen);
        let listener = TcpListener::bind(listen)
            .await
            .with_context(|| format!("failed to bind {listen}"))?;
        let state = ctx.server_state();
        let cancel = CancellationToken::new();

        let sweeper = (!self.no_sweeper).then(|| {
            let tracker = state.tracker.clone();
            let interval = ctx.config.tracker.sweep_interval;
            let cancel = cancel.clone();
            tokio::spawn(async move { tracker.run_sweeper(interval, cancel).await })
        });
        let server = tokio::spawn(crate::server::serve(listener, state, cancel.clone()));

        tokio::signal::ctrl_c().await?;
        info!("shutting down");
        cancel.cancel();
        server.await??;
        if let Some(sweeper) = sweeper {
            sweeper.await?;
        }
        Ok(())
    }
}
