// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Packs files into CAR archives, publishes them for storage providers, and
//! tracks the Filecoin storage deals proposed for them.

pub mod car;
pub mod catalog;
mod cli;
mod cli_shared;
pub mod deal;
pub mod error;
pub mod piece;
pub mod pipeline;
pub mod rpc_client;
pub mod server;
#[cfg(test)]
mod test_utils;
mod utils;

/// These items are semver-exempt, and exist for filstore author use only
// Doctests need a public path to helpers that are otherwise internal.
#[doc(hidden)]
pub mod doctest_private {
    pub use crate::utils::io::read_toml;
}

pub use cli::main::main as filstore_main;
pub use cli_shared::cli::Config;
pub use error::{Error, Result};
