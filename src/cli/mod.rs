// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod context;
pub mod main;
pub mod subcommands;

pub use context::Context;
