// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::cli_shared::cli::LogConfig;
use std::io::IsTerminal as _;
use tracing_subscriber::{EnvFilter, Registry, prelude::*};

const LOG_FILE_NAME: &str = "filstore.log";

type BoxedLayer = Box<dyn tracing_subscriber::layer::Layer<Registry> + Send + Sync>;

/// Console logging on stderr, plus hourly rotated files under
/// [`LogConfig::log_dir`] when configured.
pub fn setup_logger(config: &LogConfig) {
    let ansi = std::io::stderr().is_terminal();
    let console: BoxedLayer = if config.json {
        Box::new(
            tracing_subscriber::fmt::Layer::new()
                .json()
                .with_writer(std::io::stderr)
                .with_filter(get_env_filter(default_env_filter())),
        )
    } else {
        Box::new(
            tracing_subscriber::fmt::Layer::new()
                .with_ansi(ansi)
                .with_writer(std::io::stderr)
                .with_filter(get_env_filter(default_env_filter())),
        )
    };
    let mut layers = vec![console];

    if let Some(log_dir) = &config.log_dir {
        let file_appender = tracing_appender::rolling::hourly(log_dir, LOG_FILE_NAME);
        layers.push(Box::new(
            tracing_subscriber::fmt::Layer::new()
                .with_ansi(false)
                .with_writer(file_appender)
                .with_filter(get_env_filter(default_env_filter())),
        ));
    }

    tracing_subscriber::registry().with(layers).init();
}

// Log warnings to stderr
pub fn setup_minimal_logger() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::Layer::new()
                .with_ansi(std::io::stderr().is_terminal())
                .with_writer(std::io::stderr)
                .with_filter(get_env_filter(default_tool_filter())),
        )
        .init();
}

/// Returns an [`EnvFilter`] according to the `RUST_LOG` environment variable, or a default
/// - see [`default_env_filter`] and [`default_tool_filter`]
///
/// Note that [`tracing_subscriber::filter::Builder`] only allows a single default directive,
/// whereas we want to provide multiple.
fn get_env_filter(def: EnvFilter) -> EnvFilter {
    use std::env::{
        self,
        VarError::{NotPresent, NotUnicode},
    };
    match env::var(tracing_subscriber::EnvFilter::DEFAULT_ENV) {
        Ok(s) => EnvFilter::new(s),
        Err(NotPresent) => def,
        Err(NotUnicode(_)) => EnvFilter::default(),
    }
}

fn filter_from(directives: &[&str]) -> EnvFilter {
    EnvFilter::try_new(directives.join(",")).unwrap_or_default()
}

fn default_env_filter() -> EnvFilter {
    filter_from(&[
        "info",
        "sqlx=warn",
        "hyper=warn",
        "axum=warn",
        "reqwest=warn",
    ])
}

fn default_tool_filter() -> EnvFilter {
    filter_from(&[
        "warn",
        "filstore::pipeline=info",
        "filstore::deal=info",
    ])
}

#[test]
fn test_default_env_filter() {
    let _did_not_panic = default_env_filter();
    let _did_not_panic = default_tool_filter();
}
