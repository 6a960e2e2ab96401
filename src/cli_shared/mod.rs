// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub mod cli;
pub mod logger;

use crate::cli_shared::cli::Config;
use crate::utils::io::read_toml_file;
use std::path::{Path, PathBuf};

/// Environment variable pointing at the configuration file.
pub const FILSTORE_CONFIG: &str = "FILSTORE_CONFIG";

/// Where the configuration file came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigPath {
    Cli(PathBuf),
    Env(PathBuf),
}

impl ConfigPath {
    pub fn to_path_buf(&self) -> &PathBuf {
        match self {
            ConfigPath::Cli(path) | ConfigPath::Env(path) => path,
        }
    }
}

/// A command line path wins over [`FILSTORE_CONFIG`].
pub fn find_config_path(config_path_opt: Option<&Path>) -> Option<ConfigPath> {
    if let Some(path) = config_path_opt {
        return Some(ConfigPath::Cli(path.to_path_buf()));
    }
    std::env::var_os(FILSTORE_CONFIG)
        .filter(|path| !path.is_empty())
        .map(|path| ConfigPath::Env(PathBuf::from(path)))
}

pub fn read_config(config_path_opt: Option<&Path>) -> anyhow::Result<(Option<ConfigPath>, Config)> {
    let (path, config) = match find_config_path(config_path_opt) {
        Some(path) => {
            let config = read_toml_file(path.to_path_buf())?;
            (Some(path), config)
        }
        None => (None, Config::default()),
    };
    config.validate()?;
    Ok((path, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_config_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut default_config = Config::default();
        default_config.server.mount = "archives".into();
        std::fs::write(&path, toml::to_string(&default_config).unwrap()).unwrap();

        let (config_path, config) = read_config(Some(path.as_path())).unwrap();

        assert_eq!(config_path.unwrap(), ConfigPath::Cli(path));
        assert_eq!(config, default_config);
    }

    #[test]
    fn invalid_settings_are_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[tracker]\nsweep_interval = 0\n").unwrap();
        let err = read_config(Some(path.as_path())).unwrap_err();
        assert!(err.to_string().contains("sweep_interval"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_config(Some(dir.path().join("nope.toml").as_path())).is_err());
    }
}
