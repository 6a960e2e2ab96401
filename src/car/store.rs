// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::error::{Error, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use cid::Cid;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr as _;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use url::Url;

const ARCHIVE_EXTENSION: &str = "car";
const TEMP_EXTENSION: &str = "tmp";

/// Where an archive ended up and how providers can fetch it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArchive {
    pub archive_path: PathBuf,
    pub file_name: String,
    pub download_url: Url,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub cleaned_files: usize,
    pub freed_bytes: u64,
    pub cutoff: DateTime<Utc>,
}

/// Content-addressed archive directory. Every archive lives at
/// `<car_dir>/<root>.car` and is published under `<public_url>/<mount>/`.
#[derive(Debug, Clone)]
pub struct CarStore {
    car_dir: PathBuf,
    public_url: Url,
    mount: Vec<String>,
}

impl CarStore {
    pub fn new(car_dir: impl Into<PathBuf>, public_url: Url, mount: &str) -> Result<Self> {
        if public_url.cannot_be_a_base() {
            return Err(Error::validation(format!(
                "public URL {public_url} cannot carry a path"
            )));
        }
        Ok(Self {
            car_dir: car_dir.into(),
            public_url,
            mount: mount
                .split('/')
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        })
    }

    pub fn car_dir(&self) -> &Path {
        &self.car_dir
    }

    /// The mount point, without leading or trailing slashes.
    pub fn mount(&self) -> String {
        self.mount.join("/")
    }

    pub fn file_name(root: &Cid) -> String {
        format!("{root}.{ARCHIVE_EXTENSION}")
    }

    pub fn path_for(&self, root: &Cid) -> PathBuf {
        self.car_dir.join(Self::file_name(root))
    }

    pub fn download_url(&self, file_name: &str) -> Url {
        let mut url = self.public_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(&self.mount)
                .push(file_name);
        }
        url
    }

    /// Writes `bytes` under the archive name derived from `root`.
    ///
    /// The bytes land in a temporary sibling first and are renamed into place,
    /// so readers never observe a partial archive. Persisting the same root
    /// again rewrites identical content.
    pub async fn persist(&self, root: &Cid, bytes: &[u8]) -> Result<StoredArchive> {
        tokio::fs::create_dir_all(&self.car_dir).await?;
        let file_name = Self::file_name(root);
        let archive_path = self.car_dir.join(&file_name);
        let temp_path = self.car_dir.join(format!(
            ".{file_name}.{}.{TEMP_EXTENSION}",
            uuid::Uuid::new_v4().simple()
        ));

        if let Err(e) = write_then_rename(&temp_path, &archive_path, bytes).await {
            if let Err(cleanup) = tokio::fs::remove_file(&temp_path).await
                && cleanup.kind() != ErrorKind::NotFound
            {
                warn!(
                    "failed to remove temporary archive {}: {cleanup}",
                    temp_path.display()
                );
            }
            return Err(e.into());
        }

        debug!(path = %archive_path.display(), bytes = bytes.len(), "persisted archive");
        Ok(StoredArchive {
            download_url: self.download_url(&file_name),
            archive_path,
            file_name,
        })
    }

    pub async fn open(&self, root: &Cid) -> Result<Bytes> {
        self.read_file(&Self::file_name(root)).await
    }

    /// Reads an archive by file name. Only names of the form `<cid>.car` are
    /// accepted, which keeps lookups inside the archive directory.
    pub async fn read_file(&self, file_name: &str) -> Result<Bytes> {
        let root = file_name
            .strip_suffix(&format!(".{ARCHIVE_EXTENSION}"))
            .and_then(|stem| Cid::from_str(stem).ok())
            .ok_or_else(|| Error::not_found("archive", file_name))?;
        match tokio::fs::read(self.path_for(&root)).await {
            Ok(bytes) => Ok(bytes.into()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::not_found("archive", file_name)),
            Err(e) => Err(e.into()),
        }
    }

    /// Removes archives and stale temporary files last modified more than
    /// `older_than` ago.
    pub async fn cleanup(&self, older_than: Duration) -> Result<CleanupReport> {
        let cutoff = SystemTime::now()
            .checked_sub(older_than)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut report = CleanupReport {
            cleaned_files: 0,
            freed_bytes: 0,
            cutoff: cutoff.into(),
        };
        let mut dir = match tokio::fs::read_dir(&self.car_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            let managed = matches!(
                path.extension().and_then(|ext| ext.to_str()),
                Some(ARCHIVE_EXTENSION | TEMP_EXTENSION)
            );
            let metadata = entry.metadata().await?;
            if !managed || !metadata.is_file() || metadata.modified()? > cutoff {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    report.cleaned_files += 1;
                    report.freed_bytes += metadata.len();
                    info!("cleaned up archive {}", path.display());
                }
                Err(e) => warn!("failed to clean up {}: {e}", path.display()),
            }
        }
        Ok(report)
    }
}

async fn write_then_rename(temp: &Path, dest: &Path, bytes: &[u8]) -> std::io::Result<()> {
    tokio::fs::write(temp, bytes).await?;
    tokio::fs::rename(temp, dest).await
}
