// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::pack::{DagPacker, PackedArchive, Packer};
use crate::error::{Error, Result};
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Builds archives from files or directories on disk. Reads only; persisting
/// the result is [`super::CarStore`]'s job.
#[derive(Clone)]
pub struct CarArchiveBuilder {
    packer: Arc<dyn Packer>,
}

impl Default for CarArchiveBuilder {
    fn default() -> Self {
        Self::new(Arc::new(DagPacker::default()))
    }
}

impl CarArchiveBuilder {
    pub fn new(packer: Arc<dyn Packer>) -> Self {
        Self { packer }
    }

    /// Packs `source` into an archive.
    ///
    /// A single file is always wrapped in a directory so that every root CID
    /// refers to a directory node, whatever the input kind.
    pub async fn build(&self, source: &Path, wrap_in_directory: bool) -> Result<PackedArchive> {
        let metadata = tokio::fs::metadata(source).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::not_found("source path", source.display()),
            _ => Error::packing(source, e),
        })?;
        let wrap = wrap_in_directory || metadata.is_file();

        let start = Instant::now();
        let packer = self.packer.clone();
        let owned = source.to_path_buf();
        let packed = tokio::task::spawn_blocking(move || packer.pack(&owned, wrap))
            .await
            .map_err(|e| Error::packing(source, e))??;

        info!(
            source = %source.display(),
            root = %packed.root,
            archive_bytes = packed.archive_size(),
            original_bytes = packed.original_size,
            "built archive in {}",
            humantime::format_duration(start.elapsed())
        );
        Ok(packed)
    }
}
