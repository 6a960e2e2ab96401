// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! End-to-end flow: pack a source, publish the archive, catalog its CIDs, and
//! register a deal proposal for it.

use crate::car::{ArchiveRecord, CarArchiveBuilder, CarStore};
use crate::catalog::CidCatalog;
use crate::deal::{
    DealProposalBuilder, DealRecord, DealRegistry, NewDeal, ProposalOptions, UnsignedDealProposal,
};
use crate::error::{Error, Result};
use cid::Cid;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// A registered deal proposal together with the archive it covers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedDeal {
    pub archive: ArchiveRecord,
    pub proposal: UnsignedDealProposal,
    pub deal: DealRecord,
    /// Hex payload to hand to a wallet for signing.
    pub signing_payload: String,
}

#[derive(Clone)]
pub struct Pipeline {
    builder: CarArchiveBuilder,
    store: CarStore,
    catalog: Arc<dyn CidCatalog>,
    proposals: DealProposalBuilder,
    registry: Arc<dyn DealRegistry>,
}

impl Pipeline {
    pub fn new(
        builder: CarArchiveBuilder,
        store: CarStore,
        catalog: Arc<dyn CidCatalog>,
        proposals: DealProposalBuilder,
        registry: Arc<dyn DealRegistry>,
    ) -> Self {
        Self {
            builder,
            store,
            catalog,
            proposals,
            registry,
        }
    }

    pub fn store(&self) -> &CarStore {
        &self.store
    }

    /// Packs `source`, persists the archive and indexes every CID in it.
    pub async fn pack(&self, source: &Path, wrap_in_directory: bool) -> Result<ArchiveRecord> {
        let packed = self.builder.build(source, wrap_in_directory).await?;
        let stored = self.store.persist(&packed.root, &packed.bytes).await?;
        let original_file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.display().to_string());
        let archive = ArchiveRecord::new(&packed, stored, original_file_name);

        // an archive that was packed before keeps its original record
        let archive = self.catalog.index_packed(&archive, &packed.entries).await?;
        info!(
            root = %archive.root_cid,
            piece = %archive.piece_cid,
            url = %archive.download_url,
            entries = packed.entries.len(),
            "archive ready"
        );
        Ok(archive)
    }

    /// Proposes a deal for an archive that is already in the catalog. Nothing
    /// is registered if the proposal cannot be built.
    pub async fn propose(
        &self,
        root: &Cid,
        client_address: &str,
        options: &ProposalOptions,
    ) -> Result<ProposedDeal> {
        let archive = self.catalog.archive(root).await?;
        self.propose_archive(archive, client_address, options).await
    }

    pub async fn pack_and_propose(
        &self,
        source: &Path,
        wrap_in_directory: bool,
        client_address: &str,
        options: &ProposalOptions,
    ) -> Result<ProposedDeal> {
        let archive = self.pack(source, wrap_in_directory).await?;
        self.propose_archive(archive, client_address, options).await
    }

    async fn propose_archive(
        &self,
        archive: ArchiveRecord,
        client_address: &str,
        options: &ProposalOptions,
    ) -> Result<ProposedDeal> {
        if !tokio::fs::try_exists(self.store.path_for(&archive.root_cid)).await? {
            return Err(Error::not_found("archive file", &archive.archive_file_name));
        }
        let proposal = self
            .proposals
            .propose(&archive, client_address, options)
            .await?;
        let deal = self.registry.create(NewDeal::from(&proposal)).await?;
        info!(deal_id = %deal.deal_id, root = %archive.root_cid, "registered deal proposal");
        Ok(ProposedDeal {
            signing_payload: proposal.encode_for_signing()?,
            archive,
            proposal,
            deal,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCidCatalog;
    use crate::deal::proposal::DealSettings;
    use crate::deal::{DealFilter, DealState, MemoryDealRegistry};
    use crate::rpc_client::ChainHead;
    use crate::test_utils::{FailingChainHead, StaticChainHead};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        source: std::path::PathBuf,
        pipeline: Pipeline,
        catalog: Arc<MemoryCidCatalog>,
        registry: Arc<MemoryDealRegistry>,
    }

    fn fixture(chain: Arc<dyn ChainHead>) -> Fixture {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("hello.txt");
        std::fs::write(&source, b"0123456789").unwrap();
        let store = CarStore::new(
            dir.path().join("car"),
            "http://localhost:3001".parse().unwrap(),
            "car",
        )
        .unwrap();
        let catalog = Arc::new(MemoryCidCatalog::new());
        let registry = Arc::new(MemoryDealRegistry::new());
        let pipeline = Pipeline::new(
            CarArchiveBuilder::default(),
            store,
            catalog.clone(),
            DealProposalBuilder::new(chain, DealSettings::default()).unwrap(),
            registry.clone(),
        );
        Fixture {
            _dir: dir,
            source,
            pipeline,
            catalog,
            registry,
        }
    }

    #[tokio::test]
    async fn ten_byte_file_end_to_end() {
        let f = fixture(Arc::new(StaticChainHead::new(1000)));
        let proposed = f
            .pipeline
            .pack_and_propose(&f.source, false, "t1abcdefg", &ProposalOptions::default())
            .await
            .unwrap();

        let archive = &proposed.archive;
        assert_eq!(archive.original_size_bytes, 10);
        assert_eq!(archive.piece_size_bytes.get(), 256);
        assert!(archive.archive_path.exists());
        assert_eq!(archive.original_file_name, "hello.txt");
        assert_eq!(
            archive.download_url.as_str(),
            format!("http://localhost:3001/car/{}.car", archive.root_cid)
        );
        assert_eq!(proposed.proposal.start_epoch, 3880);
        assert_eq!(proposed.proposal.end_epoch, 1_052_200);
        assert_eq!(proposed.deal.status, DealState::Proposed);
        assert!(proposed.signing_payload.starts_with("0x"));

        let stats = f.catalog.statistics().await.unwrap();
        assert_eq!(stats.total_archives, 1);
        let info = f.catalog.lookup(&archive.root_cid).await.unwrap();
        assert_eq!(info.archive.as_ref(), Some(archive));
        assert_eq!(
            f.registry.get(&proposed.deal.deal_id).await.unwrap(),
            proposed.deal
        );
    }

    #[tokio::test]
    async fn repacking_keeps_one_archive() {
        let f = fixture(Arc::new(StaticChainHead::new(1000)));
        let first = f.pipeline.pack(&f.source, true).await.unwrap();
        let second = f.pipeline.pack(&f.source, true).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(f.catalog.statistics().await.unwrap().total_archives, 1);
    }

    #[tokio::test]
    async fn chain_failure_registers_nothing() {
        let f = fixture(Arc::new(FailingChainHead));
        let err = f
            .pipeline
            .pack_and_propose(&f.source, true, "t1abcdefg", &ProposalOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ChainUnavailable(_)));
        assert!(f.registry.list(&DealFilter::default()).await.unwrap().is_empty());
        // the archive itself is kept and can be proposed later
        assert_eq!(f.catalog.statistics().await.unwrap().total_archives, 1);
    }

    #[tokio::test]
    async fn propose_unknown_archive() {
        let f = fixture(Arc::new(StaticChainHead::new(1000)));
        let err = f
            .pipeline
            .propose(&crate::piece::piece_cid_for(b"x"), "t1abc", &ProposalOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
