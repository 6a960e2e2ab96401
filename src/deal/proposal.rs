// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::{AttoFil, DealArchive};
use crate::car::ArchiveRecord;
use crate::error::{Error, Result};
use crate::piece::PaddedPieceSize;
use crate::rpc_client::{ChainEpoch, ChainHead, DEFAULT_TIMEOUT};
use cid::Cid;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, DurationSeconds, serde_as};
use smart_default::SmartDefault;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Storage provider used when the caller names none.
pub const DEFAULT_PROVIDER: &str = "t017840";
/// One day of epochs.
pub const DEFAULT_START_DELAY_EPOCHS: ChainEpoch = 2880;
/// One year of epochs.
pub const DEFAULT_DURATION_EPOCHS: ChainEpoch = 1_051_200;
pub const LABEL_PREFIX: &str = "filstore-";

const GIB: u64 = 1 << 30;

/// How the per-epoch storage price of a deal is computed.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PricingPolicy {
    #[default]
    Free,
    /// `atto_fil` per started GiB of padded piece size, per epoch.
    PerGibEpoch {
        #[serde_as(as = "DisplayFromStr")]
        atto_fil: AttoFil,
    },
}

impl PricingPolicy {
    pub fn price_per_epoch(&self, piece_size: PaddedPieceSize) -> AttoFil {
        match *self {
            Self::Free => 0,
            Self::PerGibEpoch { atto_fil } => {
                let gibs = piece_size.get().div_ceil(GIB);
                atto_fil.saturating_mul(gibs.into())
            }
        }
    }
}

/// Deal parameters shared by every proposal.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, SmartDefault, Serialize, Deserialize)]
#[serde(default)]
pub struct DealSettings {
    #[default(DEFAULT_PROVIDER.into())]
    pub provider_id: String,
    #[default(DEFAULT_START_DELAY_EPOCHS)]
    pub start_delay_epochs: ChainEpoch,
    #[default(DEFAULT_DURATION_EPOCHS)]
    pub duration_epochs: ChainEpoch,
    pub pricing: PricingPolicy,
    #[default(DEFAULT_TIMEOUT)]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub rpc_timeout: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProposalOptions {
    pub verified: bool,
    /// Overrides [`DealSettings::provider_id`].
    pub provider_id: Option<String>,
}

/// An unsigned storage deal proposal in Lotus JSON form, ready to be signed
/// by an external wallet.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UnsignedDealProposal {
    #[serde(rename = "PieceCID", with = "lotus_cid")]
    pub piece_cid: Cid,
    pub piece_size: PaddedPieceSize,
    pub archive_size: u64,
    #[serde(rename = "RootCID", with = "lotus_cid")]
    pub root_cid: Cid,
    pub client: String,
    pub provider: String,
    pub label: String,
    pub start_epoch: ChainEpoch,
    pub end_epoch: ChainEpoch,
    #[serde_as(as = "DisplayFromStr")]
    pub storage_price_per_epoch: AttoFil,
    pub verified_deal: bool,
    #[serde(rename = "DownloadURL")]
    pub download_url: Url,
    #[serde_as(as = "DisplayFromStr")]
    pub provider_collateral: AttoFil,
    #[serde_as(as = "DisplayFromStr")]
    pub client_collateral: AttoFil,
}

impl UnsignedDealProposal {
    pub fn archive(&self) -> DealArchive {
        DealArchive {
            root_cid: self.root_cid,
            piece_cid: self.piece_cid,
            piece_size: self.piece_size,
            archive_size: self.archive_size,
            download_url: self.download_url.clone(),
        }
    }

    /// The canonical JSON bytes of the proposal as `0x`-prefixed hex.
    pub fn encode_for_signing(&self) -> Result<String> {
        Ok(format!("0x{}", hex::encode(serde_json::to_vec(self)?)))
    }
}

/// Cids as `{"/": "<cid>"}`, the way Lotus writes them.
mod lotus_cid {
    use cid::Cid;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_with::{DisplayFromStr, serde_as};

    #[serde_as]
    #[derive(Serialize, Deserialize)]
    struct CidJson {
        #[serde(rename = "/")]
        #[serde_as(as = "DisplayFromStr")]
        cid: Cid,
    }

    pub fn serialize<S: Serializer>(cid: &Cid, serializer: S) -> Result<S::Ok, S::Error> {
        CidJson { cid: *cid }.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Cid, D::Error> {
        Ok(CidJson::deserialize(deserializer)?.cid)
    }
}

/// Turns archives into unsigned deal proposals anchored at the current chain
/// height.
#[derive(Clone)]
pub struct DealProposalBuilder {
    chain: Arc<dyn ChainHead>,
    settings: DealSettings,
}

impl DealProposalBuilder {
    pub fn new(chain: Arc<dyn ChainHead>, settings: DealSettings) -> Result<Self> {
        if settings.start_delay_epochs <= 0 {
            return Err(Error::validation(format!(
                "start delay must be positive, got {}",
                settings.start_delay_epochs
            )));
        }
        if settings.duration_epochs <= settings.start_delay_epochs {
            return Err(Error::validation(format!(
                "deal duration ({} epochs) must exceed the start delay ({} epochs)",
                settings.duration_epochs, settings.start_delay_epochs
            )));
        }
        validate_provider_id(&settings.provider_id)?;
        Ok(Self { chain, settings })
    }

    pub fn settings(&self) -> &DealSettings {
        &self.settings
    }

    /// Builds an unsigned proposal for `archive`.
    ///
    /// Inputs are validated before the chain is contacted. The chain head read
    /// is bounded by [`DealSettings::rpc_timeout`] and is not retried.
    pub async fn propose(
        &self,
        archive: &ArchiveRecord,
        client_address: &str,
        options: &ProposalOptions,
    ) -> Result<UnsignedDealProposal> {
        validate_client_address(client_address)?;
        let provider = options
            .provider_id
            .as_deref()
            .unwrap_or(&self.settings.provider_id);
        validate_provider_id(provider)?;
        validate_archive(archive)?;

        let height = self.chain_height().await?;
        let (start_epoch, end_epoch) = height
            .checked_add(self.settings.start_delay_epochs)
            .zip(height.checked_add(self.settings.duration_epochs))
            .ok_or_else(|| {
                Error::ChainUnavailable(format!("chain height {height} is out of range"))
            })?;
        let piece_size = archive.piece_size_bytes;
        let proposal = UnsignedDealProposal {
            piece_cid: archive.piece_cid,
            piece_size,
            archive_size: archive.archive_size_bytes,
            root_cid: archive.root_cid,
            client: client_address.into(),
            provider: provider.into(),
            label: format!("{LABEL_PREFIX}{}", archive.root_cid),
            start_epoch,
            end_epoch,
            storage_price_per_epoch: self.settings.pricing.price_per_epoch(piece_size),
            verified_deal: options.verified,
            download_url: archive.download_url.clone(),
            provider_collateral: 0,
            client_collateral: 0,
        };
        info!(
            root = %archive.root_cid,
            provider,
            start_epoch = proposal.start_epoch,
            end_epoch = proposal.end_epoch,
            "created deal proposal"
        );
        Ok(proposal)
    }

    async fn chain_height(&self) -> Result<ChainEpoch> {
        let timeout = self.settings.rpc_timeout;
        let height = tokio::time::timeout(timeout, self.chain.chain_head_height())
            .await
            .map_err(|_| {
                Error::ChainUnavailable(format!(
                    "chain head not reported within {}",
                    humantime::format_duration(timeout)
                ))
            })??;
        debug!("proposing at chain height {height}");
        Ok(height)
    }
}

/// Filecoin addresses (`f`/`t`, protocol 0-4) or 20-byte `0x` addresses.
pub fn validate_client_address(address: &str) -> Result<()> {
    if lazy_regex::regex_is_match!(r"^[tf][0-4][a-zA-Z0-9]+$", address)
        || lazy_regex::regex_is_match!(r"^0x[0-9a-fA-F]{40}$", address)
    {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "invalid client address: {address:?}"
        )))
    }
}

pub fn validate_provider_id(provider: &str) -> Result<()> {
    if lazy_regex::regex_is_match!(r"^[tf]0[0-9]+$", provider) {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "invalid storage provider ID: {provider:?}"
        )))
    }
}

fn validate_archive(archive: &ArchiveRecord) -> Result<()> {
    let size = archive.archive_size_bytes;
    if size == 0 {
        return Err(Error::validation("archive is empty"));
    }
    let piece_size = archive.piece_size_bytes;
    if !piece_size.get().is_power_of_two() || !piece_size.fits(size) {
        return Err(Error::validation(format!(
            "piece size {piece_size} cannot hold an archive of {size} bytes"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::car::{DagPacker, Packer as _, StoredArchive};
    use crate::test_utils::{FailingChainHead, StalledChainHead, StaticChainHead};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tempfile::TempDir;

    fn archive(content: &[u8]) -> ArchiveRecord {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("hello.txt");
        std::fs::write(&file, content).unwrap();
        let packed = DagPacker::default().pack(&file, true).unwrap();
        let file_name = format!("{}.car", packed.root);
        let stored = StoredArchive {
            archive_path: dir.path().join(&file_name),
            download_url: format!("http://localhost:3001/car/{file_name}")
                .parse()
                .unwrap(),
            file_name,
        };
        ArchiveRecord::new(&packed, stored, "hello.txt")
    }

    fn builder(height: ChainEpoch) -> DealProposalBuilder {
        DealProposalBuilder::new(Arc::new(StaticChainHead::new(height)), DealSettings::default())
            .unwrap()
    }

    #[tokio::test]
    async fn proposal_epochs_follow_chain_height() {
        let archive = archive(b"0123456789");
        let proposal = builder(1000)
            .propose(&archive, "t1abcdefghijk", &ProposalOptions::default())
            .await
            .unwrap();
        assert_eq!(proposal.start_epoch, 3880);
        assert_eq!(proposal.end_epoch, 1_052_200);
        assert_eq!(proposal.provider, DEFAULT_PROVIDER);
        assert_eq!(proposal.label, format!("filstore-{}", archive.root_cid));
        assert_eq!(proposal.storage_price_per_epoch, 0);
        assert!(proposal.piece_size.fits(archive.archive_size_bytes));
        assert_eq!(proposal.download_url, archive.download_url);
    }

    #[tokio::test]
    async fn each_proposal_reads_a_fresh_head() {
        let archive = archive(b"0123456789");
        let chain = Arc::new(StaticChainHead::new(1000));
        let builder = DealProposalBuilder::new(chain.clone(), DealSettings::default()).unwrap();
        let first = builder
            .propose(&archive, "t1abcdefghijk", &ProposalOptions::default())
            .await
            .unwrap();
        chain.set(5000);
        let second = builder
            .propose(&archive, "t1abcdefghijk", &ProposalOptions::default())
            .await
            .unwrap();
        assert_eq!(first.start_epoch, 3880);
        assert_eq!(second.start_epoch, 7880);
    }

    #[tokio::test]
    async fn proposal_json_is_lotus_shaped() {
        let archive = archive(b"0123456789");
        let options = ProposalOptions {
            verified: true,
            provider_id: Some("f01234".into()),
        };
        let proposal = builder(10)
            .propose(&archive, "f3abc", &options)
            .await
            .unwrap();
        let json = serde_json::to_value(&proposal).unwrap();
        assert_eq!(json["PieceCID"]["/"], archive.piece_cid.to_string());
        assert_eq!(json["Provider"], "f01234");
        assert_eq!(json["VerifiedDeal"], true);
        assert_eq!(json["StoragePricePerEpoch"], "0");
        assert_eq!(json["ClientCollateral"], "0");
        assert_eq!(json["DownloadURL"], archive.download_url.as_str());
        let back: UnsignedDealProposal = serde_json::from_value(json).unwrap();
        assert_eq!(back, proposal);

        let encoded = proposal.encode_for_signing().unwrap();
        let bytes = hex::decode(encoded.strip_prefix("0x").unwrap()).unwrap();
        assert_eq!(bytes, serde_json::to_vec(&proposal).unwrap());
    }

    #[rstest]
    #[case("t1abc", true)]
    #[case("f410fabc", true)]
    #[case("0x52908400098527886E0F7030069857D2E4169EE7", true)]
    #[case("t5abc", false)]
    #[case("x1abc", false)]
    #[case("0x1234", false)]
    #[case("", false)]
    fn client_addresses(#[case] address: &str, #[case] valid: bool) {
        assert_eq!(validate_client_address(address).is_ok(), valid);
    }

    #[rstest]
    #[case("t017840", true)]
    #[case("f01000", true)]
    #[case("t1abc", false)]
    #[case("t0", false)]
    fn provider_ids(#[case] provider: &str, #[case] valid: bool) {
        assert_eq!(validate_provider_id(provider).is_ok(), valid);
    }

    #[tokio::test]
    async fn validation_happens_before_chain_access() {
        let builder = DealProposalBuilder::new(Arc::new(StalledChainHead), DealSettings::default())
            .unwrap();
        let err = builder
            .propose(&archive(b"data"), "not-an-address", &ProposalOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "{err}");
    }

    #[tokio::test]
    async fn empty_or_undersized_archives_are_rejected() {
        let mut record = archive(b"data");
        record.archive_size_bytes = 0;
        let err = builder(1)
            .propose(&record, "t1abc", &ProposalOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let mut record = archive(b"data");
        record.archive_size_bytes = record.piece_size_bytes.get() + 1;
        let err = builder(1)
            .propose(&record, "t1abc", &ProposalOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn stalled_chain_times_out() {
        let settings = DealSettings {
            rpc_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let builder = DealProposalBuilder::new(Arc::new(StalledChainHead), settings).unwrap();
        let err = builder
            .propose(&archive(b"data"), "t1abc", &ProposalOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ChainUnavailable(_)), "{err}");
    }

    #[tokio::test]
    async fn chain_errors_are_propagated() {
        let builder = DealProposalBuilder::new(Arc::new(FailingChainHead), DealSettings::default())
            .unwrap();
        let err = builder
            .propose(&archive(b"data"), "t1abc", &ProposalOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ChainUnavailable(_)));
    }

    #[tokio::test]
    async fn out_of_range_height_is_chain_unavailable() {
        let err = builder(ChainEpoch::MAX - 10)
            .propose(&archive(b"data"), "t1abc", &ProposalOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ChainUnavailable(_)), "{err}");
    }

    #[tokio::test]
    async fn start_is_always_after_the_head() {
        let settings = DealSettings {
            start_delay_epochs: 1,
            ..Default::default()
        };
        let builder = DealProposalBuilder::new(Arc::new(StaticChainHead::new(1000)), settings)
            .unwrap();
        let proposal = builder
            .propose(&archive(b"data"), "t1abc", &ProposalOptions::default())
            .await
            .unwrap();
        assert_eq!(proposal.start_epoch, 1001);
    }

    #[test]
    fn settings_are_checked() {
        let chain = Arc::new(StaticChainHead::new(0));
        let settings = DealSettings {
            duration_epochs: 100,
            start_delay_epochs: 100,
            ..Default::default()
        };
        assert!(DealProposalBuilder::new(chain.clone(), settings).is_err());
        for start_delay_epochs in [0, -1] {
            let settings = DealSettings {
                start_delay_epochs,
                ..Default::default()
            };
            assert!(DealProposalBuilder::new(chain.clone(), settings).is_err());
        }
        let settings = DealSettings {
            provider_id: "t1abc".into(),
            ..Default::default()
        };
        assert!(DealProposalBuilder::new(chain, settings).is_err());
    }

    #[rstest]
    #[case(PricingPolicy::Free, 1 << 35, 0)]
    #[case(PricingPolicy::PerGibEpoch { atto_fil: 10 }, 256, 10)]
    #[case(PricingPolicy::PerGibEpoch { atto_fil: 10 }, 1 << 30, 10)]
    #[case(PricingPolicy::PerGibEpoch { atto_fil: 10 }, 1 << 31, 20)]
    fn pricing(#[case] policy: PricingPolicy, #[case] size: u64, #[case] expected: AttoFil) {
        let piece_size = PaddedPieceSize::new(size).unwrap();
        assert_eq!(policy.price_per_epoch(piece_size), expected);
    }

    #[test]
    fn pricing_from_toml() {
        let settings: DealSettings = toml::from_str(
            r#"
            provider_id = "t01000"
            rpc_timeout = 3

            [pricing]
            kind = "per_gib_epoch"
            atto_fil = "500000000"
            "#,
        )
        .unwrap();
        assert_eq!(settings.rpc_timeout, Duration::from_secs(3));
        assert_eq!(
            settings.pricing,
            PricingPolicy::PerGibEpoch {
                atto_fil: 500_000_000
            }
        );
        assert_eq!(settings.duration_epochs, DEFAULT_DURATION_EPOCHS);
    }
}
