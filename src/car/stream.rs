// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use bytes::{Buf, Bytes};
use cid::Cid;
use futures::{Stream, StreamExt, TryStreamExt};
use integer_encoding::VarInt;
use multihash_codetable::{Code, MultihashDigest as _};
use nunny::Vec as NonEmpty;
use pin_project_lite::pin_project;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncBufRead, AsyncRead, BufReader};
use tokio_util::codec::FramedRead;
use unsigned_varint::codec::UviBytes;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CarV1Header {
    // The roots array must contain one or more CIDs,
    // each of which should be present somewhere in the remainder of the CAR.
    // See <https://ipld.io/specs/transport/car/carv1/#constraints>
    pub roots: NonEmpty<Cid>,
    pub version: u64,
}

impl CarV1Header {
    pub fn new(roots: NonEmpty<Cid>) -> Self {
        Self { roots, version: 1 }
    }

    /// Writes the varint-framed DAG-CBOR header.
    pub fn write(&self, writer: &mut impl io::Write) -> io::Result<()> {
        let encoded = fvm_ipld_encoding::to_vec(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writer.write_all(&encoded.len().encode_var_vec())?;
        writer.write_all(&encoded)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CarBlock {
    pub cid: Cid,
    pub data: Vec<u8>,
}

impl CarBlock {
    // Write a varint frame containing the cid and the data
    pub fn write(&self, mut writer: &mut impl io::Write) -> io::Result<()> {
        let frame_length = self.cid.encoded_len() + self.data.len();
        writer.write_all(&frame_length.encode_var_vec())?;
        #[allow(clippy::needless_borrows_for_generic_args)]
        self.cid
            .write_bytes(&mut writer)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writer.write_all(&self.data)?;
        Ok(())
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> io::Result<CarBlock> {
        let bytes: Bytes = bytes.into();
        let mut cursor = bytes.reader();
        let cid = Cid::read_bytes(&mut cursor)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let bytes = cursor.into_inner();
        Ok(CarBlock {
            cid,
            data: bytes.to_vec(),
        })
    }

    pub fn valid(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let actual = {
            let code = Code::try_from(self.cid.hash().code())?;
            Cid::new_v1(self.cid.codec(), code.digest(&self.data))
        };
        anyhow::ensure!(
            actual == self.cid,
            "CID/Block mismatch for block {}, actual: {actual}",
            self.cid
        );
        Ok(())
    }
}

/// Serializes a complete CAR v1 archive into memory.
pub fn encode_car<'a>(
    roots: NonEmpty<Cid>,
    blocks: impl IntoIterator<Item = &'a CarBlock>,
) -> io::Result<Vec<u8>> {
    let mut out = vec![];
    CarV1Header::new(roots).write(&mut out)?;
    for block in blocks {
        block.write(&mut out)?;
    }
    Ok(out)
}

pin_project! {
    /// Stream of CAR blocks.
    pub struct CarStream<ReaderT> {
        #[pin]
        reader: FramedRead<ReaderT, UviBytes>,
        pub header: CarV1Header,
        first_block: Option<CarBlock>,
    }
}

impl<ReaderT: AsyncBufRead + Unpin> CarStream<ReaderT> {
    pub async fn new(reader: ReaderT) -> io::Result<Self> {
        let mut reader = FramedRead::new(reader, UviBytes::default());
        let header = read_v1_header(&mut reader)
            .await
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "invalid header block"))?;

        // Read the first block and check if it is valid. This check helps to
        // catch invalid CAR files as soon as we open.
        let first_block = match reader.next().await.transpose()? {
            Some(first_entry) => {
                let block = CarBlock::from_bytes(first_entry)?;
                if !block.valid() {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "invalid first block",
                    ));
                }
                Some(block)
            }
            None => None,
        };
        Ok(CarStream {
            reader,
            header,
            first_block,
        })
    }
}

impl<ReaderT: AsyncRead> Stream for CarStream<ReaderT> {
    type Item = io::Result<CarBlock>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if let Some(block) = this.first_block.take() {
            return Poll::Ready(Some(Ok(block)));
        }
        let item = futures::ready!(this.reader.poll_next(cx));
        Poll::Ready(item.map(|ret| ret.and_then(CarBlock::from_bytes)))
    }
}

async fn read_v1_header<ReaderT: AsyncRead + Unpin>(
    framed_reader: &mut FramedRead<ReaderT, UviBytes>,
) -> Option<CarV1Header> {
    let frame = framed_reader.next().await?.ok()?;
    let header = fvm_ipld_encoding::from_slice::<CarV1Header>(&frame).ok()?;
    if header.version != 1 {
        return None;
    }
    Some(header)
}

/// Outcome of [`verify_archive`].
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveSummary {
    #[serde_as(as = "Vec<DisplayFromStr>")]
    pub roots: Vec<Cid>,
    pub block_count: usize,
    pub data_bytes: u64,
}

/// Parses the archive at `path`, checking the header and that every block
/// hashes to its CID.
pub async fn verify_archive(path: &Path) -> anyhow::Result<ArchiveSummary> {
    let file = tokio::fs::File::open(path).await?;
    let mut stream = CarStream::new(BufReader::new(file)).await?;
    let roots = stream.header.roots.to_vec();
    let mut block_count = 0;
    let mut data_bytes = 0;
    while let Some(block) = stream.try_next().await? {
        block.validate()?;
        block_count += 1;
        data_bytes += block.data.len() as u64;
    }
    anyhow::ensure!(block_count > 0, "archive {} has no blocks", path.display());
    tracing::debug!(path = %path.display(), block_count, "verified archive");
    Ok(ArchiveSummary {
        roots,
        block_count,
        data_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{Arbitrary, Gen};
    use quickcheck_macros::quickcheck;

    impl Arbitrary for CarBlock {
        fn arbitrary(g: &mut Gen) -> CarBlock {
            let data = Vec::<u8>::arbitrary(g);
            let encoding = g
                .choose(&[fvm_ipld_encoding::DAG_CBOR, fvm_ipld_encoding::IPLD_RAW])
                .unwrap();
            let cid = Cid::new_v1(*encoding, Code::Sha2_256.digest(&data));
            CarBlock { cid, data }
        }
    }

    #[quickcheck]
    fn encoded_blocks_stream_back(blocks: Vec<CarBlock>) -> bool {
        let Some(first) = blocks.first() else {
            return true;
        };
        let roots = nunny::vec![first.cid];
        let bytes = encode_car(roots.clone(), &blocks).unwrap();
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        rt.block_on(async {
            let stream = CarStream::new(bytes.as_slice()).await.unwrap();
            assert_eq!(stream.header.roots, roots);
            let read: Vec<CarBlock> = stream.try_collect().await.unwrap();
            read == blocks
        })
    }

    #[tokio::test]
    async fn rejects_corrupted_first_block() {
        let data = b"payload".to_vec();
        let block = CarBlock {
            cid: Cid::new_v1(fvm_ipld_encoding::IPLD_RAW, Code::Sha2_256.digest(&data)),
            data,
        };
        let mut bytes = encode_car(nunny::vec![block.cid], [&block]).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(CarStream::new(bytes.as_slice()).await.is_err());
    }

    #[tokio::test]
    async fn rejects_garbage_header() {
        assert!(CarStream::new(&b"CAR file placeholder"[..]).await.is_err());
    }
}
