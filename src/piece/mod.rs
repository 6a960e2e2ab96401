// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Piece sizing and the simplified piece commitment attached to every archive.

use cid::Cid;
use cid::multihash::Multihash;
use multihash_codetable::{Code, MultihashDigest as _};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest piece the storage network accepts.
pub const MIN_PIECE_SIZE: u64 = 256;

/// Largest representable padded piece size.
pub const MAX_PIECE_SIZE: u64 = 1 << 63;

/// Multicodec for unsealed sector commitments.
pub const FIL_COMMITMENT_UNSEALED: u64 = 0xf101;

/// Multihash code for `sha2-256-trunc254-padded`.
pub const SHA2_256_TRUNC254_PADDED: u64 = 0x1012;

/// Size of a piece in bytes with padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaddedPieceSize(u64);

impl PaddedPieceSize {
    /// Wraps an already padded size, rejecting anything that is not a power of
    /// two of at least [`MIN_PIECE_SIZE`].
    pub fn new(size: u64) -> Option<Self> {
        (size >= MIN_PIECE_SIZE && size.is_power_of_two()).then_some(Self(size))
    }

    pub fn get(self) -> u64 {
        self.0
    }

    /// Whether `len` bytes fit in this piece.
    pub fn fits(self, len: u64) -> bool {
        len <= self.0
    }
}

impl From<PaddedPieceSize> for u64 {
    fn from(size: PaddedPieceSize) -> Self {
        size.0
    }
}

impl fmt::Display for PaddedPieceSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Returns the smallest power of two that is at least [`MIN_PIECE_SIZE`] and at
/// least `len`.
///
/// Lengths above [`MAX_PIECE_SIZE`] saturate; no file system can hold such an
/// archive.
pub fn padded_piece_size(len: u64) -> PaddedPieceSize {
    PaddedPieceSize(
        len.max(MIN_PIECE_SIZE)
            .checked_next_power_of_two()
            .unwrap_or(MAX_PIECE_SIZE),
    )
}

/// Derives the piece identifier for an archive.
///
/// This is a `sha2-256` digest of the archive bytes with the two most
/// significant bits of the last byte cleared, wrapped as an unsealed
/// commitment CID. It has the shape of a piece commitment but is not computed
/// over the padded binary merkle tree.
pub fn piece_cid_for(archive: &[u8]) -> Cid {
    let sha = Code::Sha2_256.digest(archive);
    let mut digest = [0u8; 32];
    digest.copy_from_slice(sha.digest());
    digest[31] &= 0b0011_1111;
    let mh = Multihash::<64>::wrap(SHA2_256_TRUNC254_PADDED, &digest)
        .expect("a 32-byte digest always fits in a 64-byte multihash");
    Cid::new_v1(FIL_COMMITMENT_UNSEALED, mh)
}
