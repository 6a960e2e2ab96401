// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::error::{Error, Result};
use cid::multibase::Base;
use cid::{Cid, Version};
use serde::{Deserialize, Serialize};
use std::str::FromStr as _;

/// Multibase encodings a CIDv1 can be rendered in.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CidBase {
    Base32,
    Base32Upper,
    Base58Btc,
    Base36,
    Base64,
    Base64Url,
    Base16,
}

impl From<CidBase> for Base {
    fn from(base: CidBase) -> Self {
        match base {
            CidBase::Base32 => Base::Base32Lower,
            CidBase::Base32Upper => Base::Base32Upper,
            CidBase::Base58Btc => Base::Base58Btc,
            CidBase::Base36 => Base::Base36Lower,
            CidBase::Base64 => Base::Base64,
            CidBase::Base64Url => Base::Base64Url,
            CidBase::Base16 => Base::Base16Lower,
        }
    }
}

/// Outcome of checking a user supplied CID. Invalid input is reported in
/// `error` rather than failing the call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CidValidation {
    pub cid: String,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<CidDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CidValidation {
    pub fn check(text: &str) -> Self {
        match CidDetails::parse(text) {
            Ok((_, details)) => Self {
                cid: text.trim().to_owned(),
                valid: true,
                details: Some(details),
                error: None,
            },
            Err(e) => Self {
                cid: text.trim().to_owned(),
                valid: false,
                details: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// A CID re-encoded into another version and/or multibase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CidConversion {
    pub original: String,
    pub converted: String,
    pub original_version: u64,
    pub converted_version: u64,
}

/// Re-encodes `text`. Without a target version the CID keeps its own; without
/// a base, v1 CIDs use base32 and v0 CIDs base58btc. Only dag-pb CIDs have a
/// v0 form, and v0 CIDs can only be written in base58btc.
pub fn convert_cid(text: &str, version: Option<u64>, base: Option<CidBase>) -> Result<CidConversion> {
    let (cid, _) = CidDetails::parse(text)?;
    let target = match version {
        None => cid.version(),
        Some(v) => Version::try_from(v)
            .map_err(|_| Error::validation(format!("unsupported CID version {v}")))?,
    };
    let converted = match (cid.version(), target) {
        (Version::V0, Version::V1) => cid.into_v1(),
        (Version::V1, Version::V0) => Cid::new(Version::V0, cid.codec(), *cid.hash()),
        _ => Ok(cid),
    }
    .map_err(|e| Error::validation(format!("cannot convert {cid} to CIDv{}: {e}", u64::from(target))))?;
    let rendered = match base {
        Some(base) => converted
            .to_string_of_base(base.into())
            .map_err(|e| Error::validation(format!("cannot encode {converted} as {base}: {e}")))?,
        None => converted.to_string(),
    };
    Ok(CidConversion {
        original: text.trim().to_owned(),
        converted: rendered,
        original_version: cid.version().into(),
        converted_version: converted.version().into(),
    })
}

/// Human-readable breakdown of a CID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CidDetails {
    pub version: u64,
    pub codec: u64,
    pub codec_name: String,
    pub multihash_code: u64,
    pub multihash_name: String,
    pub digest_size: u8,
    pub multibase: String,
}

impl CidDetails {
    /// Parses `text` as a CID, guessing the multibase from its prefix.
    pub fn parse(text: &str) -> Result<(Cid, Self)> {
        let text = text.trim();
        let cid = Cid::from_str(text)
            .map_err(|e| Error::validation(format!("invalid CID {text:?}: {e}")))?;
        let mut details = Self::from(&cid);
        if cid.version() == Version::V1
            && let Some(prefix) = text.chars().next()
        {
            details.multibase = multibase_name(prefix).into();
        }
        Ok((cid, details))
    }
}

impl From<&Cid> for CidDetails {
    fn from(cid: &Cid) -> Self {
        let hash = cid.hash();
        let version = cid.version();
        Self {
            version: version.into(),
            codec: cid.codec(),
            codec_name: codec_name(cid.codec()).into(),
            multihash_code: hash.code(),
            multihash_name: multihash_name(hash.code()).into(),
            digest_size: hash.size(),
            // the `Display` encoding of each version
            multibase: match version {
                Version::V0 => "base58btc",
                Version::V1 => "base32",
            }
            .into(),
        }
    }
}

fn codec_name(code: u64) -> &'static str {
    match code {
        0x55 => "raw",
        0x70 => "dag-pb",
        0x71 => "dag-cbor",
        0x0129 => "dag-json",
        0x0200 => "json",
        0xf101 => "fil-commitment-unsealed",
        0xf102 => "fil-commitment-sealed",
        _ => "unknown",
    }
}

fn multihash_name(code: u64) -> &'static str {
    match code {
        0x00 => "identity",
        0x12 => "sha2-256",
        0x13 => "sha2-512",
        0x1012 => "sha2-256-trunc254-padded",
        0xb220 => "blake2b-256",
        0x1e => "blake3",
        _ => "unknown",
    }
}

fn multibase_name(prefix: char) -> &'static str {
    match prefix {
        'b' => "base32",
        'B' => "base32upper",
        'z' => "base58btc",
        'f' => "base16",
        'F' => "base16upper",
        'k' => "base36",
        'm' => "base64",
        'u' => "base64url",
        _ => "unknown",
    }
}
