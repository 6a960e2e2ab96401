// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Content packing: turns a file tree into a content-addressed block DAG and
//! serializes it as a CAR v1 archive.
//!
//! File bytes are split into fixed-size chunks stored as `raw` blocks. A file
//! that fits in one chunk is addressed by that block directly; larger files
//! and all directories are DAG-CBOR nodes linking to their children:
//!
//! ```text
//! file      { "size": u64, "chunks": [Cid] }
//! directory { "entries": [{ "cid": Cid, "name": String, "size": u64 }] }
//! ```
//!
//! Directory entries are sorted by name, so identical trees always produce
//! identical archives.

use super::CidType;
use super::stream::{CarBlock, encode_car};
use crate::error::{Error, Result};
use bytes::Bytes;
use cid::Cid;
use fvm_ipld_encoding::{DAG_CBOR, IPLD_RAW};
use indexmap::IndexMap;
use multihash_codetable::{Code, MultihashDigest as _};
use serde::Serialize;
use smart_default::SmartDefault;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read as _;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Default chunk size for file data.
pub const CHUNK_SIZE: usize = 256 * 1024;

/// A node of the packed DAG other than the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedEntry {
    pub cid: Cid,
    pub kind: CidType,
    pub parent: Cid,
    pub path: PathBuf,
    pub size: u64,
}

/// Result of packing a source tree.
#[derive(Debug, Clone)]
pub struct PackedArchive {
    pub root: Cid,
    /// The complete CAR v1 byte sequence.
    pub bytes: Bytes,
    pub entries: Vec<PackedEntry>,
    /// Sum of the sizes of every packed file.
    pub original_size: u64,
}

impl PackedArchive {
    pub fn archive_size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Packs a file or directory into an archive.
///
/// Implementations must be deterministic: packing the same names and bytes
/// twice yields the same root and the same archive bytes.
pub trait Packer: Send + Sync {
    fn pack(&self, source: &Path, wrap_in_directory: bool) -> Result<PackedArchive>;
}

#[derive(Serialize)]
struct FileNode {
    size: u64,
    chunks: Vec<Cid>,
}

#[derive(Serialize)]
struct DirEntry {
    cid: Cid,
    name: String,
    size: u64,
}

#[derive(Serialize)]
struct DirNode {
    entries: Vec<DirEntry>,
}

#[derive(Debug, Clone, SmartDefault)]
pub struct DagPacker {
    #[default(CHUNK_SIZE)]
    chunk_size: usize,
}

impl DagPacker {
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }
}

impl Packer for DagPacker {
    fn pack(&self, source: &Path, wrap_in_directory: bool) -> Result<PackedArchive> {
        let mut dag = DagBuilder::new(self.chunk_size);
        let name = entry_name(source)?;
        let top = dag.add_tree(source)?;

        let root = if wrap_in_directory || top.kind == CidType::File {
            let entry = DirEntry {
                cid: top.cid,
                name,
                size: top.size,
            };
            let root = dag.put_node(
                source,
                &DirNode {
                    entries: vec![entry],
                },
            )?;
            dag.entries.push(PackedEntry {
                cid: top.cid,
                kind: top.kind,
                parent: root,
                path: source.to_path_buf(),
                size: top.size,
            });
            root
        } else {
            top.cid
        };

        for entry in dag.entries.iter_mut() {
            if let Some(parent) = dag.parents.get(&entry.path) {
                entry.parent = *parent;
            }
        }

        let bytes = encode_car(nunny::vec![root], dag.blocks.values())
            .map_err(|e| Error::packing(source, e))?;
        Ok(PackedArchive {
            root,
            bytes: bytes.into(),
            entries: dag.entries,
            original_size: top.size,
        })
    }
}

struct Node {
    cid: Cid,
    kind: CidType,
    size: u64,
}

struct DagBuilder {
    chunk_size: usize,
    blocks: IndexMap<Cid, CarBlock>,
    entries: Vec<PackedEntry>,
    // child path -> parent directory CID, filled in once the parent is built
    parents: HashMap<PathBuf, Cid>,
}

impl DagBuilder {
    fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            blocks: IndexMap::new(),
            entries: vec![],
            parents: HashMap::new(),
        }
    }

    fn put(&mut self, codec: u64, data: Vec<u8>) -> Cid {
        let cid = Cid::new_v1(codec, Code::Sha2_256.digest(&data));
        self.blocks
            .entry(cid)
            .or_insert_with(|| CarBlock { cid, data });
        cid
    }

    fn put_node(&mut self, path: &Path, node: &impl Serialize) -> Result<Cid> {
        let data = fvm_ipld_encoding::to_vec(node).map_err(|e| Error::packing(path, e))?;
        Ok(self.put(DAG_CBOR, data))
    }

    fn add_file(&mut self, path: &Path) -> Result<Node> {
        let mut file = File::open(path).map_err(|e| Error::packing(path, e))?;
        let mut chunks = vec![];
        let mut size = 0;
        loop {
            let mut chunk = Vec::with_capacity(self.chunk_size);
            let read = (&mut file)
                .take(self.chunk_size as u64)
                .read_to_end(&mut chunk)
                .map_err(|e| Error::packing(path, e))?;
            if read == 0 {
                break;
            }
            size += read as u64;
            chunks.push(self.put(IPLD_RAW, chunk));
        }
        let cid = match chunks.as_slice() {
            [] => self.put(IPLD_RAW, vec![]),
            [single] => *single,
            _ => self.put_node(path, &FileNode { size, chunks })?,
        };
        Ok(Node {
            cid,
            kind: CidType::File,
            size,
        })
    }

    /// Adds `source` and everything below it, children before parents.
    fn add_tree(&mut self, source: &Path) -> Result<Node> {
        let mut pending: HashMap<PathBuf, Vec<DirEntry>> = HashMap::new();
        let mut top = None;
        let walker = WalkDir::new(source)
            .follow_links(false)
            .sort_by_file_name()
            .contents_first(true);
        for item in walker {
            let item = item.map_err(|e| {
                let path = e.path().unwrap_or(source).to_path_buf();
                Error::packing(path, e)
            })?;
            let path = item.path();
            let file_type = item.file_type();
            let node = if file_type.is_file() {
                self.add_file(path)?
            } else if file_type.is_dir() {
                let mut entries = pending.remove(path).unwrap_or_default();
                entries.sort_by(|a, b| a.name.cmp(&b.name));
                let size = entries.iter().map(|e| e.size).sum();
                let cid = self.put_node(path, &DirNode { entries })?;
                for child in self.entries.iter().filter(|e| e.path.parent() == Some(path)) {
                    self.parents.insert(child.path.clone(), cid);
                }
                Node {
                    cid,
                    kind: CidType::Directory,
                    size,
                }
            } else if file_type.is_symlink() {
                return Err(Error::packing(path, "symbolic links are not supported"));
            } else {
                return Err(Error::packing(path, "unsupported file type"));
            };

            if item.depth() == 0 {
                top = Some(node);
                continue;
            }
            let parent = path
                .parent()
                .ok_or_else(|| Error::packing(path, "entry has no parent"))?;
            pending
                .entry(parent.to_path_buf())
                .or_default()
                .push(DirEntry {
                    cid: node.cid,
                    name: entry_name(path)?,
                    size: node.size,
                });
            self.entries.push(PackedEntry {
                cid: node.cid,
                kind: node.kind,
                // placeholder until the parent directory has been built
                parent: node.cid,
                path: path.to_path_buf(),
                size: node.size,
            });
        }
        top.ok_or_else(|| Error::packing(source, "nothing to pack"))
    }
}

fn entry_name(path: &Path) -> Result<String> {
    path.file_name()
        .ok_or_else(|| Error::packing(path, "path has no file name"))?
        .to_str()
        .map(String::from)
        .ok_or_else(|| Error::packing(path, "file name is not valid UTF-8"))
}
