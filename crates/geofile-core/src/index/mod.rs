//! Index variants and the shared machinery they are built on.
//!
//! Every index is a read-only view over a sub-range of one index file
//! buffer, made of fixed-size little-endian records:
//!
//! | type      | record                                   | bytes            |
//! |-----------|------------------------------------------|------------------|
//! | `handle`  | `pos:u64, len:u32`                       | 12               |
//! | `rtree`   | `minX,minY,maxX,maxY:f64, child:u32`     | 36               |
//! | `ordered` | `key:[u8;24], rank:u32`                  | 28               |
//! | `fuzzy`   | `hash:u32, rank:u32`                     | 8                |
//! | `prefix`  | `prefix:[u8;N], rank:u32`                | N + 4            |
//!
//! Variants are selected by the type tag read from the index metadata;
//! there is no shared mutable state between them.

pub mod attribute;
pub mod builder;
pub mod fuzzy;
pub mod handle;
pub mod ordered;
pub mod prefix;
pub mod rtree;
pub mod set;

pub use attribute::AttributeTable;
pub use builder::{IndexBuilder, IndexDefinition};
pub use fuzzy::FuzzyIndex;
pub use handle::HandleIndex;
pub use ordered::OrderedIndex;
pub use prefix::PrefixIndex;
pub use rtree::RtreeIndex;
pub use set::{IndexInfo, IndexSet};

use crate::error::{GeofileError, Result};
use crate::types::Rank;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Attribute name under which the handle index is stored.
pub const HANDLE_ATTRIBUTE: &str = "rank";

/// Attribute name under which the spatial index is stored.
pub const RTREE_ATTRIBUTE: &str = "geometry";

/// The five index variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
    Handle,
    Rtree,
    Ordered,
    Fuzzy,
    Prefix,
}

impl IndexType {
    /// Tag written to the metadata `type` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexType::Handle => "handle",
            IndexType::Rtree => "rtree",
            IndexType::Ordered => "ordered",
            IndexType::Fuzzy => "fuzzy",
            IndexType::Prefix => "prefix",
        }
    }

    /// True for the per-attribute variants.
    pub fn is_attribute(&self) -> bool {
        matches!(self, IndexType::Ordered | IndexType::Fuzzy | IndexType::Prefix)
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexType {
    type Err = GeofileError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "handle" => Ok(IndexType::Handle),
            "rtree" => Ok(IndexType::Rtree),
            "ordered" => Ok(IndexType::Ordered),
            "fuzzy" => Ok(IndexType::Fuzzy),
            "prefix" => Ok(IndexType::Prefix),
            other => Err(GeofileError::format(format!("unknown index type '{}'", other))),
        }
    }
}

/// A shared, bounds-checked window into an index file buffer.
#[derive(Clone)]
pub struct IndexSlice {
    buf: Arc<[u8]>,
    offset: usize,
    length: usize,
}

impl IndexSlice {
    /// Window `[offset, offset + length)` of `buf`.
    pub fn new(buf: Arc<[u8]>, offset: usize, length: usize) -> Result<Self> {
        match offset.checked_add(length) {
            Some(end) if end <= buf.len() => Ok(IndexSlice {
                buf,
                offset,
                length,
            }),
            _ => Err(GeofileError::format(format!(
                "index region [{}, +{}) exceeds file size {}",
                offset,
                length,
                buf.len()
            ))),
        }
    }

    /// The whole buffer.
    pub fn whole(buf: Arc<[u8]>) -> Self {
        let length = buf.len();
        IndexSlice {
            buf,
            offset: 0,
            length,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[self.offset..self.offset + self.length]
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

impl fmt::Debug for IndexSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexSlice")
            .field("offset", &self.offset)
            .field("length", &self.length)
            .finish()
    }
}

/// A freshly built index, not yet laid out in a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexBuffer {
    pub attribute: String,
    pub kind: IndexType,
    pub bytes: Vec<u8>,
}

impl IndexBuffer {
    pub fn new(attribute: impl Into<String>, kind: IndexType, bytes: Vec<u8>) -> Self {
        IndexBuffer {
            attribute: attribute.into(),
            kind,
            bytes,
        }
    }
}

/// A loaded index of any variant.
#[derive(Debug, Clone)]
pub enum Index {
    Handle(HandleIndex),
    Rtree(RtreeIndex),
    Ordered(OrderedIndex),
    Fuzzy(FuzzyIndex),
    Prefix(PrefixIndex),
}

impl Index {
    /// Construct the variant named by `kind` over `slice`.
    pub fn from_slice(attribute: &str, kind: IndexType, slice: IndexSlice) -> Result<Self> {
        Ok(match kind {
            IndexType::Handle => Index::Handle(HandleIndex::from_slice(slice)?),
            IndexType::Rtree => Index::Rtree(RtreeIndex::from_slice(slice)?),
            IndexType::Ordered => Index::Ordered(OrderedIndex::from_slice(attribute, slice)?),
            IndexType::Fuzzy => Index::Fuzzy(FuzzyIndex::from_slice(attribute, slice)?),
            IndexType::Prefix => Index::Prefix(PrefixIndex::from_slice(attribute, slice)?),
        })
    }

    pub fn kind(&self) -> IndexType {
        match self {
            Index::Handle(_) => IndexType::Handle,
            Index::Rtree(_) => IndexType::Rtree,
            Index::Ordered(_) => IndexType::Ordered,
            Index::Fuzzy(_) => IndexType::Fuzzy,
            Index::Prefix(_) => IndexType::Prefix,
        }
    }

    pub fn attribute(&self) -> &str {
        match self {
            Index::Handle(_) => HANDLE_ATTRIBUTE,
            Index::Rtree(_) => RTREE_ATTRIBUTE,
            Index::Ordered(i) => i.attribute(),
            Index::Fuzzy(i) => i.attribute(),
            Index::Prefix(i) => i.attribute(),
        }
    }

    /// Number of entries: handles, spatial leaves, or attribute records.
    pub fn entry_count(&self) -> u32 {
        match self {
            Index::Handle(i) => i.count(),
            Index::Rtree(i) => i.leaf_count(),
            Index::Ordered(i) => i.len() as u32,
            Index::Fuzzy(i) => i.len() as u32,
            Index::Prefix(i) => i.len() as u32,
        }
    }

    /// Largest rank referenced by this index.
    pub fn max_rank(&self) -> Option<Rank> {
        match self {
            Index::Handle(i) => i.count().checked_sub(1),
            Index::Rtree(i) => i.leaf_ranks().max(),
            Index::Ordered(i) => i.table().ranks(0..i.len()).max(),
            Index::Fuzzy(i) => i.table().ranks(0..i.len()).max(),
            Index::Prefix(i) => i.table().ranks(0..i.len()).max(),
        }
    }

    /// Size of the underlying region in bytes.
    pub fn byte_len(&self) -> usize {
        match self {
            Index::Handle(i) => i.byte_len(),
            Index::Rtree(i) => i.byte_len(),
            Index::Ordered(i) => i.table().byte_len(),
            Index::Fuzzy(i) => i.table().byte_len(),
            Index::Prefix(i) => i.table().byte_len(),
        }
    }
}

// Little-endian field access. Callers have already bounds-checked the record.

pub(crate) fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(b)
}

pub(crate) fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(b)
}

pub(crate) fn read_f64(bytes: &[u8], at: usize) -> f64 {
    f64::from_bits(read_u64(bytes, at))
}

/// Normalize free text for fuzzy and prefix matching: lowercase
/// alphanumerics separated by single spaces.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c);
        } else {
            pending_space = true;
        }
    }
    out
}
