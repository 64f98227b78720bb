//! Accumulates a parsed record stream into index buffers.
//!
//! The handle index and the spatial index are always built; attribute
//! indexes are added per [`IndexDefinition`].

use super::fuzzy::fingerprint;
use super::ordered::encode_key;
use super::prefix::tokens;
use super::{FuzzyIndex, HandleIndex, IndexBuffer, IndexType, OrderedIndex, PrefixIndex, RtreeIndex};
use super::{HANDLE_ATTRIBUTE, RTREE_ATTRIBUTE};
use crate::config::GeofileConfig;
use crate::error::{GeofileError, Result};
use crate::format::ATTRIBUTE_FIELD_LEN;
use crate::parser::ParsedRecord;
use crate::types::{BBox, Handle, Rank};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// An attribute index to build: `{attribute, type}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub attribute: String,
    #[serde(rename = "type")]
    pub kind: IndexType,
}

impl IndexDefinition {
    pub fn new(attribute: impl Into<String>, kind: IndexType) -> Self {
        IndexDefinition {
            attribute: attribute.into(),
            kind,
        }
    }

    pub fn ordered(attribute: impl Into<String>) -> Self {
        Self::new(attribute, IndexType::Ordered)
    }

    pub fn fuzzy(attribute: impl Into<String>) -> Self {
        Self::new(attribute, IndexType::Fuzzy)
    }

    pub fn prefix(attribute: impl Into<String>) -> Self {
        Self::new(attribute, IndexType::Prefix)
    }

    /// Names must fit their metadata field untruncated.
    pub fn validate(&self) -> Result<()> {
        if self.attribute.len() > ATTRIBUTE_FIELD_LEN {
            return Err(GeofileError::NameTooLong {
                field: "attribute",
                value: self.attribute.clone(),
                max: ATTRIBUTE_FIELD_LEN,
            });
        }
        if self.attribute.is_empty() {
            return Err(GeofileError::Config {
                reason: "index attribute name is empty".to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for IndexDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.attribute, self.kind)
    }
}

/// Parses `attribute:type`, splitting at the last colon.
impl FromStr for IndexDefinition {
    type Err = GeofileError;

    fn from_str(s: &str) -> Result<Self> {
        let (attribute, kind) = s.rsplit_once(':').ok_or_else(|| GeofileError::Config {
            reason: format!("index definition '{}' is not ATTRIBUTE:TYPE", s),
        })?;
        let kind = kind.parse::<IndexType>().map_err(|_| GeofileError::Config {
            reason: format!("unknown index type '{}' in '{}'", kind, s),
        })?;
        let definition = IndexDefinition::new(attribute, kind);
        definition.validate()?;
        Ok(definition)
    }
}

enum Entries {
    Ordered(Vec<(Vec<u8>, Rank)>),
    Fuzzy(Vec<(u32, Rank)>),
    Prefix(Vec<(String, Rank)>),
}

struct Pending {
    attribute: String,
    entries: Entries,
}

/// Builds every index from one pass over a record stream.
pub struct IndexBuilder {
    node_size: usize,
    prefix_length: usize,
    handles: Vec<Handle>,
    boxes: Vec<(Rank, BBox)>,
    pending: Vec<Pending>,
}

impl IndexBuilder {
    /// Prepare accumulators for `definitions`.
    ///
    /// Handle and rtree definitions are implicit and ignored; duplicates
    /// collapse to one index.
    pub fn new(definitions: &[IndexDefinition], config: &GeofileConfig) -> Result<Self> {
        let mut pending: Vec<Pending> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for definition in definitions {
            definition.validate()?;
            if !definition.kind.is_attribute() {
                debug!(definition = %definition, "Skipping implicit index definition");
                continue;
            }
            if !seen.insert(definition.clone()) {
                continue;
            }
            let entries = match definition.kind {
                IndexType::Ordered => Entries::Ordered(Vec::new()),
                IndexType::Fuzzy => Entries::Fuzzy(Vec::new()),
                _ => Entries::Prefix(Vec::new()),
            };
            pending.push(Pending {
                attribute: definition.attribute.clone(),
                entries,
            });
        }

        Ok(IndexBuilder {
            node_size: config.rtree.node_size,
            prefix_length: config.search.prefix_length,
            handles: Vec::new(),
            boxes: Vec::new(),
            pending,
        })
    }

    /// Records added so far.
    pub fn count(&self) -> u32 {
        self.handles.len() as u32
    }

    /// Add the next record. Records must arrive in rank order.
    ///
    /// Records whose decode failed still get a handle but feed no other index.
    pub fn add(&mut self, record: &ParsedRecord) -> Result<()> {
        let rank = record.handle.rank;
        if rank as usize != self.handles.len() {
            return Err(GeofileError::Internal(format!(
                "record rank {} arrived after {} records",
                rank,
                self.handles.len()
            )));
        }
        self.handles.push(record.handle);

        let Some(feature) = &record.feature else {
            return Ok(());
        };
        if let Some(bbox) = feature.bbox.filter(BBox::is_valid) {
            self.boxes.push((rank, bbox));
        }

        for pending in &mut self.pending {
            match &mut pending.entries {
                Entries::Ordered(entries) => {
                    entries.push((encode_key(feature.property(&pending.attribute)), rank));
                }
                Entries::Fuzzy(entries) => {
                    if let Some(fp) = feature
                        .property_text(&pending.attribute)
                        .as_deref()
                        .and_then(fingerprint)
                    {
                        entries.push((fp, rank));
                    }
                }
                Entries::Prefix(entries) => {
                    if let Some(text) = feature.property_text(&pending.attribute) {
                        entries.extend(tokens(&text).into_iter().map(|t| (t, rank)));
                    }
                }
            }
        }
        Ok(())
    }

    /// Serialize all indexes: handle first, then rtree, then attribute
    /// indexes in definition order.
    pub fn finish(self) -> Result<Vec<IndexBuffer>> {
        let IndexBuilder {
            node_size,
            prefix_length,
            handles,
            boxes,
            pending,
        } = self;

        let mut buffers = vec![
            IndexBuffer::new(HANDLE_ATTRIBUTE, IndexType::Handle, HandleIndex::build(&handles)?),
            IndexBuffer::new(RTREE_ATTRIBUTE, IndexType::Rtree, RtreeIndex::build(boxes, node_size)?),
        ];

        let attributes = pending
            .into_par_iter()
            .map(|p| {
                let (kind, bytes) = match p.entries {
                    Entries::Ordered(entries) => (IndexType::Ordered, OrderedIndex::build(entries)),
                    Entries::Fuzzy(entries) => (IndexType::Fuzzy, FuzzyIndex::build(entries)),
                    Entries::Prefix(entries) => {
                        (IndexType::Prefix, PrefixIndex::build(prefix_length, entries)?)
                    }
                };
                debug!(attribute = %p.attribute, kind = %kind, bytes = bytes.len(), "Built attribute index");
                Ok::<_, GeofileError>(IndexBuffer::new(p.attribute, kind, bytes))
            })
            .collect::<Result<Vec<_>>>()?;
        buffers.extend(attributes);

        info!(records = handles.len(), indexes = buffers.len(), "Indexes built");
        Ok(buffers)
    }
}
