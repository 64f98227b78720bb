//! The owned collection of indexes backing one loaded data file.

use super::{
    FuzzyIndex, HandleIndex, Index, IndexType, OrderedIndex, PrefixIndex, RtreeIndex,
    HANDLE_ATTRIBUTE, RTREE_ATTRIBUTE,
};
use crate::error::{GeofileError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Summary of one index, for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexInfo {
    pub attribute: String,
    pub kind: IndexType,
    pub entries: u32,
    pub bytes: usize,
}

impl fmt::Display for IndexInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.attribute, self.kind)
    }
}

/// A validated handle index, optional spatial index and attribute indexes.
///
/// Immutable once constructed; swapped wholesale on rebuild.
#[derive(Debug, Clone)]
pub struct IndexSet {
    count: u32,
    handles: HandleIndex,
    rtree: Option<RtreeIndex>,
    attributes: HashMap<(String, IndexType), Index>,
}

impl IndexSet {
    /// Assemble and cross-check indexes declared for `count` records.
    pub fn new(count: u32, indexes: Vec<Index>) -> Result<Self> {
        let mut handles = None;
        let mut rtree = None;
        let mut attributes = HashMap::new();

        for index in indexes {
            check_bounds(&index, count)?;
            match index {
                Index::Handle(h) => {
                    if handles.replace(h).is_some() {
                        return Err(GeofileError::format("more than one handle index"));
                    }
                }
                Index::Rtree(r) => {
                    if rtree.replace(r).is_some() {
                        return Err(GeofileError::format("more than one rtree index"));
                    }
                }
                other => {
                    let key = (other.attribute().to_string(), other.kind());
                    if attributes.contains_key(&key) {
                        return Err(GeofileError::format(format!(
                            "duplicate {} index on '{}'",
                            key.1, key.0
                        )));
                    }
                    debug!(attribute = %key.0, kind = %key.1, entries = other.entry_count(), "Loaded attribute index");
                    attributes.insert(key, other);
                }
            }
        }

        let handles = handles.ok_or_else(|| GeofileError::format("no handle index"))?;
        if handles.count() != count {
            return Err(GeofileError::format(format!(
                "header declares {} records but handle index holds {}",
                count,
                handles.count()
            )));
        }

        Ok(IndexSet {
            count,
            handles,
            rtree,
            attributes,
        })
    }

    /// Number of records.
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn handles(&self) -> &HandleIndex {
        &self.handles
    }

    pub fn has_rtree(&self) -> bool {
        self.rtree.is_some()
    }

    pub fn rtree(&self) -> Result<&RtreeIndex> {
        self.rtree.as_ref().ok_or_else(|| GeofileError::IndexNotFound {
            attribute: RTREE_ATTRIBUTE.to_string(),
            kind: IndexType::Rtree,
        })
    }

    /// Attribute index of `kind` on `attribute`, if present.
    pub fn get(&self, attribute: &str, kind: IndexType) -> Option<&Index> {
        self.attributes.get(&(attribute.to_string(), kind))
    }

    fn require(&self, attribute: &str, kind: IndexType) -> Result<&Index> {
        self.get(attribute, kind).ok_or_else(|| GeofileError::IndexNotFound {
            attribute: attribute.to_string(),
            kind,
        })
    }

    pub fn ordered(&self, attribute: &str) -> Result<&OrderedIndex> {
        match self.require(attribute, IndexType::Ordered)? {
            Index::Ordered(i) => Ok(i),
            _ => Err(GeofileError::Internal("index stored under wrong type".into())),
        }
    }

    pub fn fuzzy(&self, attribute: &str) -> Result<&FuzzyIndex> {
        match self.require(attribute, IndexType::Fuzzy)? {
            Index::Fuzzy(i) => Ok(i),
            _ => Err(GeofileError::Internal("index stored under wrong type".into())),
        }
    }

    pub fn prefix(&self, attribute: &str) -> Result<&PrefixIndex> {
        match self.require(attribute, IndexType::Prefix)? {
            Index::Prefix(i) => Ok(i),
            _ => Err(GeofileError::Internal("index stored under wrong type".into())),
        }
    }

    /// One entry per index: handle, rtree, then attribute indexes by name.
    pub fn describe(&self) -> Vec<IndexInfo> {
        let mut out = vec![IndexInfo {
            attribute: HANDLE_ATTRIBUTE.to_string(),
            kind: IndexType::Handle,
            entries: self.handles.count(),
            bytes: self.handles.byte_len(),
        }];
        if let Some(rtree) = &self.rtree {
            out.push(IndexInfo {
                attribute: RTREE_ATTRIBUTE.to_string(),
                kind: IndexType::Rtree,
                entries: rtree.leaf_count(),
                bytes: rtree.byte_len(),
            });
        }
        let mut attrs: Vec<IndexInfo> = self
            .attributes
            .values()
            .map(|index| IndexInfo {
                attribute: index.attribute().to_string(),
                kind: index.kind(),
                entries: index.entry_count(),
                bytes: index.byte_len(),
            })
            .collect();
        attrs.sort_by(|a, b| a.attribute.cmp(&b.attribute).then(a.kind.cmp(&b.kind)));
        out.extend(attrs);
        out
    }
}

fn check_bounds(index: &Index, count: u32) -> Result<()> {
    // prefix indexes hold one record per token, so only their ranks are bounded
    if index.kind() != IndexType::Prefix && index.entry_count() > count {
        return Err(GeofileError::format(format!(
            "{} index on '{}' holds {} entries for {} records",
            index.kind(),
            index.attribute(),
            index.entry_count(),
            count
        )));
    }
    if let Some(max) = index.max_rank() {
        if max >= count {
            return Err(GeofileError::format(format!(
                "{} index on '{}' references rank {} of {}",
                index.kind(),
                index.attribute(),
                max,
                count
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{ordered::encode_key, IndexSlice};
    use crate::types::{BBox, Handle};
    use serde_json::json;
    use std::sync::Arc;

    fn slice(bytes: Vec<u8>) -> IndexSlice {
        let buf: Arc<[u8]> = bytes.into();
        IndexSlice::whole(buf)
    }

    fn handles(n: u32) -> Index {
        let hs: Vec<Handle> = (0..n).map(|r| Handle::new(r, r as u64 * 10, 9)).collect();
        Index::Handle(HandleIndex::from_slice(slice(HandleIndex::build(&hs).unwrap())).unwrap())
    }

    fn rtree(points: &[(u32, f64, f64)]) -> Index {
        let entries = points
            .iter()
            .map(|(r, x, y)| (*r, BBox::from_point(*x, *y)))
            .collect();
        Index::Rtree(RtreeIndex::from_slice(slice(RtreeIndex::build(entries, 4).unwrap())).unwrap())
    }

    fn ordered(attribute: &str, ranks: &[u32]) -> Index {
        let entries = ranks.iter().map(|r| (encode_key(Some(&json!(r))), *r)).collect();
        Index::Ordered(OrderedIndex::from_slice(attribute, slice(OrderedIndex::build(entries))).unwrap())
    }

    #[test]
    fn test_valid_set() {
        let set = IndexSet::new(
            3,
            vec![
                handles(3),
                rtree(&[(0, 0.0, 0.0), (2, 1.0, 1.0)]),
                ordered("name", &[0, 1, 2]),
            ],
        )
        .unwrap();
        assert_eq!(set.count(), 3);
        assert!(set.has_rtree());
        assert!(set.ordered("name").is_ok());
        assert!(matches!(
            set.fuzzy("name"),
            Err(GeofileError::IndexNotFound { kind: IndexType::Fuzzy, .. })
        ));

        let info = set.describe();
        assert_eq!(info.len(), 3);
        assert_eq!(info[0].kind, IndexType::Handle);
        assert_eq!(info[1].entries, 2);
        assert_eq!(info[2].attribute, "name");
        assert_eq!(info[2].to_string(), "name:ordered");
    }

    #[test]
    fn test_missing_handle_index() {
        let err = IndexSet::new(0, vec![rtree(&[])]).unwrap_err();
        assert!(err.is_fatal_to_load());
    }

    #[test]
    fn test_count_mismatch() {
        assert!(IndexSet::new(4, vec![handles(3)]).is_err());
    }

    #[test]
    fn test_rank_beyond_count() {
        assert!(IndexSet::new(2, vec![handles(2), ordered("name", &[0, 5])]).is_err());
        assert!(IndexSet::new(2, vec![handles(2), rtree(&[(3, 0.0, 0.0)])]).is_err());
    }

    #[test]
    fn test_duplicates_rejected() {
        assert!(IndexSet::new(1, vec![handles(1), handles(1)]).is_err());
        assert!(IndexSet::new(
            1,
            vec![handles(1), ordered("name", &[0]), ordered("name", &[0])]
        )
        .is_err());
    }

    #[test]
    fn test_rtree_absent() {
        let set = IndexSet::new(1, vec![handles(1)]).unwrap();
        assert!(matches!(
            set.rtree(),
            Err(GeofileError::IndexNotFound { kind: IndexType::Rtree, .. })
        ));
    }
}
