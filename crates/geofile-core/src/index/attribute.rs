//! Sorted fixed-size record tables shared by the attribute indexes.
//!
//! An attribute table is a run of `{key, rank}` records sorted by key bytes
//! (then rank). Ordered, fuzzy and prefix indexes differ only in how they
//! derive keys and how a probe compares against a stored key; the binary
//! search lives here once.

use super::{read_u32, IndexSlice};
use crate::error::{GeofileError, Result};
use crate::types::Rank;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::ops::Range;

/// Read-only view of a sorted `{key, rank}` table.
#[derive(Debug, Clone)]
pub struct AttributeTable {
    slice: IndexSlice,
    record_size: usize,
    key_len: usize,
    header_records: usize,
    len: usize,
}

impl AttributeTable {
    /// Wrap `slice`, skipping `header_records` leading records.
    pub fn new(slice: IndexSlice, key_len: usize, header_records: usize) -> Result<Self> {
        let record_size = key_len + 4;
        if slice.len() % record_size != 0 {
            return Err(GeofileError::format(format!(
                "attribute index length {} is not a multiple of record size {}",
                slice.len(),
                record_size
            )));
        }
        let total = slice.len() / record_size;
        if total < header_records {
            return Err(GeofileError::format("attribute index is missing its header record"));
        }
        Ok(AttributeTable {
            slice,
            record_size,
            key_len,
            header_records,
            len: total - header_records,
        })
    }

    /// Number of data records (header excluded).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn byte_len(&self) -> usize {
        self.slice.len()
    }

    fn record(&self, i: usize) -> &[u8] {
        let start = (self.header_records + i) * self.record_size;
        &self.slice.as_bytes()[start..start + self.record_size]
    }

    /// Key bytes of record `i`.
    pub fn key(&self, i: usize) -> &[u8] {
        &self.record(i)[..self.key_len]
    }

    /// Rank of record `i`.
    pub fn rank(&self, i: usize) -> Rank {
        read_u32(self.record(i), self.key_len)
    }

    /// Ranks of a range of records, in table order.
    pub fn ranks(&self, range: Range<usize>) -> impl Iterator<Item = Rank> + '_ {
        range.map(move |i| self.rank(i))
    }

    /// Binary search for any record whose key compares `Equal`.
    ///
    /// `probe` receives a stored key and reports how it orders relative to
    /// the sought value. The hit may be anywhere inside a run of equal keys.
    pub fn find<F>(&self, probe: F) -> Option<usize>
    where
        F: Fn(&[u8]) -> Ordering,
    {
        let (mut lo, mut hi) = (0usize, self.len);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match probe(self.key(mid)) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Some(mid),
            }
        }
        None
    }

    /// All records comparing `Equal`: land anywhere in the run, then widen
    /// in both directions.
    pub fn equal_range<F>(&self, probe: F) -> Range<usize>
    where
        F: Fn(&[u8]) -> Ordering,
    {
        let Some(hit) = self.find(&probe) else {
            return 0..0;
        };
        let mut start = hit;
        while start > 0 && probe(self.key(start - 1)) == Ordering::Equal {
            start -= 1;
        }
        let mut end = hit + 1;
        while end < self.len && probe(self.key(end)) == Ordering::Equal {
            end += 1;
        }
        start..end
    }
}

/// Sort `{key, rank}` entries and serialize them behind `header`.
///
/// Every key must be exactly `key_len` bytes.
pub fn pack_records(header: &[u8], mut entries: Vec<(Vec<u8>, Rank)>, key_len: usize) -> Vec<u8> {
    entries.par_sort_unstable();
    let mut out = Vec::with_capacity(header.len() + entries.len() * (key_len + 4));
    out.extend_from_slice(header);
    for (key, rank) in &entries {
        debug_assert_eq!(key.len(), key_len);
        out.extend_from_slice(key);
        out.extend_from_slice(&rank.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn table(entries: Vec<(Vec<u8>, Rank)>) -> AttributeTable {
        let bytes = pack_records(&[], entries, 2);
        let buf: Arc<[u8]> = bytes.into();
        AttributeTable::new(IndexSlice::whole(buf), 2, 0).unwrap()
    }

    #[test]
    fn test_records_sorted_by_key_then_rank() {
        let t = table(vec![
            (b"bb".to_vec(), 3),
            (b"aa".to_vec(), 9),
            (b"bb".to_vec(), 1),
        ]);
        assert_eq!(t.len(), 3);
        assert_eq!(t.key(0), b"aa");
        assert_eq!(t.ranks(0..3).collect::<Vec<_>>(), vec![9, 1, 3]);
    }

    #[test]
    fn test_equal_range_widens_in_both_directions() {
        // A long run of duplicates so the first probe lands mid-run.
        let mut entries: Vec<(Vec<u8>, Rank)> = (0..50).map(|r| (b"kk".to_vec(), r)).collect();
        entries.push((b"aa".to_vec(), 100));
        entries.push((b"zz".to_vec(), 101));
        let t = table(entries);

        let range = t.equal_range(|k| k.cmp(b"kk".as_slice()));
        assert_eq!(range.len(), 50);
        let ranks: Vec<Rank> = t.ranks(range).collect();
        assert_eq!(ranks, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_equal_range_missing_key() {
        let t = table(vec![(b"aa".to_vec(), 0), (b"cc".to_vec(), 1)]);
        assert!(t.equal_range(|k| k.cmp(b"bb".as_slice())).is_empty());
        assert!(t.find(|k| k.cmp(b"zz".as_slice())).is_none());
    }

    #[test]
    fn test_header_records_are_skipped() {
        let bytes = pack_records(&[0xff; 6], vec![(b"aa".to_vec(), 4)], 2);
        let buf: Arc<[u8]> = bytes.into();
        let t = AttributeTable::new(IndexSlice::whole(buf), 2, 1).unwrap();
        assert_eq!(t.len(), 1);
        assert_eq!(t.rank(0), 4);
    }

    #[test]
    fn test_rejects_partial_records() {
        let buf: Arc<[u8]> = vec![0u8; 7].into();
        assert!(AttributeTable::new(IndexSlice::whole(buf), 2, 0).is_err());
    }

    #[test]
    fn test_empty_table() {
        let t = table(Vec::new());
        assert!(t.is_empty());
        assert!(t.equal_range(|k| k.cmp(b"aa".as_slice())).is_empty());
    }
}
