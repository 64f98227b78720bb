//! Token prefix index.
//!
//! One record per distinct token of each record's normalized text, holding
//! the token's first `prefix_length` bytes. A query matches a record when
//! every query token is a prefix of at least one of the record's tokens.
//!
//! Record 0 is a header whose first four bytes hold `prefix_length`
//! (u32 LE), so the record size can be recovered from the buffer alone.

use super::attribute::{pack_records, AttributeTable};
use super::{normalize_text, read_u32, IndexSlice};
use crate::error::{GeofileError, Result};
use crate::types::Rank;
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Distinct normalized tokens of `text`, in order of first appearance.
pub fn tokens(text: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    normalize_text(text)
        .split(' ')
        .filter(|t| !t.is_empty() && seen.insert(t.to_string()))
        .map(str::to_string)
        .collect()
}

/// First `max` bytes of `token`, cut back to a character boundary.
fn truncate(token: &str, max: usize) -> &str {
    if token.len() <= max {
        return token;
    }
    let mut end = max;
    while !token.is_char_boundary(end) {
        end -= 1;
    }
    &token[..end]
}

/// Whether every token of `query` prefixes some token of `value`.
pub fn matches_all(query: &str, value: &str) -> bool {
    let stored = tokens(value);
    let wanted = tokens(query);
    !wanted.is_empty()
        && wanted
            .iter()
            .all(|q| stored.iter().any(|s| s.starts_with(q.as_str())))
}

/// Sorted `{prefix, rank}` table over one attribute.
#[derive(Debug, Clone)]
pub struct PrefixIndex {
    attribute: String,
    prefix_length: usize,
    table: AttributeTable,
}

impl PrefixIndex {
    pub fn from_slice(attribute: &str, slice: IndexSlice) -> Result<Self> {
        if slice.len() < 4 {
            return Err(GeofileError::format(format!(
                "prefix index on '{}' is missing its header",
                attribute
            )));
        }
        let prefix_length = read_u32(slice.as_bytes(), 0) as usize;
        if prefix_length == 0 {
            return Err(GeofileError::format(format!(
                "prefix index on '{}' declares zero prefix length",
                attribute
            )));
        }
        Ok(PrefixIndex {
            attribute: attribute.to_string(),
            prefix_length,
            table: AttributeTable::new(slice, prefix_length, 1)?,
        })
    }

    /// Serialize `(token, rank)` pairs, keeping `prefix_length` bytes of
    /// each token. Pairs that collapse to the same record are stored once.
    pub fn build(prefix_length: usize, entries: Vec<(String, Rank)>) -> Result<Vec<u8>> {
        if prefix_length == 0 || prefix_length > u32::MAX as usize - 4 {
            return Err(GeofileError::Config {
                reason: format!("prefix length {} is out of range", prefix_length),
            });
        }

        let record_size = prefix_length + 4;
        let mut header = vec![0u8; record_size];
        header[..4].copy_from_slice(&(prefix_length as u32).to_le_bytes());

        let mut keyed: Vec<(Vec<u8>, Rank)> = entries
            .iter()
            .map(|(token, rank)| {
                let mut key = vec![0u8; prefix_length];
                let bytes = truncate(token, prefix_length).as_bytes();
                key[..bytes.len()].copy_from_slice(bytes);
                (key, *rank)
            })
            .collect();
        keyed.sort_unstable();
        keyed.dedup();

        Ok(pack_records(&header, keyed, prefix_length))
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub fn prefix_length(&self) -> usize {
        self.prefix_length
    }

    /// Number of token records, header excluded.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn table(&self) -> &AttributeTable {
        &self.table
    }

    /// Ranks having at least one stored prefix starting with `token`.
    fn ranks_for_token(&self, token: &str) -> BTreeSet<Rank> {
        let probe = truncate(token, self.prefix_length).as_bytes();
        let range = self.table.equal_range(|stored| {
            let end = stored.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
            let stored = &stored[..end];
            if stored.starts_with(probe) {
                Ordering::Equal
            } else {
                stored.cmp(probe)
            }
        });
        self.table.ranks(range).collect()
    }

    /// Ranks matched by every token of `text`, ascending.
    ///
    /// Candidates whose query tokens were longer than the stored prefix
    /// still need confirming with [`matches_all`].
    pub fn lookup(&self, text: &str) -> BTreeSet<Rank> {
        let mut result: Option<BTreeSet<Rank>> = None;
        for token in tokens(text) {
            let ranks = self.ranks_for_token(&token);
            let next = match result {
                None => ranks,
                Some(acc) => acc.intersection(&ranks).copied().collect(),
            };
            if next.is_empty() {
                return next;
            }
            result = Some(next);
        }
        result.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn load(texts: &[&str], prefix_length: usize) -> PrefixIndex {
        let entries = texts
            .iter()
            .enumerate()
            .flat_map(|(rank, t)| tokens(t).into_iter().map(move |tok| (tok, rank as Rank)))
            .collect();
        let buf: Arc<[u8]> = PrefixIndex::build(prefix_length, entries).unwrap().into();
        PrefixIndex::from_slice("name", IndexSlice::whole(buf)).unwrap()
    }

    fn ranks(set: BTreeSet<Rank>) -> Vec<Rank> {
        set.into_iter().collect()
    }

    #[test]
    fn test_tokens() {
        assert_eq!(tokens("Queen Elizabeth II"), vec!["queen", "elizabeth", "ii"]);
        assert_eq!(tokens("New  new NEW york"), vec!["new", "york"]);
        assert!(tokens(" - ").is_empty());
    }

    #[test]
    fn test_all_tokens_must_match() {
        let index = load(&["Queen Elizabeth II", "Queen Mary", "Elizabeth Line"], 16);
        assert_eq!(ranks(index.lookup("Eliz Quee")), vec![0]);
        assert_eq!(ranks(index.lookup("quee")), vec![0, 1]);
        assert_eq!(ranks(index.lookup("eliz")), vec![0, 2]);
        assert!(index.lookup("Eliz DummY").is_empty());
        assert!(index.lookup("").is_empty());
    }

    #[test]
    fn test_header_carries_prefix_length() {
        let index = load(&["Harry Potter"], 3);
        assert_eq!(index.prefix_length(), 3);
        assert_eq!(index.len(), 2);
        assert_eq!(index.table().byte_len(), 3 * 7);
    }

    #[test]
    fn test_long_query_tokens_are_truncated_then_verified() {
        let index = load(&["Harrison", "Harry"], 4);
        // both store "harr"
        assert_eq!(ranks(index.lookup("harrison")), vec![0, 1]);
        assert!(matches_all("harrison", "Harrison"));
        assert!(!matches_all("harrison", "Harry"));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        assert_eq!(truncate("émile", 1), "");
        assert_eq!(truncate("émile", 2), "é");
        let index = load(&["Émile Zola"], 3);
        assert_eq!(ranks(index.lookup("ém")), vec![0]);
    }

    #[test]
    fn test_duplicate_tokens_stored_once() {
        let index = load(&["new new new"], 8);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_rejects_bad_header() {
        let buf: Arc<[u8]> = vec![0u8; 8].into();
        assert!(PrefixIndex::from_slice("name", IndexSlice::whole(buf)).is_err());
        assert!(PrefixIndex::build(0, Vec::new()).is_err());
    }
}
