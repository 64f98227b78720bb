//! Approximate text index.
//!
//! Each record stores a 32-bit fingerprint of the attribute's normalized
//! text. The fingerprint is the CRC32 of a phonetic key: every word becomes
//! its first letter plus three consonant-class digits, so spellings that
//! sound alike ("harry", "harri") share a fingerprint. Queries also probe the
//! fingerprints of every single-character deletion and adjacent transposition
//! of the query, which catches typos that change the phonetic key. The first
//! letter of a word is kept literally in the key, so substitutions of it and
//! insertions in front of it are probed as well.
//!
//! Records are ordered by their raw key bytes; the order is only used for
//! binary search.

use super::attribute::{pack_records, AttributeTable};
use super::{normalize_text, IndexSlice};
use crate::error::Result;
use crate::types::Rank;
use std::collections::BTreeSet;

/// Bytes of fingerprint per record.
pub const FUZZY_KEY_LEN: usize = 4;

fn consonant_class(c: char) -> Option<char> {
    match c {
        'b' | 'f' | 'p' | 'v' => Some('1'),
        'c' | 'g' | 'j' | 'k' | 'q' | 's' | 'x' | 'z' => Some('2'),
        'd' | 't' => Some('3'),
        'l' => Some('4'),
        'm' | 'n' => Some('5'),
        'r' => Some('6'),
        _ => None,
    }
}

fn phonetic_word(word: &str, out: &mut String) {
    let mut chars = word.chars();
    let Some(first) = chars.next() else {
        return;
    };
    out.push(first);

    let mut last = consonant_class(first);
    let mut digits = 0;
    for c in chars {
        if digits == 3 {
            break;
        }
        match c {
            'h' | 'w' => continue,
            _ => match consonant_class(c) {
                Some(code) if Some(code) != last => {
                    out.push(code);
                    digits += 1;
                    last = Some(code);
                }
                Some(_) => {}
                None => last = None,
            },
        }
    }
    for _ in digits..3 {
        out.push('0');
    }
}

/// Phonetic key of already normalized text, one code per word.
pub fn phonetic_key(normalized: &str) -> String {
    let mut out = String::with_capacity(normalized.len());
    for (i, word) in normalized.split(' ').filter(|w| !w.is_empty()).enumerate() {
        if i > 0 {
            out.push(' ');
        }
        phonetic_word(word, &mut out);
    }
    out
}

/// Fingerprint of raw text, or `None` when nothing indexable remains.
pub fn fingerprint(text: &str) -> Option<u32> {
    let normalized = normalize_text(text);
    if normalized.is_empty() {
        return None;
    }
    Some(fingerprint_normalized(&normalized))
}

fn fingerprint_normalized(normalized: &str) -> u32 {
    crc32fast::hash(phonetic_key(normalized).as_bytes())
}

/// Fingerprints of the one-edit variants of `normalized` that can change
/// its phonetic key, excluding its own fingerprint: every deletion, every
/// adjacent transposition, and every substitution of or insertion before a
/// word's first letter.
pub fn neighbor_fingerprints(normalized: &str) -> BTreeSet<u32> {
    let chars: Vec<char> = normalized.chars().collect();
    let own = fingerprint_normalized(normalized);
    let mut out = BTreeSet::new();

    let mut probe = |variant: String| {
        let variant = normalize_text(&variant);
        if !variant.is_empty() {
            let fp = fingerprint_normalized(&variant);
            if fp != own {
                out.insert(fp);
            }
        }
    };

    for skip in 0..chars.len() {
        probe(
            chars
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != skip)
                .map(|(_, c)| c)
                .collect(),
        );
    }
    for i in 1..chars.len() {
        if chars[i] != chars[i - 1] {
            let mut swapped = chars.clone();
            swapped.swap(i - 1, i);
            probe(swapped.into_iter().collect());
        }
    }

    let word_starts = (0..chars.len()).filter(|&i| chars[i] != ' ' && (i == 0 || chars[i - 1] == ' '));
    for start in word_starts {
        for letter in 'a'..='z' {
            if letter != chars[start] {
                let mut substituted = chars.clone();
                substituted[start] = letter;
                probe(substituted.into_iter().collect());
            }
            let mut inserted = chars.clone();
            inserted.insert(start, letter);
            probe(inserted.into_iter().collect());
        }
    }
    out
}

/// Edit distance between two strings, by characters.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0usize; b.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            cur[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

/// Distance used to rank fuzzy hits: edit distance of the normalized texts.
pub fn text_distance(query: &str, value: &str) -> usize {
    levenshtein(&normalize_text(query), &normalize_text(value))
}

/// Candidate ranks of a fuzzy lookup, before verification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FuzzyCandidates {
    /// Records sharing the query's fingerprint.
    pub exact: Vec<Rank>,
    /// Records matching only a neighbor fingerprint.
    pub near: Vec<Rank>,
}

impl FuzzyCandidates {
    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.near.is_empty()
    }
}

/// Sorted `{fingerprint, rank}` table over one attribute.
#[derive(Debug, Clone)]
pub struct FuzzyIndex {
    attribute: String,
    table: AttributeTable,
}

impl FuzzyIndex {
    pub fn from_slice(attribute: &str, slice: IndexSlice) -> Result<Self> {
        Ok(FuzzyIndex {
            attribute: attribute.to_string(),
            table: AttributeTable::new(slice, FUZZY_KEY_LEN, 0)?,
        })
    }

    /// Serialize `(fingerprint, rank)` pairs.
    pub fn build(entries: Vec<(u32, Rank)>) -> Vec<u8> {
        let entries = entries
            .into_iter()
            .map(|(fp, rank)| (fp.to_le_bytes().to_vec(), rank))
            .collect();
        pack_records(&[], entries, FUZZY_KEY_LEN)
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn table(&self) -> &AttributeTable {
        &self.table
    }

    fn ranks_of(&self, fp: u32) -> impl Iterator<Item = Rank> + '_ {
        let key = fp.to_le_bytes();
        let range = self.table.equal_range(|stored| stored.cmp(key.as_slice()));
        self.table.ranks(range)
    }

    /// Exact and neighbor candidates for `text`, each ascending by rank.
    pub fn lookup(&self, text: &str) -> FuzzyCandidates {
        let normalized = normalize_text(text);
        if normalized.is_empty() {
            return FuzzyCandidates::default();
        }

        let exact: BTreeSet<Rank> = self.ranks_of(fingerprint_normalized(&normalized)).collect();
        let near: BTreeSet<Rank> = neighbor_fingerprints(&normalized)
            .into_iter()
            .flat_map(|fp| self.ranks_of(fp).collect::<Vec<_>>())
            .filter(|rank| !exact.contains(rank))
            .collect();

        FuzzyCandidates {
            exact: exact.into_iter().collect(),
            near: near.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn load(texts: &[&str]) -> FuzzyIndex {
        let entries = texts
            .iter()
            .enumerate()
            .filter_map(|(rank, t)| fingerprint(t).map(|fp| (fp, rank as Rank)))
            .collect();
        let buf: Arc<[u8]> = FuzzyIndex::build(entries).into();
        FuzzyIndex::from_slice("name", IndexSlice::whole(buf)).unwrap()
    }

    #[test]
    fn test_phonetic_key() {
        assert_eq!(phonetic_key("harry"), "h600");
        assert_eq!(phonetic_key("harri"), "h600");
        assert_eq!(phonetic_key("potter"), "p360");
        assert_eq!(phonetic_key("robert"), "r163");
        assert_eq!(phonetic_key("rupert"), "r163");
        assert_eq!(phonetic_key("ashcraft"), "a261");
        assert_eq!(phonetic_key("liz"), "l200");
        assert_eq!(phonetic_key("harry potter"), "h600 p360");
        assert_eq!(phonetic_key(""), "");
    }

    #[test]
    fn test_fingerprint_ignores_case_and_punctuation() {
        assert_eq!(fingerprint("Harry Potter"), fingerprint("  harry, POTTER "));
        assert_eq!(fingerprint("Harri Potter"), fingerprint("Harry Potter"));
        assert_ne!(fingerprint("Harry"), fingerprint("Mary"));
        assert_eq!(fingerprint("--"), None);
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("harry", "harri"), 1);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(text_distance("Harri Potter", "Harry Potter"), 1);
    }

    #[test]
    fn test_lookup_tolerates_one_edit() {
        let index = load(&["Harry Potter", "Mary Poppins", "Liz", "Ron Weasley"]);
        let hits = index.lookup("Harri Potter");
        assert_eq!(hits.exact, vec![0]);

        // swapping the first letters changes the phonetic key
        let hits = index.lookup("Orn Weasley");
        assert!(hits.exact.is_empty());
        assert_eq!(hits.near, vec![3]);

        assert!(index.lookup("Zebedee").is_empty());
        assert!(index.lookup("   ").is_empty());
    }

    #[test]
    fn test_lookup_tolerates_edits_to_first_letters() {
        let index = load(&["Harry Potter", "Mary Poppins"]);
        for query in ["Barry Potter", "arry Potter", "Harry Botter", "Harry otter", "Hharry Potter"] {
            let hits = index.lookup(query);
            assert!(
                hits.exact.contains(&0) || hits.near.contains(&0),
                "{query} should find Harry Potter"
            );
            assert_eq!(text_distance(query, "Harry Potter"), 1);
        }
        assert!(index.lookup("Barry Botter").is_empty());
    }

    #[test]
    fn test_exact_hits_are_not_repeated_as_near() {
        let index = load(&["Harry", "Harry", "Hary"]);
        let hits = index.lookup("Harry");
        assert_eq!(hits.exact, vec![0, 1, 2]);
        assert!(hits.near.is_empty());
    }
}
