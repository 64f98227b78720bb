//! Exact-match attribute index.
//!
//! Keys are a 24-byte order-preserving encoding of the JSON value: a type
//! tag followed by a payload. Byte order of the encoding is the value order,
//! with a missing value (`null`) sorting before everything else:
//!
//! | tag | value            | payload                                   |
//! |-----|------------------|-------------------------------------------|
//! | 0   | null / missing   | zeros                                     |
//! | 1   | bool             | 0 or 1                                    |
//! | 2   | number           | f64 bits, sign flipped, big-endian        |
//! | 3   | string           | UTF-8 bytes, truncated, zero padded       |
//! | 4   | array / object   | compact JSON text, truncated, zero padded |
//!
//! Truncated keys may collide, so candidates must be confirmed against the
//! decoded feature with [`value_matches`].

use super::attribute::{pack_records, AttributeTable};
use super::IndexSlice;
use crate::error::Result;
use crate::types::{Feature, Rank};
use serde_json::Value;

/// Bytes of encoded key per record.
pub const ORDERED_KEY_LEN: usize = 24;

const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_NUMBER: u8 = 2;
const TAG_STRING: u8 = 3;
const TAG_COMPOSITE: u8 = 4;

/// Order-preserving key of an attribute value; `None` is a missing value.
pub fn encode_key(value: Option<&Value>) -> Vec<u8> {
    let mut key = vec![0u8; ORDERED_KEY_LEN];
    let payload_len = ORDERED_KEY_LEN - 1;
    match value {
        None | Some(Value::Null) => key[0] = TAG_NULL,
        Some(Value::Bool(b)) => {
            key[0] = TAG_BOOL;
            key[1] = u8::from(*b);
        }
        Some(Value::Number(n)) => {
            key[0] = TAG_NUMBER;
            key[1..9].copy_from_slice(&number_bits(n.as_f64().unwrap_or(f64::NAN)));
        }
        Some(Value::String(s)) => {
            key[0] = TAG_STRING;
            let bytes = s.as_bytes();
            let n = bytes.len().min(payload_len);
            key[1..1 + n].copy_from_slice(&bytes[..n]);
        }
        Some(composite) => {
            key[0] = TAG_COMPOSITE;
            let text = composite.to_string();
            let bytes = text.as_bytes();
            let n = bytes.len().min(payload_len);
            key[1..1 + n].copy_from_slice(&bytes[..n]);
        }
    }
    key
}

fn number_bits(x: f64) -> [u8; 8] {
    // -0.0 and 0.0 must encode alike
    let x = if x == 0.0 { 0.0 } else { x };
    let bits = x.to_bits();
    let flipped = if bits >> 63 == 1 { !bits } else { bits ^ (1 << 63) };
    flipped.to_be_bytes()
}

/// Whether a stored value equals a queried one. Numbers compare by value
/// (`1` matches `1.0`); a missing value matches `null`.
pub fn value_matches(stored: Option<&Value>, query: &Value) -> bool {
    match (stored.unwrap_or(&Value::Null), query) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (a, b) => a == b,
    }
}

/// Confirm that `feature` carries `value` under `attribute`.
pub fn feature_matches(feature: &Feature, attribute: &str, value: &Value) -> bool {
    value_matches(feature.property(attribute), value)
}

/// Sorted `{key, rank}` table over one attribute.
#[derive(Debug, Clone)]
pub struct OrderedIndex {
    attribute: String,
    table: AttributeTable,
}

impl OrderedIndex {
    pub fn from_slice(attribute: &str, slice: IndexSlice) -> Result<Self> {
        Ok(OrderedIndex {
            attribute: attribute.to_string(),
            table: AttributeTable::new(slice, ORDERED_KEY_LEN, 0)?,
        })
    }

    /// Serialize `(key, rank)` pairs produced by [`encode_key`].
    pub fn build(entries: Vec<(Vec<u8>, Rank)>) -> Vec<u8> {
        pack_records(&[], entries, ORDERED_KEY_LEN)
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

    /// Candidate ranks whose key equals the key of `value`, ascending.
    pub fn lookup(&self, value: &Value) -> Vec<Rank> {
        let key = encode_key(Some(value));
        let range = self.table.equal_range(|stored| stored.cmp(key.as_slice()));
        self.table.ranks(range).collect()
    }
}
