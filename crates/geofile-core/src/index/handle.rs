//! The mandatory record locator table.
//!
//! Record `r` of the table is the handle of rank `r`; ranks are implicit.

use super::{read_u32, read_u64, IndexSlice};
use crate::error::{GeofileError, Result};
use crate::types::{Handle, Rank};

/// Bytes per handle record: `pos:u64 LE, len:u32 LE`.
pub const HANDLE_RECORD_SIZE: usize = 12;

/// rank -> (pos, len) lookup table.
#[derive(Debug, Clone)]
pub struct HandleIndex {
    slice: IndexSlice,
    count: u32,
}

impl HandleIndex {
    pub fn from_slice(slice: IndexSlice) -> Result<Self> {
        if slice.len() % HANDLE_RECORD_SIZE != 0 {
            return Err(GeofileError::format(format!(
                "handle index length {} is not a multiple of {}",
                slice.len(),
                HANDLE_RECORD_SIZE
            )));
        }
        let count = u32::try_from(slice.len() / HANDLE_RECORD_SIZE)
            .map_err(|_| GeofileError::format("handle index holds more than u32::MAX records"))?;
        Ok(HandleIndex { slice, count })
    }

    /// Serialize handles, which must carry dense ranks `0..n` in order.
    pub fn build(handles: &[Handle]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(handles.len() * HANDLE_RECORD_SIZE);
        for (i, handle) in handles.iter().enumerate() {
            if handle.rank as usize != i {
                return Err(GeofileError::Internal(format!(
                    "handle at position {} carries rank {}",
                    i, handle.rank
                )));
            }
            out.extend_from_slice(&handle.pos.to_le_bytes());
            out.extend_from_slice(&handle.len.to_le_bytes());
        }
        Ok(out)
    }

    /// Number of records.
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn byte_len(&self) -> usize {
        self.slice.len()
    }

    /// Handle of `rank`, O(1).
    pub fn get(&self, rank: Rank) -> Result<Handle> {
        if rank >= self.count {
            return Err(GeofileError::RankOutOfRange {
                rank,
                count: self.count,
            });
        }
        let at = rank as usize * HANDLE_RECORD_SIZE;
        let bytes = self.slice.as_bytes();
        Ok(Handle::new(rank, read_u64(bytes, at), read_u32(bytes, at + 8)))
    }

    /// All handles in rank order.
    pub fn iter(&self) -> impl Iterator<Item = Handle> + '_ {
        (0..self.count).filter_map(move |rank| self.get(rank).ok())
    }
}
