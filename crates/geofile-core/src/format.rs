//! Index file container.
//!
//! ## Layout
//!
//! ```text
//! offset 0   "GEOFILEX"                      8 bytes
//!        8   record count          u32 LE
//!       12   index count           u32 LE
//!       16   metadata[index count] 68 bytes each
//!              attribute   50 bytes, zero padded
//!              type        10 bytes, zero padded
//!              offset      u32 LE (from start of file)
//!              length      u32 LE
//!        ..  index regions, contiguous, in metadata order
//! ```
//!
//! Names that do not fit their field are rejected, never truncated.

use crate::error::{GeofileError, Result};
use crate::index::handle::HANDLE_RECORD_SIZE;
use crate::index::{Index, IndexBuffer, IndexSet, IndexSlice, IndexType};
use std::sync::Arc;
use tracing::{debug, instrument};

/// File signature at offset 0.
pub const SIGNATURE: &[u8; 8] = b"GEOFILEX";

/// Size of the fixed header.
pub const HEADER_SIZE: usize = 16;

/// Size of one metadata record.
pub const METADATA_SIZE: usize = 68;

/// Width of the attribute name field.
pub const ATTRIBUTE_FIELD_LEN: usize = 50;

/// Width of the type name field.
pub const TYPE_FIELD_LEN: usize = 10;

/// Decoded fixed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    pub count: u32,
    pub index_count: u32,
}

/// One decoded metadata record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMetadata {
    pub attribute: String,
    pub kind: IndexType,
    pub offset: u32,
    pub length: u32,
}

fn write_name(out: &mut Vec<u8>, name: &str, width: usize, field: &'static str) -> Result<()> {
    let bytes = name.as_bytes();
    if bytes.len() > width {
        return Err(GeofileError::NameTooLong {
            field,
            value: name.to_string(),
            max: width,
        });
    }
    out.extend_from_slice(bytes);
    out.resize(out.len() + width - bytes.len(), 0);
    Ok(())
}

fn read_name(bytes: &[u8]) -> Result<String> {
    let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    String::from_utf8(bytes[..end].to_vec())
        .map_err(|_| GeofileError::format("metadata name is not valid UTF-8"))
}

fn le_u32(bytes: &[u8], at: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(b)
}

/// Lay out built index buffers as one index file.
///
/// The record count is taken from the handle index, which must be present
/// exactly once.
#[instrument(skip(buffers), fields(indexes = buffers.len()))]
pub fn serialize(buffers: &[IndexBuffer]) -> Result<Vec<u8>> {
    let mut handle_buffers = buffers.iter().filter(|b| b.kind == IndexType::Handle);
    let handles = handle_buffers
        .next()
        .ok_or_else(|| GeofileError::Internal("no handle index to serialize".into()))?;
    if handle_buffers.next().is_some() {
        return Err(GeofileError::Internal("more than one handle index to serialize".into()));
    }
    let count = u32::try_from(handles.bytes.len() / HANDLE_RECORD_SIZE)
        .map_err(|_| GeofileError::format("record count exceeds u32"))?;
    let index_count = u32::try_from(buffers.len())
        .map_err(|_| GeofileError::format("index count exceeds u32"))?;

    let table_end = HEADER_SIZE + METADATA_SIZE * buffers.len();
    let total = buffers
        .iter()
        .try_fold(table_end, |acc, b| acc.checked_add(b.bytes.len()))
        .filter(|total| *total <= u32::MAX as usize)
        .ok_or_else(|| GeofileError::format("index file would exceed 4 GiB"))?;

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(SIGNATURE);
    out.extend_from_slice(&count.to_le_bytes());
    out.extend_from_slice(&index_count.to_le_bytes());

    let mut offset = table_end;
    for buffer in buffers {
        write_name(&mut out, &buffer.attribute, ATTRIBUTE_FIELD_LEN, "attribute")?;
        write_name(&mut out, buffer.kind.as_str(), TYPE_FIELD_LEN, "type")?;
        out.extend_from_slice(&(offset as u32).to_le_bytes());
        out.extend_from_slice(&(buffer.bytes.len() as u32).to_le_bytes());
        offset += buffer.bytes.len();
    }
    for buffer in buffers {
        out.extend_from_slice(&buffer.bytes);
    }

    debug!(records = count, bytes = out.len(), "Serialized index file");
    Ok(out)
}

/// Validate the signature and decode the header.
pub fn read_header(bytes: &[u8]) -> Result<IndexHeader> {
    if bytes.len() < SIGNATURE.len() || &bytes[..SIGNATURE.len()] != SIGNATURE {
        return Err(GeofileError::format("bad signature"));
    }
    if bytes.len() < HEADER_SIZE {
        return Err(GeofileError::format("truncated header"));
    }
    Ok(IndexHeader {
        count: le_u32(bytes, 8),
        index_count: le_u32(bytes, 12),
    })
}

/// Decode the header and every metadata record without touching the
/// index regions themselves.
pub fn read_layout(bytes: &[u8]) -> Result<(IndexHeader, Vec<IndexMetadata>)> {
    let header = read_header(bytes)?;
    let table_end = (header.index_count as usize)
        .checked_mul(METADATA_SIZE)
        .and_then(|n| n.checked_add(HEADER_SIZE))
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| GeofileError::format("truncated metadata table"))?;

    let mut metadata = Vec::with_capacity(header.index_count as usize);
    for record in bytes[HEADER_SIZE..table_end].chunks_exact(METADATA_SIZE) {
        let attribute = read_name(&record[..ATTRIBUTE_FIELD_LEN])?;
        let kind: IndexType = read_name(&record[ATTRIBUTE_FIELD_LEN..ATTRIBUTE_FIELD_LEN + TYPE_FIELD_LEN])?
            .parse()?;
        let offset = le_u32(record, ATTRIBUTE_FIELD_LEN + TYPE_FIELD_LEN);
        let length = le_u32(record, ATTRIBUTE_FIELD_LEN + TYPE_FIELD_LEN + 4);
        if (offset as usize) < table_end {
            return Err(GeofileError::format(format!(
                "{} index on '{}' overlaps the metadata table",
                kind, attribute
            )));
        }
        metadata.push(IndexMetadata {
            attribute,
            kind,
            offset,
            length,
        });
    }
    Ok((header, metadata))
}

/// Decode an index file into a validated [`IndexSet`].
///
/// Index objects are views into `buf`; nothing is copied.
#[instrument(skip(buf), fields(bytes = buf.len()))]
pub fn parse(buf: Arc<[u8]>) -> Result<IndexSet> {
    let (header, metadata) = read_layout(&buf)?;
    let mut indexes = Vec::with_capacity(metadata.len());
    for meta in &metadata {
        let slice = IndexSlice::new(Arc::clone(&buf), meta.offset as usize, meta.length as usize)?;
        let index = Index::from_slice(&meta.attribute, meta.kind, slice)?;
        debug!(attribute = %meta.attribute, kind = %meta.kind, entries = index.entry_count(), "Index region");
        indexes.push(index);
    }
    IndexSet::new(header.count, indexes)
}
