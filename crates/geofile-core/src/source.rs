//! Byte source abstraction.
//!
//! The index engine reads data and index files exclusively through this
//! trait, always by explicit range. Nothing assumes a whole source fits in
//! memory; `FileSource` memory-maps the file and copies out only the range
//! a caller asks for.

use crate::error::{GeofileError, Result};
use memmap2::Mmap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Random-access reader over an immutable byte sequence.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`: the parser engine reads from a
/// producer thread while queries read from the caller's thread.
pub trait ByteSource: Send + Sync {
    /// Total size in bytes
    fn size(&self) -> u64;

    /// Read exactly `length` bytes starting at `offset`.
    ///
    /// Reading past the end is an `UnexpectedEof` I/O error.
    fn read(&self, offset: u64, length: usize) -> Result<Vec<u8>>;

    /// Read a range and decode it as UTF-8.
    fn read_text(&self, offset: u64, length: usize) -> Result<String> {
        let bytes = self.read(offset, length)?;
        String::from_utf8(bytes).map_err(|e| {
            GeofileError::Io(io::Error::new(io::ErrorKind::InvalidData, e))
        })
    }

    /// Human-readable origin, for logs
    fn describe(&self) -> String {
        format!("<{} bytes>", self.size())
    }
}

fn check_range(offset: u64, length: usize, size: u64) -> Result<(usize, usize)> {
    let end = offset.checked_add(length as u64);
    match end {
        Some(end) if end <= size => Ok((offset as usize, end as usize)),
        _ => Err(GeofileError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("read of {} bytes at {} exceeds source size {}", length, offset, size),
        ))),
    }
}

/// A read-only, memory-mapped file.
pub struct FileSource {
    path: PathBuf,
    map: Option<Mmap>,
}

impl FileSource {
    /// Open and map a file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let len = file.metadata()?.len();

        // Zero-length files cannot be mapped on every platform.
        let map = if len == 0 {
            None
        } else {
            // The mapping is read-only; files are treated as immutable while open.
            Some(unsafe { Mmap::map(&file)? })
        };

        debug!(path = %path.display(), bytes = len, "Opened file source");
        Ok(FileSource { path, map })
    }

    /// Path of the underlying file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSource for FileSource {
    fn size(&self) -> u64 {
        self.map.as_ref().map_or(0, |m| m.len() as u64)
    }

    fn read(&self, offset: u64, length: usize) -> Result<Vec<u8>> {
        let (start, end) = check_range(offset, length, self.size())?;
        match &self.map {
            Some(map) => Ok(map[start..end].to_vec()),
            None => Ok(Vec::new()),
        }
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// An in-memory byte source.
#[derive(Clone)]
pub struct MemorySource {
    name: String,
    bytes: Arc<[u8]>,
}

impl MemorySource {
    /// Wrap owned bytes.
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        MemorySource {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Build from text.
    pub fn from_text(name: impl Into<String>, text: &str) -> Self {
        MemorySource::new(name, text.as_bytes().to_vec())
    }

    /// The full contents, shared.
    pub fn bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }
}

impl ByteSource for MemorySource {
    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read(&self, offset: u64, length: usize) -> Result<Vec<u8>> {
        let (start, end) = check_range(offset, length, self.size())?;
        Ok(self.bytes[start..end].to_vec())
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// Read a whole source into one shared buffer (used for index files, which
/// are small relative to the data they describe).
pub fn read_all(source: &dyn ByteSource) -> Result<Arc<[u8]>> {
    let size = usize::try_from(source.size())
        .map_err(|_| GeofileError::format("index source too large for this platform"))?;
    Ok(source.read(0, size)?.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_memory_source_read() {
        let source = MemorySource::from_text("mem", "hello geofile");
        assert_eq!(source.size(), 13);
        assert_eq!(source.read(6, 7).unwrap(), b"geofile");
        assert_eq!(source.read_text(0, 5).unwrap(), "hello");
        assert_eq!(source.describe(), "mem");
    }

    #[test]
    fn test_read_past_end() {
        let source = MemorySource::from_text("mem", "abc");
        let err = source.read(2, 5).unwrap_err();
        assert!(matches!(err, GeofileError::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
        assert!(source.read(3, 0).unwrap().is_empty());
    }

    #[test]
    fn test_read_text_invalid_utf8() {
        let source = MemorySource::new("bin", vec![0xff, 0xfe]);
        assert!(source.read_text(0, 2).is_err());
    }

    #[test]
    fn test_file_source() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"-100,-100,Harry\n100,100,Mary\n").unwrap();
        file.flush().unwrap();

        let source = FileSource::open(file.path()).unwrap();
        assert_eq!(source.size(), 29);
        assert_eq!(source.read_text(16, 12).unwrap(), "100,100,Mary");
        assert!(source.read(20, 100).is_err());
    }

    #[test]
    fn test_empty_file_source() {
        let file = NamedTempFile::new().unwrap();
        let source = FileSource::open(file.path()).unwrap();
        assert_eq!(source.size(), 0);
        assert!(source.read(0, 0).unwrap().is_empty());
    }

    #[test]
    fn test_read_all() {
        let source = MemorySource::from_text("mem", "GEOFILEX");
        assert_eq!(&*read_all(&source).unwrap(), b"GEOFILEX");
    }
}
