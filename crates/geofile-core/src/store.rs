//! On-disk index files.
//!
//! An index file lives next to its data file (`<data file>.idx` by default).
//! Writes are atomic: the new file is written to `<index>.tmp`, the previous
//! file is kept as `<index>.bak`, then the temp file is renamed into place.

use crate::error::{GeofileError, Result};
use crate::format;
use crate::index::IndexSet;
use crate::source::{read_all, ByteSource, FileSource};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Handles index file persistence.
#[derive(Debug, Clone)]
pub struct IndexStore {
    path: PathBuf,
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

impl IndexStore {
    /// Store for an index file at `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        IndexStore {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Store for the default index of `data_path`: `<data_path>.idx`.
    pub fn for_data_file(data_path: impl AsRef<Path>) -> Self {
        IndexStore::new(with_suffix(data_path.as_ref(), ".idx"))
    }

    /// Path of the index file.
    pub fn index_path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> PathBuf {
        with_suffix(&self.path, ".bak")
    }

    fn temp_path(&self) -> PathBuf {
        with_suffix(&self.path, ".tmp")
    }

    /// Check if an index file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Write serialized index bytes.
    ///
    /// Uses atomic write (write to temp, then rename) to prevent corruption.
    pub fn save(&self, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        info!(path = %self.path.display(), bytes = bytes.len(), "Saving index file");

        let temp_path = self.temp_path();
        {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);
            writer.write_all(bytes)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }

        let backup_path = self.backup_path();
        if self.path.exists() {
            let _ = fs::remove_file(&backup_path);
            let _ = fs::rename(&self.path, &backup_path);
        }

        fs::rename(&temp_path, &self.path)?;
        debug!(path = %self.path.display(), "Index file saved");
        Ok(())
    }

    fn read_file(path: &Path) -> Result<Arc<[u8]>> {
        if !path.exists() {
            return Err(GeofileError::IndexFileMissing {
                path: path.to_path_buf(),
            });
        }
        let source = FileSource::open(path)?;
        debug!(source = %source.describe(), bytes = source.size(), "Reading index file");
        read_all(&source)
    }

    /// Raw bytes of the index file.
    pub fn load_bytes(&self) -> Result<Arc<[u8]>> {
        Self::read_file(&self.path)
    }

    /// Load and validate the index file.
    pub fn load(&self) -> Result<IndexSet> {
        info!(path = %self.path.display(), "Loading index file");
        let set = format::parse(self.load_bytes()?)?;
        info!(records = set.count(), indexes = set.describe().len(), "Index file loaded");
        Ok(set)
    }

    /// Delete the index file and its backup.
    pub fn clear(&self) -> Result<()> {
        let backup_path = self.backup_path();

        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        if backup_path.exists() {
            fs::remove_file(&backup_path)?;
        }

        Ok(())
    }

    /// Restore from backup if the main index file is corrupted.
    pub fn restore_from_backup(&self) -> Result<IndexSet> {
        let backup_path = self.backup_path();
        let set = format::parse(Self::read_file(&backup_path)?)?;
        fs::copy(&backup_path, &self.path)?;
        info!(path = %self.path.display(), "Index restored from backup");
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeofileConfig;
    use crate::index::IndexBuilder;
    use crate::parser::ParsedRecord;
    use crate::types::Handle;
    use tempfile::TempDir;

    fn index_bytes(count: u32) -> Vec<u8> {
        let mut builder = IndexBuilder::new(&[], &GeofileConfig::default()).unwrap();
        for rank in 0..count {
            builder
                .add(&ParsedRecord {
                    handle: Handle::new(rank, rank as u64 * 8, 7),
                    feature: None,
                })
                .unwrap();
        }
        format::serialize(&builder.finish().unwrap()).unwrap()
    }

    #[test]
    fn test_default_path() {
        let store = IndexStore::for_data_file("/data/places.csv");
        assert_eq!(store.index_path(), Path::new("/data/places.csv.idx"));
        assert_eq!(store.backup_path(), PathBuf::from("/data/places.csv.idx.bak"));
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = IndexStore::for_data_file(temp_dir.path().join("places.csv"));

        store.save(&index_bytes(3)).unwrap();
        assert!(store.exists());
        assert!(!store.temp_path().exists());
        assert_eq!(store.load().unwrap().count(), 3);
    }

    #[test]
    fn test_save_keeps_backup() {
        let temp_dir = TempDir::new().unwrap();
        let store = IndexStore::new(temp_dir.path().join("nested").join("x.idx"));

        store.save(&index_bytes(2)).unwrap();
        store.save(&index_bytes(5)).unwrap();
        assert_eq!(store.load().unwrap().count(), 5);
        assert!(store.backup_path().exists());

        // corrupt the main file, then recover
        fs::write(store.index_path(), b"not a valid index file").unwrap();
        assert!(store.load().is_err());
        assert_eq!(store.restore_from_backup().unwrap().count(), 2);
        assert_eq!(store.load().unwrap().count(), 2);
    }

    #[test]
    fn test_load_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let store = IndexStore::new(temp_dir.path().join("missing.idx"));
        assert!(matches!(store.load(), Err(GeofileError::IndexFileMissing { .. })));
        assert!(store.restore_from_backup().is_err());
    }

    #[test]
    fn test_clear() {
        let temp_dir = TempDir::new().unwrap();
        let store = IndexStore::new(temp_dir.path().join("x.idx"));
        store.save(&index_bytes(1)).unwrap();
        store.save(&index_bytes(1)).unwrap();

        store.clear().unwrap();
        assert!(!store.exists());
        assert!(!store.backup_path().exists());
    }

    #[test]
    fn test_corrupted_index() {
        let temp_dir = TempDir::new().unwrap();
        let store = IndexStore::new(temp_dir.path().join("x.idx"));
        fs::write(store.index_path(), b"not a valid index file").unwrap();
        let err = store.load().unwrap_err();
        assert!(err.is_fatal_to_load());
    }
}
