//! Application state management.

use crate::DataArgs;
use anyhow::Context;
use geofile_core::{ByteSource, FileSource, Format, Geofile, GeofileConfig, IndexStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// One data file with its format and index store.
pub struct App {
    /// Configuration
    pub config: GeofileConfig,

    /// The data file
    pub data_path: PathBuf,

    /// Index persistence
    pub store: IndexStore,

    /// Data format plug-in
    pub format: Arc<dyn Format>,

    data: Arc<dyn ByteSource>,
}

impl App {
    /// Resolve the format and index location for `args`.
    pub fn new(config: GeofileConfig, args: DataArgs) -> anyhow::Result<Self> {
        let format_name = match args.format.as_deref() {
            Some(name) => name,
            None => geofile_formats::detect(&args.data).with_context(|| {
                format!(
                    "cannot detect the format of {}, pass --format ({})",
                    args.data.display(),
                    geofile_formats::FORMAT_NAMES.join(", ")
                )
            })?,
        };
        let format = geofile_formats::format_by_name(format_name, &config)?;
        let data: Arc<dyn ByteSource> = Arc::new(
            FileSource::open(&args.data)
                .with_context(|| format!("cannot open {}", args.data.display()))?,
        );
        let store = match args.index {
            Some(path) => IndexStore::new(path),
            None => IndexStore::for_data_file(&args.data),
        };

        info!(
            data = %args.data.display(),
            format = format.name(),
            index = %store.index_path().display(),
            "Application initialized"
        );

        Ok(App {
            config,
            data_path: args.data,
            store,
            format,
            data,
        })
    }

    fn name(&self) -> String {
        self.data_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.data_path.display().to_string())
    }

    /// An unopened container over the data file.
    pub fn geofile(&self) -> Geofile {
        Geofile::new(self.name(), Arc::clone(&self.data), Arc::clone(&self.format))
            .with_config(self.config.clone())
    }

    /// A container opened on the stored index file.
    pub fn open(&self) -> anyhow::Result<Geofile> {
        if !self.store.exists() {
            anyhow::bail!(
                "no index file at {}, run 'geofile index {}' first",
                self.store.index_path().display(),
                self.data_path.display()
            );
        }
        let index: Arc<dyn ByteSource> = Arc::new(FileSource::open(self.store.index_path())?);
        let file = self.geofile().with_index_source(index);
        file.open()?;
        Ok(file)
    }
}
