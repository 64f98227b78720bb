//! # Geofile Core Library
//!
//! This crate provides random access to large geospatial data files without
//! loading them into memory: a streaming parser engine enumerates records
//! once to build a compact binary index, and queries then read only the
//! bytes they need.
//!
//! ## Architecture
//!
//! - **Sources** (`source`): Random-access byte sources (memory-mapped files, buffers)
//! - **Parser** (`parser`): Streaming engine driving per-format automata with backpressure
//! - **Index** (`index`): Handle, R-tree, ordered, fuzzy and prefix indexes
//! - **Format** (`format`): The `GEOFILEX` index file container
//! - **Store** (`store`): Atomic on-disk index files
//! - **Filter** (`filter`): The projection/filter/action/cap pipeline shared by all queries
//! - **Geofile** (`geofile`): The container tying a data file to its indexes
//! - **Config** (`config`): Configuration management
//!
//! Concrete formats (CSV, GeoJSON) live in the `geofile-formats` crate and
//! plug in through the [`Format`] trait.
//!
//! ## Example
//!
//! ```rust,ignore
//! use geofile_core::{BBox, FileSource, Geofile, IndexDefinition, QueryOptions};
//! use std::sync::Arc;
//!
//! let data = Arc::new(FileSource::open("places.csv")?);
//! let file = Geofile::new("places", data, Arc::new(csv_format));
//! file.build_indexes(&[IndexDefinition::prefix("name")])?;
//!
//! for feature in file.bbox(&BBox::new(-10.0, 40.0, 10.0, 50.0), &QueryOptions::new())? {
//!     println!("{} {:?}", feature.rank, feature.property("name"));
//! }
//! ```

pub mod config;
pub mod error;
pub mod filter;
pub mod format;
pub mod geofile;
pub mod index;
pub mod parser;
pub mod source;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::{DistanceMetric, GeofileConfig};
pub use error::{GeofileError, Result, SyntaxError};
pub use filter::{FeaturePipeline, Projection, QueryOptions};
pub use geofile::{Geofile, Radius};
pub use index::{normalize_text, IndexDefinition, IndexInfo, IndexSet, IndexType};
pub use parser::{Emitter, Format, FormatParser, ParsedRecord, ParserEngine, RecordDecoder, RecordStream};
pub use source::{ByteSource, FileSource, MemorySource};
pub use store::IndexStore;
pub use types::{BBox, Feature, Handle, RawRecord, Rank, DEFAULT_PROJECTION};
