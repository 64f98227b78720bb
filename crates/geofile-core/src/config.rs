//! Configuration management for Geofile.
//!
//! This module provides configuration loading, saving, and defaults.
//! Configuration is stored in TOML format in a platform-appropriate location.

use crate::error::{GeofileError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure for Geofile.
///
/// ## Example Configuration File (geofile.toml)
///
/// ```toml
/// [parser]
/// workers = 4
/// max_pending = 256
///
/// [rtree]
/// node_size = 16
///
/// [search]
/// nearest_radii = [0.001, 0.01, 0.1, 1.0]
/// prefix_length = 16
/// metric = "euclidean"
///
/// [csv]
/// separator = ","
/// header = true
/// lonlat = [0, 1]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeofileConfig {
    /// Streaming parser settings
    pub parser: ParserConfig,

    /// Spatial index build settings
    pub rtree: RtreeConfig,

    /// Query settings
    pub search: SearchConfig,

    /// Defaults for the delimited-text plug-in
    pub csv: CsvConfig,

    /// General settings
    pub general: GeneralConfig,
}

/// Streaming parser configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Number of decode worker threads
    pub workers: usize,

    /// Maximum number of records emitted but not yet decoded
    pub max_pending: usize,

    /// Bytes requested from the source per read
    pub chunk_size: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(4);
        ParserConfig {
            workers,
            max_pending: 256,
            chunk_size: 64 * 1024,
        }
    }
}

/// Spatial index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RtreeConfig {
    /// Branching factor used when packing the tree
    pub node_size: usize,
}

impl Default for RtreeConfig {
    fn default() -> Self {
        RtreeConfig { node_size: 16 }
    }
}

/// Query configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Half-width of the box used by point queries
    pub point_tolerance: f64,

    /// Successively larger radii tried by nearest-neighbor queries
    pub nearest_radii: Vec<f64>,

    /// Bytes of each token stored in prefix indexes
    pub prefix_length: usize,

    /// Default cap on edit distance for fuzzy results (None = no cap)
    pub max_text_distance: Option<usize>,

    /// Distance used by nearest-neighbor queries
    pub metric: DistanceMetric,
}

/// How `nearest` measures distance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Planar distance in coordinate units; radii are in coordinate units
    #[default]
    Euclidean,
    /// Great-circle distance in meters over lon/lat; radii are in meters
    Haversine,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            point_tolerance: 1e-9,
            nearest_radii: vec![0.001, 0.01, 0.1, 1.0],
            prefix_length: 16,
            max_text_distance: None,
            metric: DistanceMetric::Euclidean,
        }
    }
}

/// Delimited text defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvConfig {
    /// Field separator
    pub separator: char,

    /// Whether the first non-skipped line holds column names
    pub header: bool,

    /// Number of leading lines to ignore
    pub skip: usize,

    /// Lines starting with this prefix are ignored
    pub comment: Option<String>,

    /// Column indices holding longitude and latitude
    pub lonlat: Option<[usize; 2]>,
}

impl Default for CsvConfig {
    fn default() -> Self {
        CsvConfig {
            separator: ',',
            header: false,
            skip: 0,
            comment: None,
            lonlat: None,
        }
    }
}

/// General configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Maximum number of features a CLI query prints
    pub max_results: usize,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            max_results: 1000,
            log_level: "info".to_string(),
        }
    }
}

impl GeofileConfig {
    /// Load configuration from the default location.
    ///
    /// Returns default config if no config file exists.
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(GeofileConfig::default());
        }

        info!(path = %path.display(), "Loading configuration");
        let contents = fs::read_to_string(path)?;
        let config: GeofileConfig = toml::from_str(&contents).map_err(|e| GeofileError::Config {
            reason: format!("Failed to parse config: {}", e),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        info!(path = %path.display(), "Saving configuration");
        let contents = toml::to_string_pretty(self).map_err(|e| GeofileError::Config {
            reason: format!("Failed to serialize config: {}", e),
        })?;

        fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "geofile").ok_or_else(|| GeofileError::Config {
            reason: "Could not determine config directory".to_string(),
        })?;

        Ok(dirs.config_dir().join("geofile.toml"))
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: &str| {
            Err(GeofileError::Config {
                reason: reason.to_string(),
            })
        };

        if self.parser.workers == 0 {
            return fail("parser.workers must be at least 1");
        }
        if self.parser.max_pending == 0 {
            return fail("parser.max_pending must be at least 1");
        }
        if self.parser.chunk_size == 0 {
            return fail("parser.chunk_size must be at least 1");
        }
        if self.rtree.node_size < 2 {
            return fail("rtree.node_size must be at least 2");
        }
        if self.search.prefix_length == 0 {
            return fail("search.prefix_length must be at least 1");
        }
        if !(self.search.point_tolerance >= 0.0) {
            return fail("search.point_tolerance must be non-negative");
        }
        let radii = &self.search.nearest_radii;
        if radii.is_empty() {
            return fail("search.nearest_radii must not be empty");
        }
        if radii.iter().any(|r| !(*r > 0.0)) || radii.windows(2).any(|w| w[1] <= w[0]) {
            return fail("search.nearest_radii must be positive and strictly increasing");
        }
        Ok(())
    }
}
