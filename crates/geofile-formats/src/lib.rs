//! # Geofile Formats
//!
//! Concrete data formats for the Geofile engine:
//!
//! - `csv.rs`: delimited text (separator, quoting, header, skipped and comment lines)
//! - `geojson.rs`: GeoJSON feature collections
//!
//! Both plug into [`geofile_core::Geofile`] through the [`Format`] trait.

pub mod csv;
pub mod error;
pub mod geojson;

pub use csv::{CsvFormat, CsvOptions};
pub use error::FormatsError;
pub use geojson::GeoJsonFormat;

use geofile_core::config::CsvConfig;
use geofile_core::{Format, GeofileConfig};
use std::path::Path;
use std::sync::Arc;

/// Names accepted by [`format_by_name`].
pub const FORMAT_NAMES: &[&str] = &["csv", "tsv", "geojson"];

/// Build a format by name, taking delimited-text defaults from `config`.
///
/// `tsv` is the csv format with a tab separator.
pub fn format_by_name(
    name: &str,
    config: &GeofileConfig,
) -> Result<Arc<dyn Format>, FormatsError> {
    match name.to_ascii_lowercase().as_str() {
        "csv" => {
            let options = CsvOptions::try_from(&config.csv)?;
            Ok(Arc::new(CsvFormat::new(options)?))
        }
        "tsv" => {
            let csv = CsvConfig {
                separator: '\t',
                ..config.csv.clone()
            };
            let options = CsvOptions::try_from(&csv)?;
            Ok(Arc::new(CsvFormat::new(options)?))
        }
        "geojson" | "json" => Ok(Arc::new(GeoJsonFormat::new())),
        _ => Err(FormatsError::UnknownFormat {
            name: name.to_string(),
        }),
    }
}

/// Guess a format name from a file extension.
pub fn detect(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "csv" | "txt" => Some("csv"),
        "tsv" => Some("tsv"),
        "geojson" | "json" => Some("geojson"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geofile_core::{ByteSource, MemorySource};

    #[test]
    fn test_detect() {
        assert_eq!(detect(Path::new("data/places.CSV")), Some("csv"));
        assert_eq!(detect(Path::new("world.geojson")), Some("geojson"));
        assert_eq!(detect(Path::new("cities.tsv")), Some("tsv"));
        assert_eq!(detect(Path::new("archive.zip")), None);
        assert_eq!(detect(Path::new("noext")), None);
    }

    #[test]
    fn test_format_by_name() {
        let config = GeofileConfig::default();
        assert_eq!(format_by_name("CSV", &config).unwrap().name(), "csv");
        assert_eq!(format_by_name("geojson", &config).unwrap().name(), "geojson");
        assert!(matches!(
            format_by_name("shapefile", &config),
            Err(FormatsError::UnknownFormat { .. })
        ));

        let bad = GeofileConfig {
            csv: CsvConfig {
                separator: '"',
                ..CsvConfig::default()
            },
            ..GeofileConfig::default()
        };
        assert!(format_by_name("csv", &bad).is_err());
    }

    #[test]
    fn test_tsv_splits_on_tabs() {
        let config = GeofileConfig {
            csv: CsvConfig {
                header: true,
                lonlat: Some([1, 2]),
                ..CsvConfig::default()
            },
            ..GeofileConfig::default()
        };
        let format = format_by_name("tsv", &config).unwrap();
        let source = MemorySource::from_text("cities.tsv", "name\tlon\tlat\nParis, France\t2.35\t48.85\n");
        let decoder = format.decoder(&source).unwrap();

        let bytes = source.read(13, 24).unwrap();
        let record = geofile_core::RawRecord::new(geofile_core::Handle::new(0, 13, 24), bytes);
        let feature = decoder.decode(&record).unwrap();
        assert_eq!(feature.property_text("name").as_deref(), Some("Paris, France"));
        assert_eq!(feature.property_text("lat").as_deref(), Some("48.85"));
        assert!(feature.geometry.is_some());
    }
}
