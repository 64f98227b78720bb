//! Error types for the format plug-ins.

use geofile_core::{GeofileError, Rank};
use thiserror::Error;

/// Errors raised while configuring a format or decoding one record.
#[derive(Error, Debug)]
pub enum FormatsError {
    /// An option value the format cannot work with
    #[error("invalid {format} option {option}: {reason}")]
    InvalidOption {
        format: &'static str,
        option: &'static str,
        reason: String,
    },

    /// No format registered under this name or extension
    #[error("unknown format '{name}' (expected csv or geojson)")]
    UnknownFormat { name: String },

    /// A geometry object that is not valid GeoJSON
    #[error("invalid geometry: {reason}")]
    Geometry { reason: String },

    /// A record that is not valid JSON
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A record that is not valid UTF-8
    #[error("invalid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

impl FormatsError {
    pub fn geometry(reason: impl Into<String>) -> Self {
        FormatsError::Geometry {
            reason: reason.into(),
        }
    }

    /// Attach a record rank, turning this into a record-local decode error.
    pub fn at_rank(self, rank: Rank) -> GeofileError {
        GeofileError::decode(rank, self.to_string())
    }
}

impl From<FormatsError> for GeofileError {
    fn from(err: FormatsError) -> Self {
        GeofileError::Config {
            reason: err.to_string(),
        }
    }
}
