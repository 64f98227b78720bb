//! Error types for Geofile core operations.
//!
//! This module defines well-structured error types using `thiserror` for
//! library-level errors, while higher-level code can use `anyhow` for
//! convenient error handling.

use crate::index::IndexType;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using GeofileError
pub type Result<T> = std::result::Result<T, GeofileError>;

/// A structural error raised by a format automaton while streaming bytes.
///
/// Positions are 1-based and counted by the parser engine, so automata
/// only need to supply the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
    pub line: u64,
    pub col: u64,
}

impl SyntaxError {
    /// Create a syntax error without position; the engine fills it in.
    pub fn new(message: impl Into<String>) -> Self {
        SyntaxError {
            message: message.into(),
            line: 0,
            col: 0,
        }
    }

    /// Attach a line/column position.
    pub fn at(mut self, line: u64, col: u64) -> Self {
        self.line = line;
        self.col = col;
        self
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at line {}, col {}", self.message, self.line, self.col)
    }
}

/// Core error types for Geofile operations.
///
/// The variants follow the failure classes callers handle differently:
/// format errors leave a container unloaded, syntax errors abort a build,
/// range errors are local to one query, decode errors are local to one record.
#[derive(Error, Debug)]
pub enum GeofileError {
    // === Format Errors ===
    /// The index file is malformed (signature, truncation, count mismatch)
    #[error("invalid index file: {reason}")]
    Format { reason: String },

    // === Parse Errors ===
    /// Malformed data file bytes encountered while streaming
    #[error("syntax error: {0}")]
    Syntax(SyntaxError),

    /// A single record could not be decoded into a feature
    #[error("cannot decode record {rank}: {reason}")]
    Decode { rank: u32, reason: String },

    // === Range Errors ===
    /// Requested rank is outside `[0, count)`
    #[error("rank {rank} out of range (record count {count})")]
    RankOutOfRange { rank: u32, count: u32 },

    /// No index exists for the requested attribute and type
    #[error("no {kind} index on attribute '{attribute}'")]
    IndexNotFound { attribute: String, kind: IndexType },

    /// No index file exists at the expected location
    #[error("index file not found: {}", path.display())]
    IndexFileMissing { path: PathBuf },

    /// The container has not been opened (or was closed)
    #[error("geofile '{name}' is not loaded")]
    NotLoaded { name: String },

    // === Build Errors ===
    /// Attribute or type name does not fit its fixed-width metadata field
    #[error("{field} name '{value}' exceeds {max} bytes")]
    NameTooLong {
        field: &'static str,
        value: String,
        max: usize,
    },

    // === Configuration Errors ===
    /// Configuration file parsing or validation failed
    #[error("configuration error: {reason}")]
    Config { reason: String },

    // === I/O Errors ===
    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Internal Errors ===
    /// Internal error that should not happen
    #[error("internal error: {0}")]
    Internal(String),
}

impl GeofileError {
    /// Returns true if this error must leave the container unloaded
    pub fn is_fatal_to_load(&self) -> bool {
        matches!(self, GeofileError::Format { .. } | GeofileError::Io(_))
    }

    /// Returns true if this error concerns one record only and the
    /// surrounding stream may continue
    pub fn is_record_local(&self) -> bool {
        matches!(self, GeofileError::Decode { .. })
    }

    /// Create a format error
    pub fn format(reason: impl Into<String>) -> Self {
        GeofileError::Format {
            reason: reason.into(),
        }
    }

    /// Create a decode error
    pub fn decode(rank: u32, reason: impl Into<String>) -> Self {
        GeofileError::Decode {
            rank,
            reason: reason.into(),
        }
    }
}

impl From<SyntaxError> for GeofileError {
    fn from(err: SyntaxError) -> Self {
        GeofileError::Syntax(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_to_load() {
        assert!(GeofileError::format("bad signature").is_fatal_to_load());
        assert!(!GeofileError::RankOutOfRange { rank: 3, count: 3 }.is_fatal_to_load());
        assert!(!GeofileError::decode(1, "bad json").is_fatal_to_load());
    }

    #[test]
    fn test_record_local() {
        assert!(GeofileError::decode(7, "bad json").is_record_local());
        assert!(!GeofileError::Syntax(SyntaxError::new("unterminated")).is_record_local());
    }

    #[test]
    fn test_syntax_error_display() {
        let err = SyntaxError::new("unterminated quoted field").at(3, 14);
        assert_eq!(err.to_string(), "unterminated quoted field at line 3, col 14");

        let err: GeofileError = err.into();
        assert!(err.to_string().starts_with("syntax error: unterminated"));
    }

    #[test]
    fn test_index_not_found_display() {
        let err = GeofileError::IndexNotFound {
            attribute: "name".to_string(),
            kind: IndexType::Fuzzy,
        };
        assert_eq!(err.to_string(), "no fuzzy index on attribute 'name'");
    }
}
