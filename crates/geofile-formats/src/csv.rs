//! Delimited text.
//!
//! One logical record per line; a quoted field may span lines. Blank lines,
//! the first `skip` physical lines, lines starting with the comment prefix
//! and the header line (when enabled) get no rank.
//!
//! ## Automaton
//!
//! ```text
//! LineStart ──skip──► Skipped ──\n──► LineStart
//!     │
//!     └──► Field ──"──► Quoted ──"──► QuoteInQuoted ──"──► Quoted
//!            │  ▲                          │
//!            │  └────────── other ─────────┘
//!            ├──prefix──► Comment ──\n──► LineStart
//!            └──\n──► (record complete) LineStart
//! ```

use crate::error::FormatsError;
use geofile_core::config::CsvConfig;
use geofile_core::{
    ByteSource, Emitter, Feature, Format, FormatParser, GeofileError, RawRecord, RecordDecoder,
    Result, SyntaxError,
};
use geo_types::{Geometry, Point};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Delimited text options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvOptions {
    pub separator: u8,
    pub quote: u8,
    /// First unskipped, non-blank line names the columns
    pub header: bool,
    /// Physical lines to ignore at the start
    pub skip: usize,
    /// Lines starting with this prefix are ignored
    pub comment: Option<String>,
    /// Column indices of longitude and latitude
    pub lonlat: Option<[usize; 2]>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        CsvOptions {
            separator: b',',
            quote: b'"',
            header: false,
            skip: 0,
            comment: None,
            lonlat: None,
        }
    }
}

impl CsvOptions {
    pub fn with_separator(mut self, separator: u8) -> Self {
        self.separator = separator;
        self
    }

    pub fn with_header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_comment(mut self, prefix: impl Into<String>) -> Self {
        self.comment = Some(prefix.into());
        self
    }

    pub fn with_lonlat(mut self, lon: usize, lat: usize) -> Self {
        self.lonlat = Some([lon, lat]);
        self
    }

    pub fn validate(&self) -> std::result::Result<(), FormatsError> {
        let invalid = |option, reason: &str| FormatsError::InvalidOption {
            format: "csv",
            option,
            reason: reason.to_string(),
        };
        if matches!(self.separator, b'\n' | b'\r') || self.separator == self.quote {
            return Err(invalid("separator", "must differ from quote and line breaks"));
        }
        if matches!(self.quote, b'\n' | b'\r') {
            return Err(invalid("quote", "must not be a line break"));
        }
        if self.comment.as_deref() == Some("") {
            return Err(invalid("comment", "prefix must not be empty"));
        }
        if let Some([lon, lat]) = self.lonlat {
            if lon == lat {
                return Err(invalid("lonlat", "longitude and latitude columns must differ"));
            }
        }
        Ok(())
    }
}

impl TryFrom<&CsvConfig> for CsvOptions {
    type Error = FormatsError;

    fn try_from(config: &CsvConfig) -> std::result::Result<Self, FormatsError> {
        let separator = u8::try_from(config.separator)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| FormatsError::InvalidOption {
                format: "csv",
                option: "separator",
                reason: format!("'{}' is not a single ASCII byte", config.separator),
            })?;
        let options = CsvOptions {
            separator,
            header: config.header,
            skip: config.skip,
            comment: config.comment.clone(),
            lonlat: config.lonlat,
            ..CsvOptions::default()
        };
        options.validate()?;
        Ok(options)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    LineStart,
    Skipped,
    Comment,
    Field,
    Quoted,
    QuoteInQuoted,
}

/// The delimited-text automaton, independent of the engine so the decoder
/// can reuse it to find the header line.
#[derive(Debug)]
struct Scanner {
    options: CsvOptions,
    state: State,
    skip_remaining: usize,
    header_pending: bool,
    header: Option<Vec<u8>>,
    field_start: bool,
    record_start: u64,
    current: Vec<u8>,
}

impl Scanner {
    fn new(options: CsvOptions) -> Self {
        let mut scanner = Scanner {
            skip_remaining: options.skip,
            header_pending: options.header,
            options,
            state: State::LineStart,
            header: None,
            field_start: true,
            record_start: 0,
            current: Vec::new(),
        };
        scanner.reset();
        scanner
    }

    fn reset(&mut self) {
        self.state = State::LineStart;
        self.skip_remaining = self.options.skip;
        self.header_pending = self.options.header;
        self.header = None;
        self.field_start = true;
        self.record_start = 0;
        self.current.clear();
    }

    fn push<F>(&mut self, pos: u64, byte: u8, emit: &mut F) -> std::result::Result<(), SyntaxError>
    where
        F: FnMut(u64, Vec<u8>),
    {
        match self.state {
            State::LineStart => {
                self.record_start = pos;
                self.current.clear();
                self.field_start = true;
                if self.skip_remaining > 0 {
                    self.skip_remaining -= 1;
                    self.state = State::Skipped;
                    if byte == b'\n' {
                        self.state = State::LineStart;
                    }
                    return Ok(());
                }
                self.state = State::Field;
                self.field(byte, emit);
            }
            State::Skipped | State::Comment => {
                if byte == b'\n' {
                    self.state = State::LineStart;
                }
            }
            State::Field => self.field(byte, emit),
            State::Quoted => {
                self.current.push(byte);
                if byte == self.options.quote {
                    self.state = State::QuoteInQuoted;
                }
            }
            State::QuoteInQuoted => {
                if byte == self.options.quote {
                    // doubled quote: literal quote, still inside the field
                    self.current.push(byte);
                    self.state = State::Quoted;
                } else {
                    self.state = State::Field;
                    self.field_start = false;
                    self.field(byte, emit);
                }
            }
        }
        Ok(())
    }

    fn field<F>(&mut self, byte: u8, emit: &mut F)
    where
        F: FnMut(u64, Vec<u8>),
    {
        if byte == b'\n' {
            self.complete(emit);
            self.state = State::LineStart;
            return;
        }
        self.current.push(byte);
        if byte == self.options.quote && self.field_start {
            self.state = State::Quoted;
        } else {
            self.field_start = byte == self.options.separator;
        }

        if let Some(prefix) = self.options.comment.as_deref() {
            if self.current.as_slice() == prefix.as_bytes() {
                self.current.clear();
                self.state = State::Comment;
            }
        }
    }

    fn complete<F>(&mut self, emit: &mut F)
    where
        F: FnMut(u64, Vec<u8>),
    {
        let mut record = std::mem::take(&mut self.current);
        if record.last() == Some(&b'\r') {
            record.pop();
        }
        if record.iter().all(u8::is_ascii_whitespace) {
            return;
        }
        if self.header_pending {
            self.header_pending = false;
            self.header = Some(record);
            return;
        }
        emit(self.record_start, record);
    }

    fn finish<F>(&mut self, emit: &mut F) -> std::result::Result<(), SyntaxError>
    where
        F: FnMut(u64, Vec<u8>),
    {
        match self.state {
            State::Quoted => Err(SyntaxError::new("unterminated quoted field")),
            State::Field | State::QuoteInQuoted => {
                self.complete(emit);
                self.state = State::LineStart;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Split one record into fields, honoring quotes and doubled quotes.
pub fn split_fields(text: &str, separator: u8, quote: u8) -> Vec<String> {
    let separator = separator as char;
    let quote = quote as char;
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut at_start = true;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if quoted {
            if c == quote {
                if chars.peek() == Some(&quote) {
                    field.push(quote);
                    chars.next();
                } else {
                    quoted = false;
                }
            } else {
                field.push(c);
            }
        } else if c == quote && at_start {
            quoted = true;
            at_start = false;
        } else if c == separator {
            fields.push(std::mem::take(&mut field));
            at_start = true;
        } else {
            field.push(c);
            at_start = false;
        }
    }
    fields.push(field);
    fields
}

/// Adapts the scanner to the engine.
struct CsvParser {
    source: Arc<dyn ByteSource>,
    scanner: Scanner,
}

impl FormatParser for CsvParser {
    fn begin(&mut self) -> Arc<dyn ByteSource> {
        self.scanner.reset();
        Arc::clone(&self.source)
    }

    fn process(&mut self, byte: u8, emitter: &mut Emitter) -> std::result::Result<(), SyntaxError> {
        let pos = emitter.position();
        self.scanner.push(pos, byte, &mut |start, bytes| {
            emitter.emit(start, bytes);
        })
    }

    fn end(&mut self, emitter: &mut Emitter) -> std::result::Result<(), SyntaxError> {
        self.scanner.finish(&mut |start, bytes| {
            emitter.emit(start, bytes);
        })
    }
}

/// Turns one record into a feature: header names (or `col<N>`) map to
/// string values; `lonlat` columns give a point when both parse.
#[derive(Debug)]
pub struct CsvDecoder {
    options: CsvOptions,
    columns: Vec<String>,
}

impl CsvDecoder {
    pub fn new(options: CsvOptions, columns: Vec<String>) -> Self {
        CsvDecoder { options, columns }
    }

    fn column_name(&self, i: usize) -> String {
        self.columns
            .get(i)
            .filter(|name| !name.is_empty())
            .cloned()
            .unwrap_or_else(|| format!("col{}", i))
    }
}

impl RecordDecoder for CsvDecoder {
    fn decode(&self, record: &RawRecord) -> Result<Feature> {
        let rank = record.handle.rank;
        let text = record.text().map_err(|e| FormatsError::from(e).at_rank(rank))?;
        let fields = split_fields(text, self.options.separator, self.options.quote);

        let geometry = self.options.lonlat.and_then(|[lon, lat]| {
            let lon = fields.get(lon)?.trim().parse::<f64>().ok()?;
            let lat = fields.get(lat)?.trim().parse::<f64>().ok()?;
            Some(Geometry::Point(Point::new(lon, lat)))
        });

        let mut properties = Map::new();
        for (i, value) in fields.into_iter().enumerate() {
            properties.insert(self.column_name(i), Value::String(value));
        }
        Ok(Feature::new(record.handle, geometry, properties))
    }
}

/// The delimited text format.
#[derive(Debug, Clone, Default)]
pub struct CsvFormat {
    options: CsvOptions,
}

impl CsvFormat {
    pub fn new(options: CsvOptions) -> std::result::Result<Self, FormatsError> {
        options.validate()?;
        Ok(CsvFormat { options })
    }

    pub fn options(&self) -> &CsvOptions {
        &self.options
    }

    /// Column names from the header line, empty without a header.
    pub fn read_columns(&self, source: &dyn ByteSource) -> Result<Vec<String>> {
        if !self.options.header {
            return Ok(Vec::new());
        }
        const CHUNK: usize = 4096;
        let mut scanner = Scanner::new(self.options.clone());
        let size = source.size();
        let mut offset = 0u64;
        let mut ignore = |_: u64, _: Vec<u8>| {};

        while scanner.header.is_none() && offset < size {
            let length = CHUNK.min((size - offset) as usize);
            let chunk = source.read(offset, length)?;
            for (i, &byte) in chunk.iter().enumerate() {
                scanner
                    .push(offset + i as u64, byte, &mut ignore)
                    .map_err(GeofileError::Syntax)?;
                if scanner.header.is_some() {
                    break;
                }
            }
            offset += length as u64;
        }
        if scanner.header.is_none() {
            scanner.finish(&mut ignore).map_err(GeofileError::Syntax)?;
        }

        let Some(header) = scanner.header else {
            return Ok(Vec::new());
        };
        let text = std::str::from_utf8(&header).map_err(|e| GeofileError::Config {
            reason: format!("csv header is not UTF-8: {}", e),
        })?;
        let columns: Vec<String> = split_fields(text, self.options.separator, self.options.quote)
            .into_iter()
            .map(|c| c.trim().to_string())
            .collect();
        debug!(columns = columns.len(), "Read csv header");
        Ok(columns)
    }
}

impl Format for CsvFormat {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn parser(&self, source: Arc<dyn ByteSource>) -> Box<dyn FormatParser> {
        Box::new(CsvParser {
            source,
            scanner: Scanner::new(self.options.clone()),
        })
    }

    fn decoder(&self, source: &dyn ByteSource) -> Result<Arc<dyn RecordDecoder>> {
        let columns = self.read_columns(source)?;
        Ok(Arc::new(CsvDecoder::new(self.options.clone(), columns)))
    }
}
