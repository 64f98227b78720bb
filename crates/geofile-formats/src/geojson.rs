//! GeoJSON feature collections.
//!
//! Each object inside the top-level `features` array is one record. A
//! top-level array of features is accepted too. The automaton only tracks
//! nesting and string state; full JSON parsing happens per record in the
//! decoder.

use crate::error::FormatsError;
use geofile_core::{
    ByteSource, Emitter, Feature, Format, FormatParser, RawRecord, RecordDecoder, Result,
    SyntaxError,
};
use geo_types::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon,
};
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Scanner {
    /// Open containers, `{` or `[`
    stack: Vec<u8>,
    in_string: bool,
    escaped: bool,
    /// Reading a key of the root object
    reading_key: bool,
    /// Next string in the root object is a key
    expect_key: bool,
    key: Vec<u8>,
    last_key: Vec<u8>,
    /// Stack depth of the features array once it is open
    features_depth: Option<usize>,
    record_start: Option<u64>,
    current: Vec<u8>,
    closed: bool,
}

impl Scanner {
    fn push<F>(&mut self, pos: u64, byte: u8, emit: &mut F) -> std::result::Result<(), SyntaxError>
    where
        F: FnMut(u64, Vec<u8>),
    {
        if self.record_start.is_some() {
            self.current.push(byte);
        }

        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if byte == b'\\' {
                self.escaped = true;
            } else if byte == b'"' {
                self.in_string = false;
                if self.reading_key {
                    self.reading_key = false;
                    self.last_key = std::mem::take(&mut self.key);
                }
                return Ok(());
            }
            if self.reading_key {
                self.key.push(byte);
            }
            return Ok(());
        }

        if byte.is_ascii_whitespace() {
            return Ok(());
        }
        if self.closed {
            return Err(SyntaxError::new("unexpected characters after the top-level value"));
        }

        let depth = self.stack.len();
        let in_root_object = depth == 1 && self.stack[0] == b'{';
        let in_features = self.features_depth == Some(depth);

        if depth == 0 && !matches!(byte, b'{' | b'[') {
            return Err(SyntaxError::new(format!(
                "expected '{{' or '[', found '{}'",
                byte as char
            )));
        }
        if in_features && !matches!(byte, b'{' | b',' | b']') {
            return Err(SyntaxError::new(format!(
                "expected a feature object, found '{}'",
                byte as char
            )));
        }

        match byte {
            b'"' => {
                self.in_string = true;
                if in_root_object && self.expect_key {
                    self.reading_key = true;
                    self.key.clear();
                }
            }
            b'{' | b'[' => {
                if depth == 0 && self.features_depth.is_none() && byte == b'[' {
                    self.features_depth = Some(1);
                }
                if in_features && byte == b'{' {
                    self.record_start = Some(pos);
                    self.current.clear();
                    self.current.push(byte);
                }
                if in_root_object && byte == b'[' && self.last_key == b"features" {
                    self.features_depth = Some(2);
                }
                self.stack.push(byte);
                if self.stack.len() == 1 && byte == b'{' {
                    self.expect_key = true;
                }
            }
            b'}' | b']' => {
                let open = if byte == b'}' { b'{' } else { b'[' };
                match self.stack.pop() {
                    Some(top) if top == open => {}
                    Some(top) => {
                        return Err(SyntaxError::new(format!(
                            "'{}' closes '{}'",
                            byte as char, top as char
                        )))
                    }
                    None => {
                        return Err(SyntaxError::new(format!("unexpected '{}'", byte as char)))
                    }
                }
                let depth = self.stack.len();
                if self.features_depth == Some(depth) {
                    if let Some(start) = self.record_start.take() {
                        emit(start, std::mem::take(&mut self.current));
                    }
                }
                if self.features_depth.is_some_and(|d| depth < d) {
                    self.features_depth = None;
                }
                if depth == 0 {
                    self.closed = true;
                }
            }
            b':' if in_root_object => self.expect_key = false,
            b',' if in_root_object => self.expect_key = true,
            _ => {}
        }
        Ok(())
    }

    fn finish(&self) -> std::result::Result<(), SyntaxError> {
        if self.in_string {
            return Err(SyntaxError::new("unterminated string"));
        }
        if let Some(&open) = self.stack.last() {
            return Err(SyntaxError::new(format!(
                "unclosed '{}' at end of input",
                open as char
            )));
        }
        Ok(())
    }
}

struct GeoJsonParser {
    source: Arc<dyn ByteSource>,
    scanner: Scanner,
}

impl FormatParser for GeoJsonParser {
    fn begin(&mut self) -> Arc<dyn ByteSource> {
        self.scanner = Scanner::default();
        Arc::clone(&self.source)
    }

    fn process(&mut self, byte: u8, emitter: &mut Emitter) -> std::result::Result<(), SyntaxError> {
        let pos = emitter.position();
        self.scanner.push(pos, byte, &mut |start, bytes| {
            emitter.emit(start, bytes);
        })
    }

    fn end(&mut self, _emitter: &mut Emitter) -> std::result::Result<(), SyntaxError> {
        self.scanner.finish()
    }
}

fn coord(value: &Value) -> std::result::Result<Coord<f64>, FormatsError> {
    let position = value
        .as_array()
        .ok_or_else(|| FormatsError::geometry("position is not an array"))?;
    match (
        position.first().and_then(Value::as_f64),
        position.get(1).and_then(Value::as_f64),
    ) {
        (Some(x), Some(y)) => Ok(Coord { x, y }),
        _ => Err(FormatsError::geometry("position needs two numbers")),
    }
}

fn array(value: &Value) -> std::result::Result<&Vec<Value>, FormatsError> {
    value
        .as_array()
        .ok_or_else(|| FormatsError::geometry("coordinates are not an array"))
}

fn line(value: &Value) -> std::result::Result<LineString<f64>, FormatsError> {
    array(value)?
        .iter()
        .map(coord)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map(LineString::new)
}

fn polygon(value: &Value) -> std::result::Result<Polygon<f64>, FormatsError> {
    let mut rings = array(value)?.iter().map(line);
    let exterior = rings
        .next()
        .ok_or_else(|| FormatsError::geometry("polygon has no rings"))??;
    let interiors = rings.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

/// Convert a GeoJSON geometry object.
pub fn geometry(value: &Value) -> std::result::Result<Option<Geometry<f64>>, FormatsError> {
    if value.is_null() {
        return Ok(None);
    }
    let object = value
        .as_object()
        .ok_or_else(|| FormatsError::geometry("geometry is not an object"))?;
    let kind = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| FormatsError::geometry("geometry has no type"))?;

    if kind == "GeometryCollection" {
        let members = object
            .get("geometries")
            .and_then(Value::as_array)
            .ok_or_else(|| FormatsError::geometry("collection has no geometries"))?;
        let mut geometries = Vec::with_capacity(members.len());
        for member in members {
            if let Some(g) = geometry(member)? {
                geometries.push(g);
            }
        }
        return Ok(Some(Geometry::GeometryCollection(GeometryCollection(geometries))));
    }

    let coordinates = object
        .get("coordinates")
        .ok_or_else(|| FormatsError::geometry(format!("{} has no coordinates", kind)))?;
    let geometry = match kind {
        "Point" => Geometry::Point(Point(coord(coordinates)?)),
        "MultiPoint" => Geometry::MultiPoint(MultiPoint(
            array(coordinates)?
                .iter()
                .map(|c| coord(c).map(Point))
                .collect::<std::result::Result<_, _>>()?,
        )),
        "LineString" => Geometry::LineString(line(coordinates)?),
        "MultiLineString" => Geometry::MultiLineString(MultiLineString(
            array(coordinates)?
                .iter()
                .map(line)
                .collect::<std::result::Result<_, _>>()?,
        )),
        "Polygon" => Geometry::Polygon(polygon(coordinates)?),
        "MultiPolygon" => Geometry::MultiPolygon(MultiPolygon(
            array(coordinates)?
                .iter()
                .map(polygon)
                .collect::<std::result::Result<_, _>>()?,
        )),
        other => {
            return Err(FormatsError::geometry(format!(
                "unsupported geometry type '{}'",
                other
            )))
        }
    };
    Ok(Some(geometry))
}

/// Decodes one feature object.
#[derive(Debug, Default)]
pub struct GeoJsonDecoder;

impl GeoJsonDecoder {
    fn convert(record: &RawRecord) -> std::result::Result<Feature, FormatsError> {
        let value: Value = serde_json::from_slice(&record.bytes)?;
        let mut object = match value {
            Value::Object(object) => object,
            _ => return Err(FormatsError::geometry("feature is not an object")),
        };
        let geometry = match object.get("geometry") {
            Some(g) => geometry(g)?,
            None => None,
        };
        let properties = match object.remove("properties") {
            Some(Value::Object(properties)) => properties,
            _ => Map::new(),
        };
        Ok(Feature::new(record.handle, geometry, properties))
    }
}

impl RecordDecoder for GeoJsonDecoder {
    fn decode(&self, record: &RawRecord) -> Result<Feature> {
        Self::convert(record).map_err(|e| e.at_rank(record.handle.rank))
    }
}

/// The GeoJSON format.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoJsonFormat;

impl GeoJsonFormat {
    pub fn new() -> Self {
        GeoJsonFormat
    }
}

impl Format for GeoJsonFormat {
    fn name(&self) -> &'static str {
        "geojson"
    }

    fn parser(&self, source: Arc<dyn ByteSource>) -> Box<dyn FormatParser> {
        Box::new(GeoJsonParser {
            source,
            scanner: Scanner::default(),
        })
    }

    fn decoder(&self, _source: &dyn ByteSource) -> Result<Arc<dyn RecordDecoder>> {
        Ok(Arc::new(GeoJsonDecoder))
    }
}
