//! Core data types for Geofile.
//!
//! These types describe records as the index engine sees them:
//!
//! - **Handle**: where a record's raw bytes live in the data file
//! - **RawRecord**: the bytes of one record, as emitted by a format automaton
//! - **Feature**: a decoded record with geometry and properties
//! - **BBox**: axis-aligned bounding boxes used by the spatial index

use geo::BoundingRect;
use geo_types::Geometry;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Dense zero-based record number assigned in file order.
pub type Rank = u32;

/// Default coordinate reference system of decoded features.
pub const DEFAULT_PROJECTION: &str = "EPSG:4326";

/// Locates one logical record's raw bytes in the data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handle {
    /// Record number, primary key across all indexes
    pub rank: Rank,

    /// Byte offset of the first byte of the record
    pub pos: u64,

    /// Length of the record in bytes
    pub len: u32,
}

impl Handle {
    /// Create a new handle
    pub fn new(rank: Rank, pos: u64, len: u32) -> Self {
        Handle { rank, pos, len }
    }

    /// Byte offset one past the end of the record
    pub fn end(&self) -> u64 {
        self.pos + self.len as u64
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} [{}..{})", self.rank, self.pos, self.end())
    }
}

/// The raw bytes of one record together with its handle.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub handle: Handle,
    pub bytes: Vec<u8>,
}

impl RawRecord {
    pub fn new(handle: Handle, bytes: Vec<u8>) -> Self {
        RawRecord { handle, bytes }
    }

    /// Record bytes as UTF-8 text.
    pub fn text(&self) -> std::result::Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.bytes)
    }
}

/// Axis-aligned bounding box `[min_x, min_y, max_x, max_y]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BBox {
    /// Create a new bounding box.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        BBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// A degenerate box holding a single point.
    pub fn from_point(x: f64, y: f64) -> Self {
        BBox::new(x, y, x, y)
    }

    /// A square of half-width `half` centered on a point.
    pub fn around(x: f64, y: f64, half: f64) -> Self {
        BBox::new(x - half, y - half, x + half, y + half)
    }

    /// Bounding box of a geometry, `None` for empty geometries.
    pub fn from_geometry(geometry: &Geometry<f64>) -> Option<Self> {
        geometry.bounding_rect().map(|rect| {
            let min = rect.min();
            let max = rect.max();
            BBox::new(min.x, min.y, max.x, max.y)
        })
    }

    /// The empty box: union identity, intersects nothing.
    pub fn empty() -> Self {
        BBox::new(
            f64::INFINITY,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::NEG_INFINITY,
        )
    }

    /// True when all coordinates are finite and min <= max on both axes.
    pub fn is_valid(&self) -> bool {
        self.min_x.is_finite()
            && self.min_y.is_finite()
            && self.max_x.is_finite()
            && self.max_y.is_finite()
            && self.min_x <= self.max_x
            && self.min_y <= self.max_y
    }

    /// Check if this bbox intersects another (closed intervals).
    pub fn intersects(&self, other: &BBox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Check if this bbox contains a point.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Grow this bbox to cover another.
    pub fn expand(&mut self, other: &BBox) {
        self.min_x = self.min_x.min(other.min_x);
        self.min_y = self.min_y.min(other.min_y);
        self.max_x = self.max_x.max(other.max_x);
        self.max_y = self.max_y.max(other.max_y);
    }

    /// Center point `(x, y)`.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }
}

impl fmt::Display for BBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}]",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

/// A decoded record.
///
/// Features are owned transiently by the caller and never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub rank: Rank,
    pub pos: u64,
    pub len: u32,

    /// Geometry, absent for non-spatial records
    pub geometry: Option<Geometry<f64>>,

    /// Attribute values keyed by name
    pub properties: Map<String, Value>,

    /// Derived from `geometry`
    pub bbox: Option<BBox>,

    /// Coordinate reference system of `geometry`
    pub projection: String,

    /// Distance to the query point, set by nearest-neighbor queries
    pub distance: Option<f64>,
}

impl Feature {
    /// Create a feature located by `handle`; the bbox is derived from the geometry.
    pub fn new(handle: Handle, geometry: Option<Geometry<f64>>, properties: Map<String, Value>) -> Self {
        let bbox = geometry.as_ref().and_then(BBox::from_geometry);
        Feature {
            rank: handle.rank,
            pos: handle.pos,
            len: handle.len,
            geometry,
            properties,
            bbox,
            projection: DEFAULT_PROJECTION.to_string(),
            distance: None,
        }
    }

    /// The handle this feature was decoded from.
    pub fn handle(&self) -> Handle {
        Handle::new(self.rank, self.pos, self.len)
    }

    /// Look up a property value.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Property value as text: strings verbatim, other scalars rendered,
    /// null and missing values as `None`.
    pub fn property_text(&self, name: &str) -> Option<String> {
        match self.properties.get(name)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Recompute the bbox after the geometry changed.
    pub fn refresh_bbox(&mut self) {
        self.bbox = self.geometry.as_ref().and_then(BBox::from_geometry);
    }
}
