//! The result pipeline shared by every retrieval path.
//!
//! Each decoded feature passes, in order, through: projection transform,
//! predicate filter, side-effecting action, result cap. Every query on
//! [`Geofile`](crate::Geofile) and every full parse feeds its features
//! through one [`FeaturePipeline`].

use crate::error::Result;
use crate::types::Feature;
use geo::MapCoordsInPlace;
use geo_types::Coord;
use std::fmt;
use std::sync::Arc;

/// Coordinate transform `(x, y) -> (x, y)`.
pub type Transform = Arc<dyn Fn(f64, f64) -> (f64, f64) + Send + Sync>;

/// Feature predicate; `false` drops the feature.
pub type Predicate = Arc<dyn Fn(&Feature) -> bool + Send + Sync>;

/// Side effect run on every accepted feature.
pub type Action = Arc<dyn Fn(&Feature) + Send + Sync>;

/// A target coordinate reference system and the transform into it.
///
/// The reprojection math itself is supplied by the caller.
#[derive(Clone)]
pub struct Projection {
    code: String,
    transform: Transform,
}

impl Projection {
    pub fn new<F>(code: impl Into<String>, transform: F) -> Self
    where
        F: Fn(f64, f64) -> (f64, f64) + Send + Sync + 'static,
    {
        Projection {
            code: code.into(),
            transform: Arc::new(transform),
        }
    }

    /// Target projection code, e.g. `EPSG:3857`.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Reproject `feature` in place unless it is already in the target
    /// projection.
    pub fn apply(&self, feature: &mut Feature) {
        if feature.projection == self.code {
            return;
        }
        let transform = &self.transform;
        if let Some(geometry) = feature.geometry.as_mut() {
            geometry.map_coords_in_place(|c: Coord<f64>| {
                let (x, y) = transform(c.x, c.y);
                Coord { x, y }
            });
        }
        feature.refresh_bbox();
        feature.projection = self.code.clone();
    }
}

impl fmt::Debug for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Projection").field("code", &self.code).finish()
    }
}

/// Per-query options, built fluently.
///
/// ```ignore
/// let opts = QueryOptions::new()
///     .with_filter(|f| f.property("kind").is_some())
///     .with_max_features(10);
/// ```
#[derive(Clone, Default)]
pub struct QueryOptions {
    projection: Option<Projection>,
    filter: Option<Predicate>,
    action: Option<Action>,
    max_features: Option<usize>,
    max_text_distance: Option<usize>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Feature) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn with_action<F>(mut self, action: F) -> Self
    where
        F: Fn(&Feature) + Send + Sync + 'static,
    {
        self.action = Some(Arc::new(action));
        self
    }

    /// Stop after this many accepted features.
    pub fn with_max_features(mut self, max: usize) -> Self {
        self.max_features = Some(max);
        self
    }

    /// Drop fuzzy hits farther than this edit distance from the query.
    pub fn with_max_text_distance(mut self, max: usize) -> Self {
        self.max_text_distance = Some(max);
        self
    }

    pub fn projection(&self) -> Option<&Projection> {
        self.projection.as_ref()
    }

    pub fn max_features(&self) -> Option<usize> {
        self.max_features
    }

    pub fn max_text_distance(&self) -> Option<usize> {
        self.max_text_distance
    }

    /// Start collecting features under these options.
    pub fn pipeline(&self) -> FeaturePipeline<'_> {
        FeaturePipeline {
            options: self,
            accepted: Vec::new(),
        }
    }

    /// Run `features` through a pipeline, stopping at the cap or the
    /// first error.
    pub fn apply<I>(&self, features: I) -> Result<Vec<Feature>>
    where
        I: IntoIterator<Item = Result<Feature>>,
    {
        let mut pipeline = self.pipeline();
        for feature in features {
            if !pipeline.push(feature?) {
                break;
            }
        }
        Ok(pipeline.finish())
    }
}

impl fmt::Debug for QueryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryOptions")
            .field("projection", &self.projection)
            .field("filter", &self.filter.is_some())
            .field("action", &self.action.is_some())
            .field("max_features", &self.max_features)
            .field("max_text_distance", &self.max_text_distance)
            .finish()
    }
}

/// Accumulates features for one query.
pub struct FeaturePipeline<'a> {
    options: &'a QueryOptions,
    accepted: Vec<Feature>,
}

impl FeaturePipeline<'_> {
    /// The cap has been reached.
    pub fn is_full(&self) -> bool {
        self.options
            .max_features
            .is_some_and(|max| self.accepted.len() >= max)
    }

    /// Offer one feature. Returns false once no more will be accepted.
    pub fn push(&mut self, mut feature: Feature) -> bool {
        if self.is_full() {
            return false;
        }
        if let Some(projection) = &self.options.projection {
            projection.apply(&mut feature);
        }
        if let Some(filter) = &self.options.filter {
            if !filter(&feature) {
                return true;
            }
        }
        if let Some(action) = &self.options.action {
            action(&feature);
        }
        self.accepted.push(feature);
        !self.is_full()
    }

    /// Features accepted so far.
    pub fn len(&self) -> usize {
        self.accepted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }

    pub fn finish(self) -> Vec<Feature> {
        self.accepted
    }
}
