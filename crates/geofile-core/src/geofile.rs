//! The owning container: one data file, its format, and its indexes.
//!
//! ## Lifecycle
//!
//! ```text
//! new() ──► unloaded ──open()──► loaded ──close()──► unloaded
//!                       ▲                    │
//!                       └── build_indexes() ─┘ (swaps the index set)
//! ```
//!
//! The loaded state is published as one `Arc` behind a lock, so queries
//! running on other threads keep the index set they started with while a
//! rebuild swaps in a new one. A failed open or build never publishes a
//! partial set.

use crate::config::{DistanceMetric, GeofileConfig};
use crate::error::{GeofileError, Result};
use crate::filter::QueryOptions;
use crate::format;
use crate::index::fuzzy::text_distance;
use crate::index::ordered::feature_matches;
use crate::index::prefix::matches_all;
use crate::index::{IndexBuilder, IndexDefinition, IndexInfo, IndexSet};
use crate::parser::{Format, ParserEngine, RecordDecoder, RecordStream};
use crate::source::{read_all, ByteSource};
use crate::types::{BBox, Feature, Rank, RawRecord};
use geo::{Closest, ClosestPoint, HaversineDistance};
use geo_types::{Geometry, Point};
use parking_lot::RwLock;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Meters per degree of latitude, for sizing haversine search boxes.
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Search radius for [`Geofile::nearest`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Radius {
    /// One radius.
    Fixed(f64),
    /// Successively larger radii, tried in order until one yields a hit.
    Expanding(Vec<f64>),
    /// The configured `search.nearest_radii`.
    #[default]
    Configured,
}

impl From<f64> for Radius {
    fn from(r: f64) -> Self {
        Radius::Fixed(r)
    }
}

struct Loaded {
    indexes: IndexSet,
    decoder: Arc<dyn RecordDecoder>,
}

/// A geospatial data file with random access through its indexes.
pub struct Geofile {
    name: String,
    data: Arc<dyn ByteSource>,
    format: Arc<dyn Format>,
    index_source: Option<Arc<dyn ByteSource>>,
    config: GeofileConfig,
    state: RwLock<Option<Arc<Loaded>>>,
}

impl fmt::Debug for Geofile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Geofile")
            .field("name", &self.name)
            .field("format", &self.format.name())
            .field("data", &self.data.describe())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl Geofile {
    /// An unloaded container over `data`.
    pub fn new(name: impl Into<String>, data: Arc<dyn ByteSource>, format: Arc<dyn Format>) -> Self {
        Geofile {
            name: name.into(),
            data,
            format,
            index_source: None,
            config: GeofileConfig::default(),
            state: RwLock::new(None),
        }
    }

    /// Load indexes from `source` on open instead of building them.
    pub fn with_index_source(mut self, source: Arc<dyn ByteSource>) -> Self {
        self.index_source = Some(source);
        self
    }

    pub fn with_config(mut self, config: GeofileConfig) -> Self {
        self.config = config;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &GeofileConfig {
        &self.config
    }

    pub fn format_name(&self) -> &'static str {
        self.format.name()
    }

    /// Load the index source if one was given, otherwise build the
    /// mandatory indexes in memory.
    ///
    /// On failure the container is left unloaded.
    #[instrument(skip(self), fields(name = %self.name))]
    pub fn open(&self) -> Result<()> {
        let result = self.load_state();
        let mut state = self.state.write();
        match result {
            Ok(loaded) => {
                info!(
                    records = loaded.indexes.count(),
                    indexes = loaded.indexes.describe().len(),
                    "Geofile opened"
                );
                *state = Some(Arc::new(loaded));
                Ok(())
            }
            Err(e) => {
                *state = None;
                Err(e)
            }
        }
    }

    fn load_state(&self) -> Result<Loaded> {
        let decoder = self.format.decoder(self.data.as_ref())?;
        let indexes = match &self.index_source {
            Some(source) => {
                debug!(source = %source.describe(), "Loading index source");
                format::parse(read_all(source.as_ref())?)?
            }
            None => {
                debug!("No index source, building mandatory indexes");
                let buffers = self.build_buffers(&[], Arc::clone(&decoder))?;
                format::parse(format::serialize(&buffers)?.into())?
            }
        };
        Ok(Loaded { indexes, decoder })
    }

    /// Release the index set and decoder.
    pub fn close(&self) {
        if self.state.write().take().is_some() {
            info!(name = %self.name, "Geofile closed");
        }
    }

    /// Opened, with at least one record.
    pub fn is_loaded(&self) -> bool {
        self.state
            .read()
            .as_ref()
            .is_some_and(|loaded| loaded.indexes.count() > 0)
    }

    /// Record count, zero when not opened.
    pub fn count(&self) -> u32 {
        self.state
            .read()
            .as_ref()
            .map_or(0, |loaded| loaded.indexes.count())
    }

    fn loaded(&self) -> Result<Arc<Loaded>> {
        self.state.read().clone().ok_or_else(|| GeofileError::NotLoaded {
            name: self.name.clone(),
        })
    }

    fn decoder(&self) -> Result<Arc<dyn RecordDecoder>> {
        match self.state.read().as_ref() {
            Some(loaded) => Ok(Arc::clone(&loaded.decoder)),
            None => self.format.decoder(self.data.as_ref()),
        }
    }

    /// Raw record stream over the whole data file, in rank order.
    pub fn stream(&self) -> Result<RecordStream> {
        let parser = self.format.parser(Arc::clone(&self.data));
        ParserEngine::new(parser, self.decoder()?, self.config.parser.clone()).run()
    }

    fn build_buffers(
        &self,
        definitions: &[IndexDefinition],
        decoder: Arc<dyn RecordDecoder>,
    ) -> Result<Vec<crate::index::IndexBuffer>> {
        let mut builder = IndexBuilder::new(definitions, &self.config)?;
        let parser = self.format.parser(Arc::clone(&self.data));
        let stream = ParserEngine::new(parser, decoder, self.config.parser.clone()).run()?;
        for record in stream {
            builder.add(&record?)?;
        }
        builder.finish()
    }

    /// Parse the data file and build the mandatory indexes plus
    /// `definitions`. Returns the serialized index file.
    ///
    /// The new index set replaces the current one only if every step
    /// succeeded.
    #[instrument(skip(self, definitions), fields(name = %self.name, definitions = definitions.len()))]
    pub fn build_indexes(&self, definitions: &[IndexDefinition]) -> Result<Vec<u8>> {
        let decoder = self.decoder()?;
        let buffers = self.build_buffers(definitions, Arc::clone(&decoder))?;
        let bytes = format::serialize(&buffers)?;
        let indexes = format::parse(Arc::from(bytes.as_slice()))?;

        info!(records = indexes.count(), bytes = bytes.len(), "Index set rebuilt");
        *self.state.write() = Some(Arc::new(Loaded { indexes, decoder }));
        Ok(bytes)
    }

    /// Indexes of the loaded set.
    pub fn indexes(&self) -> Result<Vec<IndexInfo>> {
        Ok(self.loaded()?.indexes.describe())
    }

    fn read_feature(&self, loaded: &Loaded, rank: Rank) -> Result<Feature> {
        let handle = loaded.indexes.handles().get(rank)?;
        let bytes = self.data.read(handle.pos, handle.len as usize)?;
        loaded.decoder.decode(&RawRecord::new(handle, bytes))
    }

    /// Decode `rank`, logging and skipping records the decoder rejects.
    fn try_feature(&self, loaded: &Loaded, rank: Rank) -> Result<Option<Feature>> {
        match self.read_feature(loaded, rank) {
            Ok(feature) => Ok(Some(feature)),
            Err(e) if e.is_record_local() => {
                warn!(rank, error = %e, "Skipping undecodable record");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn collect<I>(&self, loaded: &Loaded, ranks: I, opts: &QueryOptions) -> Result<Vec<Feature>>
    where
        I: IntoIterator<Item = Rank>,
    {
        let mut pipeline = opts.pipeline();
        for rank in ranks {
            if let Some(feature) = self.try_feature(loaded, rank)? {
                if !pipeline.push(feature) {
                    break;
                }
            }
        }
        Ok(pipeline.finish())
    }

    /// The feature of `rank`, without any pipeline.
    pub fn get_feature(&self, rank: Rank) -> Result<Feature> {
        let loaded = self.loaded()?;
        self.read_feature(&loaded, rank)
    }

    /// Up to `limit` features starting at `rank`.
    pub fn get_features(&self, rank: Rank, limit: u32, opts: &QueryOptions) -> Result<Vec<Feature>> {
        let loaded = self.loaded()?;
        let count = loaded.indexes.count();
        if rank >= count {
            return Err(GeofileError::RankOutOfRange { rank, count });
        }
        let end = rank.saturating_add(limit).min(count);
        self.collect(&loaded, rank..end, opts)
    }

    /// Every feature of the data file, streamed through the pipeline.
    ///
    /// Does not need the container to be opened.
    pub fn parse(&self, opts: &QueryOptions) -> Result<Vec<Feature>> {
        opts.apply(self.stream()?.features())
    }

    /// Features whose bounding box intersects `bbox`.
    pub fn bbox(&self, bbox: &BBox, opts: &QueryOptions) -> Result<Vec<Feature>> {
        let loaded = self.loaded()?;
        let ranks = loaded.indexes.rtree()?.search(bbox);
        debug!(bbox = %bbox, candidates = ranks.len(), "Bbox query");
        self.collect(&loaded, ranks, opts)
    }

    /// Features at `(lon, lat)`, within the configured point tolerance.
    pub fn point(&self, lon: f64, lat: f64, opts: &QueryOptions) -> Result<Vec<Feature>> {
        let bbox = BBox::around(lon, lat, self.config.search.point_tolerance);
        self.bbox(&bbox, opts)
    }

    fn search_box(&self, lon: f64, lat: f64, radius: f64) -> BBox {
        match self.config.search.metric {
            DistanceMetric::Euclidean => BBox::around(lon, lat, radius),
            DistanceMetric::Haversine => {
                let dlat = radius / METERS_PER_DEGREE;
                let dlon = radius / (METERS_PER_DEGREE * lat.to_radians().cos().abs().max(1e-9));
                BBox::new(lon - dlon, lat - dlat, lon + dlon, lat + dlat)
            }
        }
    }

    fn distance(&self, geometry: &Geometry<f64>, origin: Point<f64>) -> Option<f64> {
        let closest = match geometry.closest_point(&origin) {
            Closest::Intersection(p) | Closest::SinglePoint(p) => p,
            Closest::Indeterminate => return None,
        };
        Some(match self.config.search.metric {
            DistanceMetric::Euclidean => (closest.x() - origin.x()).hypot(closest.y() - origin.y()),
            DistanceMetric::Haversine => origin.haversine_distance(&closest),
        })
    }

    /// The single closest feature to `(lon, lat)`, with `distance` set.
    ///
    /// Radii are tried in order; `None` once the largest is exhausted.
    pub fn nearest(
        &self,
        lon: f64,
        lat: f64,
        radius: impl Into<Radius>,
        opts: &QueryOptions,
    ) -> Result<Option<Feature>> {
        let loaded = self.loaded()?;
        let rtree = loaded.indexes.rtree()?;
        let radii = match radius.into() {
            Radius::Fixed(r) => vec![r],
            Radius::Expanding(radii) => radii,
            Radius::Configured => self.config.search.nearest_radii.clone(),
        };
        let origin = Point::new(lon, lat);

        for r in radii {
            let ranks = rtree.search(&self.search_box(lon, lat, r));
            let mut hits: Vec<Feature> = Vec::new();
            for rank in ranks {
                let Some(mut feature) = self.try_feature(&loaded, rank)? else {
                    continue;
                };
                let d = feature
                    .geometry
                    .as_ref()
                    .and_then(|g| self.distance(g, origin));
                if let Some(d) = d.filter(|d| *d <= r) {
                    feature.distance = Some(d);
                    hits.push(feature);
                }
            }
            hits.sort_by(|a, b| {
                a.distance
                    .unwrap_or(f64::INFINITY)
                    .total_cmp(&b.distance.unwrap_or(f64::INFINITY))
                    .then(a.rank.cmp(&b.rank))
            });
            debug!(radius = r, hits = hits.len(), "Nearest ring");

            let mut pipeline = opts.pipeline();
            for feature in hits {
                pipeline.push(feature);
                if !pipeline.is_empty() || pipeline.is_full() {
                    break;
                }
            }
            if let Some(feature) = pipeline.finish().into_iter().next() {
                return Ok(Some(feature));
            }
        }
        Ok(None)
    }

    /// Features whose `attribute` equals one of `values`, grouped by value
    /// in input order.
    pub fn search(&self, attribute: &str, values: &[Value], opts: &QueryOptions) -> Result<Vec<Feature>> {
        let loaded = self.loaded()?;
        let index = loaded.indexes.ordered(attribute)?;

        let mut pipeline = opts.pipeline();
        'values: for value in values {
            for rank in index.lookup(value) {
                let Some(feature) = self.try_feature(&loaded, rank)? else {
                    continue;
                };
                if feature_matches(&feature, attribute, value) && !pipeline.push(feature) {
                    break 'values;
                }
            }
        }
        Ok(pipeline.finish())
    }

    /// Features whose `attribute` approximately matches `text`.
    ///
    /// Fingerprint matches come first, then neighbor matches; each group is
    /// ordered by edit distance to `text`, then rank.
    pub fn fuzzy(&self, attribute: &str, text: &str, opts: &QueryOptions) -> Result<Vec<Feature>> {
        let loaded = self.loaded()?;
        let candidates = loaded.indexes.fuzzy(attribute)?.lookup(text);
        let cap = opts
            .max_text_distance()
            .or(self.config.search.max_text_distance);

        let mut pipeline = opts.pipeline();
        for group in [candidates.exact, candidates.near] {
            let mut ranked: Vec<(usize, Feature)> = Vec::new();
            for rank in group {
                let Some(feature) = self.try_feature(&loaded, rank)? else {
                    continue;
                };
                let value = feature.property_text(attribute).unwrap_or_default();
                let d = text_distance(text, &value);
                if cap.map_or(true, |cap| d <= cap) {
                    ranked.push((d, feature));
                }
            }
            ranked.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.rank.cmp(&b.1.rank)));
            for (_, feature) in ranked {
                if !pipeline.push(feature) {
                    return Ok(pipeline.finish());
                }
            }
        }
        Ok(pipeline.finish())
    }

    /// Features where every word of `text` prefixes some word of
    /// `attribute`, in rank order.
    pub fn prefix(&self, attribute: &str, text: &str, opts: &QueryOptions) -> Result<Vec<Feature>> {
        let loaded = self.loaded()?;
        let ranks = loaded.indexes.prefix(attribute)?.lookup(text);

        let mut pipeline = opts.pipeline();
        for rank in ranks {
            let Some(feature) = self.try_feature(&loaded, rank)? else {
                continue;
            };
            let value = feature.property_text(attribute).unwrap_or_default();
            if matches_all(text, &value) && !pipeline.push(feature) {
                break;
            }
        }
        Ok(pipeline.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexType;
    use crate::parser::tests::LineFormat;
    use crate::source::MemorySource;
    use serde_json::json;
    use std::thread;

    const PEOPLE: &str = "-100,-100,Harry\n100,100,Mary\n100,-100,Liz\n";

    fn geofile(text: &str) -> Geofile {
        let data: Arc<dyn ByteSource> = Arc::new(MemorySource::from_text("test.txt", text));
        Geofile::new("test", data, Arc::new(LineFormat))
    }

    fn opened(text: &str) -> Geofile {
        let file = geofile(text);
        file.open().unwrap();
        file
    }

    fn names(features: &[Feature]) -> Vec<String> {
        features
            .iter()
            .map(|f| f.property_text("name").unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_open_builds_mandatory_indexes() {
        let file = opened(PEOPLE);
        assert!(file.is_loaded());
        assert_eq!(file.count(), 3);
        let kinds: Vec<IndexType> = file.indexes().unwrap().iter().map(|i| i.kind).collect();
        assert_eq!(kinds, vec![IndexType::Handle, IndexType::Rtree]);
        for rank in 0..3 {
            assert_eq!(file.get_feature(rank).unwrap().rank, rank);
        }
        assert!(matches!(
            file.get_feature(3),
            Err(GeofileError::RankOutOfRange { rank: 3, count: 3 })
        ));
    }

    #[test]
    fn test_bbox_and_point() {
        let file = opened(PEOPLE);
        let opts = QueryOptions::new();

        let south = file.bbox(&BBox::new(-200.0, -200.0, 200.0, 0.0), &opts).unwrap();
        let mut found = names(&south);
        found.sort();
        assert_eq!(found, vec!["Harry", "Liz"]);

        let at = file.point(100.0, 100.0, &opts).unwrap();
        assert_eq!(names(&at), vec!["Mary"]);
        assert!(file.point(0.0, 0.0, &opts).unwrap().is_empty());
    }

    #[test]
    fn test_nearest() {
        let file = opened(PEOPLE);
        let opts = QueryOptions::new();

        let hit = file.nearest(99.0, 99.0, 2.0, &opts).unwrap().unwrap();
        assert_eq!(hit.property_text("name").as_deref(), Some("Mary"));
        assert!((hit.distance.unwrap() - 2f64.sqrt()).abs() < 1e-12);

        assert!(file.nearest(99.0, 99.0, 0.5, &opts).unwrap().is_none());

        let hit = file
            .nearest(90.0, -90.0, Radius::Expanding(vec![1.0, 5.0, 50.0]), &opts)
            .unwrap()
            .unwrap();
        assert_eq!(hit.property_text("name").as_deref(), Some("Liz"));

        // the filter sees candidates closest first
        let not_mary = QueryOptions::new().with_filter(|f| f.property_text("name").as_deref() != Some("Mary"));
        let hit = file.nearest(99.0, 99.0, 500.0, &not_mary).unwrap().unwrap();
        assert_eq!(hit.property_text("name").as_deref(), Some("Liz"));
    }

    #[test]
    fn test_nearest_haversine_in_meters() {
        let mut config = GeofileConfig::default();
        config.search.metric = DistanceMetric::Haversine;
        let file = geofile("2.3522,48.8566,Paris\n-0.1276,51.5072,London\n").with_config(config);
        file.open().unwrap();

        let hit = file
            .nearest(2.35, 48.85, Radius::Expanding(vec![100.0, 10_000.0]), &QueryOptions::new())
            .unwrap()
            .unwrap();
        assert_eq!(hit.property_text("name").as_deref(), Some("Paris"));
        let d = hit.distance.unwrap();
        assert!(d > 100.0 && d < 10_000.0, "distance {} m", d);
    }

    #[test]
    fn test_attribute_queries_after_build() {
        let file = geofile("0,0,Harry Potter\n1,1,Queen Elizabeth II\n2,2,Mary\n3,3,Harry Potter\n4,4,Mary Poppins\n");
        let bytes = file
            .build_indexes(&[
                IndexDefinition::ordered("name"),
                IndexDefinition::fuzzy("name"),
                IndexDefinition::prefix("name"),
            ])
            .unwrap();
        assert!(file.is_loaded());
        let opts = QueryOptions::new();

        let found = file.search("name", &[json!("Harry Potter")], &opts).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|f| f.property("name") == Some(&json!("Harry Potter"))));

        let found = file.search("name", &[json!("Mary"), json!("Harry Potter")], &opts).unwrap();
        let ranks: Vec<Rank> = found.iter().map(|f| f.rank).collect();
        assert_eq!(ranks, vec![2, 0, 3]);

        assert_eq!(file.prefix("name", "Eliz Quee", &opts).unwrap().len(), 1);
        assert!(file.prefix("name", "Eliz DummY", &opts).unwrap().is_empty());
        assert_eq!(names(&file.prefix("name", "mar", &opts).unwrap()), vec!["Mary", "Mary Poppins"]);

        let fuzzy = file.fuzzy("name", "Harri Potter", &opts).unwrap();
        assert_eq!(fuzzy.len(), 2);
        assert!(names(&fuzzy).iter().all(|n| n == "Harry Potter"));

        // the returned bytes reload to the same answers
        let reloaded = geofile("0,0,Harry Potter\n1,1,Queen Elizabeth II\n2,2,Mary\n3,3,Harry Potter\n4,4,Mary Poppins\n")
            .with_index_source(Arc::new(MemorySource::new("test.idx", bytes)));
        reloaded.open().unwrap();
        assert_eq!(reloaded.count(), 5);
        assert_eq!(reloaded.prefix("name", "quee", &opts).unwrap().len(), 1);
    }

    #[test]
    fn test_fuzzy_distance_cap_and_order() {
        let file = geofile("0,0,Harri\n1,1,Harry\n2,2,Hary\n");
        file.build_indexes(&[IndexDefinition::fuzzy("name")]).unwrap();

        let all = file.fuzzy("name", "Harry", &QueryOptions::new()).unwrap();
        assert_eq!(names(&all), vec!["Harry", "Harri", "Hary"]);

        let capped = file
            .fuzzy("name", "Harry", &QueryOptions::new().with_max_text_distance(0))
            .unwrap();
        assert_eq!(names(&capped), vec!["Harry"]);
    }

    #[test]
    fn test_missing_attribute_index() {
        let file = opened(PEOPLE);
        let err = file.fuzzy("name", "Harry", &QueryOptions::new()).unwrap_err();
        assert!(matches!(err, GeofileError::IndexNotFound { kind: IndexType::Fuzzy, .. }));
        // range errors leave the container loaded
        assert!(file.is_loaded());
    }

    #[test]
    fn test_get_features_and_parse() {
        let file = opened(PEOPLE);
        let opts = QueryOptions::new();
        let ranks: Vec<Rank> = file.get_features(1, 5, &opts).unwrap().iter().map(|f| f.rank).collect();
        assert_eq!(ranks, vec![1, 2]);
        assert!(file.get_features(3, 1, &opts).is_err());

        let capped = QueryOptions::new().with_max_features(2);
        assert_eq!(file.parse(&capped).unwrap().len(), 2);
        let unopened = geofile("# comment\n\n1,2,a\n3,4,b\n");
        assert_eq!(unopened.parse(&opts).unwrap().len(), 2);
    }

    #[test]
    fn test_queries_need_open() {
        let file = geofile(PEOPLE);
        assert!(!file.is_loaded());
        assert!(matches!(file.get_feature(0), Err(GeofileError::NotLoaded { .. })));

        file.open().unwrap();
        file.close();
        assert!(!file.is_loaded());
        assert_eq!(file.count(), 0);
        assert!(file.point(100.0, 100.0, &QueryOptions::new()).is_err());
    }

    #[test]
    fn test_bad_index_source_leaves_unloaded() {
        let file = geofile(PEOPLE)
            .with_index_source(Arc::new(MemorySource::from_text("bad.idx", "not an index file")));
        let err = file.open().unwrap_err();
        assert!(err.is_fatal_to_load());
        assert!(!file.is_loaded());
    }

    #[test]
    fn test_failed_build_keeps_previous_set() {
        let file = opened("1,1,a\n2,2,b\n");
        let err = file
            .build_indexes(&[IndexDefinition::ordered("n".repeat(60))])
            .unwrap_err();
        assert!(matches!(err, GeofileError::NameTooLong { .. }));
        assert_eq!(file.count(), 2);
    }

    #[test]
    fn test_syntax_error_aborts_open() {
        let file = geofile("1,1,a\n2,2,!b\n");
        assert!(matches!(file.open(), Err(GeofileError::Syntax(_))));
        assert!(!file.is_loaded());
    }

    #[test]
    fn test_empty_file_is_not_loaded() {
        let file = geofile("");
        file.open().unwrap();
        assert!(!file.is_loaded());
        assert_eq!(file.count(), 0);
        assert!(file.bbox(&BBox::new(-1.0, -1.0, 1.0, 1.0), &QueryOptions::new()).unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_queries() {
        let file = Arc::new(opened(PEOPLE));
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let file = Arc::clone(&file);
                thread::spawn(move || {
                    for _ in 0..20 {
                        let hits = file.point(100.0, -100.0, &QueryOptions::new()).unwrap();
                        assert_eq!(hits.len(), 1);
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }
    }
}
