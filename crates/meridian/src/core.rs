//! The [`Geocoder`] facade.
//!
//! Ties the pipeline together: place and address rows are assembled into
//! documents and indexed; requests are parsed into tag filters, built into a
//! query, executed, de-duplicated and localized.
//!
//! ```rust
//! use meridian::{Geocoder, SearchRequest};
//! use meridian::data_processing::test_data;
//!
//! let geocoder = Geocoder::with_defaults()?;
//! geocoder.index_frames(&test_data::place_frame()?, &test_data::address_frame()?)?;
//!
//! let results = geocoder.search(&SearchRequest::new("marienplatz").with_language("de"))?;
//! assert_eq!(results[0].city.as_deref(), Some("München"));
//! # Ok::<(), meridian::error::MeridianError>(())
//! ```

use std::path::Path;

use itertools::Itertools;
use meridian_data_processing::{AddressRow, PlaceRow, Point, read_address_lines, read_place_rows};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::config::PipelineConfig;
use crate::document::{DocumentAssembler, DocumentError, PlaceDocument};
use crate::error::Result;
use crate::index::PlaceIndex;
use crate::query::{BuiltQuery, TagFilter, TagFilterQueryBuilder, parse_layers};
use crate::results::{LocalizedResult, StreetDupesRemover, supported_languages, to_feature_collection};

/// A geocoding request as it arrives from a front end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchRequest {
    pub query: String,
    pub limit: Option<i64>,
    pub location_bias: Option<Point>,
    /// Raw `osm_tag` tokens, e.g. `["shop:bakery", "!highway"]`.
    pub osm_tags: Vec<String>,
    /// Address types to restrict results to, e.g. `["city", "street"]`.
    pub layers: Vec<String>,
    /// Every query term must match. Lenient matching also accepts partial
    /// and fuzzy matches.
    pub strict: bool,
    pub language: Option<String>,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            limit: None,
            location_bias: None,
            osm_tags: Vec::new(),
            layers: Vec::new(),
            strict: true,
            language: None,
        }
    }
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_tag(mut self, token: impl Into<String>) -> Self {
        self.osm_tags.push(token.into());
        self
    }

    pub fn with_layer(mut self, layer: impl Into<String>) -> Self {
        self.layers.push(layer.into());
        self
    }

    pub fn with_location_bias(mut self, point: Point) -> Self {
        self.location_bias = Some(point);
        self
    }

    pub fn lenient(mut self) -> Self {
        self.strict = false;
        self
    }
}

/// Outcome of an indexing run.
#[derive(Debug, Default)]
pub struct IndexReport {
    /// Documents written to the index.
    pub indexed: usize,
    /// Documents dropped for having neither a name nor a house number.
    pub skipped: usize,
    /// Rows rejected while reading frames.
    pub rejected_rows: usize,
    /// Places that could not be assembled.
    pub failures: Vec<DocumentError>,
}

/// Assembles, indexes and searches place documents.
#[derive(Debug, Clone)]
pub struct Geocoder {
    config: PipelineConfig,
    assembler: DocumentAssembler,
    index: PlaceIndex,
}

impl Geocoder {
    #[instrument(name = "Create Geocoder", level = "info", skip_all)]
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let assembler = DocumentAssembler::new(&config);
        let index = PlaceIndex::new(&config.languages)?;
        info!(languages = ?config.languages, "Geocoder ready");
        Ok(Self {
            config,
            assembler,
            index,
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(PipelineConfig::default())
    }

    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub const fn index(&self) -> &PlaceIndex {
        &self.index
    }

    /// Assembles one document per place without indexing it.
    pub fn assemble(&self, place: &PlaceRow, ancestors: &[AddressRow]) -> Result<PlaceDocument> {
        Ok(self.assembler.assemble(place, ancestors)?)
    }

    /// Assembles and indexes places. A place that fails to assemble is
    /// reported and skipped; the others are still indexed.
    #[instrument(name = "Index places", level = "info", skip_all, fields(num_places = places.len()))]
    pub fn index_places(&self, places: &[(PlaceRow, Vec<AddressRow>)]) -> Result<IndexReport> {
        let t_index = std::time::Instant::now();
        let mut report = IndexReport::default();
        let mut docs = Vec::with_capacity(places.len());

        for assembled in self.assembler.assemble_batch(places) {
            match assembled {
                Ok(doc) => {
                    for doc in doc.expand_housenumbers() {
                        if doc.is_useful_for_index() {
                            docs.push(doc);
                        } else {
                            debug!(place_id = doc.place_id, "Skipping document without name or house number");
                            report.skipped += 1;
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to assemble place");
                    report.failures.push(e);
                }
            }
        }

        self.index.upsert(&docs)?;
        report.indexed = docs.len();
        info!(
            indexed = report.indexed,
            skipped = report.skipped,
            failed = report.failures.len(),
            elapsed_seconds = ?t_index.elapsed(),
            "Indexing complete"
        );
        Ok(report)
    }

    /// Indexes a place frame together with its address frame. Address lines
    /// are matched to places by `for_place_id`.
    pub fn index_frames(&self, places: &DataFrame, addresses: &DataFrame) -> Result<IndexReport> {
        let place_batch = PlaceRow::from_df(places)?;
        let address_batch = AddressRow::from_df(addresses)?;
        let rejected_rows = place_batch.rejected.len() + address_batch.rejected.len();
        self.index_batches(place_batch.rows, address_batch.rows, rejected_rows)
    }

    /// Same as [`index_frames`](Self::index_frames), reading parquet files.
    pub fn index_parquet(&self, places: impl AsRef<Path>, addresses: impl AsRef<Path>) -> Result<IndexReport> {
        let place_batch = read_place_rows(places)?;
        let address_batch = read_address_lines(addresses)?;
        let rejected_rows = place_batch.rejected.len() + address_batch.rejected.len();
        self.index_batches(place_batch.rows, address_batch.rows, rejected_rows)
    }

    fn index_batches(
        &self,
        places: Vec<PlaceRow>,
        lines: Vec<meridian_data_processing::AddressLine>,
        rejected_rows: usize,
    ) -> Result<IndexReport> {
        let mut ancestors = lines
            .into_iter()
            .map(|line| (line.for_place_id, line.row))
            .into_group_map();
        let pairs: Vec<(PlaceRow, Vec<AddressRow>)> = places
            .into_iter()
            .map(|place| {
                let rows = ancestors.remove(&place.place_id).unwrap_or_default();
                (place, rows)
            })
            .collect();
        if !ancestors.is_empty() {
            warn!(orphaned = ancestors.len(), "Address lines reference unknown places");
        }

        let mut report = self.index_places(&pairs)?;
        report.rejected_rows = rejected_rows;
        Ok(report)
    }

    /// The request language if it is supported, else the configured default.
    fn resolve_language(&self, requested: Option<&str>) -> String {
        match requested {
            Some(lang) if supported_languages(&self.config).contains(lang) => lang.to_string(),
            Some(lang) => {
                debug!(language = lang, fallback = %self.config.default_language, "Unsupported language");
                self.config.default_language.clone()
            }
            None => self.config.default_language.clone(),
        }
    }

    /// Parses the request's tag tokens and layers and builds the query.
    /// Unknown layer names are an error; invalid tag tokens are skipped.
    pub fn build_query(&self, request: &SearchRequest) -> Result<BuiltQuery> {
        let language = self.resolve_language(request.language.as_deref());
        let filters = TagFilter::parse_all(&request.osm_tags);
        let layers = parse_layers(&request.layers)?;
        let builder = TagFilterQueryBuilder::new(&request.query, language, &self.config.languages)
            .with_limit(request.limit)
            .with_location_bias(request.location_bias)
            .with_tag_filters(&filters)
            .with_layers(&layers);
        let builder = if request.strict {
            builder.with_strict_match()
        } else {
            builder.with_lenient_match()
        };
        Ok(builder.build()?)
    }

    /// Runs a request and returns localized, de-duplicated results.
    #[instrument(name = "Geocoder search", level = "info", skip_all, fields(query = %request.query))]
    pub fn search(&self, request: &SearchRequest) -> Result<Vec<LocalizedResult>> {
        let t_search = std::time::Instant::now();
        let query = self.build_query(request)?;
        let spec = query.spec();

        let results: Vec<LocalizedResult> = self
            .index
            .search(spec)?
            .into_iter()
            .map(|hit| LocalizedResult::localize(&hit.document, &spec.language, hit.score))
            .collect();
        let results = StreetDupesRemover::from_config(&spec.language, &self.config).remove(results);

        info!(
            num_results = results.len(),
            elapsed_seconds = ?t_search.elapsed(),
            "Search complete"
        );
        Ok(results)
    }

    /// Runs a request and renders the results as GeoJSON.
    pub fn search_geojson(&self, request: &SearchRequest) -> Result<Value> {
        Ok(to_feature_collection(&self.search(request)?))
    }
}

#[cfg(test)]
mod tests {
    use meridian_data_processing::test_data::*;

    use super::*;
    use crate::document::AddressType;
    use crate::error::MeridianError;
    use crate::query::QueryError;

    fn geocoder() -> Geocoder {
        let geocoder = Geocoder::with_defaults().unwrap();
        let report = geocoder.index_frames(&place_frame().unwrap(), &address_frame().unwrap()).unwrap();
        assert!(report.failures.is_empty(), "{:?}", report.failures);
        geocoder
    }

    #[test]
    fn test_request_defaults_to_strict() {
        let request: SearchRequest = serde_json::from_str(r#"{"query": "berlin"}"#).unwrap();
        assert!(request.strict);
        assert_eq!(request.limit, None);
        assert!(!SearchRequest::new("x").lenient().strict);
    }

    #[test]
    fn test_unsupported_language_falls_back() {
        let geocoder = Geocoder::with_defaults().unwrap();
        let query = geocoder
            .build_query(&SearchRequest::new("x").with_language("xx"))
            .unwrap();
        assert_eq!(query.spec().language, "en");

        let query = geocoder
            .build_query(&SearchRequest::new("x").with_language("de"))
            .unwrap();
        assert_eq!(query.spec().language, "de");
    }

    #[test]
    fn test_build_query_applies_request() {
        let geocoder = Geocoder::with_defaults().unwrap();
        let request = SearchRequest::new("bakery")
            .with_limit(500)
            .with_tag("shop")
            .with_tag("::")
            .lenient();
        let spec = geocoder.build_query(&request).unwrap().into_spec();
        assert_eq!(spec.limit, 50);
        assert!(spec.filter.is_some());
        assert!(spec.accepts_tag("shop", "bakery"));
        assert!(!spec.accepts_tag("amenity", "cafe"));
    }

    #[test]
    fn test_layers_from_request() {
        let geocoder = geocoder();
        let results = geocoder
            .search(&SearchRequest::new("münchen").with_layer("city"))
            .unwrap();
        assert!(!results.is_empty());
        assert!(results.iter().all(|r| r.address_type == AddressType::City));

        let err = geocoder
            .build_query(&SearchRequest::new("münchen").with_layer("planet"))
            .unwrap_err();
        assert!(matches!(err, MeridianError::Query(QueryError::UnknownLayer { .. })));
    }

    #[test]
    fn test_house_numbers_are_expanded() {
        let geocoder = geocoder();
        let docs = geocoder.index().get(RATHAUS_PLACE_ID).unwrap();
        let mut numbers: Vec<_> = docs.iter().filter_map(|d| d.housenumber.clone()).collect();
        numbers.sort();
        assert_eq!(numbers, vec!["10", "8"]);
    }

    #[test]
    fn test_reindexing_replaces_documents() {
        let geocoder = geocoder();
        let before = geocoder.index().num_docs().unwrap();
        geocoder.index_frames(&place_frame().unwrap(), &address_frame().unwrap()).unwrap();
        assert_eq!(geocoder.index().num_docs().unwrap(), before);
    }
}
