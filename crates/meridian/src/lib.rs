//! Meridian - Geocoding Document Pipeline
//!
//! Meridian turns OpenStreetMap place extracts into multilingual search
//! documents and turns free-text requests with OSM tag filters into
//! structured queries.
//!
//! # Quick Start
//!
//! ```rust
//! use meridian::{Geocoder, SearchRequest};
//! use meridian::data_processing::test_data;
//!
//! let geocoder = Geocoder::with_defaults()?;
//! geocoder.index_frames(&test_data::place_frame()?, &test_data::address_frame()?)?;
//!
//! // Only streets, in English
//! let request = SearchRequest::new("baker street")
//!     .with_tag("highway")
//!     .with_language("en");
//! let results = geocoder.search(&request)?;
//! assert_eq!(results[0].city.as_deref(), Some("London"));
//! # Ok::<(), meridian::error::MeridianError>(())
//! ```
//!
//! # Building blocks
//!
//! - [`DocumentAssembler`] resolves a place's address hierarchy (street,
//!   city, state, country) and context from its ancestor rows.
//! - [`TagFilter`] parses `osm_tag` tokens such as `shop:bakery`,
//!   `!highway` or `amenity:!post_box`.
//! - [`TagFilterQueryBuilder`] combines the query text and filters into an
//!   engine-agnostic [`QuerySpec`].
//! - [`StreetDupesRemover`] drops repeated street segments from results.
use once_cell::sync::OnceCell;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, filter::Directive, fmt::format::FmtSpan};

pub mod config;
mod core;
pub mod document;
pub mod error;
pub mod index;
pub mod query;
pub mod results;

pub use crate::core::{Geocoder, IndexReport, SearchRequest};

pub use config::{MetropolitanOverride, PipelineConfig, PipelineConfigBuilder};
pub use document::{AddressType, ContextMap, DocumentAssembler, HierarchyClassifier, NameMap, PlaceDocument};
pub use index::{IndexHit, PlaceIndex};
pub use meridian_data_processing as data_processing;
pub use meridian_data_processing::{AddressRow, Extent, PlaceRow, Point};
pub use polars;
pub use query::{BuiltQuery, FilterNode, QuerySpec, QueryState, TagFilter, TagFilterKind, TagFilterQueryBuilder};
pub use results::{LocalizedResult, StreetDupesRemover, to_feature_collection};

static LOGGER_INIT: OnceCell<()> = OnceCell::new();

/// Initialize logging for the library.
///
/// `RUST_LOG` takes precedence over `level`. Only the first call installs
/// the subscriber; later calls are no-ops.
///
/// ```rust
/// use meridian::init_logging;
/// use tracing::Level;
///
/// init_logging(Level::INFO)?;
/// # Ok::<(), meridian::error::MeridianError>(())
/// ```
pub fn init_logging(level: impl Into<LevelFilter>) -> Result<&'static (), error::MeridianError> {
    LOGGER_INIT.get_or_try_init(|| {
        let quiet_tantivy: Directive = "tantivy=warn".parse()?;
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level.into().to_string()))?
            .add_directive(quiet_tantivy);

        tracing_subscriber::fmt::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .init();
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_processing::test_data::*;

    fn setup_test_env() {
        let _ = init_logging(tracing::Level::WARN);
    }

    #[test]
    fn test_init_logging_twice() {
        setup_test_env();
        assert!(init_logging(tracing::Level::DEBUG).is_ok(), "Second init should be a no-op");
    }

    #[test]
    fn test_geocoder_creation() {
        setup_test_env();

        let geocoder = Geocoder::with_defaults();
        assert!(geocoder.is_ok(), "Should be able to create a geocoder with defaults");
    }

    #[test]
    fn test_basic_search() {
        setup_test_env();

        let geocoder = Geocoder::with_defaults().unwrap();
        geocoder.index_frames(&place_frame().unwrap(), &address_frame().unwrap()).unwrap();

        for term in ["München", "Marienplatz", "Alexanderplatz", "Baker Street"] {
            let results = geocoder.search(&SearchRequest::new(term)).unwrap();
            assert!(!results.is_empty(), "Search for '{term}' should find something");
        }
    }
}
