//! Localized search results and their post-processing.

use std::collections::{BTreeMap, BTreeSet};

use ahash::AHashSet;
use meridian_data_processing::{Extent, Point};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::config::PipelineConfig;
use crate::document::{AddressType, NameMap, PlaceDocument};

/// A document rendered in one language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalizedResult {
    pub place_id: u64,
    pub osm_type: String,
    pub osm_id: u64,
    pub osm_key: String,
    pub osm_value: String,
    #[serde(rename = "type")]
    pub address_type: AddressType,
    pub name: Option<String>,
    pub housenumber: Option<String>,
    pub street: Option<String>,
    pub postcode: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub coordinates: Point,
    pub extent: Option<Extent>,
    pub score: f32,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub extra: BTreeMap<String, String>,
}

impl LocalizedResult {
    /// Picks the `language` entry of every name, falling back to `default`.
    pub fn localize(doc: &PlaceDocument, language: &str, score: f32) -> Self {
        let part = |kind: AddressType| -> Option<String> {
            doc.address_part(kind)
                .and_then(|names| names.localized(language))
                .map(str::to_string)
        };
        Self {
            place_id: doc.place_id,
            osm_type: doc.osm_type.clone(),
            osm_id: doc.osm_id,
            osm_key: doc.osm_key.clone(),
            osm_value: doc.osm_value.clone(),
            address_type: doc.address_type(),
            name: localized_name(&doc.names, language),
            housenumber: doc.housenumber.clone(),
            street: part(AddressType::Street),
            postcode: doc.postcode.clone(),
            city: part(AddressType::City),
            state: part(AddressType::State),
            country: part(AddressType::Country),
            country_code: doc.country_code.clone(),
            coordinates: doc.centroid,
            extent: doc.bbox,
            score,
            extra: doc.extra_tags.clone(),
        }
    }

    pub fn is_street(&self) -> bool {
        self.osm_key == "highway"
    }
}

fn localized_name(names: &NameMap, language: &str) -> Option<String> {
    names.localized(language).map(str::to_string)
}

/// Drops repeated street segments from a result list.
///
/// Long streets are split into many ways in OSM. Two street results with the
/// same name and postcode are treated as the same street, and only the first
/// one is kept. Results that are not streets, or lack a postcode or name,
/// always pass.
#[derive(Debug, Clone)]
pub struct StreetDupesRemover {
    numeric_postcodes: bool,
}

impl StreetDupesRemover {
    /// Only the `nl` locale compares postcodes by their digits.
    pub fn new(language: &str) -> Self {
        Self {
            numeric_postcodes: language == "nl",
        }
    }

    pub fn from_config(language: &str, config: &PipelineConfig) -> Self {
        Self {
            numeric_postcodes: config.numeric_postcode_locales.contains(language),
        }
    }

    pub fn remove(&self, results: Vec<LocalizedResult>) -> Vec<LocalizedResult> {
        let before = results.len();
        let mut seen: AHashSet<String> = AHashSet::new();
        let kept: Vec<LocalizedResult> = results
            .into_iter()
            .filter(|result| self.dedupe_key(result).is_none_or(|key| seen.insert(key)))
            .collect();
        if kept.len() < before {
            debug!(removed = before - kept.len(), "Removed duplicate streets");
        }
        kept
    }

    fn dedupe_key(&self, result: &LocalizedResult) -> Option<String> {
        if !result.is_street() {
            return None;
        }
        let (postcode, name) = (result.postcode.as_deref()?, result.name.as_deref()?);
        let postcode = if self.numeric_postcodes {
            postcode.chars().filter(char::is_ascii_digit).collect()
        } else {
            postcode.to_string()
        };
        Some(format!("{postcode}:{name}"))
    }
}

/// Renders results as a GeoJSON FeatureCollection.
pub fn to_feature_collection(results: &[LocalizedResult]) -> Value {
    let features: Vec<Value> = results.iter().map(feature).collect();
    json!({
        "type": "FeatureCollection",
        "features": features,
    })
}

fn feature(result: &LocalizedResult) -> Value {
    let mut properties = serde_json::Map::new();
    properties.insert("osm_type".into(), json!(result.osm_type));
    properties.insert("osm_id".into(), json!(result.osm_id));
    properties.insert("osm_key".into(), json!(result.osm_key));
    properties.insert("osm_value".into(), json!(result.osm_value));
    properties.insert("type".into(), json!(result.address_type));
    let optional = [
        ("name", &result.name),
        ("housenumber", &result.housenumber),
        ("street", &result.street),
        ("postcode", &result.postcode),
        ("city", &result.city),
        ("state", &result.state),
        ("country", &result.country),
        ("countrycode", &result.country_code),
    ];
    for (key, value) in optional {
        if let Some(value) = value {
            properties.insert(key.into(), json!(value));
        }
    }
    if let Some(extent) = result.extent {
        properties.insert("extent".into(), json!(extent.as_array()));
    }
    if !result.extra.is_empty() {
        properties.insert("extra".into(), json!(result.extra));
    }

    json!({
        "type": "Feature",
        "geometry": {
            "type": "Point",
            "coordinates": [result.coordinates.lon, result.coordinates.lat],
        },
        "properties": properties,
    })
}

/// Languages a result set can be rendered in, as a convenience for callers
/// that validate a requested language.
pub fn supported_languages(config: &PipelineConfig) -> BTreeSet<&str> {
    config
        .languages
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(crate::document::DEFAULT_KEY))
        .collect()
}
