//! Raw rows as extracted from the place database.
//!
//! A [`PlaceRow`] is the place a document is built for. Each place comes with
//! an ordered list of [`AddressRow`]s, its ancestors in the administrative
//! hierarchy (street, suburb, city, state, country, ...).

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::{Extent, Point};

/// Name tags exactly as stored on the object (`name`, `name:de`, `alt_name`, ...).
pub type RawNameTags = HashMap<String, String>;

/// The place a search document is assembled for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceRow {
    pub place_id: u64,
    /// `N`, `W` or `R`.
    pub osm_type: String,
    pub osm_id: u64,
    pub osm_key: String,
    pub osm_value: String,
    pub names: RawNameTags,
    pub housenumber: Option<String>,
    pub postcode: Option<String>,
    pub country_code: Option<String>,
    pub extratags: BTreeMap<String, String>,
    /// Address tags without the `addr:` prefix, e.g. `street`, `city:de`.
    pub address: BTreeMap<String, String>,
    pub centroid: Point,
    pub bbox: Option<Extent>,
    pub rank_address: u8,
    pub rank_search: u8,
    pub admin_level: Option<u8>,
    pub importance: Option<f64>,
    pub parent_place_id: Option<u64>,
}

impl PlaceRow {
    /// A minimal row with the mandatory fields set and everything else empty.
    pub fn new(
        place_id: u64,
        osm_type: impl Into<String>,
        osm_id: u64,
        osm_key: impl Into<String>,
        osm_value: impl Into<String>,
        rank_address: u8,
    ) -> Self {
        Self {
            place_id,
            osm_type: osm_type.into(),
            osm_id,
            osm_key: osm_key.into(),
            osm_value: osm_value.into(),
            names: RawNameTags::new(),
            housenumber: None,
            postcode: None,
            country_code: None,
            extratags: BTreeMap::new(),
            address: BTreeMap::new(),
            centroid: Point::new(0.0, 0.0),
            bbox: None,
            rank_address,
            rank_search: rank_address,
            admin_level: None,
            importance: None,
            parent_place_id: None,
        }
    }

    pub fn with_name(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.names.insert(key.into(), value.into());
        self
    }

    pub fn with_extratag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extratags.insert(key.into(), value.into());
        self
    }

    pub fn with_address(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.address.insert(key.into(), value.into());
        self
    }

    pub const fn with_centroid(mut self, centroid: Point) -> Self {
        self.centroid = centroid;
        self
    }

    pub fn with_country_code(mut self, country_code: impl Into<String>) -> Self {
        self.country_code = Some(country_code.into());
        self
    }

    pub fn with_postcode(mut self, postcode: impl Into<String>) -> Self {
        self.postcode = Some(postcode.into());
        self
    }

    pub fn with_housenumber(mut self, housenumber: impl Into<String>) -> Self {
        self.housenumber = Some(housenumber.into());
        self
    }

    pub const fn with_admin_level(mut self, admin_level: u8) -> Self {
        self.admin_level = Some(admin_level);
        self
    }

    /// The `place=*` extra tag, if the object carries one.
    pub fn place_tag(&self) -> Option<&str> {
        self.extratags.get("place").map(String::as_str)
    }

    /// Converts the place into the ancestor form so that the same hierarchy
    /// predicates can be applied to it.
    pub fn as_address_row(&self) -> AddressRow {
        AddressRow {
            place_id: self.place_id,
            osm_type: Some(self.osm_type.clone()),
            osm_id: Some(self.osm_id),
            osm_key: self.osm_key.clone(),
            osm_value: self.osm_value.clone(),
            names: self.names.clone(),
            rank_address: self.rank_address,
            admin_level: self.admin_level,
            postcode: self.postcode.clone(),
            place: self.place_tag().map(str::to_string),
            is_address: true,
            housenumber: self.housenumber.clone(),
            country_code: self.country_code.clone(),
        }
    }
}

impl fmt::Display for PlaceRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PlaceRow {{ place_id: {}, osm: {}{}, tag: {}={} }}",
            self.place_id, self.osm_type, self.osm_id, self.osm_key, self.osm_value
        )
    }
}

/// One ancestor of a place in the address hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressRow {
    pub place_id: u64,
    pub osm_type: Option<String>,
    pub osm_id: Option<u64>,
    pub osm_key: String,
    pub osm_value: String,
    pub names: RawNameTags,
    pub rank_address: u8,
    pub admin_level: Option<u8>,
    pub postcode: Option<String>,
    /// Value of the `place=*` extra tag.
    pub place: Option<String>,
    /// Whether the row is a proper address line of the place rather than a
    /// containing area that merely overlaps it.
    pub is_address: bool,
    pub housenumber: Option<String>,
    pub country_code: Option<String>,
}

const USEFUL_CONTEXT_KEYS: [&str; 3] = ["boundary", "landuse", "place"];

impl AddressRow {
    pub fn new(
        place_id: u64,
        osm_key: impl Into<String>,
        osm_value: impl Into<String>,
        rank_address: u8,
    ) -> Self {
        Self {
            place_id,
            osm_type: None,
            osm_id: None,
            osm_key: osm_key.into(),
            osm_value: osm_value.into(),
            names: RawNameTags::new(),
            rank_address,
            admin_level: None,
            postcode: None,
            place: None,
            is_address: true,
            housenumber: None,
            country_code: None,
        }
    }

    pub fn with_name(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.names.insert(key.into(), value.into());
        self
    }

    pub fn with_osm(mut self, osm_type: impl Into<String>, osm_id: u64) -> Self {
        self.osm_type = Some(osm_type.into());
        self.osm_id = Some(osm_id);
        self
    }

    pub const fn with_admin_level(mut self, admin_level: u8) -> Self {
        self.admin_level = Some(admin_level);
        self
    }

    pub fn with_place(mut self, place: impl Into<String>) -> Self {
        self.place = Some(place.into());
        self
    }

    pub fn with_postcode(mut self, postcode: impl Into<String>) -> Self {
        self.postcode = Some(postcode.into());
        self
    }

    pub fn with_country_code(mut self, country_code: impl Into<String>) -> Self {
        self.country_code = Some(country_code.into());
        self
    }

    pub const fn with_is_address(mut self, is_address: bool) -> Self {
        self.is_address = is_address;
        self
    }

    /// The place type of the row: the `place` extra tag, or the main tag
    /// value when the object is itself a `place=*` object.
    pub fn place_tag(&self) -> Option<&str> {
        self.place
            .as_deref()
            .or_else(|| (self.osm_key == "place").then_some(self.osm_value.as_str()))
    }

    pub fn has_name(&self) -> bool {
        !self.names.is_empty()
    }

    pub fn is_administrative_boundary(&self) -> bool {
        self.osm_key == "boundary" && self.osm_value == "administrative"
    }

    /// Relation identity as used by curated lists and overrides.
    pub fn relation_id(&self) -> Option<u64> {
        match (self.osm_type.as_deref(), self.osm_id) {
            (Some("R"), Some(id)) => Some(id),
            _ => None,
        }
    }

    pub const fn is_street(&self) -> bool {
        26 <= self.rank_address && self.rank_address < 28
    }

    pub const fn is_state(&self) -> bool {
        5 <= self.rank_address && self.rank_address < 10
    }

    pub fn is_country(&self) -> bool {
        (self.is_administrative_boundary()
            && (self.admin_level == Some(2) || self.rank_address == 4))
            || self.place_tag() == Some("country")
    }

    pub fn is_postcode(&self) -> bool {
        (self.osm_key == "place" && self.osm_value == "postcode")
            || (self.osm_key == "boundary" && self.osm_value == "postal_code")
    }

    /// Context usefulness without the curated-city exclusion, which needs
    /// configuration and is applied by the classifier.
    pub fn is_useful_context_candidate(&self) -> bool {
        self.has_name()
            && !self.is_postcode()
            && self.rank_address >= 4
            && USEFUL_CONTEXT_KEYS.contains(&self.osm_key.as_str())
    }
}

impl fmt::Display for AddressRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AddressRow {{ place_id: {}, tag: {}={}, rank: {} }}",
            self.place_id, self.osm_key, self.osm_value, self.rank_address
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_predicates() {
        assert!(AddressRow::new(1, "highway", "residential", 26).is_street());
        assert!(AddressRow::new(1, "highway", "residential", 27).is_street());
        assert!(!AddressRow::new(1, "highway", "residential", 28).is_street());
        assert!(AddressRow::new(1, "boundary", "administrative", 5).is_state());
        assert!(AddressRow::new(1, "boundary", "administrative", 9).is_state());
        assert!(!AddressRow::new(1, "boundary", "administrative", 10).is_state());
    }

    #[test]
    fn test_country_detection() {
        let by_level = AddressRow::new(1, "boundary", "administrative", 0).with_admin_level(2);
        let by_rank = AddressRow::new(2, "boundary", "administrative", 4);
        let by_place = AddressRow::new(3, "place", "country", 4);
        let state = AddressRow::new(4, "boundary", "administrative", 8).with_admin_level(4);

        assert!(by_level.is_country(), "admin_level 2 boundary is a country");
        assert!(by_rank.is_country(), "rank 4 boundary is a country");
        assert!(by_place.is_country(), "place=country is a country");
        assert!(!state.is_country());
    }

    #[test]
    fn test_postcode_detection() {
        assert!(AddressRow::new(1, "place", "postcode", 21).is_postcode());
        assert!(AddressRow::new(1, "boundary", "postal_code", 21).is_postcode());
        assert!(!AddressRow::new(1, "place", "city", 16).is_postcode());
    }

    #[test]
    fn test_context_candidate() {
        let named = |row: AddressRow| row.with_name("name", "x");

        assert!(named(AddressRow::new(1, "place", "suburb", 20)).is_useful_context_candidate());
        assert!(named(AddressRow::new(1, "landuse", "residential", 22)).is_useful_context_candidate());
        assert!(
            !AddressRow::new(1, "place", "suburb", 20).is_useful_context_candidate(),
            "nameless rows are not useful"
        );
        assert!(
            !named(AddressRow::new(1, "place", "continent", 2)).is_useful_context_candidate(),
            "ranks below 4 are not useful"
        );
        assert!(
            !named(AddressRow::new(1, "highway", "residential", 26)).is_useful_context_candidate(),
            "only boundary, landuse and place keys are useful"
        );
        assert!(!named(AddressRow::new(1, "place", "postcode", 21)).is_useful_context_candidate());
    }

    #[test]
    fn test_place_tag_falls_back_to_main_tag() {
        let row = AddressRow::new(1, "place", "town", 16);
        assert_eq!(row.place_tag(), Some("town"));

        let row = AddressRow::new(1, "boundary", "administrative", 16).with_place("city");
        assert_eq!(row.place_tag(), Some("city"));

        assert_eq!(AddressRow::new(1, "highway", "primary", 26).place_tag(), None);
    }

    #[test]
    fn test_relation_id() {
        let row = AddressRow::new(1, "boundary", "administrative", 8).with_osm("R", 62422);
        assert_eq!(row.relation_id(), Some(62422));
        let row = AddressRow::new(1, "place", "city", 16).with_osm("N", 240109189);
        assert_eq!(row.relation_id(), None);
    }
}
