//! Search documents and their assembly from place rows.
//!
//! A [`PlaceDocument`] is built once per place from the place row and its
//! ancestors. It carries the place's own multilingual names, the resolved
//! address parts (street, city, state, country, ...) and the names of further
//! surrounding places as context.

mod address_tags;
mod address_type;
mod assemble;
mod classify;
mod names;

use std::collections::BTreeMap;

pub use address_type::AddressType;
pub use assemble::DocumentAssembler;
pub use classify::HierarchyClassifier;
pub use error::DocumentError;
pub(crate) use error::Result;
pub use names::{ContextMap, DEFAULT_KEY, NameMap};

use meridian_data_processing::{Extent, Point};
use serde::{Deserialize, Serialize};

/// An assembled, indexable search document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceDocument {
    pub place_id: u64,
    pub osm_type: String,
    pub osm_id: u64,
    pub osm_key: String,
    pub osm_value: String,
    pub rank_address: u8,
    pub rank_search: u8,
    pub centroid: Point,
    pub bbox: Option<Extent>,
    pub postcode: Option<String>,
    pub country_code: Option<String>,
    pub housenumber: Option<String>,
    pub names: NameMap,
    pub address: BTreeMap<AddressType, NameMap>,
    pub context: ContextMap,
    pub secondary_context: ContextMap,
    pub extra_tags: BTreeMap<String, String>,
    pub importance: f64,
}

impl PlaceDocument {
    pub fn address_type(&self) -> AddressType {
        AddressType::from_rank(self.rank_address)
    }

    pub fn address_part(&self, kind: AddressType) -> Option<&NameMap> {
        self.address.get(&kind)
    }

    pub fn city(&self) -> Option<&NameMap> {
        self.address_part(AddressType::City)
    }

    pub fn street(&self) -> Option<&NameMap> {
        self.address_part(AddressType::Street)
    }

    pub fn state(&self) -> Option<&NameMap> {
        self.address_part(AddressType::State)
    }

    pub fn country(&self) -> Option<&NameMap> {
        self.address_part(AddressType::Country)
    }

    /// Sets an address part unless it is already present or `names` is
    /// empty. Returns whether the part was stored.
    pub fn set_address_part(&mut self, kind: AddressType, names: NameMap) -> bool {
        if names.is_empty() || self.address.contains_key(&kind) {
            return false;
        }
        self.address.insert(kind, names);
        true
    }

    /// Replaces an address part and returns the previous names.
    pub fn replace_address_part(&mut self, kind: AddressType, names: NameMap) -> Option<NameMap> {
        self.address.insert(kind, names)
    }

    /// Documents without a name or a house number are not worth indexing.
    pub fn is_useful_for_index(&self) -> bool {
        self.housenumber.is_some() || !self.names.is_empty()
    }

    /// Splits a `;` separated house number list into one document per
    /// number. Documents with a single number are returned unchanged.
    pub fn expand_housenumbers(self) -> Vec<Self> {
        let numbers: Vec<String> = match self.housenumber.as_deref() {
            Some(raw) if raw.contains(';') => raw
                .split(';')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .collect(),
            _ => return vec![self],
        };
        if numbers.is_empty() {
            return vec![Self {
                housenumber: None,
                ..self
            }];
        }
        numbers
            .into_iter()
            .map(|number| Self {
                housenumber: Some(number),
                ..self.clone()
            })
            .collect()
    }

    /// Compact token describing the main tag, e.g. `tpfldbusstopclsfldhighway`.
    /// Tags that carry no useful classification yield `None`.
    pub fn classification(&self) -> Option<String> {
        classification_token(&self.osm_key, &self.osm_value)
    }
}

pub fn classification_token(key: &str, value: &str) -> Option<String> {
    if key == "place" || key == "building" {
        return None;
    }
    if key == "highway" && matches!(value, "unclassified" | "residential") {
        return None;
    }
    if !value.chars().all(|c| c == '_' || c.is_ascii_alphanumeric()) {
        return None;
    }
    let strip = |s: &str| s.replace('_', "").to_lowercase();
    Some(format!("tpfld{}clsfld{}", strip(value), strip(key)))
}

mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum DocumentError {
        #[error("Malformed place {place_id}: {reason}")]
        MalformedPlace { place_id: u64, reason: String },
        #[error("Malformed ancestor {ancestor_id} of place {place_id}: {reason}")]
        MalformedAncestor {
            place_id: u64,
            ancestor_id: u64,
            reason: String,
        },
    }

    pub type Result<T> = std::result::Result<T, DocumentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(housenumber: Option<&str>) -> PlaceDocument {
        PlaceDocument {
            place_id: 1,
            osm_type: "N".to_string(),
            osm_id: 1,
            osm_key: "amenity".to_string(),
            osm_value: "bus_stop".to_string(),
            rank_address: 30,
            rank_search: 30,
            centroid: Point::new(0.0, 0.0),
            bbox: None,
            postcode: None,
            country_code: None,
            housenumber: housenumber.map(str::to_string),
            names: NameMap::new(),
            address: BTreeMap::new(),
            context: ContextMap::new(),
            secondary_context: ContextMap::new(),
            extra_tags: BTreeMap::new(),
            importance: 0.0,
        }
    }

    #[test]
    fn test_expand_housenumbers() {
        let docs = doc(Some("8;10; 12")).expand_housenumbers();
        let numbers: Vec<_> = docs.iter().filter_map(|d| d.housenumber.as_deref()).collect();
        assert_eq!(numbers, vec!["8", "10", "12"]);
        assert!(docs.iter().all(|d| d.place_id == 1));

        assert_eq!(doc(Some("8")).expand_housenumbers().len(), 1);
        assert_eq!(doc(None).expand_housenumbers().len(), 1);

        let docs = doc(Some(";")).expand_housenumbers();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].housenumber, None);
    }

    #[test]
    fn test_useful_for_index() {
        assert!(!doc(None).is_useful_for_index());
        assert!(doc(Some("3")).is_useful_for_index());

        let mut named = doc(None);
        named.names.set_name(DEFAULT_KEY, "Stachus");
        assert!(named.is_useful_for_index());
    }

    #[test]
    fn test_classification_token() {
        assert_eq!(
            classification_token("highway", "bus_stop").as_deref(),
            Some("tpfldbusstopclsfldhighway")
        );
        assert_eq!(classification_token("place", "city"), None);
        assert_eq!(classification_token("building", "yes"), None);
        assert_eq!(classification_token("highway", "residential"), None);
        assert_eq!(classification_token("shop", "bäcker"), None);
        assert_eq!(doc(None).classification().as_deref(), Some("tpfldbusstopclsfldamenity"));
    }

    #[test]
    fn test_address_parts_are_set_once() {
        let mut d = doc(None);
        let first: NameMap = [(DEFAULT_KEY, "München")].into_iter().collect();
        let second: NameMap = [(DEFAULT_KEY, "Augsburg")].into_iter().collect();

        assert!(d.set_address_part(AddressType::City, first.clone()));
        assert!(!d.set_address_part(AddressType::City, second.clone()));
        assert!(!d.set_address_part(AddressType::Street, NameMap::new()));
        assert_eq!(d.city(), Some(&first));

        assert_eq!(d.replace_address_part(AddressType::City, second.clone()), Some(first));
        assert_eq!(d.city(), Some(&second));
    }

    #[test]
    fn test_document_json_roundtrip_keeps_address_keys() {
        let mut d = doc(None);
        d.set_address_part(AddressType::Country, [(DEFAULT_KEY, "Deutschland")].into_iter().collect());
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["address"]["country"]["default"], "Deutschland");
        let back: PlaceDocument = serde_json::from_value(json).unwrap();
        assert_eq!(back, d);
    }
}
