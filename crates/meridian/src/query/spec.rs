//! Engine-agnostic query description.
//!
//! A [`QuerySpec`] is what the builder produces and what every engine adapter
//! consumes. The filter tree is the contract between the two: the include
//! groups are OR-ed, the exclude groups are AND-ed, and both are combined
//! conjunctively with an optional layer restriction.

use std::collections::BTreeSet;

use meridian_data_processing::Point;
use serde::{Deserialize, Serialize};

use crate::document::AddressType;

/// The document field a filter predicate looks at: the key or value of the
/// main tag, or the address type (layer) of the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TagField {
    #[serde(rename = "osm_key")]
    Key,
    #[serde(rename = "osm_value")]
    Value,
    #[serde(rename = "address_type")]
    Layer,
}

impl TagField {
    pub const fn field_name(self) -> &'static str {
        match self {
            Self::Key => "osm_key",
            Self::Value => "osm_value",
            Self::Layer => "address_type",
        }
    }

    fn select<'a>(self, osm_key: &'a str, osm_value: &'a str, layer: Option<AddressType>) -> Option<&'a str> {
        match self {
            Self::Key => Some(osm_key),
            Self::Value => Some(osm_value),
            Self::Layer => layer.map(AddressType::name),
        }
    }
}

/// A boolean predicate tree over the main tag of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterNode {
    Term { field: TagField, value: String },
    Terms { field: TagField, values: BTreeSet<String> },
    And(Vec<FilterNode>),
    Or(Vec<FilterNode>),
    Not(Box<FilterNode>),
}

impl FilterNode {
    pub fn term(field: TagField, value: impl Into<String>) -> Self {
        Self::Term {
            field,
            value: value.into(),
        }
    }

    pub fn terms<I, S>(field: TagField, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Terms {
            field,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn negate(node: Self) -> Self {
        Self::Not(Box::new(node))
    }

    /// Evaluates the tree against a single `key=value` tag. Layer
    /// predicates see no address type and never match.
    pub fn matches(&self, osm_key: &str, osm_value: &str) -> bool {
        self.matches_document(osm_key, osm_value, None)
    }

    /// Evaluates the tree against the main tag and address type of a
    /// document.
    pub fn matches_document(&self, osm_key: &str, osm_value: &str, layer: Option<AddressType>) -> bool {
        match self {
            Self::Term { field, value } => field.select(osm_key, osm_value, layer) == Some(value.as_str()),
            Self::Terms { field, values } => field
                .select(osm_key, osm_value, layer)
                .is_some_and(|v| values.contains(v)),
            Self::And(children) => children
                .iter()
                .all(|c| c.matches_document(osm_key, osm_value, layer)),
            Self::Or(children) => children
                .iter()
                .any(|c| c.matches_document(osm_key, osm_value, layer)),
            Self::Not(child) => !child.matches_document(osm_key, osm_value, layer),
        }
    }

    /// Number of nodes in the tree.
    pub fn size(&self) -> usize {
        match self {
            Self::Term { .. } | Self::Terms { .. } => 1,
            Self::And(children) | Self::Or(children) => {
                1 + children.iter().map(Self::size).sum::<usize>()
            }
            Self::Not(child) => 1 + child.size(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Every query term must match.
    #[default]
    Strict,
    /// Partial and fuzzy term matches are accepted.
    Lenient,
}

/// A free-text field to match against, with its score boost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchClause {
    pub field: String,
    pub boost: f32,
}

impl MatchClause {
    pub fn new(field: impl Into<String>, boost: f32) -> Self {
        Self {
            field: field.into(),
            boost,
        }
    }
}

/// A finished, immutable query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub query: String,
    pub language: String,
    pub languages: Vec<String>,
    pub limit: usize,
    pub match_mode: MatchMode,
    pub match_clauses: Vec<MatchClause>,
    pub location_bias: Option<Point>,
    pub filter: Option<FilterNode>,
}

impl QuerySpec {
    /// Whether a document with this main tag passes the tag filter.
    pub fn accepts_tag(&self, osm_key: &str, osm_value: &str) -> bool {
        self.filter
            .as_ref()
            .is_none_or(|filter| filter.matches(osm_key, osm_value))
    }

    /// Whether a document passes the whole filter, layer restrictions
    /// included.
    pub fn accepts(&self, osm_key: &str, osm_value: &str, layer: AddressType) -> bool {
        self.filter
            .as_ref()
            .is_none_or(|filter| filter.matches_document(osm_key, osm_value, Some(layer)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_evaluation() {
        let shop_bakery = FilterNode::And(vec![
            FilterNode::term(TagField::Key, "shop"),
            FilterNode::terms(TagField::Value, ["bakery", "pastry"]),
        ]);
        assert!(shop_bakery.matches("shop", "bakery"));
        assert!(shop_bakery.matches("shop", "pastry"));
        assert!(!shop_bakery.matches("amenity", "bakery"));

        let not_highway = FilterNode::negate(FilterNode::terms(TagField::Key, ["highway"]));
        assert!(not_highway.matches("shop", "bakery"));
        assert!(!not_highway.matches("highway", "primary"));
        assert_eq!(not_highway.size(), 2);
    }

    #[test]
    fn test_filter_serializes_by_field_name() {
        let node = FilterNode::term(TagField::Key, "shop");
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["term"]["field"], "osm_key");
        assert_eq!(json["term"]["value"], "shop");
    }

    #[test]
    fn test_spec_without_filter_accepts_everything() {
        let spec = QuerySpec {
            query: "berlin".to_string(),
            language: "en".to_string(),
            languages: vec![],
            limit: 15,
            match_mode: MatchMode::Strict,
            match_clauses: vec![],
            location_bias: None,
            filter: None,
        };
        assert!(spec.accepts_tag("anything", "goes"));
        assert!(spec.accepts("anything", "goes", AddressType::Other));
    }

    #[test]
    fn test_layer_predicates() {
        let cities = FilterNode::terms(TagField::Layer, ["city", "locality"]);
        assert!(cities.matches_document("place", "city", Some(AddressType::City)));
        assert!(cities.matches_document("place", "suburb", Some(AddressType::Locality)));
        assert!(!cities.matches_document("place", "city", Some(AddressType::State)));
        assert!(!cities.matches("place", "city"), "no layer, no match");

        let json = serde_json::to_value(&cities).unwrap();
        assert_eq!(json["terms"]["field"], "address_type");
    }
}
