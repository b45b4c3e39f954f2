use ahash::AHashMap;
use meridian_data_processing::{AddressRow, PlaceRow};
use rayon::prelude::*;
use tracing::{debug, instrument, trace, warn};

use super::error::{DocumentError, Result};
use super::{AddressType, HierarchyClassifier, NameMap, PlaceDocument, address_tags};
use crate::config::PipelineConfig;

/// Where the current city of a document came from. Decides whether a later
/// ancestor may still replace it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CitySource {
    Empty,
    /// The place is a city itself.
    Own,
    Ancestor,
    /// Set by a metropolitan override; never replaced.
    Override,
}

/// Builds [`PlaceDocument`]s from a place row and its ancestors.
#[derive(Debug, Clone)]
pub struct DocumentAssembler {
    classifier: HierarchyClassifier,
    languages: Vec<String>,
    overrides: AHashMap<u64, NameMap>,
}

impl Default for DocumentAssembler {
    fn default() -> Self {
        Self::new(&PipelineConfig::default())
    }
}

impl DocumentAssembler {
    pub fn new(config: &PipelineConfig) -> Self {
        Self::with_classifier(config, HierarchyClassifier::from_config(config))
    }

    pub fn with_classifier(config: &PipelineConfig, classifier: HierarchyClassifier) -> Self {
        Self {
            classifier,
            languages: config.languages.clone(),
            overrides: config
                .metropolitan_overrides
                .iter()
                .map(|o| (o.relation_id, o.names.iter().collect()))
                .collect(),
        }
    }

    /// Assembles the document for `place`. `ancestors` may come in any
    /// order; they are sorted most specific first.
    #[instrument(name = "Assemble document", level = "debug", skip_all, fields(place_id = place.place_id, ancestors = ancestors.len()))]
    pub fn assemble(&self, place: &PlaceRow, ancestors: &[AddressRow]) -> Result<PlaceDocument> {
        validate_place(place)?;
        for ancestor in ancestors {
            validate_ancestor(place.place_id, ancestor)?;
        }

        let mut doc = self.seed(place);

        let ordered = order_ancestors(ancestors);

        if doc.country_code.is_none() {
            doc.country_code = ordered
                .iter()
                .filter(|a| a.is_country())
                .find_map(|a| a.country_code.as_deref())
                .map(str::to_ascii_uppercase);
        }
        let country_code = doc.country_code.clone();
        let country_code = country_code.as_deref();

        let own = place.as_address_row();
        let mut city = CitySource::Empty;
        if own.is_country() {
            doc.set_address_part(AddressType::Country, doc.names.clone());
        } else if self.classifier.is_city(&own, country_code) && !doc.names.is_empty() {
            doc.set_address_part(AddressType::City, doc.names.clone());
            city = CitySource::Own;
        }

        for row in &ordered {
            if row.is_postcode() {
                if doc.postcode.is_none() {
                    doc.postcode = postcode_of(row);
                }
                continue;
            }

            let names = NameMap::make_for_place(&row.names, &self.languages);
            if names.is_empty() {
                trace!(ancestor = row.place_id, "Skipping nameless ancestor");
                continue;
            }

            if let Some(override_names) = row.relation_id().and_then(|id| self.overrides.get(&id)) {
                if city != CitySource::Own {
                    debug!(ancestor = row.place_id, "Applying metropolitan override");
                    move_city_to_context(&mut doc);
                    doc.replace_address_part(AddressType::City, override_names.clone());
                    city = CitySource::Override;
                }
                doc.context.add_names(&names);
                continue;
            }

            if !row.is_address {
                doc.secondary_context.add_names(&names);
                continue;
            }

            let curated = self.classifier.is_curated_city(row);
            if curated {
                match city {
                    CitySource::Empty => {
                        doc.set_address_part(AddressType::City, names.clone());
                        city = CitySource::Ancestor;
                    }
                    CitySource::Ancestor => {
                        move_city_to_context(&mut doc);
                        doc.replace_address_part(AddressType::City, names.clone());
                    }
                    CitySource::Own | CitySource::Override => {}
                }
                // a curated city may fill the state slot as well
            } else if self.classifier.is_tagged_city(row, country_code) {
                match city {
                    CitySource::Empty => {
                        doc.set_address_part(AddressType::City, names);
                        city = CitySource::Ancestor;
                    }
                    CitySource::Ancestor if row.place.is_some() => {
                        move_city_to_context(&mut doc);
                        doc.replace_address_part(AddressType::City, names);
                    }
                    _ => doc.context.add_names(&names),
                }
                continue;
            }

            let slot = if row.is_country() {
                AddressType::Country
            } else {
                AddressType::from_rank(row.rank_address)
            };
            let fills_slot = matches!(
                slot,
                AddressType::Street
                    | AddressType::Locality
                    | AddressType::District
                    | AddressType::County
                    | AddressType::State
                    | AddressType::Country
            );
            if fills_slot && doc.set_address_part(slot, names.clone()) {
                continue;
            }

            if curated {
                continue;
            }
            if self.classifier.is_useful_for_context(row) {
                doc.context.add_names(&names);
            } else {
                doc.secondary_context.add_names(&names);
            }
        }

        address_tags::apply(&mut doc, &place.address, &self.languages);

        if doc.city().is_none() {
            if let Some(names) = ordered
                .iter()
                .filter(|a| !a.is_address && self.classifier.is_city(a, country_code))
                .map(|a| NameMap::make_for_place(&a.names, &self.languages))
                .find(|names| !names.is_empty())
            {
                debug!(place_id = place.place_id, "Using non-address city as fallback");
                doc.set_address_part(AddressType::City, names);
            }
        }

        inherit_from(&mut doc, &ordered);

        if doc.country_code.is_none() && doc.country().is_none() {
            warn!(place_id = place.place_id, "No country found for place");
        }

        Ok(doc)
    }

    /// Assembles independent places in parallel. Results keep input order.
    #[instrument(name = "Assemble batch", level = "debug", skip_all, fields(places = places.len()))]
    pub fn assemble_batch(&self, places: &[(PlaceRow, Vec<AddressRow>)]) -> Vec<Result<PlaceDocument>> {
        places
            .par_iter()
            .map(|(place, ancestors)| self.assemble(place, ancestors))
            .collect()
    }

    fn seed(&self, place: &PlaceRow) -> PlaceDocument {
        let (osm_key, osm_value) = match place
            .extratags
            .get("place")
            .or_else(|| place.extratags.get("linked_place"))
        {
            Some(place_type) => ("place".to_string(), place_type.clone()),
            None => (place.osm_key.clone(), place.osm_value.clone()),
        };

        PlaceDocument {
            place_id: place.place_id,
            osm_type: place.osm_type.clone(),
            osm_id: place.osm_id,
            osm_key,
            osm_value,
            rank_address: place.rank_address,
            rank_search: place.rank_search,
            centroid: place.centroid,
            bbox: place.bbox,
            postcode: place.postcode.clone(),
            country_code: place.country_code.as_deref().map(str::to_ascii_uppercase),
            housenumber: place.housenumber.clone(),
            names: NameMap::make_for_place(&place.names, &self.languages),
            address: Default::default(),
            context: Default::default(),
            secondary_context: Default::default(),
            extra_tags: place.extratags.clone(),
            importance: place
                .importance
                .unwrap_or_else(|| 0.75 - f64::from(place.rank_search) / 40.0),
        }
    }
}

/// Most specific first; on equal rank, address lines before the rest.
fn order_ancestors(ancestors: &[AddressRow]) -> Vec<&AddressRow> {
    let mut ordered: Vec<&AddressRow> = ancestors.iter().collect();
    ordered.sort_by(|a, b| {
        b.rank_address
            .cmp(&a.rank_address)
            .then_with(|| b.is_address.cmp(&a.is_address))
    });
    ordered
}

fn move_city_to_context(doc: &mut PlaceDocument) {
    if let Some(previous) = doc.address.remove(&AddressType::City) {
        doc.context.add_names(&previous);
    }
}

/// Copies scalars the document lacks from the nearest ancestor that has
/// them. Existing values are never overwritten.
fn inherit_from(doc: &mut PlaceDocument, ordered: &[&AddressRow]) {
    if doc.country_code.is_none() {
        doc.country_code = ordered
            .iter()
            .find_map(|a| a.country_code.as_deref())
            .map(str::to_ascii_uppercase);
    }
    if doc.housenumber.is_none() {
        doc.housenumber = ordered.iter().find_map(|a| a.housenumber.clone());
    }
    if doc.postcode.is_none() {
        doc.postcode = ordered
            .iter()
            .filter(|a| !a.is_postcode())
            .find_map(|a| a.postcode.clone());
    }
}

fn postcode_of(row: &AddressRow) -> Option<String> {
    row.postcode
        .clone()
        .or_else(|| row.names.get("ref").cloned())
        .or_else(|| row.names.get("name").cloned())
}

fn validate_place(place: &PlaceRow) -> Result<()> {
    let reason = if place.osm_key.trim().is_empty() || place.osm_value.trim().is_empty() {
        Some("missing main tag".to_string())
    } else if place.rank_address > 30 {
        Some(format!("address rank {} out of range", place.rank_address))
    } else if !place.centroid.is_valid() {
        Some(format!("invalid centroid {}", place.centroid))
    } else {
        None
    };
    match reason {
        Some(reason) => Err(DocumentError::MalformedPlace {
            place_id: place.place_id,
            reason,
        }),
        None => Ok(()),
    }
}

fn validate_ancestor(place_id: u64, row: &AddressRow) -> Result<()> {
    let reason = if row.osm_key.trim().is_empty() || row.osm_value.trim().is_empty() {
        Some("missing main tag".to_string())
    } else if row.rank_address > 30 {
        Some(format!("address rank {} out of range", row.rank_address))
    } else {
        None
    };
    match reason {
        Some(reason) => Err(DocumentError::MalformedAncestor {
            place_id,
            ancestor_id: row.place_id,
            reason,
        }),
        None => Ok(()),
    }
}
