//! Hierarchy predicates that depend on configuration.

use ahash::{AHashMap, AHashSet};
use meridian_data_processing::AddressRow;

use crate::config::PipelineConfig;

const CITY_PLACE_TAGS: [&str; 4] = ["city", "town", "village", "hamlet"];

/// Decides which ancestors count as cities and which are worth keeping as
/// context. The curated city list is injected so the classifier itself
/// holds no global state.
#[derive(Debug, Clone)]
pub struct HierarchyClassifier {
    curated_city_ids: AHashSet<u64>,
    city_admin_levels: AHashMap<String, u8>,
    default_city_admin_level: u8,
}

impl Default for HierarchyClassifier {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl HierarchyClassifier {
    pub fn new(curated_city_ids: impl IntoIterator<Item = u64>) -> Self {
        let config = PipelineConfig::default();
        Self {
            curated_city_ids: curated_city_ids.into_iter().collect(),
            city_admin_levels: config.city_admin_levels.into_iter().collect(),
            default_city_admin_level: config.default_city_admin_level,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            curated_city_ids: config.curated_city_ids.iter().copied().collect(),
            city_admin_levels: config
                .city_admin_levels
                .iter()
                .map(|(cc, level)| (cc.to_ascii_uppercase(), *level))
                .collect(),
            default_city_admin_level: config.default_city_admin_level,
        }
    }

    pub fn city_admin_level(&self, country_code: Option<&str>) -> u8 {
        country_code
            .and_then(|cc| self.city_admin_levels.get(&cc.to_ascii_uppercase()))
            .copied()
            .unwrap_or(self.default_city_admin_level)
    }

    /// Whether the row is a relation on the curated city list.
    pub fn is_curated_city(&self, row: &AddressRow) -> bool {
        row.relation_id()
            .is_some_and(|id| self.curated_city_ids.contains(&id))
    }

    /// City status derived from tags alone: a city-like place tag, or an
    /// administrative boundary at the country's city admin level.
    pub fn is_tagged_city(&self, row: &AddressRow, country_code: Option<&str>) -> bool {
        if row
            .place_tag()
            .is_some_and(|tag| CITY_PLACE_TAGS.contains(&tag))
        {
            return true;
        }
        row.is_administrative_boundary()
            && row.admin_level == Some(self.city_admin_level(country_code))
    }

    pub fn is_city(&self, row: &AddressRow, country_code: Option<&str>) -> bool {
        self.is_tagged_city(row, country_code) || self.is_curated_city(row)
    }

    pub fn is_useful_for_context(&self, row: &AddressRow) -> bool {
        row.is_useful_context_candidate() && !self.is_curated_city(row)
    }
}
