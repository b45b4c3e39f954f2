//! Pipeline configuration.
//!
//! Everything the assembler and the query side need to know that is not part
//! of the data itself: requested languages, curated cities, metropolitan
//! overrides and per-country city admin levels.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{MeridianError, Result};

/// Relation ids of cities whose city status cannot be derived from tags:
/// Berlin, Hamburg and Vienna are administrative states as well.
pub const DEFAULT_CURATED_CITY_IDS: [u64; 3] = [62422, 62782, 109166];

/// City admin level used for countries without an explicit entry.
pub const DEFAULT_CITY_ADMIN_LEVEL: u8 = 8;

/// Replaces the city of every place inside a relation with a fixed name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetropolitanOverride {
    pub relation_id: u64,
    /// City names keyed by language; `default` is the main name.
    pub names: BTreeMap<String, String>,
}

impl MetropolitanOverride {
    /// Greater London: every borough resolves to the city of London.
    pub fn london() -> Self {
        Self {
            relation_id: 175342,
            names: [
                ("default", "London"),
                ("de", "London"),
                ("en", "London"),
                ("fr", "Londres"),
                ("it", "Londra"),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        }
    }
}

/// Configuration shared by document assembly and query construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Languages for which localized names are kept.
    pub languages: Vec<String>,
    /// Language used when a request does not ask for one.
    pub default_language: String,
    pub curated_city_ids: BTreeSet<u64>,
    pub metropolitan_overrides: Vec<MetropolitanOverride>,
    /// City admin level per upper-case country code.
    pub city_admin_levels: BTreeMap<String, u8>,
    pub default_city_admin_level: u8,
    /// Locales in which street de-duplication compares postcode digits only.
    pub numeric_postcode_locales: BTreeSet<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let mut city_admin_levels = BTreeMap::from([("BA".to_string(), 6)]);
        for cc in ["HR", "IE", "LV", "NO", "PT", "SE"] {
            city_admin_levels.insert(cc.to_string(), 7);
        }
        Self {
            languages: ["de", "en", "fr", "it"].map(str::to_string).to_vec(),
            default_language: "en".to_string(),
            curated_city_ids: DEFAULT_CURATED_CITY_IDS.into_iter().collect(),
            metropolitan_overrides: vec![MetropolitanOverride::london()],
            city_admin_levels,
            default_city_admin_level: DEFAULT_CITY_ADMIN_LEVEL,
            numeric_postcode_locales: BTreeSet::from(["nl".to_string()]),
        }
    }
}

impl PipelineConfig {
    /// Loads a configuration from JSON. Missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        debug!(?config, "Loaded pipeline configuration");
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!(path = ?path, "Reading pipeline configuration");
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_language.trim().is_empty() {
            return Err(MeridianError::ConfigError(
                "default_language must not be empty".to_string(),
            ));
        }
        if let Some(lang) = self.languages.iter().find(|l| l.trim().is_empty()) {
            return Err(MeridianError::ConfigError(format!(
                "invalid language entry '{lang}'"
            )));
        }
        if let Some(entry) = self
            .metropolitan_overrides
            .iter()
            .find(|o| !o.names.contains_key("default"))
        {
            return Err(MeridianError::ConfigError(format!(
                "metropolitan override for relation {} has no default name",
                entry.relation_id
            )));
        }
        Ok(())
    }
}

/// Builder for creating pipeline configurations with ergonomic defaults
#[derive(Debug, Clone, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Create a new builder with sensible defaults
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
        }
    }

    /// No curated cities, no overrides, default language only. Useful when
    /// the hierarchy should be resolved purely from tags.
    pub fn minimal() -> Self {
        let mut builder = Self::new();
        builder.config.languages.clear();
        builder.config.curated_city_ids.clear();
        builder.config.metropolitan_overrides.clear();
        builder
    }

    /// Keeps names in every language of the default set plus the common
    /// European ones.
    pub fn multilingual() -> Self {
        let mut builder = Self::new();
        for lang in ["es", "nl", "pl", "pt", "sv"] {
            builder.config.languages.push(lang.to_string());
        }
        builder
    }

    pub fn languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.languages = languages.into_iter().map(Into::into).collect();
        self
    }

    pub fn default_language(mut self, language: impl Into<String>) -> Self {
        self.config.default_language = language.into();
        self
    }

    pub fn curated_city(mut self, relation_id: u64) -> Self {
        self.config.curated_city_ids.insert(relation_id);
        self
    }

    pub fn metropolitan_override(mut self, entry: MetropolitanOverride) -> Self {
        self.config
            .metropolitan_overrides
            .retain(|o| o.relation_id != entry.relation_id);
        self.config.metropolitan_overrides.push(entry);
        self
    }

    pub fn city_admin_level(mut self, country_code: &str, level: u8) -> Self {
        self.config
            .city_admin_levels
            .insert(country_code.to_ascii_uppercase(), level);
        self
    }

    pub fn numeric_postcode_locale(mut self, locale: impl Into<String>) -> Self {
        self.config.numeric_postcode_locales.insert(locale.into());
        self
    }

    /// Build the final configuration
    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert!(config.curated_city_ids.contains(&62422), "Berlin is curated");
        assert_eq!(config.metropolitan_overrides.len(), 1);
        assert_eq!(config.metropolitan_overrides[0].relation_id, 175342);
        assert_eq!(config.city_admin_levels.get("BA"), Some(&6));
        assert_eq!(config.city_admin_levels.get("SE"), Some(&7));
        assert_eq!(config.city_admin_levels.get("DE"), None);
        assert_eq!(config.default_city_admin_level, 8);
    }

    #[test]
    fn test_builder_presets() {
        let config = PipelineConfigBuilder::minimal().build().unwrap();
        assert!(config.languages.is_empty());
        assert!(config.curated_city_ids.is_empty());
        assert!(config.metropolitan_overrides.is_empty());

        let config = PipelineConfigBuilder::multilingual().build().unwrap();
        assert!(config.languages.iter().any(|l| l == "nl"));
        assert!(config.languages.iter().any(|l| l == "de"));
    }

    #[test]
    fn test_builder_replaces_override_for_same_relation() {
        let renamed = MetropolitanOverride {
            relation_id: 175342,
            names: BTreeMap::from([("default".to_string(), "Greater London".to_string())]),
        };
        let config = PipelineConfigBuilder::new()
            .metropolitan_override(renamed)
            .curated_city(7444)
            .city_admin_level("fr", 8)
            .build()
            .unwrap();
        assert_eq!(config.metropolitan_overrides.len(), 1);
        assert_eq!(
            config.metropolitan_overrides[0].names.get("default").map(String::as_str),
            Some("Greater London")
        );
        assert!(config.curated_city_ids.contains(&7444));
        assert_eq!(config.city_admin_levels.get("FR"), Some(&8));
    }

    #[test]
    fn test_from_json_keeps_defaults_for_missing_fields() {
        let config = PipelineConfig::from_json_str(r#"{"languages": ["nl"]}"#).unwrap();
        assert_eq!(config.languages, vec!["nl".to_string()]);
        assert_eq!(config.default_language, "en");
        assert!(config.curated_city_ids.contains(&62422));
    }

    #[test]
    fn test_invalid_configs_are_rejected() {
        let err = PipelineConfigBuilder::new().default_language(" ").build();
        assert!(matches!(err, Err(MeridianError::ConfigError(_))));

        let err = PipelineConfig::from_json_str(
            r#"{"metropolitan_overrides": [{"relation_id": 1, "names": {"en": "X"}}]}"#,
        );
        assert!(matches!(err, Err(MeridianError::ConfigError(_))));

        let err = PipelineConfig::from_json_str("{not json");
        assert!(matches!(err, Err(MeridianError::Json(_))));
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, br#"{"default_language": "de"}"#).unwrap();
        let config = PipelineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.default_language, "de");
    }
}
