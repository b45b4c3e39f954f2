//! Multilingual name records.

use std::collections::{BTreeMap, BTreeSet};

use meridian_data_processing::RawNameTags;
use serde::{Deserialize, Serialize};

/// Key under which the main name of an object is stored.
pub const DEFAULT_KEY: &str = "default";

/// Name variants and the raw tags they are taken from, in priority order.
const VARIANTS: [(&str, &[&str]); 6] = [
    ("alt", &["_place_alt_name", "alt_name"]),
    ("int", &["_place_int_name", "int_name"]),
    ("loc", &["_place_loc_name", "loc_name"]),
    ("old", &["_place_old_name", "old_name"]),
    ("reg", &["_place_reg_name", "reg_name"]),
    ("housename", &["addr:housename"]),
];

/// The names of a single object, keyed by language or variant.
///
/// Every key holds at most one name. Once a key is filled by the first
/// matching raw tag it is never overwritten.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NameMap(BTreeMap<String, String>);

impl NameMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the name record for a place from its raw tags.
    ///
    /// `_place_*` tags take precedence over the plain tags, so that names
    /// inherited from a linked place win over the object's own names.
    pub fn make_for_place<S: AsRef<str>>(raw: &RawNameTags, languages: &[S]) -> Self {
        let mut names = Self::new();
        names.set_from(raw, DEFAULT_KEY, &["_place_name", "name"]);
        for lang in languages {
            let lang = lang.as_ref();
            let prefixed = format!("_place_name:{lang}");
            let plain = format!("name:{lang}");
            names.set_from(raw, lang, &[prefixed.as_str(), plain.as_str()]);
        }
        for (field, candidates) in VARIANTS {
            names.set_from(raw, field, candidates);
        }
        names
    }

    fn set_from(&mut self, raw: &RawNameTags, field: &str, candidates: &[&str]) {
        if self.0.contains_key(field) {
            return;
        }
        if let Some(value) = candidates
            .iter()
            .filter_map(|key| raw.get(*key))
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
        {
            self.0.insert(field.to_string(), value.to_string());
        }
    }

    /// Sets a name unless the key is already taken. Returns whether the
    /// value was stored.
    pub fn set_name(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        if self.0.contains_key(&key) {
            return false;
        }
        self.0.insert(key, value.into());
        true
    }

    /// Stores a name, returning the one it replaced.
    pub fn replace_name(&mut self, key: &str, value: &str) -> Option<String> {
        self.0.insert(key.to_string(), value.to_string())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn default_name(&self) -> Option<&str> {
        self.get(DEFAULT_KEY)
    }

    /// Name in `language`, falling back to the default name.
    pub fn localized(&self, language: &str) -> Option<&str> {
        self.get(language).or_else(|| self.default_name())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.0.values().map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for NameMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut names = Self::new();
        for (k, v) in iter {
            names.set_name(k, v);
        }
        names
    }
}

/// Names of surrounding places, grouped by language key.
///
/// The map only ever grows; adding is a set union per key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextMap(BTreeMap<String, BTreeSet<String>>);

impl ContextMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a single name. Absent values are ignored.
    pub fn add_name(&mut self, key: &str, value: Option<&str>) {
        if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
            self.0
                .entry(key.to_string())
                .or_default()
                .insert(value.to_string());
        }
    }

    /// Adds every name of `names` under its own key.
    pub fn add_names(&mut self, names: &NameMap) {
        for (key, value) in names.iter() {
            self.add_name(key, Some(value));
        }
    }

    /// Merges `other` into `self`. `other` is left untouched.
    pub fn add_all(&mut self, other: &Self) {
        for (key, values) in &other.0 {
            self.0
                .entry(key.clone())
                .or_default()
                .extend(values.iter().cloned());
        }
    }

    pub fn get(&self, key: &str) -> Option<&BTreeSet<String>> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Context names for `language` together with the default names.
    pub fn localized(&self, language: &str) -> BTreeSet<&str> {
        [language, DEFAULT_KEY]
            .into_iter()
            .filter_map(|key| self.0.get(key))
            .flatten()
            .map(String::as_str)
            .collect()
    }

    /// Every name of every key, deduplicated.
    pub fn all_names(&self) -> BTreeSet<&str> {
        self.0.values().flatten().map(String::as_str).collect()
    }
}
