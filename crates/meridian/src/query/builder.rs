use std::collections::{BTreeMap, BTreeSet};

use meridian_data_processing::Point;
use tracing::{debug, instrument};

use super::error::{QueryError, Result};
use super::spec::{FilterNode, MatchClause, MatchMode, QuerySpec, TagField};
use super::tag_filter::{TagFilter, TagFilterKind};
use crate::document::{AddressType, DEFAULT_KEY};

pub const DEFAULT_LIMIT: usize = 15;
pub const MAX_LIMIT: usize = 50;

/// Tag keys mapped to sets of values.
pub type TagMap = BTreeMap<String, BTreeSet<String>>;

/// Lifecycle of a query. `Plain` and `Filtered` belong to the builder,
/// `Finished` to [`BuiltQuery`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    /// Free text only.
    Plain,
    /// At least one filter group was added.
    Filtered,
    Finished,
}

/// The part of [`QueryState`] a builder can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Plain,
    Filtered,
}

impl From<Stage> for QueryState {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Plain => Self::Plain,
            Stage::Filtered => Self::Filtered,
        }
    }
}

/// Builds a [`QuerySpec`] from free text and tag filters.
///
/// Include groups are OR-ed: matching any of them is enough. Exclude groups
/// are AND-ed: every exclusion must hold. `build` consumes the builder, so a
/// finished query cannot be modified.
#[derive(Debug, Clone)]
pub struct TagFilterQueryBuilder {
    query: String,
    language: String,
    languages: Vec<String>,
    limit: usize,
    match_mode: MatchMode,
    location_bias: Option<Point>,
    stage: Stage,
    include: FilterNode,
    exclude: FilterNode,
    layers: Option<FilterNode>,
}

impl TagFilterQueryBuilder {
    pub fn new(query: impl Into<String>, language: impl Into<String>, languages: &[String]) -> Self {
        Self {
            query: query.into().trim().to_string(),
            language: language.into(),
            languages: languages.to_vec(),
            limit: DEFAULT_LIMIT,
            match_mode: MatchMode::default(),
            location_bias: None,
            stage: Stage::Plain,
            include: FilterNode::Or(Vec::new()),
            exclude: FilterNode::And(Vec::new()),
            layers: None,
        }
    }

    pub fn state(&self) -> QueryState {
        self.stage.into()
    }

    /// Missing or non-positive limits fall back to the default, large ones
    /// are capped.
    pub fn with_limit(mut self, limit: Option<i64>) -> Self {
        self.limit = match limit {
            Some(n) if n >= 1 => usize::try_from(n).map_or(MAX_LIMIT, |n| n.min(MAX_LIMIT)),
            _ => DEFAULT_LIMIT,
        };
        self
    }

    /// Biases scoring towards `point`. Does not filter.
    pub const fn with_location_bias(mut self, point: Option<Point>) -> Self {
        if let Some(point) = point {
            self.location_bias = Some(point);
        }
        self
    }

    pub const fn with_strict_match(mut self) -> Self {
        self.match_mode = MatchMode::Strict;
        self
    }

    pub const fn with_lenient_match(mut self) -> Self {
        self.match_mode = MatchMode::Lenient;
        self
    }

    /// Results must carry one of the keys with one of its values. A key
    /// with an empty value set matches on the key alone.
    pub fn with_tags(mut self, tags: &TagMap) -> Self {
        let groups = tags
            .iter()
            .map(|(key, values)| {
                if values.is_empty() {
                    FilterNode::term(TagField::Key, key.as_str())
                } else {
                    FilterNode::And(vec![
                        FilterNode::term(TagField::Key, key.as_str()),
                        FilterNode::terms(TagField::Value, values.iter().map(String::as_str)),
                    ])
                }
            })
            .collect();
        self.add_include(groups);
        self
    }

    pub fn with_keys(mut self, keys: &BTreeSet<String>) -> Self {
        if !keys.is_empty() {
            self.add_include(vec![FilterNode::terms(TagField::Key, keys.iter().map(String::as_str))]);
        }
        self
    }

    pub fn with_values(mut self, values: &BTreeSet<String>) -> Self {
        if !values.is_empty() {
            self.add_include(vec![FilterNode::terms(TagField::Value, values.iter().map(String::as_str))]);
        }
        self
    }

    /// Results must carry the key, but with none of the listed values.
    /// Contributes to the include side.
    pub fn with_tags_not_values(mut self, tags: &TagMap) -> Self {
        let groups = tags
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(key, values)| {
                FilterNode::And(vec![
                    FilterNode::term(TagField::Key, key.as_str()),
                    FilterNode::negate(FilterNode::terms(
                        TagField::Value,
                        values.iter().map(String::as_str),
                    )),
                ])
            })
            .collect();
        self.add_include(groups);
        self
    }

    /// Results must not carry any of the given key/value pairs. A key with an
    /// empty value set excludes the key as a whole.
    pub fn without_tags(mut self, tags: &TagMap) -> Self {
        let exclusions = tags
            .iter()
            .map(|(key, values)| {
                let pair = if values.is_empty() {
                    FilterNode::term(TagField::Key, key.as_str())
                } else {
                    FilterNode::And(vec![
                        FilterNode::term(TagField::Key, key.as_str()),
                        FilterNode::terms(TagField::Value, values.iter().map(String::as_str)),
                    ])
                };
                FilterNode::negate(pair)
            })
            .collect();
        self.add_exclude(exclusions);
        self
    }

    pub fn without_keys(mut self, keys: &BTreeSet<String>) -> Self {
        if !keys.is_empty() {
            self.add_exclude(vec![FilterNode::negate(FilterNode::terms(
                TagField::Key,
                keys.iter().map(String::as_str),
            ))]);
        }
        self
    }

    pub fn without_values(mut self, values: &BTreeSet<String>) -> Self {
        if !values.is_empty() {
            self.add_exclude(vec![FilterNode::negate(FilterNode::terms(
                TagField::Value,
                values.iter().map(String::as_str),
            ))]);
        }
        self
    }

    /// Results must have one of the address types. Later calls replace the
    /// layer set.
    pub fn with_layers(mut self, layers: &BTreeSet<AddressType>) -> Self {
        if !layers.is_empty() {
            self.layers = Some(FilterNode::terms(
                TagField::Layer,
                layers.iter().map(|layer| layer.name()),
            ));
            self.stage = Stage::Filtered;
        }
        self
    }

    /// Applies parsed `osm_tag` filters. Filters of the same shape are
    /// collected into one group, as if the corresponding `with*`/`without*`
    /// method had been called once.
    pub fn with_tag_filters(self, filters: &[TagFilter]) -> Self {
        let mut include_tags = TagMap::new();
        let mut include_keys = BTreeSet::new();
        let mut include_values = BTreeSet::new();
        let mut exclude_tags = TagMap::new();
        let mut exclude_keys = BTreeSet::new();
        let mut exclude_values = BTreeSet::new();
        let mut key_not_values = TagMap::new();

        for filter in filters {
            match (filter.kind, filter.key.clone(), filter.value.clone()) {
                (TagFilterKind::Include, Some(key), Some(value)) => {
                    include_tags.entry(key).or_default().insert(value);
                }
                (TagFilterKind::Include, Some(key), None) => {
                    include_keys.insert(key);
                }
                (TagFilterKind::Include, None, Some(value)) => {
                    include_values.insert(value);
                }
                (TagFilterKind::Exclude, Some(key), Some(value)) => {
                    exclude_tags.entry(key).or_default().insert(value);
                }
                (TagFilterKind::Exclude, Some(key), None) => {
                    exclude_keys.insert(key);
                }
                (TagFilterKind::Exclude, None, Some(value)) => {
                    exclude_values.insert(value);
                }
                (TagFilterKind::ExcludeValue, Some(key), Some(value)) => {
                    key_not_values.entry(key).or_default().insert(value);
                }
                (kind, key, value) => {
                    debug!(?kind, ?key, ?value, "Skipping incomplete tag filter");
                }
            }
        }

        self.with_tags(&include_tags)
            .with_keys(&include_keys)
            .with_values(&include_values)
            .with_tags_not_values(&key_not_values)
            .without_tags(&exclude_tags)
            .without_keys(&exclude_keys)
            .without_values(&exclude_values)
    }

    fn add_include(&mut self, groups: Vec<FilterNode>) {
        if groups.is_empty() {
            return;
        }
        // a multi-entry group stays one OR-ed unit within the include root
        let group = if groups.len() == 1 {
            groups.into_iter().next()
        } else {
            Some(FilterNode::Or(groups))
        };
        if let (FilterNode::Or(children), Some(group)) = (&mut self.include, group) {
            children.push(group);
        }
        self.stage = Stage::Filtered;
    }

    fn add_exclude(&mut self, exclusions: Vec<FilterNode>) {
        if exclusions.is_empty() {
            return;
        }
        if let FilterNode::And(children) = &mut self.exclude {
            children.extend(exclusions);
        }
        self.stage = Stage::Filtered;
    }

    fn match_clauses(&self) -> Vec<MatchClause> {
        let mut clauses = vec![
            MatchClause::new("collector", 1.0),
            MatchClause::new(format!("name_{DEFAULT_KEY}"), 1.5),
        ];
        if self.languages.contains(&self.language) {
            clauses.push(MatchClause::new(format!("name_{}", self.language), 2.0));
        }
        if self.match_mode == MatchMode::Lenient {
            clauses.extend(
                self.languages
                    .iter()
                    .filter(|lang| **lang != self.language)
                    .map(|lang| MatchClause::new(format!("name_{lang}"), 1.0)),
            );
            clauses.push(MatchClause::new("context", 0.5));
        }
        clauses
    }

    /// Finishes the query. A plain query carries no filter; a filtered one
    /// combines the include OR-group, the exclude AND-group and the layer
    /// restriction conjunctively.
    #[instrument(name = "Build query", level = "debug", skip_all, fields(query = %self.query, stage = ?self.stage))]
    pub fn build(self) -> Result<BuiltQuery> {
        let match_clauses = self.match_clauses();
        let filter = match self.stage {
            Stage::Plain => None,
            Stage::Filtered => {
                let include = match self.include {
                    FilterNode::Or(children) if children.is_empty() => None,
                    root @ FilterNode::Or(_) => Some(root),
                    other => {
                        return Err(QueryError::InconsistentFilterRoot {
                            group: "include",
                            found: format!("{other:?}"),
                        });
                    }
                };
                let exclude = match self.exclude {
                    FilterNode::And(children) if children.is_empty() => None,
                    root @ FilterNode::And(_) => Some(root),
                    other => {
                        return Err(QueryError::InconsistentFilterRoot {
                            group: "exclude",
                            found: format!("{other:?}"),
                        });
                    }
                };
                let mut parts: Vec<FilterNode> = [include, exclude, self.layers].into_iter().flatten().collect();
                match parts.len() {
                    0 => None,
                    1 => parts.pop(),
                    _ => Some(FilterNode::And(parts)),
                }
            }
        };

        let spec = QuerySpec {
            query: self.query,
            language: self.language,
            languages: self.languages,
            limit: self.limit,
            match_mode: self.match_mode,
            match_clauses,
            location_bias: self.location_bias,
            filter,
        };
        debug!(filter_nodes = spec.filter.as_ref().map_or(0, FilterNode::size), "Query built");
        Ok(BuiltQuery { spec })
    }
}

/// Parses layer names such as `city` or `street` into address types.
/// Every name must belong to a ranked address type.
pub fn parse_layers<I, S>(names: I) -> Result<BTreeSet<AddressType>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .map(|name| {
            let name = name.as_ref();
            AddressType::from_layer(name).ok_or_else(|| QueryError::UnknownLayer {
                layer: name.to_string(),
                allowed: AddressType::RANKED.iter().map(|t| t.name()).collect::<Vec<_>>().join(","),
            })
        })
        .collect()
}

/// A finished query. Holds the cached [`QuerySpec`]; every call to
/// [`spec`](Self::spec) returns the same value.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    spec: QuerySpec,
}

impl BuiltQuery {
    pub const fn state(&self) -> QueryState {
        QueryState::Finished
    }

    pub const fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub fn into_spec(self) -> QuerySpec {
        self.spec
    }
}
