use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagFilterKind {
    /// The result must carry the key and/or value.
    Include,
    /// The result must not carry the key, the value or the pair.
    Exclude,
    /// The result must carry the key, but not with this value.
    ExcludeValue,
}

/// A single parsed `osm_tag` filter.
///
/// Grammar: `[!]key[:[!]value]` or `:[!]value`. At least one of key and
/// value is always present.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagFilter {
    pub kind: TagFilterKind,
    pub key: Option<String>,
    pub value: Option<String>,
}

impl TagFilter {
    /// Parses one filter token. Invalid tokens yield `None`: the empty
    /// string, a lone colon, more than one colon, or an empty key without a
    /// leading colon.
    pub fn parse(token: &str) -> Option<Self> {
        let parts: Vec<&str> = token.split(':').collect();
        match parts.as_slice() {
            [key] => {
                let (negated, key) = strip_negation(key);
                if key.is_empty() {
                    return None;
                }
                Some(Self {
                    kind: if negated {
                        TagFilterKind::Exclude
                    } else {
                        TagFilterKind::Include
                    },
                    key: Some(key.to_string()),
                    value: None,
                })
            }
            [key, value] => {
                let (key_negated, key) = strip_negation(key);
                let (value_negated, value) = strip_negation(value);
                if value.is_empty() {
                    return None;
                }
                let key = (!key.is_empty()).then(|| key.to_string());
                let kind = if key.is_some() && !key_negated && value_negated {
                    TagFilterKind::ExcludeValue
                } else if key_negated || value_negated {
                    TagFilterKind::Exclude
                } else {
                    TagFilterKind::Include
                };
                Some(Self {
                    kind,
                    key,
                    value: Some(value.to_string()),
                })
            }
            _ => None,
        }
    }

    /// Parses every token, skipping the invalid ones.
    pub fn parse_all<I, S>(tokens: I) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        tokens
            .into_iter()
            .filter_map(|token| {
                let token = token.as_ref();
                let parsed = Self::parse(token);
                if parsed.is_none() {
                    warn!(token, "Ignoring invalid tag filter");
                }
                parsed
            })
            .collect()
    }
}

fn strip_negation(segment: &str) -> (bool, &str) {
    segment
        .strip_prefix('!')
        .map_or((false, segment), |rest| (true, rest))
}

impl fmt::Display for TagFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = self.key.as_deref().unwrap_or("");
        match (self.kind, &self.value) {
            (TagFilterKind::Include, None) => write!(f, "{key}"),
            (TagFilterKind::Include, Some(value)) => write!(f, "{key}:{value}"),
            (TagFilterKind::Exclude, None) => write!(f, "!{key}"),
            (TagFilterKind::Exclude, Some(value)) if self.key.is_some() => {
                write!(f, "!{key}:{value}")
            }
            (TagFilterKind::Exclude, Some(value)) => write!(f, ":!{value}"),
            (TagFilterKind::ExcludeValue, value) => {
                write!(f, "{key}:!{}", value.as_deref().unwrap_or(""))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(kind: TagFilterKind, key: Option<&str>, value: Option<&str>) -> TagFilter {
        TagFilter {
            kind,
            key: key.map(str::to_string),
            value: value.map(str::to_string),
        }
    }

    #[test]
    fn test_include_forms() {
        assert_eq!(
            TagFilter::parse("shop:bakery"),
            Some(filter(TagFilterKind::Include, Some("shop"), Some("bakery")))
        );
        assert_eq!(
            TagFilter::parse("tourism"),
            Some(filter(TagFilterKind::Include, Some("tourism"), None))
        );
        assert_eq!(
            TagFilter::parse(":information"),
            Some(filter(TagFilterKind::Include, None, Some("information")))
        );
    }

    #[test]
    fn test_exclude_forms() {
        assert_eq!(
            TagFilter::parse("!highway"),
            Some(filter(TagFilterKind::Exclude, Some("highway"), None))
        );
        assert_eq!(
            TagFilter::parse("!:information"),
            Some(filter(TagFilterKind::Exclude, None, Some("information")))
        );
        assert_eq!(
            TagFilter::parse(":!information"),
            Some(filter(TagFilterKind::Exclude, None, Some("information")))
        );
        let both = Some(filter(TagFilterKind::Exclude, Some("shop"), Some("bakery")));
        assert_eq!(TagFilter::parse("!shop:bakery"), both);
        assert_eq!(TagFilter::parse("!shop:!bakery"), both);
    }

    #[test]
    fn test_exclude_value() {
        assert_eq!(
            TagFilter::parse("amenity:!post_box"),
            Some(filter(TagFilterKind::ExcludeValue, Some("amenity"), Some("post_box")))
        );
    }

    #[test]
    fn test_invalid_tokens() {
        for token in ["", ":", "!", "addr:housenumber:1", "shop:", "!shop:", "a:b:c"] {
            assert_eq!(TagFilter::parse(token), None, "'{token}' should be invalid");
        }
    }

    #[test]
    fn test_parse_all_skips_invalid() {
        let filters = TagFilter::parse_all(["shop:bakery", ":", "!highway", ""]);
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0].kind, TagFilterKind::Include);
        assert_eq!(filters[1].kind, TagFilterKind::Exclude);
    }

    #[test]
    fn test_display_reparses_to_same_filter() {
        for token in ["shop:bakery", "tourism", ":information", "!highway", ":!information", "!shop:bakery", "amenity:!post_box"] {
            let parsed = TagFilter::parse(token).unwrap();
            assert_eq!(TagFilter::parse(&parsed.to_string()), Some(parsed), "token {token}");
        }
    }
}
