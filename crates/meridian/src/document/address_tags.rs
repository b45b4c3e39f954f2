//! The place's own address tags, layered over the resolved hierarchy.

use std::collections::BTreeMap;

use tracing::trace;

use super::{AddressType, ContextMap, DEFAULT_KEY, PlaceDocument};

#[derive(Debug, Clone, Copy)]
enum Target {
    Part(AddressType),
    Context,
}

/// Tag prefixes and where their values go. The first matching prefix wins.
const ADDRESS_TAGS: [(&str, Target); 18] = [
    ("street", Target::Part(AddressType::Street)),
    ("city", Target::Part(AddressType::City)),
    ("suburb", Target::Part(AddressType::District)),
    ("neighbourhood", Target::Part(AddressType::Locality)),
    ("county", Target::Part(AddressType::County)),
    ("state", Target::Part(AddressType::State)),
    ("province", Target::Part(AddressType::State)),
    ("other", Target::Context),
    ("district", Target::Context),
    ("hamlet", Target::Context),
    ("subdistrict", Target::Context),
    ("municipality", Target::Context),
    ("region", Target::Context),
    ("ward", Target::Context),
    ("village", Target::Context),
    ("subward", Target::Context),
    ("block", Target::Context),
    ("quarter", Target::Context),
];

/// Applies address tags such as `street`, `city:de` or `hamlet` to `doc`.
///
/// A tag for an empty address part fills it. A tag for a part that is
/// already set overrides the name for its language key, and the replaced
/// name moves to the primary context. `postcode` always replaces the
/// document postcode. Unknown tags and languages outside `languages` are
/// ignored.
pub(super) fn apply<S: AsRef<str>>(doc: &mut PlaceDocument, tags: &BTreeMap<String, String>, languages: &[S]) {
    let is_language = |key: &str| languages.iter().any(|lang| lang.as_ref() == key);
    let mut overlay: BTreeMap<AddressType, BTreeMap<&str, &str>> = BTreeMap::new();

    for (key, value) in tags {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        if key == "postcode" {
            doc.postcode = Some(value.to_string());
            continue;
        }
        let Some((prefix, target)) = ADDRESS_TAGS.iter().find(|(prefix, _)| key.starts_with(*prefix)) else {
            trace!(key = %key, "Ignoring address tag");
            continue;
        };
        match target {
            Target::Context => match key.rsplit_once(':') {
                None => doc.context.add_name(DEFAULT_KEY, Some(value)),
                Some((_, lang)) if is_language(lang) => doc.context.add_name(lang, Some(value)),
                Some(_) => {}
            },
            Target::Part(kind) => {
                let name_key = match key.strip_prefix(*prefix) {
                    Some("") => Some(DEFAULT_KEY),
                    Some(rest) => rest.strip_prefix(':').filter(|lang| is_language(*lang)),
                    None => None,
                };
                if let Some(name_key) = name_key {
                    overlay.entry(*kind).or_default().insert(name_key, value);
                }
            }
        }
    }

    for (kind, names) in overlay {
        match doc.address.get_mut(&kind) {
            None => {
                doc.address.insert(kind, names.into_iter().collect());
            }
            Some(current) => {
                for (key, value) in names {
                    if let Some(previous) = current.replace_name(key, value).filter(|previous| previous != value) {
                        move_to_context(&mut doc.context, key, &previous);
                    }
                }
            }
        }
    }
}

fn move_to_context(context: &mut ContextMap, key: &str, name: &str) {
    trace!(key, name, "Address tag replaces resolved name");
    context.add_name(key, Some(name));
}
