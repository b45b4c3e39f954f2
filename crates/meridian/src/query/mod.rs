//! Free-text queries with OSM tag filters.
//!
//! [`TagFilter`] parses the `osm_tag` request syntax, [`TagFilterQueryBuilder`]
//! turns text plus filters into an engine-agnostic [`QuerySpec`].

mod builder;
mod spec;
mod tag_filter;

pub use builder::{BuiltQuery, DEFAULT_LIMIT, MAX_LIMIT, QueryState, TagFilterQueryBuilder, TagMap, parse_layers};
pub use error::QueryError;
pub use spec::{FilterNode, MatchClause, MatchMode, QuerySpec, TagField};
pub use tag_filter::{TagFilter, TagFilterKind};

mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum QueryError {
        #[error("The {group} filter root is not a composite node: {found}")]
        InconsistentFilterRoot { group: &'static str, found: String },
        #[error("Invalid layer '{layer}'. Allowed layers are: {allowed}")]
        UnknownLayer { layer: String, allowed: String },
    }

    pub type Result<T> = std::result::Result<T, QueryError>;
}
