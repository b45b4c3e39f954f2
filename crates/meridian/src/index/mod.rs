//! In-memory tantivy index of assembled place documents.
//!
//! Documents are keyed by `place_id`; indexing a document again replaces the
//! previous version. A [`QuerySpec`] is executed by turning its match clauses
//! into a boosted full-text query and its filter tree into boolean tag
//! clauses on the raw `osm_key`/`osm_value`/`address_type` fields.

use ahash::AHashMap;
pub use error::IndexError;
use error::Result;
use itertools::Itertools;
use meridian_data_processing::Point;
use tantivy::schema::Field;
use tantivy::{
    Index, IndexWriter, TantivyDocument, Term,
    collector::TopDocs,
    query::{AllQuery, BooleanQuery, BoostQuery, FuzzyTermQuery, Occur, Query, QueryParser, TermQuery, TermSetQuery},
    schema::{FAST, INDEXED, IndexRecordOption, STORED, Schema, SchemaBuilder, TextFieldIndexing, TextOptions, Value},
};
use tracing::{debug, info, instrument, trace, warn};

use crate::document::{DEFAULT_KEY, PlaceDocument};
use crate::query::{FilterNode, MatchMode, QuerySpec, TagField};

const WRITER_MEMORY_BYTES: usize = 50_000_000;
/// Candidates fetched per requested result before re-scoring.
const CANDIDATE_FACTOR: usize = 3;
/// Distance in km at which the location bias has halved its effect.
const BIAS_SCALE_KM: f64 = 100.0;

/// A scored document returned by [`PlaceIndex::search`].
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub document: PlaceDocument,
    pub score: f32,
}

#[derive(Debug, Clone)]
struct PlaceFields {
    place_id: Field,
    osm_key: Field,
    osm_value: Field,
    address_type: Field,
    classification: Field,
    collector: Field,
    context: Field,
    names: AHashMap<String, Field>,
    source: Field,
}

/// Tantivy index over [`PlaceDocument`]s.
#[derive(Clone)]
pub struct PlaceIndex {
    index: Index,
    fields: PlaceFields,
}

impl std::fmt::Debug for PlaceIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaceIndex").field("fields", &self.fields).finish_non_exhaustive()
    }
}

impl PlaceIndex {
    /// Creates an empty in-RAM index with one name field per language plus
    /// `name_default`.
    #[instrument(name = "Create PlaceIndex", level = "debug", skip_all, fields(languages = ?languages))]
    pub fn new<S: AsRef<str> + std::fmt::Debug>(languages: &[S]) -> Result<Self> {
        let schema = Self::schema(languages);
        let index = Index::create_in_ram(schema.clone());
        let fields = PlaceFields {
            place_id: schema.get_field("place_id")?,
            osm_key: schema.get_field("osm_key")?,
            osm_value: schema.get_field("osm_value")?,
            address_type: schema.get_field("address_type")?,
            classification: schema.get_field("classification")?,
            collector: schema.get_field("collector")?,
            context: schema.get_field("context")?,
            names: name_keys(languages)
                .map(|key| {
                    let field = schema.get_field(&format!("name_{key}"))?;
                    Ok((key, field))
                })
                .collect::<Result<_>>()?,
            source: schema.get_field("source")?,
        };
        info!(num_fields = schema.fields().count(), "Created in-memory place index");
        Ok(Self { index, fields })
    }

    fn schema<S: AsRef<str>>(languages: &[S]) -> Schema {
        let mut schema_builder = SchemaBuilder::new();

        let text_indexing = TextFieldIndexing::default()
            .set_tokenizer("default")
            .set_index_option(IndexRecordOption::WithFreqsAndPositions);
        let text_options = TextOptions::default().set_indexing_options(text_indexing);

        // Tags are matched exactly
        let tag_options = TextOptions::default().set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer("raw")
                .set_index_option(IndexRecordOption::Basic),
        );

        schema_builder.add_u64_field("place_id", STORED | INDEXED | FAST);
        schema_builder.add_text_field("osm_key", tag_options.clone());
        schema_builder.add_text_field("osm_value", tag_options.clone());
        schema_builder.add_text_field("address_type", tag_options.clone());
        schema_builder.add_text_field("classification", tag_options);
        schema_builder.add_text_field("collector", text_options.clone());
        schema_builder.add_text_field("context", text_options.clone());
        for key in name_keys(languages) {
            schema_builder.add_text_field(&format!("name_{key}"), text_options.clone());
        }
        schema_builder.add_text_field("source", STORED);
        schema_builder.build()
    }

    fn to_tantivy(&self, doc: &PlaceDocument) -> Result<TantivyDocument> {
        let f = &self.fields;
        let mut out = TantivyDocument::default();
        out.add_u64(f.place_id, doc.place_id);
        out.add_text(f.osm_key, &doc.osm_key);
        out.add_text(f.osm_value, &doc.osm_value);
        out.add_text(f.address_type, doc.address_type().name());
        if let Some(token) = doc.classification() {
            out.add_text(f.classification, token);
        }

        for (key, name) in doc.names.iter() {
            if let Some(field) = f.names.get(key) {
                out.add_text(*field, name);
            }
            out.add_text(f.collector, name);
        }
        for name in doc.address.values().flat_map(|names| names.values()) {
            out.add_text(f.collector, name);
        }
        for value in [&doc.housenumber, &doc.postcode].into_iter().flatten() {
            out.add_text(f.collector, value);
        }
        for name in doc.context.all_names() {
            out.add_text(f.collector, name);
            out.add_text(f.context, name);
        }
        for name in doc.secondary_context.all_names() {
            out.add_text(f.context, name);
        }

        out.add_text(f.source, serde_json::to_string(doc)?);
        Ok(out)
    }

    /// Indexes documents, replacing any previous document with the same
    /// `place_id`, and commits.
    #[instrument(name = "Upsert documents", level = "debug", skip_all, fields(num_docs = docs.len()))]
    pub fn upsert(&self, docs: &[PlaceDocument]) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }
        let mut writer: IndexWriter = self.index.writer_with_num_threads(1, WRITER_MEMORY_BYTES)?;
        // deletes only affect documents added before them
        for place_id in docs.iter().map(|d| d.place_id).unique() {
            writer.delete_term(Term::from_field_u64(self.fields.place_id, place_id));
        }
        for doc in docs {
            writer.add_document(self.to_tantivy(doc)?)?;
        }
        writer.commit()?;
        debug!("Committed documents");
        Ok(())
    }

    /// Removes every document of a place and commits.
    pub fn delete(&self, place_id: u64) -> Result<()> {
        let mut writer: IndexWriter = self.index.writer_with_num_threads(1, WRITER_MEMORY_BYTES)?;
        writer.delete_term(Term::from_field_u64(self.fields.place_id, place_id));
        writer.commit()?;
        Ok(())
    }

    pub fn num_docs(&self) -> Result<u64> {
        Ok(self.index.reader()?.searcher().num_docs())
    }

    /// All indexed documents of a place. Several documents share a place id
    /// when a house number list was expanded.
    pub fn get(&self, place_id: u64) -> Result<Vec<PlaceDocument>> {
        let query = TermQuery::new(
            Term::from_field_u64(self.fields.place_id, place_id),
            IndexRecordOption::Basic,
        );
        let searcher = self.index.reader()?.searcher();
        let limit = usize::try_from(searcher.num_docs()).unwrap_or(usize::MAX).max(1);
        searcher
            .search(&query, &TopDocs::with_limit(limit))?
            .into_iter()
            .map(|(_, address)| self.decode(&searcher.doc::<TantivyDocument>(address)?))
            .collect()
    }

    fn decode(&self, doc: &TantivyDocument) -> Result<PlaceDocument> {
        let source = doc
            .get_first(self.fields.source)
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("Stored document is missing its source"))?;
        Ok(serde_json::from_str(source)?)
    }

    fn tag_field(&self, field: TagField) -> Field {
        match field {
            TagField::Key => self.fields.osm_key,
            TagField::Value => self.fields.osm_value,
            TagField::Layer => self.fields.address_type,
        }
    }

    /// Translates a filter tree into a boolean tantivy query.
    fn compile_filter(&self, node: &FilterNode) -> Box<dyn Query> {
        match node {
            FilterNode::Term { field, value } => Box::new(TermQuery::new(
                Term::from_field_text(self.tag_field(*field), value),
                IndexRecordOption::Basic,
            )),
            FilterNode::Terms { field, values } => {
                let field = self.tag_field(*field);
                Box::new(TermSetQuery::new(
                    values.iter().map(|v| Term::from_field_text(field, v)),
                ))
            }
            FilterNode::And(children) if children.is_empty() => Box::new(AllQuery),
            FilterNode::And(children) => Box::new(BooleanQuery::new(
                children.iter().map(|c| (Occur::Must, self.compile_filter(c))).collect(),
            )),
            FilterNode::Or(children) => Box::new(BooleanQuery::new(
                children.iter().map(|c| (Occur::Should, self.compile_filter(c))).collect(),
            )),
            FilterNode::Not(child) => {
                let all: Box<dyn Query> = Box::new(AllQuery);
                Box::new(BooleanQuery::new(vec![
                    (Occur::Must, all),
                    (Occur::MustNot, self.compile_filter(child)),
                ]))
            }
        }
    }

    /// Builds the full-text part of a query. An empty query text matches
    /// every document.
    fn compile_text(&self, spec: &QuerySpec) -> Box<dyn Query> {
        let text = spec.query.trim();
        if text.is_empty() {
            return Box::new(AllQuery);
        }

        let boosted: Vec<(Field, f32)> = spec
            .match_clauses
            .iter()
            .filter_map(|clause| match self.text_field(&clause.field) {
                Some(field) => Some((field, clause.boost)),
                None => {
                    debug!(field = %clause.field, "Skipping match clause on unknown field");
                    None
                }
            })
            .collect();
        let default_fields = if boosted.is_empty() {
            vec![self.fields.collector]
        } else {
            boosted.iter().map(|(field, _)| *field).collect()
        };

        let mut parser = QueryParser::for_index(&self.index, default_fields);
        for (field, boost) in &boosted {
            parser.set_field_boost(*field, *boost);
        }
        if spec.match_mode == MatchMode::Strict {
            parser.set_conjunction_by_default();
        }
        let (parsed, errors) = parser.parse_query_lenient(text);
        if !errors.is_empty() {
            warn!(?errors, "Query parsing errors occurred");
        }

        if spec.match_mode == MatchMode::Strict {
            return parsed;
        }

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![(Occur::Should, parsed)];
        for token in text.split_whitespace().filter(|t| t.chars().count() > 2) {
            let term = Term::from_field_text(self.fields.collector, &token.to_lowercase());
            clauses.push((
                Occur::Should,
                Box::new(BoostQuery::new(Box::new(FuzzyTermQuery::new(term, 1, true)), 0.5)),
            ));
        }
        Box::new(BooleanQuery::new(clauses))
    }

    fn text_field(&self, name: &str) -> Option<Field> {
        match name {
            "collector" => Some(self.fields.collector),
            "context" => Some(self.fields.context),
            _ => name
                .strip_prefix("name_")
                .and_then(|key| self.fields.names.get(key))
                .copied(),
        }
    }

    /// Executes a built query. Scores are re-weighted by address type,
    /// importance and distance to the location bias.
    #[instrument(name = "Search PlaceIndex", level = "debug", skip_all, fields(query = %spec.query, limit = spec.limit, filtered = spec.filter.is_some()))]
    pub fn search(&self, spec: &QuerySpec) -> Result<Vec<IndexHit>> {
        let text = self.compile_text(spec);
        let query: Box<dyn Query> = match &spec.filter {
            Some(filter) => Box::new(BooleanQuery::new(vec![
                (Occur::Must, text),
                (Occur::Must, self.compile_filter(filter)),
            ])),
            None => text,
        };
        trace!(?query, "Final query constructed");

        let searcher = self.index.reader()?.searcher();
        let limit = spec.limit.max(1);
        let t_search = std::time::Instant::now();
        let top_docs = searcher.search(&*query, &TopDocs::with_limit(limit * CANDIDATE_FACTOR))?;
        debug!(
            num_results = top_docs.len(),
            search_execution_seconds = t_search.elapsed().as_secs_f32(),
            "Tantivy search execution complete"
        );

        let mut hits = top_docs
            .into_iter()
            .map(|(score, address)| {
                let document = self.decode(&searcher.doc::<TantivyDocument>(address)?)?;
                let score = rescore(score, &document, spec.location_bias);
                Ok(IndexHit { document, score })
            })
            .collect::<Result<Vec<_>>>()?;
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }
}

fn name_keys<S: AsRef<str>>(languages: &[S]) -> impl Iterator<Item = String> + '_ {
    std::iter::once(DEFAULT_KEY.to_string())
        .chain(languages.iter().map(|l| l.as_ref().to_string()))
        .unique()
}

fn rescore(score: f32, doc: &PlaceDocument, bias: Option<Point>) -> f32 {
    let weight = doc.address_type().priority_weight();
    let importance = 1.0 + doc.importance.clamp(0.0, 1.0);
    let proximity = bias.map_or(1.0, |point| {
        let km = point.haversine_km(&doc.centroid);
        0.5 + 0.5 * (-km / BIAS_SCALE_KM).exp()
    });
    let factor = (importance * proximity) as f32;
    score * weight * factor
}

mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum IndexError {
        #[error("Tantivy error: {0}")]
        Tantivy(#[from] tantivy::TantivyError),
        #[error("Stored document error: {0}")]
        Json(#[from] serde_json::Error),
        #[error(transparent)]
        Other(#[from] anyhow::Error),
    }
    pub type Result<T> = std::result::Result<T, IndexError>;
}
