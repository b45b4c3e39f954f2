use thiserror::Error;

#[derive(Error, Debug)]
pub enum MeridianError {
    #[error("Document error: {0}")]
    Document(#[from] crate::document::DocumentError),
    #[error("Query error: {0}")]
    Query(#[from] crate::query::QueryError),
    #[error("Index error: {0}")]
    Index(#[from] crate::index::IndexError),
    #[error("Data processing error: {0}")]
    DataProcessing(#[from] meridian_data_processing::DataError),
    #[error("DataFrame error: {0}")]
    DataFrame(#[from] polars::prelude::PolarsError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Init Logging error: {0}")]
    InitLoggingError(#[from] tracing_subscriber::filter::ParseError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, MeridianError>;
