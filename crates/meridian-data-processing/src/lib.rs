//! Row model and tabular ingestion for the Meridian document pipeline.
//!
//! Place extracts arrive as polars frames (or parquet files) with one row per
//! place and one row per address line. This crate turns them into typed
//! [`PlaceRow`] and [`AddressRow`] values and carries the context-free
//! hierarchy predicates (street, state, country, postcode) on the rows.

pub mod geometry;
pub mod ingest;
pub mod rows;
pub mod test_data;

mod error {
    use std::path::PathBuf;

    use polars::prelude::PolarsError;
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum DataError {
        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),
        #[error("Polars error: {0}")]
        Polars(#[from] PolarsError),
        #[error("Serialization error: {0}")]
        Serde(#[from] serde_json::Error),
        #[error("Required column '{0}' not found")]
        MissingColumn(String),
        #[error("Malformed row {row}: {reason}")]
        MalformedRow { row: usize, reason: String },
        #[error("Required data file not found: {0}")]
        RequiredFilesNotFound(PathBuf),
    }

    pub type Result<T> = std::result::Result<T, DataError>;
}

pub use error::{DataError, Result};

pub use geometry::{Extent, Point};
pub use ingest::{AddressLine, RowBatch, read_address_lines, read_place_rows, scan_parquet};
pub use rows::{AddressRow, PlaceRow, RawNameTags};
