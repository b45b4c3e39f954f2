//! Conversion of tabular place extracts into rows.
//!
//! Place and address extracts are read as polars frames, one row per object.
//! Name, extra-tag and address-tag bags are stored as JSON object strings. Rows that miss a
//! mandatory field or carry unparsable tags are reported in
//! [`RowBatch::rejected`] instead of being coerced.

use std::collections::BTreeMap;
use std::path::Path;

use polars::prelude::*;
use tracing::{debug, info, instrument, warn};

use crate::error::{DataError, Result};
use crate::geometry::{Extent, Point};
use crate::rows::{AddressRow, PlaceRow, RawNameTags};

/// Columns every place frame must carry.
pub const PLACE_COLUMNS: [&str; 8] = [
    "place_id",
    "osm_type",
    "osm_id",
    "class",
    "type",
    "lon",
    "lat",
    "rank_address",
];

/// Columns every address frame must carry.
pub const ADDRESS_COLUMNS: [&str; 5] = ["for_place_id", "place_id", "class", "type", "rank_address"];

/// Rows converted from a frame, together with the rows that were rejected.
#[derive(Debug)]
pub struct RowBatch<T> {
    pub rows: Vec<T>,
    pub rejected: Vec<DataError>,
}

impl<T> Default for RowBatch<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            rejected: Vec::new(),
        }
    }
}

impl<T> RowBatch<T> {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }

    fn push(&mut self, row: usize, parsed: std::result::Result<T, String>) {
        match parsed {
            Ok(value) => self.rows.push(value),
            Err(reason) => {
                warn!(row, reason = %reason, "Rejecting malformed row");
                self.rejected.push(DataError::MalformedRow { row, reason });
            }
        }
    }
}

/// An address line keyed by the place it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressLine {
    pub for_place_id: u64,
    pub row: AddressRow,
}

struct Columns<'a> {
    df: &'a DataFrame,
}

impl<'a> Columns<'a> {
    const fn new(df: &'a DataFrame) -> Self {
        Self { df }
    }

    fn has(&self, name: &str) -> bool {
        self.df.get_column_index(name).is_some()
    }

    fn str(&self, name: &str) -> Result<Option<StringChunked>> {
        if !self.has(name) {
            return Ok(None);
        }
        Ok(Some(self.df.column(name)?.cast(&DataType::String)?.str()?.clone()))
    }

    fn i64(&self, name: &str) -> Result<Option<Int64Chunked>> {
        if !self.has(name) {
            return Ok(None);
        }
        Ok(Some(self.df.column(name)?.cast(&DataType::Int64)?.i64()?.clone()))
    }

    fn f64(&self, name: &str) -> Result<Option<Float64Chunked>> {
        if !self.has(name) {
            return Ok(None);
        }
        Ok(Some(self.df.column(name)?.cast(&DataType::Float64)?.f64()?.clone()))
    }

    fn bool(&self, name: &str) -> Result<Option<BooleanChunked>> {
        if !self.has(name) {
            return Ok(None);
        }
        Ok(Some(self.df.column(name)?.cast(&DataType::Boolean)?.bool()?.clone()))
    }

    fn require(&self, names: &[&str]) -> Result<()> {
        match names.iter().find(|name| !self.has(name)) {
            Some(missing) => Err(DataError::MissingColumn((*missing).to_string())),
            None => Ok(()),
        }
    }
}

fn text(ca: Option<&StringChunked>, idx: usize) -> Option<String> {
    ca.and_then(|ca| ca.get(idx))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn int(ca: Option<&Int64Chunked>, idx: usize) -> Option<i64> {
    ca.and_then(|ca| ca.get(idx))
}

fn float(ca: Option<&Float64Chunked>, idx: usize) -> Option<f64> {
    ca.and_then(|ca| ca.get(idx)).filter(|v| v.is_finite())
}

fn required<T>(value: Option<T>, field: &str) -> std::result::Result<T, String> {
    value.ok_or_else(|| format!("missing mandatory field '{field}'"))
}

fn to_u64(value: i64, field: &str) -> std::result::Result<u64, String> {
    u64::try_from(value).map_err(|_| format!("field '{field}' out of range: {value}"))
}

fn to_rank(value: Option<i64>, field: &str) -> std::result::Result<u8, String> {
    let value = required(value, field)?;
    u8::try_from(value).map_err(|_| format!("field '{field}' out of range: {value}"))
}

fn parse_tag_bag<T>(raw: Option<String>, field: &str) -> std::result::Result<T, String>
where
    T: serde::de::DeserializeOwned + Default,
{
    match raw {
        None => Ok(T::default()),
        Some(json) => serde_json::from_str(&json)
            .map_err(|e| format!("field '{field}' is not a JSON object of strings: {e}")),
    }
}

impl PlaceRow {
    /// Converts a place frame into rows. Missing mandatory columns fail the
    /// whole frame; malformed individual rows are collected in `rejected`.
    #[instrument(name = "Place rows from DataFrame", level = "debug", skip_all, fields(height = df.height()))]
    pub fn from_df(df: &DataFrame) -> Result<RowBatch<Self>> {
        let cols = Columns::new(df);
        cols.require(&PLACE_COLUMNS)?;

        let place_id = cols.i64("place_id")?;
        let osm_type = cols.str("osm_type")?;
        let osm_id = cols.i64("osm_id")?;
        let class = cols.str("class")?;
        let kind = cols.str("type")?;
        let name = cols.str("name")?;
        let extratags = cols.str("extratags")?;
        let address = cols.str("address")?;
        let housenumber = cols.str("housenumber")?;
        let postcode = cols.str("postcode")?;
        let country_code = cols.str("country_code")?;
        let lon = cols.f64("lon")?;
        let lat = cols.f64("lat")?;
        let bbox = [
            cols.f64("bbox_min_lon")?,
            cols.f64("bbox_min_lat")?,
            cols.f64("bbox_max_lon")?,
            cols.f64("bbox_max_lat")?,
        ];
        let rank_address = cols.i64("rank_address")?;
        let rank_search = cols.i64("rank_search")?;
        let admin_level = cols.i64("admin_level")?;
        let importance = cols.f64("importance")?;
        let parent_place_id = cols.i64("parent_place_id")?;

        let mut batch = RowBatch::default();
        for idx in 0..df.height() {
            let parsed = (|| -> std::result::Result<Self, String> {
                let rank_address = to_rank(int(rank_address.as_ref(), idx), "rank_address")?;
                let centroid = Point::new(
                    required(float(lon.as_ref(), idx), "lon")?,
                    required(float(lat.as_ref(), idx), "lat")?,
                );
                let bbox = match bbox.each_ref().map(|c| float(c.as_ref(), idx)) {
                    [Some(a), Some(b), Some(c), Some(d)] => Some(Extent::new(a, b, c, d)),
                    _ => None,
                };
                Ok(Self {
                    place_id: to_u64(required(int(place_id.as_ref(), idx), "place_id")?, "place_id")?,
                    osm_type: required(text(osm_type.as_ref(), idx), "osm_type")?,
                    osm_id: to_u64(required(int(osm_id.as_ref(), idx), "osm_id")?, "osm_id")?,
                    osm_key: required(text(class.as_ref(), idx), "class")?,
                    osm_value: required(text(kind.as_ref(), idx), "type")?,
                    names: parse_tag_bag::<RawNameTags>(text(name.as_ref(), idx), "name")?,
                    housenumber: text(housenumber.as_ref(), idx),
                    postcode: text(postcode.as_ref(), idx),
                    country_code: text(country_code.as_ref(), idx),
                    extratags: parse_tag_bag::<BTreeMap<String, String>>(
                        text(extratags.as_ref(), idx),
                        "extratags",
                    )?,
                    address: parse_tag_bag::<BTreeMap<String, String>>(text(address.as_ref(), idx), "address")?,
                    centroid,
                    bbox,
                    rank_address,
                    rank_search: match int(rank_search.as_ref(), idx) {
                        Some(v) => to_rank(Some(v), "rank_search")?,
                        None => rank_address,
                    },
                    admin_level: int(admin_level.as_ref(), idx).and_then(|v| u8::try_from(v).ok()),
                    importance: float(importance.as_ref(), idx),
                    parent_place_id: int(parent_place_id.as_ref(), idx)
                        .and_then(|v| u64::try_from(v).ok()),
                })
            })();
            batch.push(idx, parsed);
        }

        debug!(
            rows = batch.rows.len(),
            rejected = batch.rejected.len(),
            "Converted place frame"
        );
        Ok(batch)
    }
}

impl AddressRow {
    /// Converts an address frame into address lines keyed by `for_place_id`.
    /// Frame order is preserved.
    #[instrument(name = "Address rows from DataFrame", level = "debug", skip_all, fields(height = df.height()))]
    pub fn from_df(df: &DataFrame) -> Result<RowBatch<AddressLine>> {
        let cols = Columns::new(df);
        cols.require(&ADDRESS_COLUMNS)?;

        let for_place_id = cols.i64("for_place_id")?;
        let place_id = cols.i64("place_id")?;
        let osm_type = cols.str("osm_type")?;
        let osm_id = cols.i64("osm_id")?;
        let class = cols.str("class")?;
        let kind = cols.str("type")?;
        let name = cols.str("name")?;
        let rank_address = cols.i64("rank_address")?;
        let admin_level = cols.i64("admin_level")?;
        let postcode = cols.str("postcode")?;
        let place = cols.str("place")?;
        let is_address = cols.bool("isaddress")?;
        let housenumber = cols.str("housenumber")?;
        let country_code = cols.str("country_code")?;

        let mut batch = RowBatch::default();
        for idx in 0..df.height() {
            let parsed = (|| -> std::result::Result<AddressLine, String> {
                let row = Self {
                    place_id: to_u64(required(int(place_id.as_ref(), idx), "place_id")?, "place_id")?,
                    osm_type: text(osm_type.as_ref(), idx),
                    osm_id: int(osm_id.as_ref(), idx).and_then(|v| u64::try_from(v).ok()),
                    osm_key: required(text(class.as_ref(), idx), "class")?,
                    osm_value: required(text(kind.as_ref(), idx), "type")?,
                    names: parse_tag_bag::<RawNameTags>(text(name.as_ref(), idx), "name")?,
                    rank_address: to_rank(int(rank_address.as_ref(), idx), "rank_address")?,
                    admin_level: int(admin_level.as_ref(), idx).and_then(|v| u8::try_from(v).ok()),
                    postcode: text(postcode.as_ref(), idx),
                    place: text(place.as_ref(), idx),
                    is_address: is_address
                        .as_ref()
                        .and_then(|ca| ca.get(idx))
                        .unwrap_or(true),
                    housenumber: text(housenumber.as_ref(), idx),
                    country_code: text(country_code.as_ref(), idx),
                };
                Ok(AddressLine {
                    for_place_id: to_u64(
                        required(int(for_place_id.as_ref(), idx), "for_place_id")?,
                        "for_place_id",
                    )?,
                    row,
                })
            })();
            batch.push(idx, parsed);
        }

        debug!(
            rows = batch.rows.len(),
            rejected = batch.rejected.len(),
            "Converted address frame"
        );
        Ok(batch)
    }
}

/// Lazily scans a parquet extract.
pub fn scan_parquet(path: impl AsRef<Path>) -> Result<LazyFrame> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(DataError::RequiredFilesNotFound(path.to_path_buf()));
    }
    info!(path = ?path, "Scanning parquet extract");
    Ok(LazyFrame::scan_parquet(path, Default::default())?)
}

/// Reads place rows from a parquet extract.
pub fn read_place_rows(path: impl AsRef<Path>) -> Result<RowBatch<PlaceRow>> {
    let df = scan_parquet(path)?.collect()?;
    PlaceRow::from_df(&df)
}

/// Reads address lines from a parquet extract.
pub fn read_address_lines(path: impl AsRef<Path>) -> Result<RowBatch<AddressLine>> {
    let df = scan_parquet(path)?.collect()?;
    AddressRow::from_df(&df)
}
