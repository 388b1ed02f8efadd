//! Structured codec layer.
//!
//! Encodes numeric Canonical Tables to, and decodes them from, two WMO
//! binary formats:
//! - [`BufrCodec`]: BUFR edition 4, one subset per row, bit-packed
//! - [`GribCodec`]: GRIB edition 2, one message (field) per column
//!
//! Both embed a column manifest in their local-use section, so decoding
//! needs no external schema. Text and decimal columns are rejected with
//! `UnsupportedFieldType`; see [`packing`] for the precision of each kind.

mod bits;
pub mod bufr;
pub mod descriptors;
pub mod grib;
mod manifest;
pub mod packing;

use std::ops::Range;

use chrono::{DateTime, Utc};

use crate::error_handling::CodecError;
use crate::table::{CanonicalTable, ColumnType, Value};

pub use bufr::{BufrCodec, BufrMessage};
pub use descriptors::{Fxy, GribParameter, KnownField, KNOWN_FIELDS};
pub use grib::{GribCodec, GribField};
pub use manifest::ManifestEntry;

/// Decimal scale applied to float columns unless configured otherwise.
pub const DEFAULT_FLOAT_PRECISION: u8 = 4;

/// Encoder settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecOptions {
    /// Decimal digits kept for float columns.
    pub float_precision: u8,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            float_precision: DEFAULT_FLOAT_PRECISION,
        }
    }
}

/// A self-describing binary format for numeric tables.
pub trait ScientificFormat {
    fn name(&self) -> &'static str;

    fn encode(&self, table: &CanonicalTable) -> Result<Vec<u8>, CodecError>;

    fn decode(&self, bytes: &[u8]) -> Result<CanonicalTable, CodecError>;
}

/// First non-null timestamp in `rows`, scanning timestamp columns left to
/// right; the epoch when there is none.
pub(crate) fn first_timestamp(table: &CanonicalTable, rows: Range<usize>) -> DateTime<Utc> {
    let timestamp_columns: Vec<usize> = table
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, c)| c.column_type == ColumnType::Timestamp)
        .map(|(i, _)| i)
        .collect();
    table.rows()[rows]
        .iter()
        .find_map(|row| {
            timestamp_columns.iter().find_map(|&i| match &row[i] {
                Value::Timestamp(ts) => Some(*ts),
                _ => None,
            })
        })
        .unwrap_or_default()
}
