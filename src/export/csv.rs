//! CSV export functionality.
//!
//! One header row of column names, then one record per table row. Nulls are
//! empty fields and timestamps are RFC 3339 UTC.

use anyhow::{Context, Result};
use csv::Writer;
use std::io::Write;

use crate::table::CanonicalTable;

/// Writes `table` as CSV to `output`.
///
/// # Returns
///
/// Returns the number of data rows written.
pub fn write_csv<W: Write>(table: &CanonicalTable, output: W) -> Result<usize> {
    let mut writer = Writer::from_writer(output);

    writer
        .write_record(table.column_names())
        .context("Failed to write CSV header")?;

    let mut record_count = 0;
    for row in table.rows() {
        writer
            .write_record(row.iter().map(|value| value.to_string()))
            .with_context(|| format!("Failed to write CSV row {}", record_count))?;
        record_count += 1;
    }

    writer.flush().context("Failed to flush CSV output")?;
    Ok(record_count)
}
