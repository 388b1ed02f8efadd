//! Spreadsheet export functionality.
//!
//! One worksheet with a bold header row. Numbers and booleans keep their
//! cell types; timestamps and decimals are written as text; null cells are
//! left empty.

use anyhow::{bail, Context, Result};
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use std::io::Write;

use crate::table::{CanonicalTable, Value};

/// Worksheet row limit, header included.
const MAX_ROWS: usize = 1_048_576;
/// Worksheet column limit.
const MAX_COLUMNS: usize = 16_384;
/// Integers beyond this lose precision as spreadsheet numbers.
const MAX_EXACT_INTEGER: i64 = 1 << 53;

fn write_cell(sheet: &mut Worksheet, row: u32, col: u16, value: &Value) -> Result<(), XlsxError> {
    match value {
        Value::Null => {}
        Value::Boolean(b) => {
            sheet.write_boolean(row, col, *b)?;
        }
        Value::Integer(i) if i.abs() <= MAX_EXACT_INTEGER => {
            sheet.write_number(row, col, *i as f64)?;
        }
        Value::Float(f) if f.is_finite() => {
            sheet.write_number(row, col, *f)?;
        }
        Value::Float(_) => {}
        other => {
            sheet.write_string(row, col, other.to_string())?;
        }
    }
    Ok(())
}

/// Writes `table` as an .xlsx workbook to `output`.
///
/// # Returns
///
/// Returns the number of data rows written.
pub fn write_excel<W: Write>(table: &CanonicalTable, mut output: W) -> Result<usize> {
    if table.row_count() + 1 > MAX_ROWS {
        bail!(
            "{} rows exceed the spreadsheet limit of {} rows",
            table.row_count(),
            MAX_ROWS - 1
        );
    }
    if table.column_count() > MAX_COLUMNS {
        bail!(
            "{} columns exceed the spreadsheet limit of {} columns",
            table.column_count(),
            MAX_COLUMNS
        );
    }

    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let sheet = workbook.add_worksheet();

    for (col, name) in table.column_names().enumerate() {
        sheet
            .write_string_with_format(0, col as u16, name, &header)
            .context("Failed to write spreadsheet header")?;
    }

    for (index, row) in table.rows().iter().enumerate() {
        let sheet_row = index as u32 + 1;
        for (col, value) in row.iter().enumerate() {
            write_cell(sheet, sheet_row, col as u16, value)
                .with_context(|| format!("Failed to write spreadsheet row {}", index))?;
        }
    }

    let buffer = workbook
        .save_to_buffer()
        .context("Failed to assemble spreadsheet")?;
    output
        .write_all(&buffer)
        .context("Failed to write spreadsheet")?;
    output.flush().context("Failed to flush spreadsheet")?;
    Ok(table.row_count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Column, ColumnType};

    #[test]
    fn test_write_excel_produces_zip_container() {
        let table = CanonicalTable::try_new(
            vec![
                Column::new("timestamp", ColumnType::Integer),
                Column::new("ok", ColumnType::Boolean),
            ],
            vec![
                vec![Value::Integer(1), Value::Boolean(true)],
                vec![Value::Integer(2), Value::Null],
            ],
        )
        .expect("valid");
        let mut out = Vec::new();
        assert_eq!(write_excel(&table, &mut out).expect("xlsx"), 2);
        assert_eq!(&out[..2], b"PK");
    }
}
