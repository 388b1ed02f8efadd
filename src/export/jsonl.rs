//! JSONL export functionality.
//!
//! Each line is one JSON object, keys in column order. This format is ideal
//! for piping to `jq` or loading into document stores.

use anyhow::{Context, Result};
use serde_json::{Map, Number, Value as Json};
use std::io::Write;

use crate::table::{format_timestamp, CanonicalTable, Value};

/// JSON rendering of one cell.
///
/// Non-finite floats become `null`; decimals are strings so no precision is lost.
pub fn to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Boolean(b) => Json::Bool(*b),
        Value::Integer(i) => Json::Number((*i).into()),
        Value::Float(f) => Number::from_f64(*f).map_or(Json::Null, Json::Number),
        Value::Decimal(d) => Json::String(d.to_string()),
        Value::Timestamp(ts) => Json::String(format_timestamp(ts)),
        Value::Text(s) => Json::String(s.clone()),
    }
}

/// Writes `table` as line-delimited JSON to `output`.
///
/// # Returns
///
/// Returns the number of records written.
pub fn write_jsonl<W: Write>(table: &CanonicalTable, mut output: W) -> Result<usize> {
    let names: Vec<&str> = table.column_names().collect();
    let mut record_count = 0;

    for row in table.rows() {
        let object: Map<String, Json> = names
            .iter()
            .zip(row)
            .map(|(name, value)| (name.to_string(), to_json(value)))
            .collect();
        serde_json::to_writer(&mut output, &object)
            .with_context(|| format!("Failed to serialize record {}", record_count))?;
        output
            .write_all(b"\n")
            .context("Failed to write JSONL line")?;
        record_count += 1;
    }

    output.flush().context("Failed to flush JSONL output")?;
    Ok(record_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Column, ColumnType};
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    #[test]
    fn test_write_jsonl_preserves_column_order() {
        let table = CanonicalTable::try_new(
            vec![
                Column::new("z", ColumnType::Integer),
                Column::new("a", ColumnType::Float),
            ],
            vec![vec![Value::Integer(1), Value::Float(f64::NAN)]],
        )
        .expect("valid");
        let mut out = Vec::new();
        assert_eq!(write_jsonl(&table, &mut out).expect("jsonl"), 1);
        assert_eq!(String::from_utf8(out).expect("utf8"), "{\"z\":1,\"a\":null}\n");
    }

    #[test]
    fn test_to_json_decimal_is_string() {
        let d = BigDecimal::from_str("12.3400").expect("decimal");
        assert_eq!(to_json(&Value::Decimal(d)), Json::String("12.3400".to_string()));
        assert_eq!(to_json(&Value::Null), Json::Null);
    }
}
