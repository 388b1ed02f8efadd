//! sqlx rows to Canonical Tables.
//!
//! PostgreSQL columns carry a reliable type, so each cell is decoded as that
//! type. SQLite types are advisory: cells are read by storage class and the
//! declared type only steers the final column type (booleans, timestamps and
//! `REAL`/`NUMERIC` affinity).

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::types::BigDecimal;
use sqlx::{Column as _, Row, TypeInfo, ValueRef};

use crate::config::parse_timestamp;
use crate::error_handling::DatabaseError;
use crate::storage::sql::{pg_column_type, sqlite_column_type};
use crate::table::{CanonicalTable, Column, ColumnType, Value};

/// Name and database type of a result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ColumnMeta {
    pub name: String,
    pub sql_type: String,
}

pub(crate) fn column_meta<C: sqlx::Column>(columns: &[C]) -> Vec<ColumnMeta> {
    columns
        .iter()
        .map(|c| ColumnMeta {
            name: c.name().to_string(),
            sql_type: c.type_info().name().to_string(),
        })
        .collect()
}

fn unsupported(source_name: &str, meta: &ColumnMeta, sql_type: &str) -> DatabaseError {
    DatabaseError::UnsupportedColumnType {
        source_name: source_name.to_string(),
        column: meta.name.clone(),
        sql_type: sql_type.to_string(),
    }
}

fn decode_pg(row: &PgRow, index: usize, sql_type: &str) -> Result<Value, sqlx::Error> {
    let value = match sql_type.to_ascii_lowercase().as_str() {
        "int2" => row
            .try_get::<Option<i16>, _>(index)?
            .map(|v| Value::Integer(i64::from(v))),
        "int4" => row
            .try_get::<Option<i32>, _>(index)?
            .map(|v| Value::Integer(i64::from(v))),
        "int8" => row.try_get::<Option<i64>, _>(index)?.map(Value::Integer),
        "float4" => row
            .try_get::<Option<f32>, _>(index)?
            .map(|v| Value::Float(f64::from(v))),
        "float8" => row.try_get::<Option<f64>, _>(index)?.map(Value::Float),
        "numeric" => row
            .try_get::<Option<BigDecimal>, _>(index)?
            .map(Value::Decimal),
        "bool" => row.try_get::<Option<bool>, _>(index)?.map(Value::Boolean),
        "timestamptz" => row
            .try_get::<Option<DateTime<Utc>>, _>(index)?
            .map(Value::Timestamp),
        "timestamp" => row
            .try_get::<Option<NaiveDateTime>, _>(index)?
            .map(|v| Value::Timestamp(v.and_utc())),
        "date" => row
            .try_get::<Option<NaiveDate>, _>(index)?
            .map(|d| Value::Timestamp(d.and_time(NaiveTime::MIN).and_utc())),
        _ => row.try_get::<Option<String>, _>(index)?.map(Value::Text),
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Builds a table from PostgreSQL rows; unknown column types are rejected.
pub(crate) fn pg_table(
    source_name: &str,
    columns: &[ColumnMeta],
    rows: &[PgRow],
) -> Result<CanonicalTable, DatabaseError> {
    let table_columns = columns
        .iter()
        .map(|meta| {
            pg_column_type(&meta.sql_type)
                .map(|t| Column::new(meta.name.clone(), t))
                .ok_or_else(|| unsupported(source_name, meta, &meta.sql_type))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut table_rows = Vec::with_capacity(rows.len());
    for row in rows {
        let values = columns
            .iter()
            .enumerate()
            .map(|(i, meta)| decode_pg(row, i, &meta.sql_type))
            .collect::<Result<Vec<_>, _>>()?;
        table_rows.push(values);
    }
    Ok(CanonicalTable::try_new(table_columns, table_rows)?)
}

/// Reads one SQLite cell by its storage class.
fn decode_sqlite(
    source_name: &str,
    row: &SqliteRow,
    index: usize,
    meta: &ColumnMeta,
) -> Result<Value, DatabaseError> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let storage = raw.type_info().name().to_string();
    match storage.as_str() {
        "INTEGER" => Ok(Value::Integer(row.try_get::<i64, _>(index)?)),
        "REAL" => Ok(Value::Float(row.try_get::<f64, _>(index)?)),
        "TEXT" => Ok(Value::Text(row.try_get::<String, _>(index)?)),
        other => Err(unsupported(source_name, meta, other)),
    }
}

/// Column type from the declaration and the values actually stored.
fn resolve_sqlite_type(declared: Option<ColumnType>, values: &[Value]) -> ColumnType {
    let observed = values
        .iter()
        .filter_map(Value::column_type)
        .reduce(ColumnType::widen);
    match (declared, observed) {
        (Some(ColumnType::Timestamp), _) => ColumnType::Timestamp,
        (Some(declared), None) => declared,
        (Some(ColumnType::Boolean), Some(ColumnType::Integer)) => ColumnType::Boolean,
        (Some(ColumnType::Float), Some(ColumnType::Integer | ColumnType::Float)) => {
            ColumnType::Float
        }
        (Some(ColumnType::Text), Some(_)) => ColumnType::Text,
        (_, Some(observed)) => observed,
        (None, None) => ColumnType::Text,
    }
}

fn convert_sqlite(
    source_name: &str,
    column: &str,
    value: Value,
    target: ColumnType,
) -> Result<Value, DatabaseError> {
    let invalid = |raw: String| DatabaseError::InvalidValue {
        source_name: source_name.to_string(),
        column: column.to_string(),
        value: raw,
        expected: target,
    };
    match (value, target) {
        (Value::Null, _) => Ok(Value::Null),
        (Value::Integer(n), ColumnType::Boolean) => Ok(Value::Boolean(n != 0)),
        (Value::Integer(secs), ColumnType::Timestamp) => DateTime::from_timestamp(secs, 0)
            .map(Value::Timestamp)
            .ok_or_else(|| invalid(secs.to_string())),
        (Value::Float(secs), ColumnType::Timestamp) => {
            DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
                .map(Value::Timestamp)
                .ok_or_else(|| invalid(secs.to_string()))
        }
        (Value::Text(text), ColumnType::Timestamp) => parse_timestamp(&text)
            .map(Value::Timestamp)
            .map_err(|_| invalid(text)),
        (value, target) => Ok(value.coerce_to(target)),
    }
}

/// Builds a table from SQLite rows.
pub(crate) fn sqlite_table(
    source_name: &str,
    columns: &[ColumnMeta],
    rows: &[SqliteRow],
) -> Result<CanonicalTable, DatabaseError> {
    let mut cells: Vec<Vec<Value>> = vec![Vec::with_capacity(rows.len()); columns.len()];
    for row in rows {
        for (index, meta) in columns.iter().enumerate() {
            cells[index].push(decode_sqlite(source_name, row, index, meta)?);
        }
    }

    let mut table_columns = Vec::with_capacity(columns.len());
    let mut converted = Vec::with_capacity(columns.len());
    for (meta, values) in columns.iter().zip(cells) {
        let target = resolve_sqlite_type(sqlite_column_type(&meta.sql_type), &values);
        let values = values
            .into_iter()
            .map(|v| convert_sqlite(source_name, &meta.name, v, target))
            .collect::<Result<Vec<_>, _>>()?;
        table_columns.push(Column::new(meta.name.clone(), target));
        converted.push(values.into_iter());
    }

    let table_rows = (0..rows.len())
        .map(|_| {
            converted
                .iter_mut()
                .map(|column| column.next().unwrap_or(Value::Null))
                .collect()
        })
        .collect();
    Ok(CanonicalTable::try_new(table_columns, table_rows)?)
}
