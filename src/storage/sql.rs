//! SQL text, identifier checks and SQL type names.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::{Database, Encode, Postgres, QueryBuilder, Sqlite, Type};

use crate::error_handling::DatabaseError;
use crate::storage::FetchFilter;
use crate::table::ColumnType;

/// Compiles a constant pattern; failure is a programming error.
fn compile_regex_unsafe(pattern: &str, context: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| {
        panic!(
            "Failed to compile regex pattern '{}' in {}: {}. This is a programming error.",
            pattern, context, e
        )
    })
}

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| compile_regex_unsafe(r"^[A-Za-z_][A-Za-z0-9_]*$", "IDENTIFIER_RE"));

/// Accepts plain identifiers only (`[A-Za-z_][A-Za-z0-9_]*`).
pub fn validate_identifier(name: &str) -> Result<&str, DatabaseError> {
    if IDENTIFIER_RE.is_match(name) {
        Ok(name)
    } else {
        Err(DatabaseError::InvalidIdentifier(name.to_string()))
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier)
}

pub(crate) const PG_LIST_SOURCES: &str = "SELECT table_name::text AS name \
     FROM information_schema.tables \
     WHERE table_schema = 'public' AND table_type = 'BASE TABLE' \
     ORDER BY table_name";

pub(crate) const PG_DESCRIBE: &str = "SELECT column_name::text AS name, udt_name::text AS sql_type \
     FROM information_schema.columns \
     WHERE table_schema = 'public' AND table_name = $1 \
     ORDER BY ordinal_position";

pub(crate) const SQLITE_LIST_SOURCES: &str = "SELECT name FROM sqlite_master \
     WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
     ORDER BY name";

pub(crate) const SQLITE_DESCRIBE: &str =
    "SELECT name, type AS sql_type FROM pragma_table_info(?) ORDER BY cid";

/// Builds `SELECT * FROM "source"` with the filter applied.
///
/// `key_present` says whether the source has the ordering key; without it the
/// range is ignored and the limit keeps the first rows. With a limit the query
/// selects the latest rows in descending order (callers reverse them).
fn build_select<'a, DB, T>(
    source_name: &str,
    filter: &FetchFilter,
    key_present: bool,
    bound: impl Fn(DateTime<Utc>) -> T,
) -> Result<QueryBuilder<'a, DB>, DatabaseError>
where
    DB: Database,
    <DB as Database>::Arguments<'a>: Default,
    T: 'a + Encode<'a, DB> + Type<DB> + Send,
    i64: 'a + Encode<'a, DB> + Type<DB>,
{
    let table = quote(validate_identifier(source_name)?);
    let mut builder = QueryBuilder::new(format!("SELECT * FROM {}", table));
    if key_present {
        let key = quote(validate_identifier(&filter.ordering_key)?);
        let mut separator = " WHERE ";
        if let Some(start) = filter.start {
            builder.push(separator).push(&key).push(" >= ").push_bind(bound(start));
            separator = " AND ";
        }
        if let Some(end) = filter.end {
            builder.push(separator).push(&key).push(" <= ").push_bind(bound(end));
        }
        builder.push(" ORDER BY ").push(&key);
        if filter.limit.is_some() {
            builder.push(" DESC");
        }
    }
    if let Some(limit) = filter.limit {
        builder.push(" LIMIT ").push_bind(i64::from(limit));
    }
    Ok(builder)
}

pub(crate) fn pg_select<'a>(
    source_name: &str,
    filter: &FetchFilter,
    key_present: bool,
) -> Result<QueryBuilder<'a, Postgres>, DatabaseError> {
    build_select(source_name, filter, key_present, |ts| ts)
}

/// SQLite stores timestamps as `YYYY-MM-DD HH:MM:SS` text, so bounds are bound
/// as naive UTC values to compare in the same shape.
pub(crate) fn sqlite_select<'a>(
    source_name: &str,
    filter: &FetchFilter,
    key_present: bool,
) -> Result<QueryBuilder<'a, Sqlite>, DatabaseError> {
    build_select(source_name, filter, key_present, |ts| ts.naive_utc())
}

/// PostgreSQL type name (sqlx or `udt_name` spelling) to column type.
pub(crate) fn pg_column_type(sql_type: &str) -> Option<ColumnType> {
    match sql_type.to_ascii_lowercase().as_str() {
        "int2" | "int4" | "int8" => Some(ColumnType::Integer),
        "float4" | "float8" => Some(ColumnType::Float),
        "numeric" => Some(ColumnType::Decimal),
        "bool" => Some(ColumnType::Boolean),
        "timestamp" | "timestamptz" | "date" => Some(ColumnType::Timestamp),
        "text" | "varchar" | "bpchar" | "name" | "citext" => Some(ColumnType::Text),
        _ => None,
    }
}

/// SQLite declared type to column type, following SQLite's affinity rules.
///
/// `None` means the declaration says nothing usable (no type, `NULL`, or a
/// blob) and the values decide.
pub(crate) fn sqlite_column_type(declared: &str) -> Option<ColumnType> {
    let declared = declared.to_ascii_lowercase();
    let has = |needle: &str| declared.contains(needle);
    if has("bool") {
        Some(ColumnType::Boolean)
    } else if has("date") || has("timestamp") {
        Some(ColumnType::Timestamp)
    } else if has("int") {
        Some(ColumnType::Integer)
    } else if has("char") || has("clob") || has("text") {
        Some(ColumnType::Text)
    } else if has("real") || has("floa") || has("doub") || has("numeric") || has("decimal") {
        Some(ColumnType::Float)
    } else {
        None
    }
}
