//! Relational sensor store.
//!
//! This module provides:
//! - [`TabularFetcher`] and [`SchemaCatalog`], the collaborator interfaces the
//!   run pipeline depends on
//! - [`SensorDatabase`], their sqlx implementation for PostgreSQL and SQLite
//!
//! Every source name and the ordering key are validated identifiers; filter
//! values are always bound parameters.

mod decode;
mod pool;
mod sql;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::DEFAULT_ORDERING_KEY;
use crate::error_handling::DatabaseError;
use crate::table::{Column, TabularSource};

pub use pool::SensorDatabase;
pub use sql::validate_identifier;

/// Row selection for one fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchFilter {
    /// Column the range and the limit apply to.
    pub ordering_key: String,
    /// Inclusive lower bound on the ordering key.
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the ordering key.
    pub end: Option<DateTime<Utc>>,
    /// Keep only the most recent rows.
    pub limit: Option<u32>,
}

impl Default for FetchFilter {
    fn default() -> Self {
        Self {
            ordering_key: DEFAULT_ORDERING_KEY.to_string(),
            start: None,
            end: None,
            limit: None,
        }
    }
}

/// Fetches typed rows from named sources.
#[async_trait]
pub trait TabularFetcher: Send + Sync {
    /// Rows of `source_name` matching `filter`, in ascending ordering-key order
    /// when the source has the key.
    async fn fetch(
        &self,
        source_name: &str,
        filter: &FetchFilter,
    ) -> Result<TabularSource, DatabaseError>;

    /// Runs a caller-supplied query as a single source.
    async fn fetch_query(&self, sql: &str) -> Result<TabularSource, DatabaseError>;
}

/// Schema discovery for `--list-sensors` and `--describe`.
#[async_trait]
pub trait SchemaCatalog: Send + Sync {
    async fn list_sources(&self) -> Result<Vec<String>, DatabaseError>;

    /// Columns of `source_name` in table order.
    async fn describe(&self, source_name: &str) -> Result<Vec<Column>, DatabaseError>;
}
