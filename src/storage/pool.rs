//! Database connection management.
//!
//! [`SensorDatabase`] wraps one sqlx pool per supported backend and implements
//! the fetch and schema-discovery interfaces over either of them.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Executor, PgPool, SqlitePool, Statement};

use crate::config::{DatabaseConfig, DB_MAX_CONNECTIONS, QUERY_SOURCE_NAME};
use crate::error_handling::DatabaseError;
use crate::storage::decode::{column_meta, pg_table, sqlite_table};
use crate::storage::sql::{
    pg_column_type, pg_select, sqlite_column_type, sqlite_select, validate_identifier,
    PG_DESCRIBE, PG_LIST_SOURCES, SQLITE_DESCRIBE, SQLITE_LIST_SOURCES,
};
use crate::storage::{FetchFilter, SchemaCatalog, TabularFetcher};
use crate::table::{CanonicalTable, Column, ColumnType, TabularSource};

/// A connected relational sensor store.
#[derive(Clone, Debug)]
pub enum SensorDatabase {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

/// Scheme of a connection URL, without credentials.
fn redact(url: &str) -> String {
    match url.split_once(':') {
        Some((scheme, _)) => format!("{}:...", scheme),
        None => "<no scheme>".to_string(),
    }
}

impl SensorDatabase {
    /// Connects from an explicit URL, or to PostgreSQL from the individual fields.
    pub async fn connect(config: &DatabaseConfig, timeout: Duration) -> Result<Self, DatabaseError> {
        match config.url.as_deref() {
            Some(url) if url.starts_with("sqlite:") => {
                // Every connection to an in-memory database is a different database.
                let max = if url.contains(":memory:") || url.contains("mode=memory") {
                    1
                } else {
                    DB_MAX_CONNECTIONS
                };
                let pool = SqlitePoolOptions::new()
                    .max_connections(max)
                    .acquire_timeout(timeout)
                    .connect(url)
                    .await?;
                info!("Connected to SQLite database");
                Ok(SensorDatabase::Sqlite(pool))
            }
            Some(url) if url.starts_with("postgres://") || url.starts_with("postgresql://") => {
                let pool = PgPoolOptions::new()
                    .max_connections(DB_MAX_CONNECTIONS)
                    .acquire_timeout(timeout)
                    .connect(url)
                    .await?;
                info!("Connected to PostgreSQL database");
                Ok(SensorDatabase::Postgres(pool))
            }
            Some(url) => Err(DatabaseError::UnsupportedUrl(redact(url))),
            None => {
                let mut options = PgConnectOptions::new()
                    .host(&config.host)
                    .port(config.port)
                    .database(&config.dbname);
                if let Some(user) = &config.credentials.user {
                    options = options.username(user);
                }
                if let Some(password) = &config.credentials.password {
                    options = options.password(password);
                }
                let pool = PgPoolOptions::new()
                    .max_connections(DB_MAX_CONNECTIONS)
                    .acquire_timeout(timeout)
                    .connect_with(options)
                    .await?;
                info!(
                    "Connected to PostgreSQL database '{}' on {}:{}",
                    config.dbname, config.host, config.port
                );
                Ok(SensorDatabase::Postgres(pool))
            }
        }
    }

    pub fn backend(&self) -> &'static str {
        match self {
            SensorDatabase::Postgres(_) => "postgresql",
            SensorDatabase::Sqlite(_) => "sqlite",
        }
    }

    async fn run_select(
        &self,
        source_name: &str,
        filter: &FetchFilter,
        key_present: bool,
    ) -> Result<CanonicalTable, DatabaseError> {
        match self {
            SensorDatabase::Postgres(pool) => {
                let mut builder = pg_select(source_name, filter, key_present)?;
                let meta = column_meta(pool.prepare(builder.sql()).await?.columns());
                let rows = builder.build().fetch_all(pool).await?;
                pg_table(source_name, &meta, &rows)
            }
            SensorDatabase::Sqlite(pool) => {
                let mut builder = sqlite_select(source_name, filter, key_present)?;
                let meta = column_meta(pool.prepare(builder.sql()).await?.columns());
                let rows = builder.build().fetch_all(pool).await?;
                sqlite_table(source_name, &meta, &rows)
            }
        }
    }
}

#[async_trait]
impl SchemaCatalog for SensorDatabase {
    async fn list_sources(&self) -> Result<Vec<String>, DatabaseError> {
        let names = match self {
            SensorDatabase::Postgres(pool) => {
                sqlx::query_scalar::<_, String>(PG_LIST_SOURCES)
                    .fetch_all(pool)
                    .await?
            }
            SensorDatabase::Sqlite(pool) => {
                sqlx::query_scalar::<_, String>(SQLITE_LIST_SOURCES)
                    .fetch_all(pool)
                    .await?
            }
        };
        Ok(names)
    }

    async fn describe(&self, source_name: &str) -> Result<Vec<Column>, DatabaseError> {
        validate_identifier(source_name)?;
        let described: Vec<(String, String)> = match self {
            SensorDatabase::Postgres(pool) => {
                sqlx::query_as(PG_DESCRIBE)
                    .bind(source_name)
                    .fetch_all(pool)
                    .await?
            }
            SensorDatabase::Sqlite(pool) => {
                sqlx::query_as(SQLITE_DESCRIBE)
                    .bind(source_name)
                    .fetch_all(pool)
                    .await?
            }
        };
        if described.is_empty() {
            return Err(DatabaseError::UnknownSource(source_name.to_string()));
        }

        described
            .into_iter()
            .map(|(name, sql_type)| {
                let column_type = match self {
                    SensorDatabase::Postgres(_) => pg_column_type(&sql_type),
                    // Untyped SQLite columns hold whatever was stored; report them as text.
                    SensorDatabase::Sqlite(_) if sql_type.trim().is_empty() => Some(ColumnType::Text),
                    SensorDatabase::Sqlite(_) => sqlite_column_type(&sql_type),
                };
                column_type
                    .map(|t| Column::new(name.clone(), t))
                    .ok_or_else(|| DatabaseError::UnsupportedColumnType {
                        source_name: source_name.to_string(),
                        column: name,
                        sql_type,
                    })
            })
            .collect()
    }
}

#[async_trait]
impl TabularFetcher for SensorDatabase {
    async fn fetch(
        &self,
        source_name: &str,
        filter: &FetchFilter,
    ) -> Result<TabularSource, DatabaseError> {
        let columns = self.describe(source_name).await?;
        let key_present = columns.iter().any(|c| c.name == filter.ordering_key);
        if !key_present && (filter.start.is_some() || filter.end.is_some()) {
            warn!(
                "Sensor '{}' has no '{}' column; ignoring the time range",
                source_name, filter.ordering_key
            );
        }

        let mut table = self.run_select(source_name, filter, key_present).await?;
        if key_present && filter.limit.is_some() {
            table.reverse_rows();
        }
        debug!(
            "Fetched {} row(s) x {} column(s) from '{}' ({})",
            table.row_count(),
            table.column_count(),
            source_name,
            self.backend()
        );
        Ok(TabularSource::new(source_name, table))
    }

    async fn fetch_query(&self, sql: &str) -> Result<TabularSource, DatabaseError> {
        let table = match self {
            SensorDatabase::Postgres(pool) => {
                let meta = column_meta(pool.prepare(sql).await?.columns());
                let rows = sqlx::query(sql).fetch_all(pool).await?;
                pg_table(QUERY_SOURCE_NAME, &meta, &rows)?
            }
            SensorDatabase::Sqlite(pool) => {
                let meta = column_meta(pool.prepare(sql).await?.columns());
                let rows = sqlx::query(sql).fetch_all(pool).await?;
                sqlite_table(QUERY_SOURCE_NAME, &meta, &rows)?
            }
        };
        debug!("Custom query returned {} row(s)", table.row_count());
        Ok(TabularSource::new(QUERY_SOURCE_NAME, table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_drops_credentials() {
        assert_eq!(redact("mysql://root:pw@db/sensors"), "mysql:...");
        assert_eq!(redact("nothing"), "<no scheme>");
    }

    #[tokio::test]
    async fn test_unsupported_url_is_rejected_before_connecting() {
        let config = DatabaseConfig {
            url: Some("mysql://root:pw@localhost/sensors".to_string()),
            ..Default::default()
        };
        let err = SensorDatabase::connect(&config, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::UnsupportedUrl(_)));
        assert!(!err.to_string().contains("pw"));
    }
}
