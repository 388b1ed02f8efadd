//! Application initialization and resource setup.
//!
//! This module provides functions to initialize the shared resources of one
//! invocation:
//! - the logger
//! - the HTTP client for the log store
//! - the relational database pool
//!
//! All initialization functions return proper error types for error handling.

mod client;
mod logger;

use std::time::Duration;

use log::info;

use crate::config::ExportConfig;
use crate::error_handling::{DatabaseError, InitializationError};
use crate::loki::LokiClient;
use crate::storage::SensorDatabase;

// Re-export public API
pub use client::init_client;
pub use logger::init_logger_with;

/// Connects to the relational store described by `config`.
pub async fn init_database(config: &ExportConfig) -> Result<SensorDatabase, DatabaseError> {
    SensorDatabase::connect(&config.database, Duration::from_secs(config.timeout_seconds)).await
}

/// Builds the log-store client for `config.loki_url`.
pub fn init_loki(config: &ExportConfig) -> anyhow::Result<LokiClient> {
    let http = init_client(Duration::from_secs(config.timeout_seconds))
        .map_err(InitializationError::from)?;
    let client = LokiClient::new(http, &config.loki_url)?;
    info!("Using Loki at {}", client.base_url());
    Ok(client)
}
