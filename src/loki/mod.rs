//! Log-store collaborator.
//!
//! [`LokiClient`] talks to the Loki HTTP API; [`logs_to_table`] and
//! [`metrics_to_table`] turn its results into Canonical Tables.

mod adapter;
mod client;
mod types;

pub use adapter::{logs_to_table, metrics_to_table, LINE_COLUMN, TIMESTAMP_COLUMN, VALUE_COLUMN};
pub use client::{LogStore, LokiClient};
pub use types::{LogRecord, MetricSample, TimeRange};
