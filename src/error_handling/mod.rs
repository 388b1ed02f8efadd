//! Error handling.
//!
//! This module provides:
//! - One `thiserror` enum per layer (configuration, engine, table, codec,
//!   relational store, log store, initialization)
//! - [`ErrorKind`], the layer-independent taxonomy printed in reports
//! - [`classify`], which maps an `anyhow` chain back onto an [`ErrorKind`]
//!
//! Kinds are split into:
//! - **Fatal**: abort the export (or, for codec failures, only the affected format)
//! - **Non-fatal**: recorded and reported (`EmptyResult`, non-strict `TypeConflict`)

mod types;

// Re-export public API
pub use types::{
    classify, CodecError, ConfigError, DatabaseError, ErrorKind, ExportError,
    InitializationError, LokiError, TableError,
};
