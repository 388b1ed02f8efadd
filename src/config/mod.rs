//! Application configuration and constants.
//!
//! This module provides:
//! - Configuration constants (defaults, limits, file and variable names)
//! - CLI option types and parsing
//! - The library-level [`ExportConfig`]
//! - Database credential resolution

mod constants;
mod credentials;
mod types;

// Re-export all constants
pub use constants::*;
pub use credentials::{CredentialSource, DbCredentials};
pub use types::{parse_timestamp, DatabaseConfig, ExportConfig, LogFormat, LogLevel, Opt};
