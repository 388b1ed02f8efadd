//! Configuration constants.
//!
//! Defaults shared by the CLI, the library configuration and the collaborators.

/// Column used to align rows across sources unless `--ordering-key` says otherwise.
pub const DEFAULT_ORDERING_KEY: &str = "timestamp";

/// Directory artifacts are written to.
pub const DEFAULT_OUT_DIR: &str = ".";

/// Source name used for the table produced by `--query`.
pub const QUERY_SOURCE_NAME: &str = "query";

// Relational store
pub const DEFAULT_DB_HOST: &str = "localhost";
pub const DEFAULT_DB_PORT: u16 = 5432;
pub const DEFAULT_DB_NAME: &str = "sensors";
/// Upper bound on pooled connections; sources are fetched concurrently.
pub const DB_MAX_CONNECTIONS: u32 = 5;

// Credential resolution
pub const DEFAULT_SECRETS_DIR: &str = "secrets";
pub const DB_USER_FILE: &str = "db_user.txt";
pub const DB_PASSWORD_FILE: &str = "db_password.txt";
pub const DB_USER_ENV: &str = "DB_USER";
pub const DB_PASSWORD_ENV: &str = "DB_PASSWORD";

// Log store
pub const DEFAULT_LOKI_URL: &str = "http://localhost:3100";
/// Maximum log lines per `--loki-query`.
pub const DEFAULT_LOKI_LIMIT: u32 = 1000;
/// Resolution of `--loki-metrics` range queries.
pub const DEFAULT_LOKI_STEP: &str = "1m";
/// `--loki-labels` prints values for this many labels...
pub const LABEL_PREVIEW_LABELS: usize = 5;
/// ...and at most this many values each.
pub const LABEL_PREVIEW_VALUES: usize = 10;
/// Longest error body kept from a failed Loki response.
pub const MAX_ERROR_BODY_CHARS: usize = 500;

/// Per-request timeout for the collaborators, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
