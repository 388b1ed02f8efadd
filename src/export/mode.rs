//! Export mode resolution.
//!
//! The CLI flags are resolved exactly once into an [`ExportPlan`] before
//! anything is fetched. Precedence is query override, then merge, then
//! separate, then the default combined-long mode; contradictory flags are a
//! [`ConfigError`].

use std::collections::HashSet;

use log::warn;

use crate::error_handling::ConfigError;

/// How several sensor tables are shaped into output tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportMode {
    /// One wide table, outer-merged on the ordering key.
    Merge,
    /// One unmodified table per source.
    Separate,
    /// Shared columns only, rows stacked, tagged with `source_id`.
    CombinedLong,
}

impl ExportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportMode::Merge => "merge",
            ExportMode::Separate => "separate",
            ExportMode::CombinedLong => "combined",
        }
    }

    /// Resolves the mode flags. Both set is a conflict; neither is combined-long.
    pub fn resolve(merge: bool, separate: bool) -> Result<Self, ConfigError> {
        match (merge, separate) {
            (true, true) => Err(ConfigError::ConflictingModes {
                first: "merge",
                second: "separate",
            }),
            (true, false) => Ok(ExportMode::Merge),
            (false, true) => Ok(ExportMode::Separate),
            (false, false) => Ok(ExportMode::CombinedLong),
        }
    }
}

impl std::fmt::Display for ExportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relational part of an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationalPlan {
    /// Named sensor tables shaped by a mode.
    Sensors {
        sources: Vec<String>,
        mode: ExportMode,
    },
    /// A caller-supplied query, exported as a single table.
    Query { sql: String },
}

/// Log-store part of an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogPlan {
    Logs { query: String, limit: u32 },
    Metrics { query: String, step: String },
}

/// Raw selection flags, before resolution.
#[derive(Debug, Clone, Default)]
pub struct PlanRequest {
    pub sensors: Vec<String>,
    pub query: Option<String>,
    pub merge: bool,
    pub separate: bool,
    pub loki_query: Option<String>,
    pub loki_metrics: Option<String>,
    pub loki_limit: u32,
    pub loki_step: String,
}

/// Everything one invocation exports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPlan {
    pub relational: Option<RelationalPlan>,
    pub logs: Option<LogPlan>,
}

impl ExportPlan {
    /// Resolves the request, failing on contradictory or empty selections.
    pub fn resolve(request: &PlanRequest) -> Result<Self, ConfigError> {
        let query = request
            .query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty());

        let relational = match query {
            Some(sql) => {
                if request.merge {
                    return Err(ConfigError::ModeWithQuery { flag: "merge" });
                }
                if request.separate {
                    return Err(ConfigError::ModeWithQuery { flag: "separate" });
                }
                if !request.sensors.is_empty() {
                    warn!(
                        "Both --query and --sensors were given; exporting the query and ignoring {} sensor(s)",
                        request.sensors.len()
                    );
                }
                Some(RelationalPlan::Query {
                    sql: sql.to_string(),
                })
            }
            None if request.sensors.is_empty() => {
                if request.merge || request.separate {
                    ExportMode::resolve(request.merge, request.separate)?;
                }
                None
            }
            None => Some(RelationalPlan::Sensors {
                sources: validate_sources(&request.sensors)?,
                mode: ExportMode::resolve(request.merge, request.separate)?,
            }),
        };

        let logs = match (&request.loki_query, &request.loki_metrics) {
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingLokiQueries),
            (Some(query), None) => Some(LogPlan::Logs {
                query: query.clone(),
                limit: request.loki_limit,
            }),
            (None, Some(query)) => Some(LogPlan::Metrics {
                query: query.clone(),
                step: request.loki_step.clone(),
            }),
            (None, None) => None,
        };

        if relational.is_none() && logs.is_none() {
            return Err(ConfigError::NothingToExport);
        }
        Ok(Self { relational, logs })
    }
}

/// Splits comma-separated entries, trims them, rejects empty and repeated names.
fn validate_sources(raw: &[String]) -> Result<Vec<String>, ConfigError> {
    let mut seen = HashSet::new();
    let mut sources = Vec::new();
    for name in raw.iter().flat_map(|entry| entry.split(',')) {
        let name = name.trim();
        if name.is_empty() {
            return Err(ConfigError::EmptySourceName);
        }
        if !seen.insert(name.to_string()) {
            return Err(ConfigError::DuplicateSource(name.to_string()));
        }
        sources.push(name.to_string());
    }
    Ok(sources)
}
