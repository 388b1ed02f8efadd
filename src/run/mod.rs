//! The export pipeline.
//!
//! One invocation resolves its plan, fetches every source (concurrently),
//! shapes the relational sources through the Export Mode Engine, converts any
//! log-store result, and only then writes. A fatal error anywhere before the
//! write step leaves the output directory untouched.

use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use log::{info, warn};

use crate::config::{ExportConfig, LABEL_PREVIEW_LABELS, LABEL_PREVIEW_VALUES};
use crate::export::{
    apply_mode, write_tables, Artifact, ArtifactKind, ExportPlan, ExportedTable, FormatFailure,
    LogPlan, RelationalPlan,
};
use crate::initialization::{init_database, init_loki};
use crate::loki::{logs_to_table, metrics_to_table, LogStore, TimeRange};
use crate::reconcile::TypeConflict;
use crate::storage::{FetchFilter, SchemaCatalog, TabularFetcher};
use crate::table::{Column, TableOrigin, TabularSource};

/// Results of an export run.
#[derive(Debug, Clone, Default)]
pub struct ExportReport {
    /// Files that were written.
    pub artifacts: Vec<Artifact>,
    /// (table, format) pairs that could not be written.
    pub failures: Vec<FormatFailure>,
    /// Number of tables handed to the writer.
    pub tables: usize,
    /// Rows across those tables.
    pub rows: usize,
    /// Type conflicts that were coerced.
    pub type_conflicts: Vec<TypeConflict>,
    /// Rows left out of a merge because their ordering key was null.
    pub dropped_null_keys: usize,
    /// Rows replaced by a later row with the same key in a merge.
    pub duplicate_keys: usize,
    pub elapsed_seconds: f64,
}

impl ExportReport {
    /// True when every requested artifact was written.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs an export with the provided configuration.
///
/// The plan is resolved before anything is contacted; the database and the
/// log store are only connected when the plan needs them.
///
/// # Errors
///
/// Returns an error for contradictory options, connection or fetch failures
/// and fatal engine errors (missing ordering key, no common columns, strict
/// type conflicts). Per-format write failures are reported in
/// [`ExportReport::failures`] instead.
///
/// # Example
///
/// ```no_run
/// use sensor_export::{run_export, ExportConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ExportConfig {
///     sensors: vec!["rain,wind".to_string()],
///     merge: true,
///     ..Default::default()
/// };
/// let report = run_export(config).await?;
/// println!("Wrote {} artifact(s)", report.artifacts.len());
/// # Ok(())
/// # }
/// ```
pub async fn run_export(config: ExportConfig) -> Result<ExportReport> {
    let plan = config.plan()?;

    let database = match plan.relational {
        Some(_) => Some(
            init_database(&config)
                .await
                .context("Failed to connect to the sensor database")?,
        ),
        None => None,
    };
    let loki = match plan.logs {
        Some(_) => Some(init_loki(&config)?),
        None => None,
    };

    export_with(
        &config,
        &plan,
        database.as_ref().map(|db| db as &dyn TabularFetcher),
        loki.as_ref().map(|client| client as &dyn LogStore),
    )
    .await
}

/// Runs a resolved plan against the given collaborators.
pub async fn export_with(
    config: &ExportConfig,
    plan: &ExportPlan,
    fetcher: Option<&dyn TabularFetcher>,
    log_store: Option<&dyn LogStore>,
) -> Result<ExportReport> {
    let start_time = Instant::now();
    let write_options = config.write_options(Utc::now());
    let mut report = ExportReport::default();
    let mut tables = Vec::new();

    if let Some(relational) = &plan.relational {
        let fetcher =
            fetcher.ok_or_else(|| anyhow!("A relational export needs a database connection"))?;
        match relational {
            RelationalPlan::Sensors { sources, mode } => {
                let fetched = fetch_sources(fetcher, sources, &fetch_filter(config)).await?;
                let output = apply_mode(*mode, &fetched, &config.engine_options())?;
                report.type_conflicts = output.type_conflicts;
                report.dropped_null_keys = output.dropped_null_keys;
                report.duplicate_keys = output.duplicate_keys;
                tables.extend(output.tables);
            }
            RelationalPlan::Query { sql } => {
                let source = fetcher
                    .fetch_query(sql)
                    .await
                    .context("Custom query failed")?;
                if source.table().is_empty() {
                    warn!("Empty result: the query returned no rows");
                }
                tables.push(ExportedTable::passthrough(ArtifactKind::Query, source));
            }
        }
    }

    if let Some(log_plan) = &plan.logs {
        let store =
            log_store.ok_or_else(|| anyhow!("A log-store export needs a Loki client"))?;
        let range = TimeRange::new(config.start_time, config.end_time);
        tables.push(fetch_log_table(store, log_plan, &range).await?);
    }

    report.tables = tables.len();
    report.rows = tables.iter().map(|t| t.table.row_count()).sum();

    let outcome = write_tables(&tables, &config.formats, &write_options);
    for (format, target) in &outcome.skipped {
        info!("Skipped {} for {}", format, target);
    }
    report.artifacts = outcome.artifacts;
    report.failures = outcome.failures;
    report.elapsed_seconds = start_time.elapsed().as_secs_f64();

    info!(
        "Export finished in {:.2}s: {} artifact(s), {} failure(s)",
        report.elapsed_seconds,
        report.artifacts.len(),
        report.failures.len()
    );
    Ok(report)
}

fn fetch_filter(config: &ExportConfig) -> FetchFilter {
    FetchFilter {
        ordering_key: config.ordering_key.clone(),
        start: config.start_time,
        end: config.end_time,
        limit: config.limit,
    }
}

/// Fetches every source concurrently; results come back in request order.
pub async fn fetch_sources(
    fetcher: &dyn TabularFetcher,
    names: &[String],
    filter: &FetchFilter,
) -> Result<Vec<TabularSource>> {
    let mut tasks = names
        .iter()
        .enumerate()
        .map(|(index, name)| async move { (index, name, fetcher.fetch(name, filter).await) })
        .collect::<FuturesUnordered<_>>();

    let mut fetched: Vec<Option<TabularSource>> = vec![None; names.len()];
    while let Some((index, name, result)) = tasks.next().await {
        let source =
            result.with_context(|| format!("Failed to fetch sensor '{}'", name))?;
        info!(
            "Fetched {} row(s) from '{}'",
            source.table().row_count(),
            name
        );
        fetched[index] = Some(source);
    }
    Ok(fetched.into_iter().flatten().collect())
}

/// Runs the log-store part of a plan and converts the result to a table.
pub async fn fetch_log_table(
    store: &dyn LogStore,
    plan: &LogPlan,
    range: &TimeRange,
) -> Result<ExportedTable> {
    let (kind, name, table) = match plan {
        LogPlan::Logs { query, limit } => {
            let records = store
                .query_logs(query, range, *limit)
                .await
                .context("Loki log query failed")?;
            (ArtifactKind::LokiLogs, "loki_logs", logs_to_table(&records)?)
        }
        LogPlan::Metrics { query, step } => {
            let samples = store
                .query_metrics(query, range, step)
                .await
                .context("Loki metric query failed")?;
            (
                ArtifactKind::LokiMetrics,
                "loki_metrics",
                metrics_to_table(&samples)?,
            )
        }
    };
    if table.is_empty() {
        warn!("Empty result: Loki returned no data for the query");
    } else {
        info!("Loki returned {} record(s)", table.row_count());
    }
    let source = TabularSource::new(name, table).with_origin(TableOrigin::LogStream);
    Ok(ExportedTable::passthrough(kind, source))
}

/// What `--loki-labels` shows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelPreview {
    pub labels: Vec<String>,
    /// Sample values for the first few labels.
    pub values: Vec<(String, Vec<String>)>,
}

/// Checks readiness, then lists labels and a sample of their values.
///
/// A label whose values cannot be fetched is left out of the sample.
pub async fn preview_labels(store: &dyn LogStore) -> Result<LabelPreview> {
    store.ready().await.context("Loki is not ready")?;
    let labels = store.labels().await.context("Failed to list Loki labels")?;

    let mut values = Vec::new();
    for label in labels.iter().take(LABEL_PREVIEW_LABELS) {
        match store.label_values(label).await {
            Ok(mut sample) => {
                sample.truncate(LABEL_PREVIEW_VALUES);
                values.push((label.clone(), sample));
            }
            Err(e) => warn!("Could not fetch values of label '{}': {}", label, e),
        }
    }
    Ok(LabelPreview { labels, values })
}

/// Names of the exportable sources.
pub async fn list_sensors(config: &ExportConfig) -> Result<Vec<String>> {
    let database = init_database(config)
        .await
        .context("Failed to connect to the sensor database")?;
    let names = database
        .list_sources()
        .await
        .context("Failed to list sensors")?;
    Ok(names)
}

/// Columns of one source, in ordinal order.
pub async fn describe_sensor(config: &ExportConfig, name: &str) -> Result<Vec<Column>> {
    let database = init_database(config)
        .await
        .context("Failed to connect to the sensor database")?;
    let columns = database
        .describe(name)
        .await
        .with_context(|| format!("Failed to describe sensor '{}'", name))?;
    Ok(columns)
}

/// Connects to Loki and runs [`preview_labels`].
pub async fn loki_labels(config: &ExportConfig) -> Result<LabelPreview> {
    let client = init_loki(config)?;
    preview_labels(&client).await
}
