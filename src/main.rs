//! Main application entry point (CLI binary).
//!
//! This is a thin wrapper around the `sensor_export` library that handles:
//! - Command-line argument parsing
//! - Environment variable loading (.env file)
//! - Logger initialization
//! - User-facing output formatting
//!
//! All core functionality is implemented in the library crate.

use anyhow::{Context, Result};
use clap::Parser;
use std::process;

use sensor_export::initialization::init_logger_with;
use sensor_export::{
    classify, describe_sensor, list_sensors, loki_labels, run_export, ExportConfig, Opt,
};

fn fail(e: anyhow::Error) -> ! {
    eprintln!("sensor_export error ({}): {:#}", classify(&e), e);
    process::exit(1);
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load DB_USER / DB_PASSWORD from .env in the current directory, or next to the executable
    if dotenvy::dotenv().is_err() {
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                let env_path = exe_dir.join(".env");
                if env_path.exists() {
                    let _ = dotenvy::from_path(&env_path);
                }
            }
        }
    }

    let opt = Opt::parse();

    let log_level = opt.log_level.clone();
    let log_format = opt.log_format.clone();
    init_logger_with(log_level.into(), log_format).context("Failed to initialize logger")?;

    let config = ExportConfig::from(&opt);

    if opt.loki_labels {
        match loki_labels(&config).await {
            Ok(preview) => {
                println!("✅ Loki connection successful!");
                println!("📊 Available labels: {}", preview.labels.join(", "));
                for (label, values) in &preview.values {
                    println!("  {}: {}", label, values.join(", "));
                }
                return Ok(());
            }
            Err(e) => fail(e),
        }
    }

    if opt.list_sensors {
        match list_sensors(&config).await {
            Ok(names) => {
                for name in names {
                    println!("{}", name);
                }
                return Ok(());
            }
            Err(e) => fail(e),
        }
    }

    if let Some(name) = &opt.describe {
        match describe_sensor(&config, name).await {
            Ok(columns) => {
                for column in columns {
                    println!("{}\t{}", column.name, column.column_type);
                }
                return Ok(());
            }
            Err(e) => fail(e),
        }
    }

    match run_export(config).await {
        Ok(report) => {
            for artifact in &report.artifacts {
                println!(
                    "✅ Wrote {} ({} row{})",
                    artifact.path.display(),
                    artifact.rows,
                    if artifact.rows == 1 { "" } else { "s" }
                );
            }
            for failure in &report.failures {
                eprintln!(
                    "❌ Failed to write {} ({}): {}",
                    failure.target, failure.kind, failure.message
                );
            }
            println!(
                "Exported {} table{} ({} rows) to {} file{} in {:.1}s",
                report.tables,
                if report.tables == 1 { "" } else { "s" },
                report.rows,
                report.artifacts.len(),
                if report.artifacts.len() == 1 { "" } else { "s" },
                report.elapsed_seconds
            );
            if !report.type_conflicts.is_empty() {
                println!(
                    "{} type conflict(s) coerced; use --strict-types to reject them",
                    report.type_conflicts.len()
                );
            }
            if report.dropped_null_keys > 0 {
                println!(
                    "{} row(s) without an ordering key were left out of the merge",
                    report.dropped_null_keys
                );
            }
            if !report.is_success() {
                process::exit(1);
            }
            Ok(())
        }
        Err(e) => fail(e),
    }
}
