//! Export functionality.
//!
//! This module turns fetched sources into artifacts:
//! - [`ExportPlan`] / [`ExportMode`]: flag resolution, done once up front
//! - [`apply_mode`]: the Export Mode Engine (merge, separate, combined long)
//! - [`write_tables`]: per-format atomic serialization (CSV, JSONL, XLSX, BUFR, GRIB)

mod csv;
mod engine;
mod excel;
mod jsonl;
mod mode;
mod naming;
mod types;
mod writer;

pub use csv::write_csv;
pub use engine::{apply_mode, EngineOptions, EngineOutput, SOURCE_ID_COLUMN};
pub use excel::write_excel;
pub use jsonl::{to_json, write_jsonl};
pub use mode::{ExportMode, ExportPlan, LogPlan, PlanRequest, RelationalPlan};
pub use naming::artifact_file_name;
pub use types::{ArtifactKind, ExportFormat, ExportedTable};
pub use writer::{write_tables, Artifact, FormatFailure, WriteOptions, WriteOutcome};
