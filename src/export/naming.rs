//! Deterministic artifact names.
//!
//! `{kind}[_{sources}][_{YYYYmmdd_HHMMSS}].{ext}`: the kind encodes the export
//! mode, the sources segment the contributing source names, and the optional
//! timestamp keeps repeated exports apart.

use chrono::{DateTime, Utc};

use crate::export::types::{ArtifactKind, ExportFormat};

/// Source lists longer than this are abbreviated.
const MAX_LISTED_SOURCES: usize = 3;

/// Keeps `[A-Za-z0-9_-]`, maps everything else to `_`.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn sources_segment(sources: &[String]) -> Option<String> {
    let cleaned: Vec<String> = sources.iter().map(|s| sanitize(s)).collect();
    match cleaned.len() {
        0 => None,
        n if n <= MAX_LISTED_SOURCES => Some(cleaned.join("-")),
        n => Some(format!(
            "{}-{}-and-{}-more",
            cleaned[0],
            cleaned[1],
            n - 2
        )),
    }
}

/// Builds the file name for one artifact.
pub fn artifact_file_name(
    kind: ArtifactKind,
    sources: &[String],
    format: ExportFormat,
    stamp: Option<DateTime<Utc>>,
) -> String {
    let mut name = kind.as_str().to_string();
    if let Some(segment) = sources_segment(sources) {
        name.push('_');
        name.push_str(&segment);
    }
    if let Some(stamp) = stamp {
        name.push('_');
        name.push_str(&stamp.format("%Y%m%d_%H%M%S").to_string());
    }
    name.push('.');
    name.push_str(format.extension());
    name
}
