//! Export Mode Engine.
//!
//! Applies one [`ExportMode`] to a set of reconciled sources and yields the
//! Canonical Table(s) handed to the sinks:
//! - **Merge**: non-key columns renamed `{source}_{column}`, then outer-merged
//!   on the ordering key
//! - **Separate**: every source passed through untouched
//! - **Combined long**: shared columns only, rows stacked and tagged with
//!   a provenance column
//!
//! Type conflicts are recorded and coerced to the widest common type unless
//! strict mode turns them into errors.

use std::collections::{HashMap, HashSet};

use log::{info, warn};

use crate::error_handling::ExportError;
use crate::export::mode::ExportMode;
use crate::export::types::{ArtifactKind, ExportedTable};
use crate::merge::{merge_on_key, MergeInput};
use crate::reconcile::{reconcile, Reconciliation, TypeConflict};
use crate::table::{CanonicalTable, Column, ColumnType, TableOrigin, TabularSource, Value};

/// Name of the provenance column added in combined-long mode.
pub const SOURCE_ID_COLUMN: &str = "source_id";

/// Knobs the engine honours.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Column sources are aligned on.
    pub ordering_key: String,
    /// Treat type conflicts as fatal.
    pub strict_types: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            ordering_key: crate::config::DEFAULT_ORDERING_KEY.to_string(),
            strict_types: false,
        }
    }
}

/// Tables produced by one mode, plus what was noticed on the way.
#[derive(Debug, Clone, Default)]
pub struct EngineOutput {
    pub tables: Vec<ExportedTable>,
    /// Conflicts that were coerced (never populated in strict mode).
    pub type_conflicts: Vec<TypeConflict>,
    /// Rows dropped from a merge because their ordering key was null.
    pub dropped_null_keys: usize,
    /// Rows superseded by a later row with the same key in a merge.
    pub duplicate_keys: usize,
}

impl EngineOutput {
    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|t| t.table.row_count()).sum()
    }
}

/// Shapes `sources` according to `mode`.
///
/// An empty source set yields a single empty table in every mode.
pub fn apply_mode(
    mode: ExportMode,
    sources: &[TabularSource],
    options: &EngineOptions,
) -> Result<EngineOutput, ExportError> {
    let output = if sources.is_empty() {
        warn!("No sources to export; producing an empty table");
        EngineOutput {
            tables: vec![ExportedTable {
                kind: artifact_kind(mode),
                sources: Vec::new(),
                table: CanonicalTable::empty(Vec::new())?,
                origin: TableOrigin::Sensor,
            }],
            ..Default::default()
        }
    } else {
        let reconciliation = reconcile(sources);
        match mode {
            ExportMode::Merge => merge_wide(sources, &reconciliation, options)?,
            ExportMode::Separate => separate(sources),
            ExportMode::CombinedLong => combine_long(sources, &reconciliation, options)?,
        }
    };

    if output.total_rows() == 0 {
        warn!(
            "Empty result: {} mode produced no rows; writing empty artifact(s)",
            mode
        );
    }
    info!(
        "{} mode produced {} table(s), {} row(s)",
        mode,
        output.tables.len(),
        output.total_rows()
    );
    Ok(output)
}

fn artifact_kind(mode: ExportMode) -> ArtifactKind {
    match mode {
        ExportMode::Merge => ArtifactKind::Merged,
        ExportMode::Separate => ArtifactKind::Separate,
        ExportMode::CombinedLong => ArtifactKind::Combined,
    }
}

fn source_names(sources: &[TabularSource]) -> Vec<String> {
    sources.iter().map(|s| s.name().to_string()).collect()
}

/// Records a conflict, or fails with it in strict mode.
fn admit_conflict(
    conflict: &TypeConflict,
    options: &EngineOptions,
    admitted: &mut Vec<TypeConflict>,
) -> Result<(), ExportError> {
    if options.strict_types {
        return Err(ExportError::TypeConflict {
            column: conflict.column.clone(),
            detail: conflict.describe(),
        });
    }
    warn!(
        "Type conflict on column '{}' ({}); coercing values to {}",
        conflict.column,
        conflict.describe(),
        conflict.resolved
    );
    admitted.push(conflict.clone());
    Ok(())
}

fn merge_wide(
    sources: &[TabularSource],
    reconciliation: &Reconciliation,
    options: &EngineOptions,
) -> Result<EngineOutput, ExportError> {
    let key = options.ordering_key.as_str();

    let mut inputs = Vec::with_capacity(sources.len());
    for source in sources {
        let key_index =
            source
                .table()
                .column_index(key)
                .ok_or_else(|| ExportError::MissingOrderingKey {
                    source_name: source.name().to_string(),
                    key: key.to_string(),
                })?;
        inputs.push(MergeInput { source, key_index });
    }

    let mut type_conflicts = Vec::new();
    if let Some(conflict) = reconciliation.conflict_for(key) {
        admit_conflict(conflict, options, &mut type_conflicts)?;
    }
    let key_type = reconciliation
        .resolved_type(key)
        .unwrap_or(ColumnType::Text);

    let mut columns = vec![Column::new(key, key_type)];
    // Output column name -> source that produced it; the key belongs to the first source.
    let mut owners: HashMap<String, &str> = HashMap::new();
    if let Some(first) = sources.first() {
        owners.insert(key.to_string(), first.name());
    }
    for source in sources {
        for column in source.table().columns().iter().filter(|c| c.name != key) {
            let name = format!("{}_{}", source.name(), column.name);
            if let Some(owner) = owners.get(&name) {
                return Err(ExportError::DuplicateOutputColumn {
                    column: name,
                    first_source: owner.to_string(),
                    second_source: source.name().to_string(),
                });
            }
            owners.insert(name.clone(), source.name());
            columns.push(Column::new(name, column.column_type));
        }
    }

    let merged = merge_on_key(&inputs, key_type);
    if merged.null_keys > 0 {
        warn!(
            "Dropped {} row(s) with a null '{}' from the merge",
            merged.null_keys, key
        );
    }

    let table = CanonicalTable::try_new(columns, merged.rows)?;
    Ok(EngineOutput {
        tables: vec![ExportedTable {
            kind: ArtifactKind::Merged,
            sources: source_names(sources),
            table,
            origin: TableOrigin::Sensor,
        }],
        type_conflicts,
        dropped_null_keys: merged.null_keys,
        duplicate_keys: merged.duplicate_keys,
    })
}

fn separate(sources: &[TabularSource]) -> EngineOutput {
    EngineOutput {
        tables: sources
            .iter()
            .cloned()
            .map(|source| ExportedTable::passthrough(ArtifactKind::Separate, source))
            .collect(),
        ..Default::default()
    }
}

fn combine_long(
    sources: &[TabularSource],
    reconciliation: &Reconciliation,
    options: &EngineOptions,
) -> Result<EngineOutput, ExportError> {
    let key = options.ordering_key.as_str();
    let shared = reconciliation.intersection();
    let has_value_column = shared.iter().any(|c| c != key);
    if !reconciliation.in_every_source(key) || !has_value_column {
        return Err(ExportError::NoCommonColumns {
            sources: source_names(sources),
            key: key.to_string(),
        });
    }

    let mut type_conflicts = Vec::new();
    for name in shared {
        if let Some(conflict) = reconciliation.conflict_for(name) {
            admit_conflict(conflict, options, &mut type_conflicts)?;
        }
    }

    let mut columns: Vec<Column> = shared
        .iter()
        .map(|name| {
            let column_type = reconciliation
                .resolved_type(name)
                .unwrap_or(ColumnType::Text);
            Column::new(name.as_str(), column_type)
        })
        .collect();
    let provenance = unique_column_name(SOURCE_ID_COLUMN, shared);
    columns.push(Column::new(provenance, ColumnType::Text));

    let total: usize = sources.iter().map(|s| s.table().row_count()).sum();
    let mut rows = Vec::with_capacity(total);
    for source in sources {
        let picks: Vec<(usize, ColumnType)> = columns[..shared.len()]
            .iter()
            .filter_map(|c| {
                source
                    .table()
                    .column_index(&c.name)
                    .map(|i| (i, c.column_type))
            })
            .collect();
        for row in source.table().rows() {
            let mut out: Vec<Value> = picks
                .iter()
                .map(|(i, ty)| row[*i].coerce_to(*ty))
                .collect();
            out.push(Value::Text(source.name().to_string()));
            rows.push(out);
        }
    }

    let table = CanonicalTable::try_new(columns, rows)?;
    Ok(EngineOutput {
        tables: vec![ExportedTable {
            kind: ArtifactKind::Combined,
            sources: source_names(sources),
            table,
            origin: TableOrigin::Sensor,
        }],
        type_conflicts,
        ..Default::default()
    })
}

/// `base`, or `base_1`, `base_2`, ... if `base` is already taken.
fn unique_column_name(base: &str, taken: &[String]) -> String {
    let taken: HashSet<&str> = taken.iter().map(String::as_str).collect();
    if !taken.contains(base) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{}_{}", base, n))
        .find(|candidate| !taken.contains(candidate.as_str()))
        .unwrap_or_else(|| base.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(name: &str, columns: &[(&str, ColumnType)], rows: Vec<Vec<Value>>) -> TabularSource {
        let columns = columns.iter().map(|(n, t)| Column::new(*n, *t)).collect();
        TabularSource::new(name, CanonicalTable::try_new(columns, rows).expect("valid"))
    }

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().map(|v| Value::Integer(*v)).collect()
    }

    fn ts_a_b() -> TabularSource {
        source(
            "s1",
            &[
                ("ts", ColumnType::Integer),
                ("a", ColumnType::Integer),
                ("b", ColumnType::Integer),
            ],
            vec![ints(&[1, 10, 100]), ints(&[2, 20, 200])],
        )
    }

    fn ts_a_c() -> TabularSource {
        source(
            "s2",
            &[
                ("ts", ColumnType::Integer),
                ("a", ColumnType::Integer),
                ("c", ColumnType::Integer),
            ],
            vec![ints(&[2, 21, 0]), ints(&[3, 31, 0]), ints(&[4, 41, 0])],
        )
    }

    fn options() -> EngineOptions {
        EngineOptions {
            ordering_key: "ts".to_string(),
            strict_types: false,
        }
    }

    #[test]
    fn test_merge_renames_and_outer_joins() {
        let out = apply_mode(ExportMode::Merge, &[ts_a_b(), ts_a_c()], &options()).expect("merge");
        let table = &out.tables[0].table;
        assert_eq!(
            table.column_names().collect::<Vec<_>>(),
            vec!["ts", "s1_a", "s1_b", "s2_a", "s2_c"]
        );
        assert_eq!(table.row_count(), 4);
        assert_eq!(table.value(0, "s2_a"), Some(&Value::Null));
        assert_eq!(table.value(3, "s1_a"), Some(&Value::Null));
        assert_eq!(table.value(1, "s1_a"), Some(&Value::Integer(20)));
        assert_eq!(table.value(1, "s2_a"), Some(&Value::Integer(21)));
        assert_eq!(out.tables[0].kind, ArtifactKind::Merged);
    }

    #[test]
    fn test_merge_rejects_renamed_column_collision() {
        let a = source(
            "a",
            &[("ts", ColumnType::Integer), ("b_c", ColumnType::Integer)],
            vec![ints(&[1, 10])],
        );
        let a_b = source(
            "a_b",
            &[("ts", ColumnType::Integer), ("c", ColumnType::Integer)],
            vec![ints(&[1, 20])],
        );

        let err = apply_mode(ExportMode::Merge, &[a, a_b], &options()).unwrap_err();

        match err {
            ExportError::DuplicateOutputColumn {
                ref column,
                ref first_source,
                ref second_source,
            } => {
                assert_eq!(column, "a_b_c");
                assert_eq!(first_source, "a");
                assert_eq!(second_source, "a_b");
            }
            ref other => panic!("unexpected error {:?}", other),
        }
        assert!(err.to_string().contains("'a_b'"));
    }

    #[test]
    fn test_merge_rejects_collision_with_ordering_key() {
        let keyed = EngineOptions {
            ordering_key: "s1_ts".to_string(),
            strict_types: false,
        };
        let s1 = source(
            "s1",
            &[("s1_ts", ColumnType::Integer), ("ts", ColumnType::Integer)],
            vec![ints(&[1, 5])],
        );

        let err = apply_mode(ExportMode::Merge, &[s1], &keyed).unwrap_err();

        assert!(matches!(err, ExportError::DuplicateOutputColumn { ref column, .. } if column == "s1_ts"));
    }

    #[test]
    fn test_merge_requires_key_in_every_source() {
        let keyless = source("s3", &[("a", ColumnType::Integer)], vec![]);
        let err = apply_mode(ExportMode::Merge, &[ts_a_b(), keyless], &options()).unwrap_err();
        match err {
            ExportError::MissingOrderingKey { source_name, key } => {
                assert_eq!(source_name, "s3");
                assert_eq!(key, "ts");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_merge_key_type_conflict_is_coerced_or_strict() {
        let floats = source(
            "f",
            &[("ts", ColumnType::Float), ("x", ColumnType::Float)],
            vec![vec![Value::Float(1.5), Value::Float(0.0)]],
        );
        let out = apply_mode(ExportMode::Merge, &[ts_a_b(), floats.clone()], &options())
            .expect("coerced");
        assert_eq!(out.type_conflicts.len(), 1);
        assert_eq!(out.tables[0].table.columns()[0].column_type, ColumnType::Float);

        let strict = EngineOptions {
            strict_types: true,
            ..options()
        };
        let err = apply_mode(ExportMode::Merge, &[ts_a_b(), floats], &strict).unwrap_err();
        assert!(matches!(err, ExportError::TypeConflict { .. }));
    }

    #[test]
    fn test_separate_is_identity() {
        let sources = [ts_a_b(), ts_a_c()];
        let out = apply_mode(ExportMode::Separate, &sources, &options()).expect("separate");
        assert_eq!(out.tables.len(), 2);
        for (exported, original) in out.tables.iter().zip(&sources) {
            assert_eq!(&exported.table, original.table());
            assert_eq!(exported.sources, vec![original.name().to_string()]);
        }
    }

    #[test]
    fn test_combined_long_keeps_shared_columns_and_tags_rows() {
        let out =
            apply_mode(ExportMode::CombinedLong, &[ts_a_b(), ts_a_c()], &options()).expect("combined");
        let table = &out.tables[0].table;
        assert_eq!(table.column_names().collect::<Vec<_>>(), vec!["ts", "a", "source_id"]);
        assert_eq!(table.row_count(), 5);
        assert_eq!(table.value(0, "source_id"), Some(&Value::Text("s1".to_string())));
        assert_eq!(table.value(4, "source_id"), Some(&Value::Text("s2".to_string())));
    }

    #[test]
    fn test_combined_long_without_shared_key_fails() {
        let renamed = source(
            "s3",
            &[("time", ColumnType::Integer), ("a", ColumnType::Integer)],
            vec![],
        );
        let err =
            apply_mode(ExportMode::CombinedLong, &[ts_a_b(), renamed], &options()).unwrap_err();
        assert!(matches!(err, ExportError::NoCommonColumns { .. }));
        assert!(err.to_string().contains("--merge or --separate"));
    }

    #[test]
    fn test_combined_long_needs_more_than_the_key() {
        let only_key = source("s3", &[("ts", ColumnType::Integer)], vec![]);
        let err =
            apply_mode(ExportMode::CombinedLong, &[ts_a_b(), only_key], &options()).unwrap_err();
        assert!(matches!(err, ExportError::NoCommonColumns { .. }));
    }

    #[test]
    fn test_combined_long_coerces_conflicting_column() {
        let text_a = source(
            "s3",
            &[("ts", ColumnType::Integer), ("a", ColumnType::Text)],
            vec![vec![Value::Integer(9), Value::Text("n/a".to_string())]],
        );
        let out =
            apply_mode(ExportMode::CombinedLong, &[ts_a_b(), text_a], &options()).expect("combined");
        let table = &out.tables[0].table;
        assert_eq!(table.column("a").map(|c| c.column_type), Some(ColumnType::Text));
        assert_eq!(table.value(0, "a"), Some(&Value::Text("10".to_string())));
        assert_eq!(out.type_conflicts.len(), 1);
    }

    #[test]
    fn test_combined_long_nan_widened_to_decimal_is_null() {
        let floats = source(
            "a",
            &[("ts", ColumnType::Integer), ("v", ColumnType::Float)],
            vec![vec![Value::Integer(1), Value::Float(f64::NAN)]],
        );
        let decimals = source(
            "b",
            &[("ts", ColumnType::Integer), ("v", ColumnType::Decimal)],
            vec![vec![Value::Integer(2), Value::Decimal("1.5".parse().unwrap())]],
        );

        let out = apply_mode(ExportMode::CombinedLong, &[floats, decimals], &options())
            .expect("coerced, not fatal");

        let table = &out.tables[0].table;
        assert_eq!(table.column("v").map(|c| c.column_type), Some(ColumnType::Decimal));
        assert_eq!(table.value(0, "v"), Some(&Value::Null));
        assert_eq!(table.value(1, "v"), Some(&Value::Decimal("1.5".parse().unwrap())));
        assert_eq!(out.type_conflicts.len(), 1);
    }

    #[test]
    fn test_merge_nan_key_widened_to_decimal_is_dropped() {
        let floats = source(
            "a",
            &[("ts", ColumnType::Float), ("x", ColumnType::Integer)],
            vec![
                vec![Value::Float(f64::NAN), Value::Integer(1)],
                vec![Value::Float(2.0), Value::Integer(2)],
            ],
        );
        let decimals = source(
            "b",
            &[("ts", ColumnType::Decimal), ("y", ColumnType::Integer)],
            vec![vec![Value::Decimal("2".parse().unwrap()), Value::Integer(3)]],
        );

        let out = apply_mode(ExportMode::Merge, &[floats, decimals], &options())
            .expect("coerced, not fatal");

        assert_eq!(out.tables[0].table.row_count(), 1);
        assert_eq!(out.dropped_null_keys, 1);
    }

    #[test]
    fn test_source_id_name_avoids_collision() {
        let a = source(
            "x",
            &[("ts", ColumnType::Integer), ("source_id", ColumnType::Integer)],
            vec![ints(&[1, 7])],
        );
        let b = source(
            "y",
            &[("ts", ColumnType::Integer), ("source_id", ColumnType::Integer)],
            vec![ints(&[2, 8])],
        );
        let out = apply_mode(ExportMode::CombinedLong, &[a, b], &options()).expect("combined");
        assert_eq!(
            out.tables[0].table.column_names().collect::<Vec<_>>(),
            vec!["ts", "source_id", "source_id_1"]
        );
    }

    #[test]
    fn test_empty_source_set_yields_empty_table() {
        for mode in [ExportMode::Merge, ExportMode::Separate, ExportMode::CombinedLong] {
            let out = apply_mode(mode, &[], &options()).expect("empty is not an error");
            assert_eq!(out.tables.len(), 1);
            assert!(out.tables[0].table.is_empty());
        }
    }

    #[test]
    fn test_zero_rows_still_produce_valid_tables() {
        let empty_a = source("e1", &[("ts", ColumnType::Integer), ("a", ColumnType::Float)], vec![]);
        let empty_b = source("e2", &[("ts", ColumnType::Integer), ("a", ColumnType::Float)], vec![]);
        let out = apply_mode(ExportMode::Merge, &[empty_a, empty_b], &options()).expect("merge");
        assert_eq!(out.total_rows(), 0);
        assert_eq!(out.tables[0].table.column_count(), 3);
    }
}
