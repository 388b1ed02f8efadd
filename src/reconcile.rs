//! Schema reconciliation across tabular sources.
//!
//! Computes, over column **names**, the union (with the sources contributing
//! each column) and the intersection of N sources. Same-named columns present
//! in every source but declared with different types are recorded as
//! [`TypeConflict`]s; whether a conflict is fatal is the mode engine's call.

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::table::{ColumnType, TabularSource};

/// A column of the union and the sources that declare it.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnPresence {
    pub name: String,
    /// `(source name, declared type)` in source order.
    pub declared_in: Vec<(String, ColumnType)>,
}

impl ColumnPresence {
    pub fn source_names(&self) -> impl Iterator<Item = &str> {
        self.declared_in.iter().map(|(s, _)| s.as_str())
    }
}

/// A same-named intersected column with incompatible declared types.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeConflict {
    pub column: String,
    pub declared_in: Vec<(String, ColumnType)>,
    /// Widest common representation the values are coerced to.
    pub resolved: ColumnType,
}

impl TypeConflict {
    pub fn describe(&self) -> String {
        self.declared_in
            .iter()
            .map(|(source, ty)| format!("{} in '{}'", ty, source))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// How the column sets of the sources relate to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRelationship {
    /// No sources.
    Empty,
    /// Every source has exactly the same column names.
    Identical,
    /// Some, but not all, columns are shared by every source.
    Overlapping,
    /// No column is shared by every source.
    Disjoint,
}

/// Result of reconciling a set of sources.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    source_names: Vec<String>,
    union: Vec<ColumnPresence>,
    intersection: Vec<String>,
    conflicts: Vec<TypeConflict>,
}

impl Reconciliation {
    pub fn source_names(&self) -> &[String] {
        &self.source_names
    }

    /// Union of column names, in first-seen order.
    pub fn union(&self) -> &[ColumnPresence] {
        &self.union
    }

    pub fn union_names(&self) -> impl Iterator<Item = &str> {
        self.union.iter().map(|c| c.name.as_str())
    }

    /// Names present in every source, in the first source's column order.
    pub fn intersection(&self) -> &[String] {
        &self.intersection
    }

    pub fn in_every_source(&self, column: &str) -> bool {
        self.intersection.iter().any(|c| c == column)
    }

    pub fn conflicts(&self) -> &[TypeConflict] {
        &self.conflicts
    }

    pub fn conflict_for(&self, column: &str) -> Option<&TypeConflict> {
        self.conflicts.iter().find(|c| c.column == column)
    }

    /// Type an intersected column is exported with: the declared type, or the
    /// widened type when the sources disagree.
    pub fn resolved_type(&self, column: &str) -> Option<ColumnType> {
        let presence = self.union.iter().find(|c| c.name == column)?;
        presence
            .declared_in
            .iter()
            .map(|(_, ty)| *ty)
            .reduce(ColumnType::widen)
    }

    pub fn relationship(&self) -> ColumnRelationship {
        if self.source_names.is_empty() {
            ColumnRelationship::Empty
        } else if self.intersection.is_empty() {
            ColumnRelationship::Disjoint
        } else if self.intersection.len() == self.union.len() {
            ColumnRelationship::Identical
        } else {
            ColumnRelationship::Overlapping
        }
    }
}

/// Reconciles the column sets of `sources`.
///
/// An empty source set yields an empty union and intersection.
pub fn reconcile(sources: &[TabularSource]) -> Reconciliation {
    let mut union: Vec<ColumnPresence> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for source in sources {
        for column in source.table().columns() {
            let index = *positions.entry(column.name.clone()).or_insert_with(|| {
                union.push(ColumnPresence {
                    name: column.name.clone(),
                    declared_in: Vec::new(),
                });
                union.len() - 1
            });
            union[index]
                .declared_in
                .push((source.name().to_string(), column.column_type));
        }
    }

    let intersection: Vec<String> = match sources.first() {
        None => Vec::new(),
        Some(first) => {
            let mut shared: HashSet<&str> = first.table().column_names().collect();
            for source in &sources[1..] {
                let names: HashSet<&str> = source.table().column_names().collect();
                shared.retain(|name| names.contains(name));
            }
            first
                .table()
                .column_names()
                .filter(|name| shared.contains(name))
                .map(str::to_string)
                .collect()
        }
    };

    let conflicts: Vec<TypeConflict> = intersection
        .iter()
        .filter_map(|name| {
            let presence = &union[positions[name]];
            let first = presence.declared_in.first()?.1;
            if presence.declared_in.iter().all(|(_, ty)| *ty == first) {
                return None;
            }
            let resolved = presence
                .declared_in
                .iter()
                .map(|(_, ty)| *ty)
                .reduce(ColumnType::widen)
                .unwrap_or(ColumnType::Text);
            Some(TypeConflict {
                column: name.clone(),
                declared_in: presence.declared_in.clone(),
                resolved,
            })
        })
        .collect();

    let reconciliation = Reconciliation {
        source_names: sources.iter().map(|s| s.name().to_string()).collect(),
        union,
        intersection,
        conflicts,
    };
    debug!(
        "Reconciled {} source(s): union={} intersection={} conflicts={} ({:?})",
        sources.len(),
        reconciliation.union.len(),
        reconciliation.intersection.len(),
        reconciliation.conflicts.len(),
        reconciliation.relationship()
    );
    reconciliation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{CanonicalTable, Column};
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn source(name: &str, columns: &[(&str, ColumnType)]) -> TabularSource {
        let columns = columns
            .iter()
            .map(|(n, t)| Column::new(*n, *t))
            .collect();
        TabularSource::new(name, CanonicalTable::empty(columns).expect("valid columns"))
    }

    #[test]
    fn test_empty_source_set() {
        let r = reconcile(&[]);
        assert!(r.union().is_empty());
        assert!(r.intersection().is_empty());
        assert_eq!(r.relationship(), ColumnRelationship::Empty);
    }

    #[test]
    fn test_union_records_contributing_sources() {
        let sources = [
            source("a", &[("ts", ColumnType::Timestamp), ("x", ColumnType::Float)]),
            source("b", &[("ts", ColumnType::Timestamp), ("y", ColumnType::Float)]),
        ];
        let r = reconcile(&sources);
        assert_eq!(r.union_names().collect::<Vec<_>>(), vec!["ts", "x", "y"]);
        let ts = &r.union()[0];
        assert_eq!(ts.source_names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(r.intersection(), &["ts".to_string()]);
        assert_eq!(r.relationship(), ColumnRelationship::Overlapping);
    }

    #[test]
    fn test_disjoint_and_identical() {
        let disjoint = reconcile(&[
            source("a", &[("x", ColumnType::Float)]),
            source("b", &[("y", ColumnType::Float)]),
        ]);
        assert_eq!(disjoint.relationship(), ColumnRelationship::Disjoint);

        let identical = reconcile(&[
            source("a", &[("x", ColumnType::Float)]),
            source("b", &[("x", ColumnType::Float)]),
        ]);
        assert_eq!(identical.relationship(), ColumnRelationship::Identical);
        assert!(identical.conflicts().is_empty());
    }

    #[test]
    fn test_type_conflict_is_flagged_not_fatal() {
        let r = reconcile(&[
            source("a", &[("ts", ColumnType::Timestamp), ("v", ColumnType::Integer)]),
            source("b", &[("ts", ColumnType::Timestamp), ("v", ColumnType::Text)]),
        ]);
        let conflict = r.conflict_for("v").expect("conflict on v");
        assert_eq!(conflict.resolved, ColumnType::Text);
        assert!(conflict.describe().contains("integer in 'a'"));
        assert_eq!(r.intersection().len(), 2);
        assert_eq!(r.resolved_type("v"), Some(ColumnType::Text));
    }

    #[test]
    fn test_names_not_values_drive_intersection() {
        let r = reconcile(&[
            source("a", &[("Temp", ColumnType::Float)]),
            source("b", &[("temp", ColumnType::Float)]),
        ]);
        assert!(r.intersection().is_empty());
    }

    fn column_sets() -> impl Strategy<Value = Vec<BTreeSet<String>>> {
        prop::collection::vec(
            prop::collection::btree_set("[a-e]", 0..5),
            0..5,
        )
    }

    proptest! {
        #[test]
        fn test_union_and_intersection_match_set_algebra(sets in column_sets()) {
            let sources: Vec<TabularSource> = sets
                .iter()
                .enumerate()
                .map(|(i, cols)| {
                    let columns = cols.iter().map(|c| (c.as_str(), ColumnType::Float)).collect::<Vec<_>>();
                    source(&format!("s{}", i), &columns)
                })
                .collect();
            let r = reconcile(&sources);

            let expected_union: BTreeSet<String> = sets.iter().flatten().cloned().collect();
            let actual_union: BTreeSet<String> = r.union_names().map(str::to_string).collect();
            prop_assert_eq!(expected_union, actual_union);

            let expected_intersection: BTreeSet<String> = match sets.split_first() {
                None => BTreeSet::new(),
                Some((first, rest)) => first
                    .iter()
                    .filter(|c| rest.iter().all(|s| s.contains(*c)))
                    .cloned()
                    .collect(),
            };
            let actual_intersection: BTreeSet<String> = r.intersection().iter().cloned().collect();
            prop_assert_eq!(expected_intersection, actual_intersection);
        }
    }
}
