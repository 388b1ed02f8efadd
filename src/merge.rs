//! Outer equi-merge of K sources on the ordering key.
//!
//! Each source is sorted by key (stable) and reduced to one row per distinct
//! key, keeping the **last observed** row for duplicated keys. The sorted runs
//! are then merged by repeatedly taking the smallest pending key across all
//! sources; a source lacking that key contributes nulls. Cost is
//! O(N log N) for the sorts plus O(N·K) for the merge.

use std::cmp::Ordering;

use log::warn;

use crate::table::{ColumnType, TabularSource, Value};

/// One source prepared for merging.
#[derive(Debug, Clone, Copy)]
pub struct MergeInput<'a> {
    pub source: &'a TabularSource,
    /// Position of the ordering key in the source.
    pub key_index: usize,
}

/// Output of [`merge_on_key`].
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRows {
    /// `[key, source 0 non-key values.., source 1 non-key values.., ..]`,
    /// ascending by key.
    pub rows: Vec<Vec<Value>>,
    /// Rows discarded because a later row in the same source had the same key.
    pub duplicate_keys: usize,
    /// Rows discarded because their key was null.
    pub null_keys: usize,
}

struct SortedRun<'a> {
    input: MergeInput<'a>,
    /// `(key, row index)`, ascending, one entry per distinct key.
    entries: Vec<(Value, usize)>,
    cursor: usize,
}

impl<'a> SortedRun<'a> {
    fn build(input: MergeInput<'a>, key_type: ColumnType) -> (Self, usize, usize) {
        let mut null_keys = 0;
        let mut entries: Vec<(Value, usize)> = input
            .source
            .table()
            .rows()
            .iter()
            .enumerate()
            .filter_map(|(row_index, row)| {
                let key = row[input.key_index].coerce_to(key_type);
                if key.is_null() {
                    null_keys += 1;
                    None
                } else {
                    Some((key, row_index))
                }
            })
            .collect();

        // Stable: rows with equal keys stay in input order, so the last of
        // each run is the last observed.
        entries.sort_by(|a, b| a.0.total_cmp(&b.0));

        let before = entries.len();
        let mut deduped: Vec<(Value, usize)> = Vec::with_capacity(before);
        for entry in entries {
            match deduped.last_mut() {
                Some(last) if last.0.total_cmp(&entry.0) == Ordering::Equal => *last = entry,
                _ => deduped.push(entry),
            }
        }
        let duplicates = before - deduped.len();

        (
            Self {
                input,
                entries: deduped,
                cursor: 0,
            },
            duplicates,
            null_keys,
        )
    }

    fn peek(&self) -> Option<&Value> {
        self.entries.get(self.cursor).map(|(k, _)| k)
    }

    fn width(&self) -> usize {
        self.input.source.table().column_count() - 1
    }

    fn push_current(&self, out: &mut Vec<Value>) {
        let (_, row_index) = &self.entries[self.cursor];
        let row = &self.input.source.table().rows()[*row_index];
        out.extend(
            row.iter()
                .enumerate()
                .filter(|(i, _)| *i != self.input.key_index)
                .map(|(_, v)| v.clone()),
        );
    }

    fn push_nulls(&self, out: &mut Vec<Value>) {
        out.extend(std::iter::repeat(Value::Null).take(self.width()));
    }
}

/// Merges `inputs` on their ordering key, coercing keys to `key_type`.
///
/// Produces one row per distinct key observed in any source, sorted
/// ascending; no key is dropped because some source lacks it.
pub fn merge_on_key(inputs: &[MergeInput<'_>], key_type: ColumnType) -> MergedRows {
    let mut duplicate_keys = 0;
    let mut null_keys = 0;
    let mut runs: Vec<SortedRun<'_>> = inputs
        .iter()
        .map(|input| {
            let (run, duplicates, nulls) = SortedRun::build(*input, key_type);
            if duplicates > 0 {
                warn!(
                    "Source '{}' has {} row(s) with a repeated ordering key; keeping the last observed row per key",
                    input.source.name(),
                    duplicates
                );
            }
            duplicate_keys += duplicates;
            null_keys += nulls;
            run
        })
        .collect();

    let capacity = runs.iter().map(|r| r.entries.len()).max().unwrap_or(0);
    let mut rows = Vec::with_capacity(capacity);

    loop {
        let mut smallest: Option<Value> = None;
        for run in &runs {
            if let Some(key) = run.peek() {
                let is_smaller = smallest
                    .as_ref()
                    .map_or(true, |s| key.total_cmp(s) == Ordering::Less);
                if is_smaller {
                    smallest = Some(key.clone());
                }
            }
        }
        let Some(key) = smallest else {
            break;
        };

        let mut row = Vec::with_capacity(1 + runs.iter().map(SortedRun::width).sum::<usize>());
        row.push(key.clone());
        for run in runs.iter_mut() {
            let matches = run
                .peek()
                .is_some_and(|k| k.total_cmp(&key) == Ordering::Equal);
            if matches {
                run.push_current(&mut row);
                run.cursor += 1;
            } else {
                run.push_nulls(&mut row);
            }
        }
        rows.push(row);
    }

    MergedRows {
        rows,
        duplicate_keys,
        null_keys,
    }
}
