//! Canonical tabular representation.
//!
//! Every source, whether a relational sensor table or a converted log stream,
//! is held as a [`CanonicalTable`]: an ordered list of typed column
//! definitions plus rows stored as value arrays positionally matching those
//! columns. The constructor enforces the table invariants:
//! - column names are unique (case-sensitive)
//! - every row has exactly one value per declared column
//! - every non-null value matches its column's declared type

mod value;

use std::collections::HashSet;

pub use value::{format_timestamp, ColumnType, Value};

use crate::error_handling::TableError;

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Where a table's data came from.
///
/// The binary scientific formats only apply to sensor data; the writer
/// consults this tag to skip them for log-store tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableOrigin {
    Sensor,
    LogStream,
}

/// The engine's single tabular representation.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalTable {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

impl CanonicalTable {
    /// Builds a table, validating every invariant.
    pub fn try_new(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Result<Self, TableError> {
        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(TableError::DuplicateColumn(column.name.clone()));
            }
        }

        for (row_index, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(TableError::ArityMismatch {
                    row: row_index,
                    expected: columns.len(),
                    actual: row.len(),
                });
            }
            for (column, value) in columns.iter().zip(row) {
                if let Some(found) = value.column_type() {
                    if found != column.column_type {
                        return Err(TableError::TypeMismatch {
                            row: row_index,
                            column: column.name.clone(),
                            expected: column.column_type,
                            found,
                        });
                    }
                }
            }
        }

        Ok(Self { columns, rows })
    }

    /// A table with columns but no rows.
    pub fn empty(columns: Vec<Column>) -> Result<Self, TableError> {
        Self::try_new(columns, Vec::new())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Position of a column by exact name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Iterates one column's values in row order.
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &Value> {
        self.rows.iter().map(move |row| &row[index])
    }

    /// Value at (`row`, column `name`), if both exist.
    pub fn value(&self, row: usize, name: &str) -> Option<&Value> {
        let index = self.column_index(name)?;
        self.rows.get(row).map(|r| &r[index])
    }

    /// Reverses row order in place.
    pub fn reverse_rows(&mut self) {
        self.rows.reverse();
    }
}

/// Infers a column type from values when the producer has no declared type.
///
/// Nulls are ignored; mixed types widen; an all-null column is text.
pub fn infer_column_type<'a>(values: impl IntoIterator<Item = &'a Value>) -> ColumnType {
    values
        .into_iter()
        .filter_map(Value::column_type)
        .reduce(ColumnType::widen)
        .unwrap_or(ColumnType::Text)
}

/// A named dataset fetched from a collaborator; read-only once built.
#[derive(Debug, Clone, PartialEq)]
pub struct TabularSource {
    name: String,
    table: CanonicalTable,
    origin: TableOrigin,
}

impl TabularSource {
    pub fn new(name: impl Into<String>, table: CanonicalTable) -> Self {
        Self {
            name: name.into(),
            table,
            origin: TableOrigin::Sensor,
        }
    }

    pub fn with_origin(mut self, origin: TableOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &CanonicalTable {
        &self.table
    }

    pub fn origin(&self) -> TableOrigin {
        self.origin
    }

    pub fn into_table(self) -> CanonicalTable {
        self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts_value_columns() -> Vec<Column> {
        vec![
            Column::new("timestamp", ColumnType::Integer),
            Column::new("value", ColumnType::Float),
        ]
    }

    #[test]
    fn test_try_new_accepts_nulls_in_any_column() {
        let table = CanonicalTable::try_new(
            ts_value_columns(),
            vec![
                vec![Value::Integer(1), Value::Float(0.5)],
                vec![Value::Integer(2), Value::Null],
            ],
        )
        .expect("valid table");
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.value(1, "value"), Some(&Value::Null));
    }

    #[test]
    fn test_try_new_rejects_arity_mismatch() {
        let err = CanonicalTable::try_new(ts_value_columns(), vec![vec![Value::Integer(1)]])
            .unwrap_err();
        assert_eq!(
            err,
            TableError::ArityMismatch {
                row: 0,
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn test_try_new_rejects_duplicate_columns() {
        let columns = vec![
            Column::new("a", ColumnType::Integer),
            Column::new("a", ColumnType::Float),
        ];
        assert_eq!(
            CanonicalTable::empty(columns).unwrap_err(),
            TableError::DuplicateColumn("a".to_string())
        );
    }

    #[test]
    fn test_column_names_are_case_sensitive() {
        let columns = vec![
            Column::new("Temp", ColumnType::Float),
            Column::new("temp", ColumnType::Float),
        ];
        let table = CanonicalTable::empty(columns).expect("distinct names");
        assert_eq!(table.column_index("temp"), Some(1));
    }

    #[test]
    fn test_try_new_rejects_type_mismatch() {
        let err = CanonicalTable::try_new(
            ts_value_columns(),
            vec![vec![Value::Integer(1), Value::Text("x".to_string())]],
        )
        .unwrap_err();
        assert!(matches!(err, TableError::TypeMismatch { row: 0, .. }));
    }

    #[test]
    fn test_infer_column_type() {
        let values = [Value::Null, Value::Integer(1), Value::Float(2.0)];
        assert_eq!(infer_column_type(values.iter()), ColumnType::Float);
        assert_eq!(infer_column_type([Value::Null].iter()), ColumnType::Text);
    }
}
