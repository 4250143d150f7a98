//! Table schema descriptors.
//!
//! A [`Schema`] is the ordered column list read from a table's header row.
//! Rows are mapped to records through it and back, so a schema that drifted
//! from the live header must be caught before any mapping happens
//! ([`Schema::verify`]) rather than silently shifting values between columns.

use crate::error::{StoreError, TabulaResult};
use crate::value::{CellValue, Record, Row};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

static EMPTY_CELL: CellValue = CellValue::Empty;

/// Ordered column names of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    table: String,
    columns: Vec<String>,
}

impl Schema {
    pub fn new(table: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            table: table.into(),
            columns,
        }
    }

    /// Build a schema from a raw header row; blank cells keep their position.
    pub fn from_header(table: impl Into<String>, header: &[CellValue]) -> Self {
        let columns = header.iter().map(clean_column).collect();
        Self::new(table, columns)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn index_of(&self, column: &str) -> Option<usize> {
        let wanted = column.trim();
        self.columns.iter().position(|c| c == wanted)
    }

    /// Position of the key column; its absence is a configuration error.
    pub fn key_index(&self, column: &str) -> TabulaResult<usize> {
        self.index_of(column).ok_or_else(|| {
            StoreError::MissingKeyColumn {
                table: self.table.clone(),
                column: column.to_string(),
            }
            .into()
        })
    }

    /// Check that the live header still matches this schema.
    pub fn verify(&self, live_header: &[CellValue]) -> TabulaResult<()> {
        let live: Vec<String> = live_header.iter().map(clean_column).collect();
        if trim_trailing_blanks(&live) == trim_trailing_blanks(&self.columns) {
            Ok(())
        } else {
            Err(StoreError::SchemaMismatch {
                table: self.table.clone(),
                expected: self.columns.clone(),
                found: live,
            }
            .into())
        }
    }

    /// Resolve the positions of every required column.
    pub fn require(&self, required: &[&str]) -> TabulaResult<ColumnIndex> {
        let mut positions = HashMap::with_capacity(required.len());
        for column in required {
            let idx = self.index_of(column).ok_or_else(|| StoreError::MissingColumn {
                table: self.table.clone(),
                column: column.to_string(),
            })?;
            positions.insert(column.to_string(), idx);
        }
        Ok(ColumnIndex { positions })
    }

    /// Map a record onto a full row: unknown keys are dropped, missing ones become `""`.
    pub fn to_row(&self, record: &Record) -> Row {
        self.columns
            .iter()
            .map(|column| {
                record
                    .get(column)
                    .cloned()
                    .unwrap_or_else(|| CellValue::Text(String::new()))
            })
            .collect()
    }

    /// Map a stored row back to a record containing every schema column.
    pub fn to_record(&self, row: &[CellValue]) -> Record {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, column)| !column.is_empty())
            .map(|(idx, column)| (column.clone(), row.get(idx).cloned().unwrap_or_default()))
            .collect()
    }

    /// Overwrite the recognized fields of `row` with the values in `patch`.
    pub fn apply_patch(&self, row: &mut Row, patch: &Record) {
        if row.len() < self.columns.len() {
            row.resize(self.columns.len(), CellValue::Empty);
        }
        for (idx, column) in self.columns.iter().enumerate() {
            if let Some(value) = patch.get(column) {
                row[idx] = value.clone();
            }
        }
    }
}

/// Required-column positions resolved against a header.
#[derive(Debug, Clone, Default)]
pub struct ColumnIndex {
    positions: HashMap<String, usize>,
}

impl ColumnIndex {
    pub fn position(&self, column: &str) -> Option<usize> {
        self.positions.get(column).copied()
    }

    /// View a row through this index.
    pub fn view<'a>(&'a self, row: &'a [CellValue]) -> RowView<'a> {
        RowView { row, index: self }
    }
}

/// Read-only access to a row by required-column name.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    row: &'a [CellValue],
    index: &'a ColumnIndex,
}

impl<'a> RowView<'a> {
    /// Cell under `column`, or an empty cell when the row is short or the column unknown.
    pub fn get(&self, column: &str) -> &'a CellValue {
        self.index
            .position(column)
            .and_then(|idx| self.row.get(idx))
            .unwrap_or(&EMPTY_CELL)
    }

    pub fn text(&self, column: &str) -> String {
        self.get(column).to_string()
    }
}

fn clean_column(cell: &CellValue) -> String {
    cell.to_string().trim().to_string()
}

fn trim_trailing_blanks(columns: &[String]) -> &[String] {
    let end = columns
        .iter()
        .rposition(|c| !c.is_empty())
        .map_or(0, |i| i + 1);
    &columns[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TabulaError;
    use crate::value::record;

    fn header(cols: &[&str]) -> Row {
        cols.iter().map(|c| CellValue::from(*c)).collect()
    }

    #[test]
    fn test_to_row_drops_unknown_and_fills_missing() {
        let schema = Schema::from_header("Cadastro", &header(&["ID", "Nome", "CPF"]));
        let rec = record([("ID", "1"), ("Nome", "Ana"), ("Extra", "x")]);
        let row = schema.to_row(&rec);
        assert_eq!(
            row,
            vec![
                CellValue::from("1"),
                CellValue::from("Ana"),
                CellValue::from("")
            ]
        );
    }

    #[test]
    fn test_to_record_pads_short_rows() {
        let schema = Schema::from_header("Cadastro", &header(&["ID", "Nome", "CPF"]));
        let rec = schema.to_record(&[CellValue::from("1")]);
        assert_eq!(rec.len(), 3);
        assert_eq!(rec["CPF"], CellValue::Empty);
    }

    #[test]
    fn test_key_index_missing_is_config_error() {
        let schema = Schema::from_header("Cadastro", &header(&["ID"]));
        let err = schema.key_index("CPF").unwrap_err();
        assert!(matches!(
            err,
            TabulaError::Store(StoreError::MissingKeyColumn { .. })
        ));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_header_cells_are_trimmed() {
        let schema = Schema::from_header("T", &header(&[" ID ", "Nome"]));
        assert_eq!(schema.index_of("ID"), Some(0));
        assert_eq!(schema.index_of(" Nome"), Some(1));
    }

    #[test]
    fn test_verify_detects_drift() {
        let schema = Schema::from_header("T", &header(&["ID", "Nome"]));
        assert!(schema.verify(&header(&["ID", "Nome", ""])).is_ok());
        let err = schema.verify(&header(&["Nome", "ID"])).unwrap_err();
        assert!(matches!(
            err,
            TabulaError::Store(StoreError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_require_and_view() {
        let schema = Schema::from_header("T", &header(&["A", "B", "C"]));
        let idx = schema.require(&["C", "A"]).unwrap();
        let row = header(&["a", "b"]);
        let view = idx.view(&row);
        assert_eq!(view.text("A"), "a");
        assert_eq!(view.get("C"), &CellValue::Empty);

        let err = schema.require(&["Z"]).unwrap_err();
        assert!(matches!(
            err,
            TabulaError::Store(StoreError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_apply_patch_only_touches_known_columns() {
        let schema = Schema::from_header("T", &header(&["ID", "Nome", "Tel"]));
        let mut row = header(&["1", "Ana", "55"]);
        schema.apply_patch(&mut row, &record([("Nome", "Bia"), ("Bogus", "z")]));
        assert_eq!(row, header(&["1", "Bia", "55"]));
    }
}
