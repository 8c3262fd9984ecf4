use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sheet `{0}` does not exist")]
    MissingSheet(String),
    #[error("sheet `{sheet}` has no column `{column}`")]
    MissingColumn { sheet: String, column: String },
    #[error("row {row} is out of range for sheet `{sheet}`")]
    RowOutOfRange { sheet: String, row: usize },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// One cell write, addressed by column header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CellUpdate {
    pub column: String,
    pub value: String,
}

impl CellUpdate {
    pub fn new(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self { column: column.into(), value: value.into() }
    }
}

/// Condition checked by [`RecordStore::compare_and_set`] before any write happens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CellGuard {
    pub column: String,
    pub expected: String,
}

impl CellGuard {
    pub fn new(column: impl Into<String>, expected: impl Into<String>) -> Self {
        Self { column: column.into(), expected: expected.into() }
    }
}

/// Point-in-time copy of a sheet. Row indexes are zero-based over data rows.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SheetSnapshot {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl SheetSnapshot {
    pub fn new(name: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { name: name.into(), headers, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        resolve_column(&self.headers, column)
    }

    /// `None` when the column is unknown; short rows read as blank.
    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.column_index(column)?;
        let values = self.rows.get(row)?;
        Some(values.get(index).map(|value| value.trim()).unwrap_or(""))
    }

    /// Blank for unknown columns and missing rows.
    pub fn text(&self, row: usize, column: &str) -> String {
        self.cell(row, column).unwrap_or("").to_string()
    }

    /// First data row whose trimmed cell equals the trimmed `value`.
    pub fn find_row_by_column_value(&self, column: &str, value: &str) -> Option<usize> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        let index = self.column_index(column)?;
        self.rows.iter().position(|row| row.get(index).map(|cell| cell.trim()) == Some(value))
    }

    pub fn row_map(&self, row: usize) -> BTreeMap<String, String> {
        let Some(values) = self.rows.get(row) else {
            return BTreeMap::new();
        };
        self.headers
            .iter()
            .enumerate()
            .filter(|(_, header)| !header.trim().is_empty())
            .map(|(index, header)| {
                (header.trim().to_string(), values.get(index).cloned().unwrap_or_default())
            })
            .collect()
    }
}

/// Header lookup: exact match first, then case-insensitive.
pub fn resolve_column(headers: &[String], column: &str) -> Option<usize> {
    let column = column.trim();
    if column.is_empty() {
        return None;
    }
    headers.iter().position(|header| header.trim() == column).or_else(|| {
        let lowered = column.to_lowercase();
        headers.iter().position(|header| header.trim().to_lowercase() == lowered)
    })
}

/// Tabular store addressed by sheet name and column header.
///
/// Writes to unknown columns are ignored, matching how the spreadsheet
/// backend treats them.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_all_rows(&self, sheet: &str) -> Result<SheetSnapshot, StoreError>;

    async fn update_cells(
        &self,
        sheet: &str,
        row: usize,
        updates: &[CellUpdate],
    ) -> Result<(), StoreError>;

    /// Appends a row and returns its index.
    async fn append_row(&self, sheet: &str, values: &[CellUpdate]) -> Result<usize, StoreError>;

    /// Applies `updates` only if the guard cell currently holds the expected value.
    /// Returns whether the write happened.
    async fn compare_and_set(
        &self,
        sheet: &str,
        row: usize,
        guard: &CellGuard,
        updates: &[CellUpdate],
    ) -> Result<bool, StoreError>;

    /// Creates the sheet when absent and appends any missing headers.
    async fn ensure_sheet(&self, sheet: &str, headers: &[&str]) -> Result<(), StoreError>;

    async fn sheet_names(&self) -> Result<Vec<String>, StoreError>;
}
