use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::store::{resolve_column, CellGuard, CellUpdate, RecordStore, SheetSnapshot, StoreError};

/// Process-local record store, used by tests and fakes.
#[derive(Default)]
pub struct InMemoryRecordStore {
    sheets: RwLock<BTreeMap<String, SheetSnapshot>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_sheets<I>(sheets: I) -> Self
    where
        I: IntoIterator<Item = SheetSnapshot>,
    {
        let sheets = sheets.into_iter().map(|sheet| (sheet.name.clone(), sheet)).collect();
        Self { sheets: RwLock::new(sheets) }
    }
}

fn write_cells(sheet: &mut SheetSnapshot, row: usize, updates: &[CellUpdate]) {
    let width = sheet.headers.len();
    let indexes: Vec<(usize, &str)> = updates
        .iter()
        .filter_map(|update| {
            resolve_column(&sheet.headers, &update.column).map(|index| (index, update.value.as_str()))
        })
        .collect();
    if let Some(values) = sheet.rows.get_mut(row) {
        if values.len() < width {
            values.resize(width, String::new());
        }
        for (index, value) in indexes {
            values[index] = value.to_string();
        }
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get_all_rows(&self, sheet: &str) -> Result<SheetSnapshot, StoreError> {
        let sheets = self.sheets.read().await;
        sheets.get(sheet).cloned().ok_or_else(|| StoreError::MissingSheet(sheet.to_string()))
    }

    async fn update_cells(
        &self,
        sheet: &str,
        row: usize,
        updates: &[CellUpdate],
    ) -> Result<(), StoreError> {
        let mut sheets = self.sheets.write().await;
        let data =
            sheets.get_mut(sheet).ok_or_else(|| StoreError::MissingSheet(sheet.to_string()))?;
        if row >= data.rows.len() {
            return Err(StoreError::RowOutOfRange { sheet: sheet.to_string(), row });
        }
        write_cells(data, row, updates);
        Ok(())
    }

    async fn append_row(&self, sheet: &str, values: &[CellUpdate]) -> Result<usize, StoreError> {
        let mut sheets = self.sheets.write().await;
        let data =
            sheets.get_mut(sheet).ok_or_else(|| StoreError::MissingSheet(sheet.to_string()))?;
        data.rows.push(vec![String::new(); data.headers.len()]);
        let row = data.rows.len() - 1;
        write_cells(data, row, values);
        Ok(row)
    }

    async fn compare_and_set(
        &self,
        sheet: &str,
        row: usize,
        guard: &CellGuard,
        updates: &[CellUpdate],
    ) -> Result<bool, StoreError> {
        let mut sheets = self.sheets.write().await;
        let data =
            sheets.get_mut(sheet).ok_or_else(|| StoreError::MissingSheet(sheet.to_string()))?;
        if row >= data.rows.len() {
            return Err(StoreError::RowOutOfRange { sheet: sheet.to_string(), row });
        }
        let current = data.cell(row, &guard.column).ok_or_else(|| StoreError::MissingColumn {
            sheet: sheet.to_string(),
            column: guard.column.clone(),
        })?;
        if current != guard.expected.trim() {
            return Ok(false);
        }
        write_cells(data, row, updates);
        Ok(true)
    }

    async fn ensure_sheet(&self, sheet: &str, headers: &[&str]) -> Result<(), StoreError> {
        let mut sheets = self.sheets.write().await;
        let data = sheets
            .entry(sheet.to_string())
            .or_insert_with(|| SheetSnapshot::new(sheet, Vec::new(), Vec::new()));
        for header in headers {
            if resolve_column(&data.headers, header).is_none() {
                data.headers.push(header.trim().to_string());
            }
        }
        let width = data.headers.len();
        for values in &mut data.rows {
            values.resize(width.max(values.len()), String::new());
        }
        Ok(())
    }

    async fn sheet_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.sheets.read().await.keys().cloned().collect())
    }
}
