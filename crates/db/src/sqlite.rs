use async_trait::async_trait;
use sqlx::{Row, Sqlite, Transaction};

use crate::store::{resolve_column, CellGuard, CellUpdate, RecordStore, SheetSnapshot, StoreError};
use crate::DbPool;

/// Record store persisted in SQLite as sheets, header columns and string cells.
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: DbPool,
}

impl SqliteRecordStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn decode(error: sqlx::Error) -> StoreError {
    StoreError::Decode(error.to_string())
}

async fn load_headers(
    tx: &mut Transaction<'_, Sqlite>,
    sheet: &str,
) -> Result<Vec<String>, StoreError> {
    let exists = sqlx::query("SELECT name FROM sheet WHERE name = ?")
        .bind(sheet)
        .fetch_optional(&mut **tx)
        .await?;
    if exists.is_none() {
        return Err(StoreError::MissingSheet(sheet.to_string()));
    }

    let rows =
        sqlx::query("SELECT header FROM sheet_column WHERE sheet_name = ? ORDER BY position ASC")
            .bind(sheet)
            .fetch_all(&mut **tx)
            .await?;
    rows.iter().map(|row| row.try_get::<String, _>("header").map_err(decode)).collect()
}

async fn row_exists(
    tx: &mut Transaction<'_, Sqlite>,
    sheet: &str,
    row: usize,
) -> Result<bool, StoreError> {
    let found = sqlx::query("SELECT row_index FROM sheet_row WHERE sheet_name = ? AND row_index = ?")
        .bind(sheet)
        .bind(row as i64)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(found.is_some())
}

async fn write_cells(
    tx: &mut Transaction<'_, Sqlite>,
    sheet: &str,
    headers: &[String],
    row: usize,
    updates: &[CellUpdate],
) -> Result<(), StoreError> {
    for update in updates {
        let Some(position) = resolve_column(headers, &update.column) else {
            continue;
        };
        sqlx::query(
            "INSERT INTO sheet_cell (sheet_name, row_index, position, value)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(sheet_name, row_index, position) DO UPDATE SET value = excluded.value",
        )
        .bind(sheet)
        .bind(row as i64)
        .bind(position as i64)
        .bind(&update.value)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn get_all_rows(&self, sheet: &str) -> Result<SheetSnapshot, StoreError> {
        let mut tx = self.pool.begin().await?;
        let headers = load_headers(&mut tx, sheet).await?;

        let row_count: i64 = sqlx::query(
            "SELECT COALESCE(MAX(row_index) + 1, 0) AS row_count FROM sheet_row WHERE sheet_name = ?",
        )
        .bind(sheet)
        .fetch_one(&mut *tx)
        .await?
        .try_get("row_count")
        .map_err(decode)?;

        let mut rows = vec![vec![String::new(); headers.len()]; row_count.max(0) as usize];
        let cells = sqlx::query(
            "SELECT row_index, position, value FROM sheet_cell WHERE sheet_name = ?",
        )
        .bind(sheet)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        for cell in cells {
            let row_index: i64 = cell.try_get("row_index").map_err(decode)?;
            let position: i64 = cell.try_get("position").map_err(decode)?;
            let value: String = cell.try_get("value").map_err(decode)?;
            if let Some(slot) = rows
                .get_mut(row_index as usize)
                .and_then(|values| values.get_mut(position as usize))
            {
                *slot = value;
            }
        }

        Ok(SheetSnapshot::new(sheet, headers, rows))
    }

    async fn update_cells(
        &self,
        sheet: &str,
        row: usize,
        updates: &[CellUpdate],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let headers = load_headers(&mut tx, sheet).await?;
        if !row_exists(&mut tx, sheet, row).await? {
            return Err(StoreError::RowOutOfRange { sheet: sheet.to_string(), row });
        }
        write_cells(&mut tx, sheet, &headers, row, updates).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn append_row(&self, sheet: &str, values: &[CellUpdate]) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await?;
        let headers = load_headers(&mut tx, sheet).await?;

        let next: i64 = sqlx::query(
            "SELECT COALESCE(MAX(row_index) + 1, 0) AS next_row FROM sheet_row WHERE sheet_name = ?",
        )
        .bind(sheet)
        .fetch_one(&mut *tx)
        .await?
        .try_get("next_row")
        .map_err(decode)?;

        sqlx::query("INSERT INTO sheet_row (sheet_name, row_index) VALUES (?, ?)")
            .bind(sheet)
            .bind(next)
            .execute(&mut *tx)
            .await?;

        let row = next as usize;
        write_cells(&mut tx, sheet, &headers, row, values).await?;
        tx.commit().await?;
        Ok(row)
    }

    async fn compare_and_set(
        &self,
        sheet: &str,
        row: usize,
        guard: &CellGuard,
        updates: &[CellUpdate],
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let headers = load_headers(&mut tx, sheet).await?;
        let position =
            resolve_column(&headers, &guard.column).ok_or_else(|| StoreError::MissingColumn {
                sheet: sheet.to_string(),
                column: guard.column.clone(),
            })?;
        if !row_exists(&mut tx, sheet, row).await? {
            return Err(StoreError::RowOutOfRange { sheet: sheet.to_string(), row });
        }

        // Writing first takes the database write lock, so no other claim can interleave.
        sqlx::query(
            "INSERT OR IGNORE INTO sheet_cell (sheet_name, row_index, position, value)
             VALUES (?, ?, ?, '')",
        )
        .bind(sheet)
        .bind(row as i64)
        .bind(position as i64)
        .execute(&mut *tx)
        .await?;

        let current: String = sqlx::query(
            "SELECT value FROM sheet_cell WHERE sheet_name = ? AND row_index = ? AND position = ?",
        )
        .bind(sheet)
        .bind(row as i64)
        .bind(position as i64)
        .fetch_one(&mut *tx)
        .await?
        .try_get("value")
        .map_err(decode)?;

        if current.trim() != guard.expected.trim() {
            tx.rollback().await?;
            return Ok(false);
        }

        write_cells(&mut tx, sheet, &headers, row, updates).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn ensure_sheet(&self, sheet: &str, headers: &[&str]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT OR IGNORE INTO sheet (name) VALUES (?)")
            .bind(sheet)
            .execute(&mut *tx)
            .await?;

        let mut existing = load_headers(&mut tx, sheet).await?;
        for header in headers {
            if resolve_column(&existing, header).is_some() {
                continue;
            }
            sqlx::query("INSERT INTO sheet_column (sheet_name, position, header) VALUES (?, ?, ?)")
                .bind(sheet)
                .bind(existing.len() as i64)
                .bind(header.trim())
                .execute(&mut *tx)
                .await?;
            existing.push(header.trim().to_string());
        }
        tx.commit().await?;
        Ok(())
    }

    async fn sheet_names(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT name FROM sheet ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(|row| row.try_get::<String, _>("name").map_err(decode)).collect()
    }
}
