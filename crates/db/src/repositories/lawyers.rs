use std::sync::Arc;

use chrono::{DateTime, Utc};

use casedesk_core::domain::lawyer::{parse_active_flag, parse_load, Lawyer, LawyerId};

use super::format_timestamp;
use crate::store::{CellUpdate, RecordStore, SheetSnapshot, StoreError};

pub const LAWYER_ID: &str = "ID_Abogado";
pub const NAME: &str = "Nombre_Abogado";
pub const PHONE: &str = "Telefono_Abogado";
pub const ACTIVE: &str = "Activo";
pub const DAILY_LOAD: &str = "Leads_Asignados_Hoy";
pub const LAST_ASSIGNED_AT: &str = "Ultima_Asignacion_TS";

pub const HEADERS: &[&str] = &[LAWYER_ID, NAME, PHONE, ACTIVE, DAILY_LOAD, LAST_ASSIGNED_AT];

#[derive(Clone)]
pub struct LawyerRepository {
    store: Arc<dyn RecordStore>,
    tab: String,
}

impl LawyerRepository {
    pub fn new(store: Arc<dyn RecordStore>, tab: impl Into<String>) -> Self {
        Self { store, tab: tab.into() }
    }

    /// All rows with an id, active or not.
    pub async fn roster(&self) -> Result<Vec<Lawyer>, StoreError> {
        let sheet = self.store.get_all_rows(&self.tab).await?;
        Ok((0..sheet.len()).filter_map(|row| lawyer_from_row(&sheet, row)).collect())
    }

    /// Read-modify-write of the daily counter; concurrent increments may be lost.
    pub async fn increment_load(
        &self,
        id: &LawyerId,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let sheet = self.store.get_all_rows(&self.tab).await?;
        let Some(row) = sheet.find_row_by_column_value(LAWYER_ID, id.as_str()) else {
            return Ok(false);
        };
        let load = parse_load(&sheet.text(row, DAILY_LOAD));
        self.store
            .update_cells(
                &self.tab,
                row,
                &[
                    CellUpdate::new(DAILY_LOAD, (load + 1).to_string()),
                    CellUpdate::new(LAST_ASSIGNED_AT, format_timestamp(now)),
                ],
            )
            .await?;
        Ok(true)
    }

    pub async fn append(&self, lawyer: &Lawyer) -> Result<usize, StoreError> {
        let cells = [
            CellUpdate::new(LAWYER_ID, lawyer.id.as_str()),
            CellUpdate::new(NAME, lawyer.name.clone()),
            CellUpdate::new(PHONE, lawyer.phone.clone().unwrap_or_default()),
            CellUpdate::new(ACTIVE, if lawyer.active { "SI" } else { "NO" }),
            CellUpdate::new(DAILY_LOAD, lawyer.daily_load.to_string()),
            CellUpdate::new(LAST_ASSIGNED_AT, lawyer.last_assigned_at.clone().unwrap_or_default()),
        ];
        self.store.append_row(&self.tab, &cells).await
    }
}

fn lawyer_from_row(sheet: &SheetSnapshot, row: usize) -> Option<Lawyer> {
    let id = sheet.text(row, LAWYER_ID);
    if id.is_empty() {
        return None;
    }
    let phone = sheet.text(row, PHONE);
    let last_assigned_at = sheet.text(row, LAST_ASSIGNED_AT);
    Some(Lawyer {
        id: LawyerId(id),
        name: sheet.text(row, NAME),
        phone: (!phone.is_empty()).then_some(phone),
        active: parse_active_flag(sheet.cell(row, ACTIVE)),
        daily_load: parse_load(&sheet.text(row, DAILY_LOAD)),
        last_assigned_at: (!last_assigned_at.is_empty()).then_some(last_assigned_at),
    })
}
