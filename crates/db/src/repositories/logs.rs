use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::format_timestamp;
use crate::store::{CellUpdate, RecordStore, StoreError};

pub const MANAGEMENT_HEADERS: &[&str] = &["ID_Lead", "ID_Abogado", "Estatus", "Notas", "Fecha_Hora"];

pub const CONVERSATION_HEADERS: &[&str] = &[
    "ID_Log",
    "Fecha_Hora",
    "Telefono",
    "ID_Lead",
    "Paso",
    "Mensaje_Entrante",
    "Mensaje_Saliente",
    "Canal",
    "Fuente_Lead",
    "Errores",
];

pub const STATUS_ASSIGNED: &str = "ASIGNADO";
pub const STATUS_UNASSIGNED: &str = "SIN_ABOGADO";

/// One assignment record for the case managers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagementLogEntry {
    pub lead_id: String,
    pub lawyer_id: String,
    pub status: String,
    pub notes: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ManagementLogRepository {
    store: Arc<dyn RecordStore>,
    tab: String,
}

impl ManagementLogRepository {
    pub fn new(store: Arc<dyn RecordStore>, tab: impl Into<String>) -> Self {
        Self { store, tab: tab.into() }
    }

    pub async fn append(&self, entry: &ManagementLogEntry) -> Result<usize, StoreError> {
        let cells = [
            CellUpdate::new("ID_Lead", entry.lead_id.clone()),
            CellUpdate::new("ID_Abogado", entry.lawyer_id.clone()),
            CellUpdate::new("Estatus", entry.status.clone()),
            CellUpdate::new("Notas", entry.notes.clone()),
            CellUpdate::new("Fecha_Hora", format_timestamp(entry.recorded_at)),
        ];
        self.store.append_row(&self.tab, &cells).await
    }
}

/// One inbound turn and the reply it produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationLogEntry {
    pub log_id: String,
    pub recorded_at: DateTime<Utc>,
    pub phone: String,
    pub lead_id: String,
    pub step: String,
    pub inbound: String,
    pub outbound: String,
    pub channel: String,
    pub lead_source: String,
    pub errors: String,
}

#[derive(Clone)]
pub struct ConversationLogRepository {
    store: Arc<dyn RecordStore>,
    tab: String,
}

impl ConversationLogRepository {
    pub fn new(store: Arc<dyn RecordStore>, tab: impl Into<String>) -> Self {
        Self { store, tab: tab.into() }
    }

    pub async fn append(&self, entry: &ConversationLogEntry) -> Result<usize, StoreError> {
        let cells = [
            CellUpdate::new("ID_Log", entry.log_id.clone()),
            CellUpdate::new("Fecha_Hora", format_timestamp(entry.recorded_at)),
            CellUpdate::new("Telefono", entry.phone.clone()),
            CellUpdate::new("ID_Lead", entry.lead_id.clone()),
            CellUpdate::new("Paso", entry.step.clone()),
            CellUpdate::new("Mensaje_Entrante", entry.inbound.clone()),
            CellUpdate::new("Mensaje_Saliente", entry.outbound.clone()),
            CellUpdate::new("Canal", entry.channel.clone()),
            CellUpdate::new("Fuente_Lead", entry.lead_source.clone()),
            CellUpdate::new("Errores", entry.errors.clone()),
        ];
        self.store.append_row(&self.tab, &cells).await
    }
}
