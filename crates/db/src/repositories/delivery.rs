use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use super::format_timestamp;
use crate::store::{CellUpdate, RecordStore, SheetSnapshot, StoreError};

pub const KEY: &str = "Clave_Entrega";
pub const LEAD_ID: &str = "ID_Lead";
pub const TOKEN: &str = "Token_Reporte";
pub const STATE: &str = "Estado";
pub const ATTEMPTED_AT: &str = "Intentado_En";
pub const DETAIL: &str = "Detalle";

pub const HEADERS: &[&str] = &[KEY, LEAD_ID, TOKEN, STATE, ATTEMPTED_AT, DETAIL];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryState {
    Reserved,
    Sent,
    Failed,
}

impl DeliveryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reserved => "RESERVED",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "RESERVED" => Some(Self::Reserved),
            "SENT" => Some(Self::Sent),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryRecord {
    pub row: usize,
    pub key: String,
    pub lead_id: String,
    pub token: String,
    pub state: Option<DeliveryState>,
    pub attempted_at: String,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reservation {
    /// This caller owns the delivery and must send, then mark the row.
    Reserved { row: usize, key: String },
    /// Someone already attempted this delivery; do not send again.
    AlreadyRecorded(DeliveryRecord),
}

/// Hex SHA-256 of `lead_id:token`.
pub fn delivery_key(lead_id: &str, token: &str) -> String {
    let digest = Sha256::digest(format!("{}:{}", lead_id.trim(), token.trim()).as_bytes());
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// At-most-once ledger of outbound result notifications.
#[derive(Clone)]
pub struct DeliveryLedger {
    store: Arc<dyn RecordStore>,
    tab: String,
}

impl DeliveryLedger {
    pub fn new(store: Arc<dyn RecordStore>, tab: impl Into<String>) -> Self {
        Self { store, tab: tab.into() }
    }

    pub async fn find(&self, key: &str) -> Result<Option<DeliveryRecord>, StoreError> {
        let sheet = self.store.get_all_rows(&self.tab).await?;
        Ok(sheet.find_row_by_column_value(KEY, key).map(|row| record_from_row(&sheet, row)))
    }

    pub async fn reserve(
        &self,
        lead_id: &str,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Reservation, StoreError> {
        let key = delivery_key(lead_id, token);
        if let Some(existing) = self.find(&key).await? {
            return Ok(Reservation::AlreadyRecorded(existing));
        }
        let row = self
            .store
            .append_row(
                &self.tab,
                &[
                    CellUpdate::new(KEY, key.clone()),
                    CellUpdate::new(LEAD_ID, lead_id),
                    CellUpdate::new(TOKEN, token),
                    CellUpdate::new(STATE, DeliveryState::Reserved.as_str()),
                    CellUpdate::new(ATTEMPTED_AT, format_timestamp(now)),
                ],
            )
            .await?;
        Ok(Reservation::Reserved { row, key })
    }

    pub async fn mark(
        &self,
        row: usize,
        state: DeliveryState,
        detail: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.store
            .update_cells(
                &self.tab,
                row,
                &[
                    CellUpdate::new(STATE, state.as_str()),
                    CellUpdate::new(DETAIL, detail),
                    CellUpdate::new(ATTEMPTED_AT, format_timestamp(now)),
                ],
            )
            .await
    }
}

fn record_from_row(sheet: &SheetSnapshot, row: usize) -> DeliveryRecord {
    DeliveryRecord {
        row,
        key: sheet.text(row, KEY),
        lead_id: sheet.text(row, LEAD_ID),
        token: sheet.text(row, TOKEN),
        state: DeliveryState::parse(&sheet.text(row, STATE)),
        attempted_at: sheet.text(row, ATTEMPTED_AT),
        detail: sheet.text(row, DETAIL),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::{delivery_key, DeliveryLedger, DeliveryState, Reservation, HEADERS};
    use crate::memory::InMemoryRecordStore;
    use crate::store::RecordStore;

    #[test]
    fn key_is_stable_hex_sha256() {
        let key = delivery_key("L-1", "abc");
        assert_eq!(key.len(), 64);
        assert_eq!(key, delivery_key(" L-1 ", "abc "));
        assert_ne!(key, delivery_key("L-1", "abd"));
    }

    #[tokio::test]
    async fn second_reservation_sees_the_first() {
        let store = Arc::new(InMemoryRecordStore::new());
        store.ensure_sheet("Entregas", HEADERS).await.expect("sheet");
        let ledger = DeliveryLedger::new(store, "Entregas");

        let Reservation::Reserved { row, .. } =
            ledger.reserve("L-1", "tok", Utc::now()).await.expect("reserve")
        else {
            panic!("first reservation must succeed");
        };
        ledger.mark(row, DeliveryState::Sent, "SM123", Utc::now()).await.expect("mark");

        match ledger.reserve("L-1", "tok", Utc::now()).await.expect("reserve again") {
            Reservation::AlreadyRecorded(record) => {
                assert_eq!(record.state, Some(DeliveryState::Sent));
                assert_eq!(record.detail, "SM123");
            }
            other => panic!("expected an existing record, got {other:?}"),
        }

        assert!(matches!(
            ledger.reserve("L-1", "otro", Utc::now()).await.expect("new token"),
            Reservation::Reserved { row: 1, .. }
        ));
    }
}
