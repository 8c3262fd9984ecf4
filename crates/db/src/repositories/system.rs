use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::warn;

use crate::store::{CellUpdate, RecordStore, StoreError};

pub const KEY: &str = "Clave";
pub const VALUE: &str = "Valor";
pub const HEADERS: &[&str] = &[KEY, VALUE];

/// Key/value pairs from the system configuration tab.
#[derive(Clone)]
pub struct SystemConfigRepository {
    store: Arc<dyn RecordStore>,
    tab: String,
}

impl SystemConfigRepository {
    pub fn new(store: Arc<dyn RecordStore>, tab: impl Into<String>) -> Self {
        Self { store, tab: tab.into() }
    }

    /// A missing tab reads as an empty map; later duplicate keys win.
    pub async fn load(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let sheet = match self.store.get_all_rows(&self.tab).await {
            Ok(sheet) => sheet,
            Err(StoreError::MissingSheet(tab)) => {
                warn!(event_name = "db.system_config.missing_sheet", tab = %tab, "system config tab not found");
                return Ok(BTreeMap::new());
            }
            Err(error) => return Err(error),
        };
        Ok((0..sheet.len())
            .filter_map(|row| {
                let key = sheet.text(row, KEY);
                (!key.is_empty()).then(|| (key, sheet.text(row, VALUE)))
            })
            .collect())
    }

    pub async fn upsert(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let sheet = self.store.get_all_rows(&self.tab).await?;
        let cells = [CellUpdate::new(KEY, key), CellUpdate::new(VALUE, value)];
        match sheet.find_row_by_column_value(KEY, key) {
            Some(row) => self.store.update_cells(&self.tab, row, &cells).await,
            None => self.store.append_row(&self.tab, &cells).await.map(|_| ()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{SystemConfigRepository, HEADERS};
    use crate::memory::InMemoryRecordStore;
    use crate::store::RecordStore;

    #[tokio::test]
    async fn missing_tab_is_empty_config() {
        let repo = SystemConfigRepository::new(Arc::new(InMemoryRecordStore::new()), "Config_Sistema");
        assert!(repo.load().await.expect("load").is_empty());
    }

    #[tokio::test]
    async fn upsert_replaces_existing_keys() {
        let store = Arc::new(InMemoryRecordStore::new());
        store.ensure_sheet("Config_Sistema", HEADERS).await.expect("sheet");
        let repo = SystemConfigRepository::new(store, "Config_Sistema");

        repo.upsert("RUTA_REPORTE", "https://old.example").await.expect("insert");
        repo.upsert("RUTA_REPORTE", "https://reportes.example").await.expect("update");
        repo.upsert("BASE_URL_WEB", "https://web.example").await.expect("insert");

        let config = repo.load().await.expect("load");
        assert_eq!(config.len(), 2);
        assert_eq!(config.get("RUTA_REPORTE").map(String::as_str), Some("https://reportes.example"));
    }
}
