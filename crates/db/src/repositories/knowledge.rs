use std::sync::Arc;

use crate::store::{RecordStore, StoreError};

pub const TITLE: &str = "Titulo_Visible";
pub const KEYWORDS: &str = "Palabras_Clave";
pub const CONTENT: &str = "Contenido_Legal";
pub const HEADERS: &[&str] = &[TITLE, KEYWORDS, CONTENT];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KnowledgeEntry {
    pub title: String,
    pub keywords: String,
    pub content: String,
}

impl KnowledgeEntry {
    /// Title, keywords and content joined, for keyword matching.
    pub fn searchable_text(&self) -> String {
        format!("{} {} {}", self.title, self.keywords, self.content).to_lowercase()
    }
}

#[derive(Clone)]
pub struct KnowledgeRepository {
    store: Arc<dyn RecordStore>,
    tab: String,
}

impl KnowledgeRepository {
    pub fn new(store: Arc<dyn RecordStore>, tab: impl Into<String>) -> Self {
        Self { store, tab: tab.into() }
    }

    /// The tab is optional; without it there is no legal context.
    pub async fn entries(&self) -> Result<Vec<KnowledgeEntry>, StoreError> {
        let sheet = match self.store.get_all_rows(&self.tab).await {
            Ok(sheet) => sheet,
            Err(StoreError::MissingSheet(_)) => return Ok(Vec::new()),
            Err(error) => return Err(error),
        };
        Ok((0..sheet.len())
            .map(|row| KnowledgeEntry {
                title: sheet.text(row, TITLE),
                keywords: sheet.text(row, KEYWORDS),
                content: sheet.text(row, CONTENT),
            })
            .filter(|entry| !entry.content.is_empty())
            .collect())
    }
}
