pub mod connection;
pub mod fixtures;
pub mod memory;
pub mod migrations;
pub mod repositories;
pub mod sqlite;
pub mod store;

pub use connection::{connect_with_config, connect_with_settings, DbPool};
pub use fixtures::{ensure_layout, SeedDataset, SeedResult, VerificationResult};
pub use memory::InMemoryRecordStore;
pub use sqlite::SqliteRecordStore;
pub use store::{CellGuard, CellUpdate, RecordStore, SheetSnapshot, StoreError};
