//! Typed views over the record store tabs.

pub mod delivery;
pub mod knowledge;
pub mod lawyers;
pub mod leads;
pub mod logs;
pub mod steps;
pub mod system;

use chrono::{DateTime, SecondsFormat, Utc};

pub use delivery::{delivery_key, DeliveryLedger, DeliveryRecord, DeliveryState, Reservation};
pub use knowledge::{KnowledgeEntry, KnowledgeRepository};
pub use lawyers::LawyerRepository;
pub use leads::{lead_from_row, lead_to_cells, LeadRecord, LeadRepository};
pub use logs::{
    ConversationLogEntry, ConversationLogRepository, ManagementLogEntry, ManagementLogRepository,
};
pub use steps::{step_from_row, step_to_cells, StepRepository};
pub use system::SystemConfigRepository;

/// Timestamps are stored as RFC 3339 text with second precision.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim()).ok().map(|at| at.with_timezone(&Utc))
}
