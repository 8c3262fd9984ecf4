pub mod assignment;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod estimate;
pub mod flows;
pub mod text;
pub mod validation;

pub use assignment::{Assignment, AssignmentPolicy, AssignmentReason};
pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, AuditSource};
pub use domain::lawyer::{Lawyer, LawyerId};
pub use domain::lead::{CaseType, DateParts, Lead, LeadField, LeadId, ProcessingStatus, ReportToken};
pub use domain::step::{FallbackStep, InputType, StepDefinition, StepId};
pub use errors::{ApplicationError, DomainError, ErrorSeverity, InterfaceError};
pub use estimate::{estimate, Estimate};
pub use flows::{ConversationEngine, FlowError, StepTable, TurnOutcome};
pub use validation::ValidationRule;

pub use chrono;
pub use rust_decimal;
