//! Agent Runtime - conversation orchestration and lead processing
//!
//! This crate wires the deterministic core to the outside world:
//! - Drives inbound WhatsApp turns through the configured step table (`conversation`)
//! - Processes leads that finished the dialogue: estimate, lawyer, report, notification (`worker`)
//! - Writes the empathetic case summary, with a deterministic fallback (`summary`, `llm`)
//!
//! # Key Types
//!
//! - `AgentRuntime` - builds every service once and hands out shared handles
//! - `ConversationService` - one inbound message in, one reply out
//! - `LeadWorker` - polls for pending leads on an injectable `PollScheduler`
//! - `TextGenerator` - pluggable trait for OpenAI-compatible chat completion APIs
//!
//! # Safety Principle
//!
//! The language model only writes prose. Amounts, lawyer selection and flow
//! transitions are decided by the deterministic core.

pub mod conversation;
pub mod llm;
pub mod runtime;
pub mod summary;
pub mod worker;

pub use conversation::{ConversationService, InboundReply, ReplyKind};
pub use llm::{generator_from_config, DisabledGenerator, OpenAiCompatibleGenerator, TextGenerator};
pub use runtime::AgentRuntime;
pub use summary::{Summary, SummaryComposer, SummarySource};
pub use worker::{
    CycleReport, DeliveryOutcome, IntervalScheduler, LeadOutcome, LeadWorker, ManualScheduler,
    ManualTrigger, PollScheduler, WorkerError, WorkerSettings,
};
