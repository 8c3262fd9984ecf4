pub mod engine;
pub mod states;

pub use engine::{render_step, ConversationEngine, FlowError};
pub use states::{StepTable, TurnOutcome};
