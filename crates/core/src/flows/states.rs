use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::step::{StepDefinition, StepId};
use crate::flows::engine::FlowError;

/// Result of feeding one inbound message to the conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnOutcome {
    /// Input failed validation; the lead was not touched.
    Rejected { step: StepId, reply: String },
    Advanced { from: StepId, to: StepId, reply: String },
    /// The dialogue reached its end marker and the lead now awaits processing.
    ReadyForProcessing { from: StepId, end_step: StepId, reply: String },
}

impl TurnOutcome {
    pub fn reply(&self) -> &str {
        match self {
            Self::Rejected { reply, .. }
            | Self::Advanced { reply, .. }
            | Self::ReadyForProcessing { reply, .. } => reply,
        }
    }

    /// Step the lead rests on after this turn.
    pub fn step_after(&self) -> &StepId {
        match self {
            Self::Rejected { step, .. } => step,
            Self::Advanced { to, .. } => to,
            Self::ReadyForProcessing { end_step, .. } => end_step,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "flow.input_rejected",
            Self::Advanced { .. } => "flow.step_advanced",
            Self::ReadyForProcessing { .. } => "flow.ready_for_processing",
        }
    }
}

/// The step table loaded for one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepTable {
    steps: HashMap<StepId, StepDefinition>,
    default_step: StepId,
}

impl StepTable {
    /// Later rows win when the same id appears twice.
    pub fn from_definitions<I>(definitions: I, default_step: StepId) -> Result<Self, FlowError>
    where
        I: IntoIterator<Item = StepDefinition>,
    {
        let mut steps = HashMap::new();
        for definition in definitions {
            let id = definition.id.clone();
            if steps.insert(id.clone(), definition).is_some() {
                warn!(
                    event_name = "core.flow.duplicate_step",
                    step_id = %id,
                    "step defined more than once; keeping the last definition"
                );
            }
        }
        if steps.is_empty() {
            return Err(FlowError::EmptyStepTable);
        }
        if !steps.contains_key(&default_step) {
            return Err(FlowError::MissingDefaultStep { requested: default_step.0.clone() });
        }
        Ok(Self { steps, default_step })
    }

    pub fn default_step(&self) -> &StepId {
        &self.default_step
    }

    pub fn get(&self, id: &StepId) -> Option<&StepDefinition> {
        self.steps.get(id)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Exact lookup, falling back to the default step on a miss.
    pub fn resolve(&self, requested: &str) -> Result<&StepDefinition, FlowError> {
        let requested = requested.trim();
        let id = StepId::parse(requested).unwrap_or_else(|| self.default_step.clone());
        if let Some(step) = self.steps.get(&id) {
            return Ok(step);
        }
        if id != self.default_step {
            if let Some(step) = self.steps.get(&self.default_step) {
                return Ok(step);
            }
        }
        Err(FlowError::MissingDefaultStep { requested: requested.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::StepTable;
    use crate::domain::step::{StepDefinition, StepId};
    use crate::flows::engine::FlowError;

    fn table() -> StepTable {
        StepTable::from_definitions(
            vec![
                StepDefinition::new(StepId::new("INICIO"), "Hola"),
                StepDefinition::new(StepId::new("NOMBRE"), "Tu nombre"),
            ],
            StepId::new("INICIO"),
        )
        .expect("valid table")
    }

    #[test]
    fn resolve_finds_exact_step() {
        assert_eq!(table().resolve(" NOMBRE ").expect("step").id.as_str(), "NOMBRE");
    }

    #[test]
    fn blank_or_unknown_ids_fall_back_to_default() {
        let table = table();
        assert_eq!(table.resolve("").expect("default").id.as_str(), "INICIO");
        assert_eq!(table.resolve("NO_EXISTE").expect("default").id.as_str(), "INICIO");
    }

    #[test]
    fn table_without_default_is_a_configuration_error() {
        let error = StepTable::from_definitions(
            vec![StepDefinition::new(StepId::new("NOMBRE"), "Tu nombre")],
            StepId::new("INICIO"),
        )
        .expect_err("default is missing");
        assert_eq!(error, FlowError::MissingDefaultStep { requested: "INICIO".to_string() });
        assert!(error.is_configuration());

        let empty = StepTable::from_definitions(Vec::new(), StepId::new("INICIO"))
            .expect_err("empty table");
        assert_eq!(empty, FlowError::EmptyStepTable);
    }

    #[test]
    fn duplicate_ids_keep_the_last_definition() {
        let table = StepTable::from_definitions(
            vec![
                StepDefinition::new(StepId::new("INICIO"), "viejo"),
                StepDefinition::new(StepId::new("INICIO"), "nuevo"),
            ],
            StepId::new("INICIO"),
        )
        .expect("valid table");
        assert_eq!(table.len(), 1);
        assert_eq!(table.resolve("INICIO").expect("step").prompt, "nuevo");
    }
}
