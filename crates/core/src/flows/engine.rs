use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use crate::domain::lead::{Lead, ProcessingStatus};
use crate::domain::step::{FallbackStep, StepDefinition, StepId};
use crate::flows::states::{StepTable, TurnOutcome};
use crate::text::{fill_template, normalize_message, normalize_option, render_prompt};

pub const DEFAULT_END_STEP: &str = "EN_PROCESO";
pub const DEFAULT_RETRY_MESSAGE: &str = "No pude validar tu respuesta. Intenta de nuevo.";
pub const DEFAULT_PROCESSING_REPLY: &str = "Gracias, ya tengo lo necesario ✅\n\n\
Estoy preparando tu *estimación preliminar* y asignando a la abogada que llevará tu caso.\n\
En un momento te envío el resultado por este medio.";

// Free-text steps always follow their first transition.
const FREE_TEXT_OPTION: &str = "1";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowError {
    #[error("step table has no definition for the default step (requested `{requested}`)")]
    MissingDefaultStep { requested: String },
    #[error("step table is empty")]
    EmptyStepTable,
}

impl FlowError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::MissingDefaultStep { .. } | Self::EmptyStepTable)
    }
}

/// Drives one lead through the configured dialogue, one inbound message at a time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationEngine {
    end_step: StepId,
}

impl Default for ConversationEngine {
    fn default() -> Self {
        Self::new(StepId::new(DEFAULT_END_STEP))
    }
}

impl ConversationEngine {
    pub fn new(end_step: StepId) -> Self {
        Self { end_step }
    }

    pub fn end_step(&self) -> &StepId {
        &self.end_step
    }

    pub fn apply(
        &self,
        table: &StepTable,
        current_step: &str,
        raw_input: &str,
        lead: &mut Lead,
        fallback: &FallbackStep,
    ) -> Result<TurnOutcome, FlowError> {
        let step = table.resolve(current_step)?;
        let is_option = step.input_type.is_option();
        let answer =
            if is_option { normalize_option(raw_input) } else { normalize_message(raw_input) };

        if !accepts(step, &answer) {
            let error = step.error_message.trim();
            let error = if error.is_empty() { DEFAULT_RETRY_MESSAGE } else { error };
            return Ok(TurnOutcome::Rejected {
                step: step.id.clone(),
                reply: format!("{}\n\n{}", render_prompt(error), render_step(step, lead)),
            });
        }

        if let Some(field) = &step.target_field {
            lead.apply_field(field, &answer);
        }

        let selected = if is_option { answer.as_str() } else { FREE_TEXT_OPTION };
        let from = step.id.clone();
        match step.next_step(selected, fallback) {
            Some(next) if next != self.end_step => {
                let next_step = table.resolve(next.as_str())?;
                lead.current_step = Some(next_step.id.clone());
                Ok(TurnOutcome::Advanced {
                    from,
                    to: next_step.id.clone(),
                    reply: render_step(next_step, lead),
                })
            }
            _ => {
                lead.status = ProcessingStatus::Pending;
                lead.current_step = Some(self.end_step.clone());
                let reply = table
                    .get(&self.end_step)
                    .map(|end| render_step(end, lead))
                    .unwrap_or_else(|| DEFAULT_PROCESSING_REPLY.to_string());
                Ok(TurnOutcome::ReadyForProcessing { from, end_step: self.end_step.clone(), reply })
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn apply_with_audit<S>(
        &self,
        table: &StepTable,
        current_step: &str,
        raw_input: &str,
        lead: &mut Lead,
        fallback: &FallbackStep,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TurnOutcome, FlowError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(table, current_step, raw_input, lead, fallback);
        match &result {
            Ok(outcome) => {
                let event = match outcome {
                    TurnOutcome::Rejected { step, .. } => audit
                        .event(outcome.event_type(), AuditCategory::Flow, AuditOutcome::Rejected)
                        .with_metadata("step", step.as_str()),
                    TurnOutcome::Advanced { from, to, .. } => audit
                        .event(outcome.event_type(), AuditCategory::Flow, AuditOutcome::Success)
                        .with_metadata("from", from.as_str())
                        .with_metadata("to", to.as_str()),
                    TurnOutcome::ReadyForProcessing { from, end_step, .. } => audit
                        .event(outcome.event_type(), AuditCategory::Flow, AuditOutcome::Success)
                        .with_metadata("from", from.as_str())
                        .with_metadata("to", end_step.as_str())
                        .with_metadata("status", lead.status.as_str()),
                };
                sink.emit(event);
            }
            Err(error) => {
                sink.emit(
                    audit
                        .event("flow.configuration_error", AuditCategory::Flow, AuditOutcome::Failed)
                        .with_metadata("requested", current_step)
                        .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

fn accepts(step: &StepDefinition, answer: &str) -> bool {
    if !step.rule.is_valid(answer) {
        return false;
    }
    if step.input_type.is_option() && !step.valid_options.is_empty() {
        return step.valid_options.iter().any(|option| option == answer);
    }
    true
}

/// Prompt text with escaped line breaks expanded and `{Column}` placeholders filled.
pub fn render_step(step: &StepDefinition, lead: &Lead) -> String {
    fill_template(&render_prompt(&step.prompt), |column| lead.column_value(column))
}
