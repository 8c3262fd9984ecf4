use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use casedesk_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use casedesk_core::domain::lead::{Lead, LeadId};
use casedesk_core::domain::step::{FallbackStep, StepId};
use casedesk_core::errors::{ApplicationError, DomainError};
use casedesk_core::flows::engine::DEFAULT_PROCESSING_REPLY;
use casedesk_core::flows::{render_step, ConversationEngine, StepTable, TurnOutcome};
use casedesk_core::text::{detect_lead_source, normalize_phone};
use casedesk_db::repositories::{
    ConversationLogEntry, ConversationLogRepository, LeadRecord, LeadRepository, StepRepository,
};
use casedesk_db::StoreError;
use casedesk_messaging::webhook::strip_channel_prefix;

const CHANNEL: &str = "WHATSAPP";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyKind {
    /// First contact: the lead was created and greeted with the default step.
    Greeting,
    Rejected,
    Advanced,
    ReadyForProcessing,
    /// The lead is queued or being processed; nothing changed.
    StillProcessing,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundReply {
    pub lead_id: LeadId,
    pub step: StepId,
    pub reply: String,
    pub kind: ReplyKind,
}

/// Missing tabs or columns are configuration problems, everything else is persistence.
pub fn application_error(error: StoreError) -> ApplicationError {
    match error {
        StoreError::MissingSheet(_) | StoreError::MissingColumn { .. } => {
            ApplicationError::Configuration(error.to_string())
        }
        other => ApplicationError::Persistence(other.to_string()),
    }
}

pub struct ConversationService {
    leads: LeadRepository,
    steps: StepRepository,
    conversation_log: ConversationLogRepository,
    engine: ConversationEngine,
    default_step: StepId,
    audit: Arc<dyn AuditSink>,
}

impl ConversationService {
    pub fn new(
        leads: LeadRepository,
        steps: StepRepository,
        conversation_log: ConversationLogRepository,
        engine: ConversationEngine,
        default_step: StepId,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { leads, steps, conversation_log, engine, default_step, audit }
    }

    pub async fn handle_inbound(
        &self,
        from: &str,
        text: &str,
    ) -> Result<InboundReply, ApplicationError> {
        let correlation_id = Uuid::new_v4().to_string();
        let phone = strip_channel_prefix(from).to_string();
        let phone_normalized = normalize_phone(from);
        if phone_normalized.is_empty() {
            return Err(DomainError::InvariantViolation(
                "inbound message has no sender address".to_string(),
            )
            .into());
        }

        let existing =
            self.leads.find_by_phone(&phone_normalized).await.map_err(application_error)?;
        let Some(mut record) = existing else {
            return self.greet_new_lead(&phone, &phone_normalized, text, &correlation_id).await;
        };

        let lead_id = record.lead.id.clone().unwrap_or_else(|| LeadId(phone_normalized.clone()));
        let audit =
            AuditContext::conversation(Some(lead_id.clone()), phone.clone(), correlation_id.clone());

        if record.lead.status.is_in_flight() {
            self.audit.emit(
                audit
                    .event("flow.still_processing", AuditCategory::Flow, AuditOutcome::Skipped)
                    .with_metadata("status", record.lead.status.as_str()),
            );
            let step = record.lead.current_step.clone().unwrap_or_else(|| self.default_step.clone());
            let reply = InboundReply {
                lead_id,
                step,
                reply: DEFAULT_PROCESSING_REPLY.to_string(),
                kind: ReplyKind::StillProcessing,
            };
            self.log_turn(&record.lead, text, &reply, "").await;
            return Ok(reply);
        }

        let table = self.load_table().await?;
        let current_step = record
            .lead
            .current_step
            .as_ref()
            .map(|step| step.as_str().to_string())
            .unwrap_or_default();
        let outcome = self.engine.apply_with_audit(
            &table,
            &current_step,
            text,
            &mut record.lead,
            &FallbackStep::StayOnCurrent,
            self.audit.as_ref(),
            &audit,
        )?;

        let kind = match &outcome {
            TurnOutcome::Rejected { .. } => ReplyKind::Rejected,
            TurnOutcome::Advanced { .. } => ReplyKind::Advanced,
            TurnOutcome::ReadyForProcessing { .. } => ReplyKind::ReadyForProcessing,
        };
        if kind != ReplyKind::Rejected {
            record.lead.updated_at = Some(Utc::now());
            self.persist(&record, &correlation_id).await?;
        }

        info!(
            event_name = "agent.conversation.turn",
            correlation_id = %correlation_id,
            lead_id = %lead_id.0,
            step_id = %outcome.step_after(),
            outcome = outcome.event_type(),
            "inbound turn handled"
        );

        let reply = InboundReply {
            lead_id,
            step: outcome.step_after().clone(),
            reply: outcome.reply().to_string(),
            kind,
        };
        let errors = if kind == ReplyKind::Rejected { "VALIDACION" } else { "" };
        self.log_turn(&record.lead, text, &reply, errors).await;
        Ok(reply)
    }

    async fn greet_new_lead(
        &self,
        phone: &str,
        phone_normalized: &str,
        text: &str,
        correlation_id: &str,
    ) -> Result<InboundReply, ApplicationError> {
        let table = self.load_table().await?;
        let default_step = table.resolve(self.default_step.as_str())?;

        let now = Utc::now();
        let lead_id = LeadId::for_phone(phone_normalized);
        let mut lead = Lead::new(lead_id.clone(), phone, phone_normalized);
        lead.current_step = Some(default_step.id.clone());
        lead.lead_source = detect_lead_source(text).to_string();
        lead.created_at = Some(now);
        lead.updated_at = Some(now);

        let record = self.leads.create(lead).await.map_err(application_error)?;
        self.audit.emit(
            AuditContext::conversation(Some(lead_id.clone()), phone, correlation_id)
                .event("ingress.lead_created", AuditCategory::Ingress, AuditOutcome::Success)
                .with_metadata("lead_source", record.lead.lead_source.clone()),
        );
        info!(
            event_name = "agent.conversation.lead_created",
            correlation_id,
            lead_id = %lead_id.0,
            lead_source = %record.lead.lead_source,
            "new lead created on first contact"
        );

        let reply = InboundReply {
            lead_id,
            step: default_step.id.clone(),
            reply: render_step(default_step, &record.lead),
            kind: ReplyKind::Greeting,
        };
        self.log_turn(&record.lead, text, &reply, "").await;
        Ok(reply)
    }

    async fn load_table(&self) -> Result<StepTable, ApplicationError> {
        let definitions = self.steps.load_definitions().await.map_err(application_error)?;
        Ok(StepTable::from_definitions(definitions, self.default_step.clone())?)
    }

    async fn persist(&self, record: &LeadRecord, correlation_id: &str) -> Result<(), ApplicationError> {
        self.leads.save(record).await.map_err(|error| {
            warn!(
                event_name = "agent.conversation.persist_failed",
                correlation_id,
                row = record.row,
                error = %error,
                "failed to persist lead after inbound turn"
            );
            application_error(error)
        })
    }

    async fn log_turn(&self, lead: &Lead, inbound: &str, reply: &InboundReply, errors: &str) {
        let entry = ConversationLogEntry {
            log_id: Uuid::new_v4().to_string(),
            recorded_at: Utc::now(),
            phone: lead.phone.clone(),
            lead_id: reply.lead_id.0.clone(),
            step: reply.step.as_str().to_string(),
            inbound: inbound.to_string(),
            outbound: reply.reply.clone(),
            channel: CHANNEL.to_string(),
            lead_source: lead.lead_source.clone(),
            errors: errors.to_string(),
        };
        if let Err(error) = self.conversation_log.append(&entry).await {
            warn!(
                event_name = "agent.conversation.log_failed",
                lead_id = %reply.lead_id.0,
                error = %error,
                "failed to append conversation log"
            );
        }
    }
}
