use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::lead::LeadId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Ingress,
    Flow,
    Processing,
    Assignment,
    Delivery,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Rejected,
    Failed,
    Skipped,
}

/// Which side of the intake produced the event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSource {
    Conversation,
    Worker,
}

impl AuditSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::Worker => "worker",
        }
    }
}

/// Fields shared by every event of one inbound turn or one worker pass over a lead.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditContext {
    pub lead_id: Option<LeadId>,
    phone: Option<String>,
    correlation_id: String,
    source: AuditSource,
}

impl AuditContext {
    pub fn conversation(
        lead_id: Option<LeadId>,
        phone: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            lead_id,
            phone: Some(phone.into()),
            correlation_id: correlation_id.into(),
            source: AuditSource::Conversation,
        }
    }

    pub fn worker(lead_id: LeadId, correlation_id: impl Into<String>) -> Self {
        Self {
            lead_id: Some(lead_id),
            phone: None,
            correlation_id: correlation_id.into(),
            source: AuditSource::Worker,
        }
    }

    pub fn event(
        &self,
        event_type: impl Into<String>,
        category: AuditCategory,
        outcome: AuditOutcome,
    ) -> AuditEvent {
        AuditEvent {
            lead_id: self.lead_id.clone(),
            phone: self.phone.clone(),
            correlation_id: self.correlation_id.clone(),
            event_type: event_type.into(),
            category,
            source: self.source,
            outcome,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub lead_id: Option<LeadId>,
    /// Client address on the messaging channel; absent for worker events.
    pub phone: Option<String>,
    pub correlation_id: String,
    pub event_type: String,
    pub category: AuditCategory,
    pub source: AuditSource,
    pub outcome: AuditOutcome,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

/// Collects events for assertions in tests.
#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_else(|poisoned| {
            poisoned.into_inner().clone()
        })
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events().into_iter().map(|event| event.event_type).collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        let mut events = self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        events.push(event);
    }
}

/// Forwards audit events to the tracing subscriber.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        tracing::info!(
            event_name = %event.event_type,
            correlation_id = %event.correlation_id,
            lead_id = event.lead_id.as_ref().map(|id| id.0.as_str()).unwrap_or(""),
            source = event.source.as_str(),
            category = ?event.category,
            outcome = ?event.outcome,
            metadata = ?event.metadata,
            "audit event"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::{AuditCategory, AuditContext, AuditOutcome, AuditSink, AuditSource, InMemoryAuditSink};
    use crate::domain::lead::LeadId;

    #[test]
    fn conversation_events_carry_the_client_phone() {
        let sink = InMemoryAuditSink::default();
        let context = AuditContext::conversation(
            Some(LeadId("5215512345678-a1b2c3".to_owned())),
            "whatsapp:+5215512345678",
            "req-123",
        );
        sink.emit(
            context
                .event("flow.step_advanced", AuditCategory::Flow, AuditOutcome::Success)
                .with_metadata("from", "NOMBRE")
                .with_metadata("to", "APELLIDO"),
        );

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].correlation_id, "req-123");
        assert_eq!(events[0].phone.as_deref(), Some("whatsapp:+5215512345678"));
        assert_eq!(events[0].source, AuditSource::Conversation);
        assert_eq!(events[0].metadata.get("to").map(String::as_str), Some("APELLIDO"));
        assert_eq!(sink.event_types(), vec!["flow.step_advanced".to_string()]);
    }

    #[test]
    fn worker_events_have_no_phone() {
        let sink = InMemoryAuditSink::default();
        let context = AuditContext::worker(LeadId("L-7".to_owned()), "cycle-1");
        sink.emit(context.event("delivery.sent", AuditCategory::Delivery, AuditOutcome::Success));

        let event = &sink.events()[0];
        assert_eq!(event.phone, None);
        assert_eq!(event.source, AuditSource::Worker);
        assert_eq!(event.lead_id.as_ref().map(|id| id.0.as_str()), Some("L-7"));
    }
}
