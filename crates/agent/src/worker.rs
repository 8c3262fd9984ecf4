//! Background processing of leads that finished the intake dialogue.
//!
//! One cycle lists the lead tab, claims every pending (or stale running) lead
//! with a compare-and-set, and for each one computes the estimate, assigns a
//! lawyer, writes the summary and report link, persists the result and sends
//! the client a single notification through the delivery ledger.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use uuid::Uuid;

use casedesk_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use casedesk_core::config::AppConfig;
use casedesk_core::domain::lawyer::LawyerId;
use casedesk_core::domain::lead::{columns, Lead, LeadId, ProcessingStatus, ReportToken};
use casedesk_core::domain::step::StepId;
use casedesk_core::errors::{ApplicationError, ErrorSeverity};
use casedesk_core::text::greeting_name;
use casedesk_core::{estimate, Assignment, AssignmentPolicy};
use casedesk_db::repositories::logs::{STATUS_ASSIGNED, STATUS_UNASSIGNED};
use casedesk_db::repositories::{
    format_timestamp, DeliveryLedger, DeliveryState, KnowledgeRepository, LawyerRepository,
    LeadRecord, LeadRepository, ManagementLogEntry, ManagementLogRepository, Reservation,
    SystemConfigRepository,
};
use casedesk_db::{CellUpdate, StoreError};
use casedesk_messaging::MessageSender;

use crate::conversation::application_error;
use crate::summary::SummaryComposer;

const REPORT_BASE_KEYS: &[&str] = &["RUTA_REPORTE", "BASE_URL_WEB"];

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("lead table unavailable: {0}")]
    Store(#[from] StoreError),
}

impl WorkerError {
    pub fn severity(&self) -> ErrorSeverity {
        ApplicationError::from(self).severity()
    }
}

impl From<&WorkerError> for ApplicationError {
    fn from(error: &WorkerError) -> Self {
        match error {
            WorkerError::Store(StoreError::MissingSheet(sheet)) => {
                application_error(StoreError::MissingSheet(sheet.clone()))
            }
            WorkerError::Store(StoreError::MissingColumn { sheet, column }) => {
                application_error(StoreError::MissingColumn {
                    sheet: sheet.clone(),
                    column: column.clone(),
                })
            }
            WorkerError::Store(other) => ApplicationError::Persistence(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent { message_id: String },
    /// The ledger already holds a record for this lead and token.
    AlreadyDelivered,
    Failed { error: String },
    NoRecipient,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LeadOutcome {
    Processed { total: Decimal, lawyer: Option<LawyerId>, delivery: DeliveryOutcome },
    /// Another worker claimed the lead first.
    ClaimLost,
    Failed { error: String },
    Skipped { reason: String },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub scanned: usize,
    pub candidates: usize,
    pub outcomes: Vec<(Option<LeadId>, LeadOutcome)>,
}

impl CycleReport {
    pub fn processed(&self) -> usize {
        self.count(|outcome| matches!(outcome, LeadOutcome::Processed { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, LeadOutcome::Failed { .. }))
    }

    fn count(&self, predicate: impl Fn(&LeadOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, outcome)| predicate(outcome)).count()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerSettings {
    pub claim_timeout: chrono::Duration,
    pub post_process_step: StepId,
    pub public_base_url: Option<String>,
    pub policy: AssignmentPolicy,
}

impl WorkerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            claim_timeout: chrono::Duration::seconds(
                i64::try_from(config.worker.claim_timeout_secs).unwrap_or(i64::MAX / 1000),
            ),
            post_process_step: config.flow.post_process_step(),
            public_base_url: config.server.public_base_url.clone(),
            policy: config.worker.assignment_policy(),
        }
    }
}

#[async_trait]
pub trait PollScheduler: Send + Sync {
    /// Waits for the next poll. `false` means no further polls will come.
    async fn tick(&self) -> bool;
}

pub struct IntervalScheduler {
    interval: tokio::sync::Mutex<tokio::time::Interval>,
}

impl IntervalScheduler {
    /// Must be created inside a tokio runtime.
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        Self { interval: tokio::sync::Mutex::new(interval) }
    }
}

#[async_trait]
impl PollScheduler for IntervalScheduler {
    async fn tick(&self) -> bool {
        self.interval.lock().await.tick().await;
        true
    }
}

/// Polls only when triggered; ends once every trigger is dropped.
pub struct ManualScheduler {
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<()>>,
}

#[derive(Clone)]
pub struct ManualTrigger {
    sender: mpsc::UnboundedSender<()>,
}

impl ManualTrigger {
    pub fn fire(&self) -> bool {
        self.sender.send(()).is_ok()
    }
}

impl ManualScheduler {
    pub fn new() -> (Self, ManualTrigger) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { receiver: tokio::sync::Mutex::new(receiver) }, ManualTrigger { sender })
    }
}

#[async_trait]
impl PollScheduler for ManualScheduler {
    async fn tick(&self) -> bool {
        self.receiver.lock().await.recv().await.is_some()
    }
}

pub struct LeadWorker {
    leads: LeadRepository,
    lawyers: LawyerRepository,
    system: SystemConfigRepository,
    management_log: ManagementLogRepository,
    ledger: DeliveryLedger,
    knowledge: KnowledgeRepository,
    sender: Arc<dyn MessageSender>,
    composer: SummaryComposer,
    audit: Arc<dyn AuditSink>,
    settings: WorkerSettings,
    rng: Mutex<StdRng>,
}

struct Computed {
    total: Decimal,
    lawyer: Option<LawyerId>,
    token: ReportToken,
    message: String,
}

impl LeadWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        leads: LeadRepository,
        lawyers: LawyerRepository,
        system: SystemConfigRepository,
        management_log: ManagementLogRepository,
        ledger: DeliveryLedger,
        knowledge: KnowledgeRepository,
        sender: Arc<dyn MessageSender>,
        composer: SummaryComposer,
        audit: Arc<dyn AuditSink>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            leads,
            lawyers,
            system,
            management_log,
            ledger,
            knowledge,
            sender,
            composer,
            audit,
            settings,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Fixes the random lawyer pick.
    pub fn with_rng_seed(self, seed: u64) -> Self {
        Self { rng: Mutex::new(StdRng::seed_from_u64(seed)), ..self }
    }

    pub async fn run<S>(&self, scheduler: &S, mut shutdown: watch::Receiver<bool>)
    where
        S: PollScheduler + ?Sized,
    {
        info!(event_name = "agent.worker.started", "lead worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                ticked = scheduler.tick() => {
                    if !ticked {
                        break;
                    }
                    match self.run_cycle().await {
                        Ok(report) if report.candidates > 0 => info!(
                            event_name = "agent.worker.cycle_completed",
                            scanned = report.scanned,
                            candidates = report.candidates,
                            processed = report.processed(),
                            failed = report.failed(),
                            "worker cycle completed"
                        ),
                        Ok(_) => {}
                        Err(error) => warn!(
                            event_name = "agent.worker.cycle_failed",
                            severity = error.severity().as_str(),
                            error = %error,
                            "worker cycle failed; retrying on next tick"
                        ),
                    }
                }
            }
        }
        info!(event_name = "agent.worker.stopped", "lead worker stopped");
    }

    pub async fn run_cycle(&self) -> Result<CycleReport, WorkerError> {
        let now = Utc::now();
        let records = self.leads.list().await?;
        let mut report = CycleReport { scanned: records.len(), ..CycleReport::default() };

        for record in records.into_iter().filter(|record| self.is_candidate(&record.lead, now)) {
            report.candidates += 1;
            let lead_id = record.lead.id.clone();
            let outcome = self.process(record).await;
            report.outcomes.push((lead_id, outcome));
        }
        Ok(report)
    }

    fn is_candidate(&self, lead: &Lead, now: DateTime<Utc>) -> bool {
        match lead.status {
            ProcessingStatus::Pending => true,
            ProcessingStatus::Running => lead
                .claimed_at
                .map_or(true, |claimed_at| now - claimed_at >= self.settings.claim_timeout),
            _ => false,
        }
    }

    async fn process(&self, mut record: LeadRecord) -> LeadOutcome {
        let Some(lead_id) = record.lead.id.clone() else {
            warn!(
                event_name = "agent.worker.lead_without_id",
                row = record.row,
                "skipping lead without ID_Lead"
            );
            return LeadOutcome::Skipped { reason: "lead has no ID_Lead".to_string() };
        };
        let correlation_id = Uuid::new_v4().to_string();
        let audit = AuditContext::worker(lead_id.clone(), correlation_id.clone());

        let claimed_at = Utc::now();
        match self.leads.claim(&record, claimed_at).await {
            Ok(true) => {}
            Ok(false) => {
                info!(
                    event_name = "agent.worker.claim_lost",
                    correlation_id = %correlation_id,
                    lead_id = %lead_id.0,
                    "lead claimed by another worker"
                );
                return LeadOutcome::ClaimLost;
            }
            Err(error) => {
                warn!(
                    event_name = "agent.worker.claim_failed",
                    correlation_id = %correlation_id,
                    lead_id = %lead_id.0,
                    error = %error,
                    "failed to claim lead"
                );
                return LeadOutcome::Failed { error: format!("claim: {error}") };
            }
        }
        record.lead.status = ProcessingStatus::Running;
        record.lead.claimed_at = Some(claimed_at);
        record.lead.last_error.clear();

        let computed = match self.compute_and_persist(&mut record, &audit).await {
            Ok(computed) => computed,
            Err(error) => {
                let now = Utc::now();
                if let Err(mark_error) = self.leads.mark_failed(record.row, &error, now).await {
                    warn!(
                        event_name = "agent.worker.mark_failed_failed",
                        lead_id = %lead_id.0,
                        error = %mark_error,
                        "could not record the processing failure"
                    );
                }
                let notes = format!("{} | ERROR: {error}", format_timestamp(now));
                self.append_management_log(&lead_id, "", STATUS_UNASSIGNED, notes).await;
                self.audit.emit(
                    audit
                        .event("processing.lead_failed", AuditCategory::Processing, AuditOutcome::Failed)
                        .with_metadata("error", error.clone()),
                );
                warn!(
                    event_name = "agent.worker.lead_failed",
                    correlation_id = %correlation_id,
                    lead_id = %lead_id.0,
                    error = %error,
                    "lead processing failed"
                );
                return LeadOutcome::Failed { error };
            }
        };

        let delivery = self.deliver(&record, &lead_id, &computed, &audit).await;
        info!(
            event_name = "agent.worker.lead_processed",
            correlation_id = %correlation_id,
            lead_id = %lead_id.0,
            total = %computed.total,
            lawyer_id = computed.lawyer.as_ref().map(|id| id.0.as_str()).unwrap_or(""),
            delivery = ?delivery,
            "lead processed"
        );
        LeadOutcome::Processed { total: computed.total, lawyer: computed.lawyer, delivery }
    }

    async fn compute_and_persist(
        &self,
        record: &mut LeadRecord,
        audit: &AuditContext,
    ) -> Result<Computed, String> {
        let lead_id = audit.lead_id.clone().unwrap_or_else(|| LeadId(String::new()));
        let result = {
            let lead = &record.lead;
            estimate(
                lead.case_type,
                lead.monthly_salary,
                lead.employment_start.to_date(),
                lead.employment_end.to_date(),
            )
        };

        let roster = self.lawyers.roster().await.map_err(|error| format!("StoreError: {error}"))?;
        let assignment = {
            let mut rng = match self.rng.lock() {
                Ok(rng) => rng,
                Err(poisoned) => poisoned.into_inner(),
            };
            self.settings.policy.select(&roster, record.lead.monthly_salary, &mut *rng)
        };
        self.record_assignment(&lead_id, assignment.as_ref(), audit).await;

        let token = record.lead.report_token.clone().unwrap_or_else(ReportToken::generate);
        let report_link = self.report_link(&token).await;
        let knowledge = match self.knowledge.entries().await {
            Ok(entries) => entries,
            Err(error) => {
                warn!(
                    event_name = "agent.worker.knowledge_unavailable",
                    lead_id = %lead_id.0,
                    error = %error,
                    "continuing without legal context"
                );
                Vec::new()
            }
        };
        let summary = self.composer.compose(&record.lead, &knowledge).await;
        let estimate_text = result.render_text();
        let total = result.total_rounded();

        let lead = &mut record.lead;
        lead.estimate_text = estimate_text.clone();
        lead.estimate_total = Some(total);
        lead.estimate_breakdown_json = result.breakdown_json();
        lead.ai_summary = summary.text.clone();
        lead.report_token = Some(token.clone());
        lead.report_link = report_link.clone();
        match &assignment {
            Some(Assignment { lawyer, .. }) => {
                lead.assigned_lawyer_id = Some(lawyer.id.clone());
                lead.assigned_lawyer_name = lawyer.display_name();
                lead.lawyer_contact_link = lawyer.contact_link().unwrap_or_default();
            }
            None => {
                lead.assigned_lawyer_id = None;
                lead.assigned_lawyer_name.clear();
                lead.lawyer_contact_link.clear();
            }
        }
        lead.status = ProcessingStatus::Done;
        lead.current_step = Some(self.settings.post_process_step.clone());
        lead.last_error.clear();
        lead.updated_at = Some(Utc::now());

        self.leads.save(record).await.map_err(|error| format!("StoreError: {error}"))?;

        let lead = &record.lead;
        let message = compose_message(
            &lead.first_name,
            &summary.text,
            &estimate_text,
            assignment.as_ref().map(|assignment| assignment.lawyer.display_name()),
            &report_link,
        );
        self.append_management_log(
            &lead_id,
            assignment.as_ref().map(|assignment| assignment.lawyer.id.as_str()).unwrap_or(""),
            if assignment.is_some() { STATUS_ASSIGNED } else { STATUS_UNASSIGNED },
            format!(
                "{} | Asignado por sistema | {} | Tipo={} | Total={:.2}",
                format_timestamp(Utc::now()),
                lead.full_name(),
                lead.case_type.map(|case| case.as_str()).unwrap_or(""),
                total
            ),
        )
        .await;
        self.audit.emit(
            audit
                .event("processing.lead_processed", AuditCategory::Processing, AuditOutcome::Success)
                .with_metadata("total", format!("{total:.2}"))
                .with_metadata("summary_source", format!("{:?}", summary.source)),
        );

        Ok(Computed {
            total,
            lawyer: assignment.map(|assignment| assignment.lawyer.id),
            token,
            message,
        })
    }

    async fn record_assignment(
        &self,
        lead_id: &LeadId,
        assignment: Option<&Assignment>,
        audit: &AuditContext,
    ) {
        let Some(assignment) = assignment else {
            warn!(
                event_name = "agent.worker.no_lawyer",
                lead_id = %lead_id.0,
                "no active lawyer available"
            );
            self.audit.emit(audit.event(
                "assignment.no_lawyer",
                AuditCategory::Assignment,
                AuditOutcome::Skipped,
            ));
            return;
        };

        self.audit.emit(
            audit
                .event("assignment.lawyer_selected", AuditCategory::Assignment, AuditOutcome::Success)
                .with_metadata("lawyer_id", assignment.lawyer.id.as_str())
                .with_metadata("reason", assignment.reason.as_str()),
        );
        match self.lawyers.increment_load(&assignment.lawyer.id, Utc::now()).await {
            Ok(true) => {}
            Ok(false) => warn!(
                event_name = "agent.worker.load_not_updated",
                lawyer_id = %assignment.lawyer.id.0,
                "lawyer row vanished before its load was updated"
            ),
            Err(error) => warn!(
                event_name = "agent.worker.load_not_updated",
                lawyer_id = %assignment.lawyer.id.0,
                error = %error,
                "failed to increment lawyer load"
            ),
        }
    }

    async fn report_link(&self, token: &ReportToken) -> String {
        let settings = match self.system.load().await {
            Ok(settings) => settings,
            Err(error) => {
                warn!(
                    event_name = "agent.worker.system_config_unavailable",
                    error = %error,
                    "falling back to the configured public base url"
                );
                Default::default()
            }
        };
        let base = REPORT_BASE_KEYS
            .iter()
            .filter_map(|key| settings.get(*key))
            .map(|value| value.replace(['\r', '\n'], "").trim().to_string())
            .find(|value| !value.is_empty())
            .or_else(|| {
                self.settings
                    .public_base_url
                    .as_deref()
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(|value| format!("{}/reporte", value.trim_end_matches('/')))
            });
        report_link(base.as_deref(), token)
    }

    async fn deliver(
        &self,
        record: &LeadRecord,
        lead_id: &LeadId,
        computed: &Computed,
        audit: &AuditContext,
    ) -> DeliveryOutcome {
        let lead = &record.lead;
        let recipient =
            if lead.phone.trim().is_empty() { lead.phone_normalized.trim() } else { lead.phone.trim() };
        if recipient.is_empty() {
            self.audit.emit(audit.event(
                "delivery.no_recipient",
                AuditCategory::Delivery,
                AuditOutcome::Skipped,
            ));
            return DeliveryOutcome::NoRecipient;
        }

        let reservation = match self.ledger.reserve(&lead_id.0, &computed.token.0, Utc::now()).await {
            Ok(reservation) => reservation,
            Err(error) => {
                let error = format!("SendError: delivery ledger unavailable: {error}");
                self.record_send_error(record.row, lead_id, &error).await;
                return DeliveryOutcome::Failed { error };
            }
        };
        let row = match reservation {
            Reservation::Reserved { row, .. } => row,
            Reservation::AlreadyRecorded(existing) => {
                info!(
                    event_name = "agent.worker.delivery_skipped",
                    lead_id = %lead_id.0,
                    state = existing.state.map(|state| state.as_str()).unwrap_or(""),
                    "notification already recorded; not sending again"
                );
                self.audit.emit(audit.event(
                    "delivery.duplicate_skipped",
                    AuditCategory::Delivery,
                    AuditOutcome::Skipped,
                ));
                return DeliveryOutcome::AlreadyDelivered;
            }
        };

        let (state, detail, outcome) = match self.sender.send(recipient, &computed.message).await {
            Ok(receipt) => {
                self.audit.emit(
                    audit
                        .event("delivery.sent", AuditCategory::Delivery, AuditOutcome::Success)
                        .with_metadata("message_id", receipt.message_id.clone()),
                );
                let outcome = DeliveryOutcome::Sent { message_id: receipt.message_id.clone() };
                (DeliveryState::Sent, receipt.message_id, outcome)
            }
            Err(error) => {
                let error = format!("SendError: {error}");
                self.record_send_error(record.row, lead_id, &error).await;
                self.audit.emit(
                    audit
                        .event("delivery.failed", AuditCategory::Delivery, AuditOutcome::Failed)
                        .with_metadata("error", error.clone()),
                );
                (DeliveryState::Failed, error.clone(), DeliveryOutcome::Failed { error })
            }
        };
        if let Err(error) = self.ledger.mark(row, state, &detail, Utc::now()).await {
            warn!(
                event_name = "agent.worker.ledger_mark_failed",
                lead_id = %lead_id.0,
                error = %error,
                "failed to update delivery ledger"
            );
        }
        outcome
    }

    async fn record_send_error(&self, row: usize, lead_id: &LeadId, error: &str) {
        warn!(
            event_name = "agent.worker.delivery_failed",
            lead_id = %lead_id.0,
            error,
            "notification not delivered; lead stays DONE"
        );
        let updates = [
            CellUpdate::new(columns::LAST_ERROR, error),
            CellUpdate::new(columns::UPDATED_AT, format_timestamp(Utc::now())),
        ];
        if let Err(store_error) = self.leads.update_columns(row, &updates).await {
            warn!(
                event_name = "agent.worker.last_error_not_saved",
                lead_id = %lead_id.0,
                error = %store_error,
                "failed to record delivery error on the lead"
            );
        }
    }

    async fn append_management_log(
        &self,
        lead_id: &LeadId,
        lawyer_id: &str,
        status: &str,
        notes: String,
    ) {
        let entry = ManagementLogEntry {
            lead_id: lead_id.0.clone(),
            lawyer_id: lawyer_id.to_string(),
            status: status.to_string(),
            notes,
            recorded_at: Utc::now(),
        };
        if let Err(error) = self.management_log.append(&entry).await {
            warn!(
                event_name = "agent.worker.management_log_failed",
                lead_id = %lead_id.0,
                error = %error,
                "failed to append management log"
            );
        }
    }
}

/// `base/?token=<token>`; no base, no link.
pub fn report_link(base: Option<&str>, token: &ReportToken) -> String {
    let Some(base) = base.map(str::trim).filter(|base| !base.is_empty()) else {
        return String::new();
    };
    let separator = if base.ends_with('/') { "" } else { "/" };
    format!("{base}{separator}?token={}", token.0)
}

pub fn compose_message(
    first_name: &str,
    summary: &str,
    estimate_text: &str,
    lawyer_name: Option<String>,
    report_link: &str,
) -> String {
    let mut parts = vec![
        format!("✅ {}, ya tengo una *estimación preliminar*.\n", greeting_name(first_name)),
        format!("{summary}\n"),
        format!("{estimate_text}\n"),
    ];
    if let Some(name) = lawyer_name {
        parts.push(format!("👩‍⚖️ Abogada asignada: *{name}*.\n"));
    }
    if !report_link.is_empty() {
        parts.push(format!("📄 Reporte en web: {report_link}\n"));
    }
    parts.push("Si deseas ver opciones, escribe *menu*.\n".to_string());
    parts.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use casedesk_core::domain::lead::ReportToken;

    use super::{compose_message, report_link, ManualScheduler, PollScheduler};

    #[test]
    fn report_link_appends_slash_and_token() {
        let token = ReportToken("abc123".to_string());
        assert_eq!(
            report_link(Some("https://casos.mx/reporte"), &token),
            "https://casos.mx/reporte/?token=abc123"
        );
        assert_eq!(report_link(Some("https://casos.mx/r/"), &token), "https://casos.mx/r/?token=abc123");
        assert_eq!(report_link(Some("  "), &token), "");
        assert_eq!(report_link(None, &token), "");
    }

    #[test]
    fn message_lists_lawyer_and_link_only_when_present() {
        let full = compose_message(
            "ana",
            "Resumen",
            "Estimación",
            Some("Lic. Rivera".to_string()),
            "https://x/?token=t",
        );
        assert!(full.starts_with("✅ Ana, ya tengo una *estimación preliminar*."));
        assert!(full.contains("👩‍⚖️ Abogada asignada: *Lic. Rivera*."));
        assert!(full.contains("📄 Reporte en web: https://x/?token=t"));
        assert!(full.ends_with("escribe *menu*."));

        let bare = compose_message("", "Resumen", "Estimación", None, "");
        assert!(bare.starts_with("✅ Hola,"));
        assert!(!bare.contains("Abogada asignada"));
        assert!(!bare.contains("Reporte en web"));
    }

    #[tokio::test]
    async fn manual_scheduler_ends_when_triggers_drop() {
        let (scheduler, trigger) = ManualScheduler::new();
        assert!(trigger.fire());
        drop(trigger);
        assert!(scheduler.tick().await);
        let finished = tokio::time::timeout(Duration::from_secs(1), scheduler.tick()).await;
        assert_eq!(finished.ok(), Some(false));
    }
}
