use std::str::FromStr;
use std::sync::Arc;

use casedesk_agent::llm::DisabledGenerator;
use casedesk_agent::{AgentRuntime, DeliveryOutcome, LeadOutcome, ManualScheduler, ReplyKind};
use casedesk_core::audit::InMemoryAuditSink;
use casedesk_core::config::AppConfig;
use casedesk_core::domain::lawyer::LawyerId;
use casedesk_core::domain::lead::{columns, ProcessingStatus};
use casedesk_core::domain::step::StepId;
use casedesk_db::repositories::{format_timestamp, LawyerRepository};
use casedesk_db::{CellUpdate, InMemoryRecordStore, RecordStore, SeedDataset};
use casedesk_messaging::{DeliveryError, MessageSender, RecordingSender};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use tokio::sync::watch;

const FROM: &str = "whatsapp:+5215512345678";
const PHONE: &str = "5215512345678";

struct Harness {
    runtime: AgentRuntime,
    store: Arc<dyn RecordStore>,
    sender: Arc<RecordingSender>,
    audit: InMemoryAuditSink,
    config: AppConfig,
}

async fn harness_with(sender: RecordingSender) -> Harness {
    let config = AppConfig::default();
    let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
    SeedDataset::load(store.clone(), &config.store, Some("https://casos.example/reporte"))
        .await
        .expect("seed");
    let sender = Arc::new(sender);
    let audit = InMemoryAuditSink::default();
    let runtime = AgentRuntime::new(
        &config,
        store.clone(),
        sender.clone() as Arc<dyn MessageSender>,
        Arc::new(DisabledGenerator),
        Arc::new(audit.clone()),
    );
    Harness { runtime, store, sender, audit, config }
}

async fn complete_dialogue(harness: &Harness, salary: &str) {
    let script = [
        "hola", "1", "1", "Ana", "López", "Me despidieron sin justificación", "2020", "1", "1",
        "2021", "1", "1", salary, "1",
    ];
    let conversation = harness.runtime.conversation();
    let mut last = None;
    for message in script {
        last = Some(conversation.handle_inbound(FROM, message).await.expect("turn").kind);
    }
    assert_eq!(last, Some(ReplyKind::ReadyForProcessing));
}

#[tokio::test]
async fn termination_case_is_estimated_assigned_and_notified_once() {
    let h = harness_with(RecordingSender::new()).await;
    complete_dialogue(&h, "30000").await;

    let report = h.runtime.worker().run_cycle().await.expect("cycle");
    assert_eq!(report.candidates, 1);
    let (_, outcome) = &report.outcomes[0];
    let LeadOutcome::Processed { total, lawyer, delivery } = outcome else {
        panic!("expected a processed lead, got {outcome:?}");
    };
    assert_eq!(*total, Decimal::from_str("125095.89").expect("decimal"));
    assert!(lawyer.is_some());
    assert!(matches!(delivery, DeliveryOutcome::Sent { .. }));

    let record = h.runtime.leads().find_by_phone(PHONE).await.expect("find").expect("lead");
    assert_eq!(record.lead.status, ProcessingStatus::Done);
    assert_eq!(record.lead.current_step, Some(StepId::new("CLIENTE_MENU")));
    assert_eq!(record.lead.estimate_total, Some(*total));
    assert!(record.lead.report_link.starts_with("https://casos.example/reporte/?token="));
    assert!(record.lead.last_error.is_empty());
    assert!(!record.lead.assigned_lawyer_name.is_empty());

    let sent = h.sender.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "+5215512345678");
    assert!(sent[0].body.contains("125,095.89"));
    assert!(sent[0].body.contains("Abogada asignada"));

    let admin = h.store.get_all_rows(&h.config.store.management_log_tab).await.expect("admin");
    assert_eq!(admin.len(), 1);
    assert_eq!(admin.text(0, "Estatus"), "ASIGNADO");
    assert!(admin.text(0, "Notas").contains("Total=125095.89"));

    let ledger = h.store.get_all_rows(&h.config.store.delivery_ledger_tab).await.expect("ledger");
    assert_eq!(ledger.text(0, "Estado"), "SENT");

    let again = h.runtime.worker().run_cycle().await.expect("second cycle");
    assert_eq!(again.candidates, 0);
    assert!(h.audit.event_types().contains(&"processing.lead_processed".to_string()));
}

#[tokio::test]
async fn reprocessing_the_same_token_never_sends_twice() {
    let h = harness_with(RecordingSender::new()).await;
    complete_dialogue(&h, "30000").await;
    h.runtime.worker().run_cycle().await.expect("first cycle");

    let record = h.runtime.leads().find_by_phone(PHONE).await.expect("find").expect("lead");
    h.runtime
        .leads()
        .update_columns(
            record.row,
            &[CellUpdate::new(columns::PROCESSING_STATUS, ProcessingStatus::Pending.as_str())],
        )
        .await
        .expect("requeue");

    let report = h.runtime.worker().run_cycle().await.expect("second cycle");
    assert!(matches!(
        &report.outcomes[0].1,
        LeadOutcome::Processed { delivery: DeliveryOutcome::AlreadyDelivered, .. }
    ));
    assert_eq!(h.sender.sent().await.len(), 1);
}

#[tokio::test]
async fn high_salary_goes_to_the_senior_lawyer() {
    let h = harness_with(RecordingSender::new()).await;
    complete_dialogue(&h, "60000").await;

    let report = h.runtime.worker().run_cycle().await.expect("cycle");
    assert!(matches!(
        &report.outcomes[0].1,
        LeadOutcome::Processed { lawyer: Some(id), .. } if *id == LawyerId("A01".to_string())
    ));

    let roster = LawyerRepository::new(h.store.clone(), h.config.store.lawyers_tab.clone())
        .roster()
        .await
        .expect("roster");
    let senior = roster.iter().find(|lawyer| lawyer.id.0 == "A01").expect("senior");
    assert_eq!(senior.daily_load, 1);
}

#[tokio::test]
async fn send_failure_keeps_the_lead_done_with_the_error() {
    let h = harness_with(RecordingSender::failing(DeliveryError::Transport("offline".into()))).await;
    complete_dialogue(&h, "30000").await;

    let report = h.runtime.worker().run_cycle().await.expect("cycle");
    assert!(matches!(
        &report.outcomes[0].1,
        LeadOutcome::Processed { delivery: DeliveryOutcome::Failed { .. }, .. }
    ));

    let record = h.runtime.leads().find_by_phone(PHONE).await.expect("find").expect("lead");
    assert_eq!(record.lead.status, ProcessingStatus::Done);
    assert!(record.lead.last_error.starts_with("SendError:"));

    let ledger = h.store.get_all_rows(&h.config.store.delivery_ledger_tab).await.expect("ledger");
    assert_eq!(ledger.text(0, "Estado"), "FAILED");
}

#[tokio::test]
async fn unavailable_lawyer_roster_marks_the_lead_failed() {
    let h = harness_with(RecordingSender::new()).await;
    complete_dialogue(&h, "30000").await;

    let mut config = h.config.clone();
    config.store.lawyers_tab = "Sin_Abogados".to_string();
    let runtime = AgentRuntime::new(
        &config,
        h.store.clone(),
        h.sender.clone() as Arc<dyn MessageSender>,
        Arc::new(DisabledGenerator),
        Arc::new(InMemoryAuditSink::default()),
    );

    let report = runtime.worker().run_cycle().await.expect("cycle");
    assert_eq!(report.failed(), 1);
    let record = runtime.leads().find_by_phone(PHONE).await.expect("find").expect("lead");
    assert_eq!(record.lead.status, ProcessingStatus::Failed);
    assert!(record.lead.last_error.starts_with("StoreError:"));
    assert!(h.sender.sent().await.is_empty());
}

#[tokio::test]
async fn stale_running_claim_is_recovered_but_fresh_one_is_left_alone() {
    let h = harness_with(RecordingSender::new()).await;
    complete_dialogue(&h, "30000").await;
    let record = h.runtime.leads().find_by_phone(PHONE).await.expect("find").expect("lead");

    let fresh = format_timestamp(Utc::now());
    h.runtime
        .leads()
        .update_columns(
            record.row,
            &[
                CellUpdate::new(columns::PROCESSING_STATUS, ProcessingStatus::Running.as_str()),
                CellUpdate::new(columns::CLAIMED_AT, fresh),
            ],
        )
        .await
        .expect("fresh claim");
    assert_eq!(h.runtime.worker().run_cycle().await.expect("cycle").candidates, 0);

    let stale = format_timestamp(Utc::now() - Duration::minutes(10));
    h.runtime
        .leads()
        .update_columns(record.row, &[CellUpdate::new(columns::CLAIMED_AT, stale)])
        .await
        .expect("stale claim");
    let report = h.runtime.worker().run_cycle().await.expect("cycle");
    assert_eq!(report.processed(), 1);
}

#[tokio::test]
async fn worker_loop_runs_on_manual_ticks_and_stops_on_shutdown() {
    let h = harness_with(RecordingSender::new()).await;
    complete_dialogue(&h, "30000").await;

    let (scheduler, trigger) = ManualScheduler::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = h.runtime.worker();
    let handle = tokio::spawn(async move { worker.run(&scheduler, shutdown_rx).await });

    assert!(trigger.fire());
    for _ in 0..50 {
        if !h.sender.sent().await.is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(h.sender.sent().await.len(), 1);

    shutdown_tx.send(true).expect("shutdown");
    tokio::time::timeout(std::time::Duration::from_secs(1), handle)
        .await
        .expect("worker stopped")
        .expect("join");
}
