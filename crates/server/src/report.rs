//! Client-facing case report linked from the WhatsApp notification.
//!
//! `GET /reporte?token=...` (or `?lead_id=...`) renders the stored estimate,
//! summary and assigned lawyer as an HTML page. Lookup is by token first.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Html,
    routing::get,
    Router,
};
use casedesk_agent::conversation::application_error;
use casedesk_core::domain::lead::Lead;
use casedesk_core::errors::InterfaceError;
use casedesk_core::text::format_amount;
use casedesk_db::repositories::{LeadRecord, LeadRepository};
use casedesk_db::StoreError;
use serde::{Deserialize, Serialize};
use tera::{Context, Tera};
use tracing::{info, warn};
use uuid::Uuid;

pub const REPORT_TEMPLATE: &str = "report.html";
const FIRM_NAME: &str = "Tu Derecho Laboral México";

/// Labels for the keys of the persisted estimate breakdown, in display order.
const BREAKDOWN_LABELS: &[(&str, &str)] = &[
    ("salario_diario", "Salario diario"),
    ("anios_trabajados", "Antigüedad (años)"),
    ("indemnizacion_90", "3 meses de salario (90 días)"),
    ("ind_20", "20 días por año"),
    ("aguinaldo_prop", "Aguinaldo proporcional"),
];

#[derive(Clone)]
pub struct ReportState {
    leads: LeadRepository,
    templates: Arc<Tera>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    pub token: Option<String>,
    pub lead_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct BreakdownItem {
    label: &'static str,
    value: String,
}

/// Templates compiled into the binary; `.html` names are autoescaped.
pub fn templates() -> Result<Arc<Tera>, tera::Error> {
    let mut tera = Tera::default();
    tera.add_raw_template(REPORT_TEMPLATE, include_str!("../templates/report.html"))?;
    Ok(Arc::new(tera))
}

pub fn router(leads: LeadRepository, templates: Arc<Tera>) -> Router {
    // Generated links take the form `<base>/reporte/?token=...`.
    Router::new()
        .route("/reporte", get(view_report))
        .route("/reporte/", get(view_report))
        .with_state(ReportState { leads, templates })
}

fn error_page(error: &InterfaceError) -> (StatusCode, Html<String>) {
    let status = match error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Html(format!("<h1>Informe no disponible</h1><p>{}</p>", error.user_message())))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

async fn find_lead(
    leads: &LeadRepository,
    token: Option<&str>,
    lead_id: Option<&str>,
) -> Result<Option<LeadRecord>, StoreError> {
    if let Some(token) = token {
        if let Some(record) = leads.find_by_token(token).await? {
            return Ok(Some(record));
        }
    }
    match lead_id {
        Some(id) => leads.find_by_id(id).await,
        None => Ok(None),
    }
}

async fn view_report(
    State(state): State<ReportState>,
    Query(query): Query<ReportQuery>,
) -> Result<Html<String>, (StatusCode, Html<String>)> {
    let correlation_id = Uuid::new_v4().to_string();
    let token = non_blank(query.token);
    let lead_id = non_blank(query.lead_id);
    if token.is_none() && lead_id.is_none() {
        return Err(error_page(&InterfaceError::BadRequest {
            message: "token or lead_id is required".to_string(),
            correlation_id,
        }));
    }

    let record = find_lead(&state.leads, token.as_deref(), lead_id.as_deref())
        .await
        .map_err(|error| {
            let interface = application_error(error).into_interface(correlation_id.clone());
            warn!(
                event_name = "http.report.lookup_failed",
                correlation_id = %correlation_id,
                error = %interface,
                "report lookup failed"
            );
            error_page(&interface)
        })?;
    let Some(record) = record else {
        return Err(error_page(&InterfaceError::NotFound {
            message: "no lead matches the report query".to_string(),
            correlation_id,
        }));
    };

    let html = state.templates.render(REPORT_TEMPLATE, &report_context(&record.lead)).map_err(
        |error| {
            warn!(
                event_name = "http.report.render_failed",
                correlation_id = %correlation_id,
                error = ?error,
                "report template failed to render"
            );
            error_page(&InterfaceError::Internal {
                message: error.to_string(),
                correlation_id: correlation_id.clone(),
            })
        },
    )?;

    info!(
        event_name = "http.report.viewed",
        correlation_id = %correlation_id,
        lead_id = %record.lead.id.as_ref().map(|id| id.0.as_str()).unwrap_or("unknown"),
        "case report rendered"
    );
    Ok(Html(html))
}

fn breakdown_items(raw_json: &str) -> Vec<BreakdownItem> {
    let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(raw_json)
    else {
        return Vec::new();
    };
    BREAKDOWN_LABELS
        .iter()
        .filter_map(|(key, label)| {
            let value = map.get(*key)?.as_str()?;
            let amount = value.parse::<rust_decimal::Decimal>().ok()?;
            let value = if *key == "anios_trabajados" {
                amount.round_dp(2).to_string()
            } else {
                format!("${}", format_amount(amount))
            };
            Some(BreakdownItem { label, value })
        })
        .collect()
}

fn report_context(lead: &Lead) -> Context {
    let mut context = Context::new();
    let client_name = lead.full_name();
    let client_name = if client_name.is_empty() { "Cliente".to_string() } else { client_name };
    context.insert("firm_name", FIRM_NAME);
    context.insert("lead_id", &lead.id.as_ref().map(|id| id.0.clone()).unwrap_or_default());
    context.insert("status", lead.status.as_str());
    context.insert("client_name", &client_name);
    context.insert(
        "case_type",
        lead.case_type.map(|case| case.display_es()).unwrap_or("sin definir"),
    );
    context.insert("description", lead.description.trim());
    context.insert("breakdown", &breakdown_items(&lead.estimate_breakdown_json));
    context.insert("total", &lead.estimate_total.map(format_amount).unwrap_or_default());
    context.insert("summary", lead.ai_summary.trim());
    context.insert("lawyer_name", lead.assigned_lawyer_name.trim());
    context.insert("lawyer_contact_link", lead.lawyer_contact_link.trim());
    context
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use casedesk_core::config::StoreConfig;
    use casedesk_core::domain::lead::{CaseType, Lead, LeadId, ProcessingStatus, ReportToken};
    use casedesk_core::estimate;
    use casedesk_db::repositories::LeadRepository;
    use casedesk_db::{ensure_layout, InMemoryRecordStore, RecordStore};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use tower::ServiceExt;

    use super::{router, templates};

    async fn app() -> Router {
        let tabs = StoreConfig::default();
        let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
        ensure_layout(store.as_ref(), &tabs).await.expect("layout");
        let leads = LeadRepository::new(store, tabs.leads_tab);

        let mut lead = Lead::new(LeadId("L-77".into()), "+5215500000077", "5215500000077");
        lead.first_name = "Ana".into();
        lead.last_name = "López".into();
        lead.case_type = Some(CaseType::Termination);
        lead.status = ProcessingStatus::Done;
        lead.report_token = Some(ReportToken("tok-abc".into()));
        lead.ai_summary = "Resumen <script>alert(1)</script>".into();
        lead.assigned_lawyer_name = "Lic. Rivera".into();
        let result = estimate(
            Some(CaseType::Termination),
            Some(Decimal::from(30_000)),
            NaiveDate::from_ymd_opt(2020, 1, 1),
            NaiveDate::from_ymd_opt(2021, 1, 1),
        );
        lead.estimate_total = Some(result.total_rounded());
        lead.estimate_breakdown_json = result.breakdown_json();
        leads.create(lead).await.expect("lead");

        router(leads, templates().expect("templates"))
    }

    async fn get(uri: &str) -> (StatusCode, String) {
        let response = app()
            .await
            .oneshot(Request::get(uri).body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, String::from_utf8(bytes.to_vec()).expect("utf8"))
    }

    #[tokio::test]
    async fn token_renders_the_report_with_escaped_content() {
        let (status, body) = get("/reporte?token=tok-abc").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Ana López"));
        assert!(body.contains("$125,095.89"));
        assert!(body.contains("$90,000.00"));
        assert!(body.contains("Lic. Rivera"));
        assert!(body.contains("&lt;script&gt;"));
        assert!(!body.contains("<script>"));
    }

    #[tokio::test]
    async fn generated_links_with_trailing_slash_resolve() {
        let (status, body) = get("/reporte/?token=tok-abc").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Ana López"));
    }

    #[tokio::test]
    async fn lead_id_is_used_when_the_token_does_not_match() {
        let (status, body) = get("/reporte?token=otro&lead_id=L-77").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("L-77"));
    }

    #[tokio::test]
    async fn missing_parameters_are_a_bad_request() {
        let (status, _) = get("/reporte").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get("/reporte?token=%20%20").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_token_is_not_found() {
        let (status, body) = get("/reporte?token=nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("No encontramos el caso solicitado."));
    }
}
