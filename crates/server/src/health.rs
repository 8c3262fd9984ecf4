use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use casedesk_core::config::AppConfig;
use casedesk_db::{DbPool, RecordStore};
use chrono::Utc;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    store: Arc<dyn RecordStore>,
    leads_tab: String,
    worker_enabled: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub store: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool, store: Arc<dyn RecordStore>, config: &AppConfig) -> Router {
    let state = HealthState {
        db_pool,
        store,
        leads_tab: config.store.leads_tab.clone(),
        worker_enabled: config.worker.enabled,
    };
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let store = store_check(state.store.as_ref(), &state.leads_tab).await;
    let ready = database.status == "ready" && store.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: if state.worker_enabled {
                "casedesk-server running with the lead worker".to_string()
            } else {
                "casedesk-server running without the lead worker".to_string()
            },
        },
        database,
        store,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

async fn store_check(store: &dyn RecordStore, leads_tab: &str) -> HealthCheck {
    match store.get_all_rows(leads_tab).await {
        Ok(sheet) => {
            HealthCheck { status: "ready", detail: format!("{} leads in `{leads_tab}`", sheet.len()) }
        }
        Err(error) => HealthCheck { status: "degraded", detail: format!("store probe failed: {error}") },
    }
}
