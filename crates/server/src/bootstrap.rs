use std::sync::Arc;

use axum::Router;
use casedesk_agent::AgentRuntime;
use casedesk_core::config::{AppConfig, ConfigError, LoadOptions};
use casedesk_db::{connect_with_config, ensure_layout, migrations, DbPool, RecordStore};
use casedesk_db::{SqliteRecordStore, StoreError};
use tera::Tera;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{health, inbound, report};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: AgentRuntime,
    pub templates: Arc<Tera>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("record store layout failed: {0}")]
    Layout(#[source] StoreError),
    #[error("report templates failed to compile: {0}")]
    Templates(#[from] tera::Error),
    #[error(transparent)]
    Runtime(#[from] anyhow::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let store: Arc<dyn RecordStore> = Arc::new(SqliteRecordStore::new(db_pool.clone()));
    ensure_layout(store.as_ref(), &config.store).await.map_err(BootstrapError::Layout)?;

    let runtime = AgentRuntime::from_config(&config, store)?;
    info!(
        event_name = "system.bootstrap.runtime_ready",
        correlation_id = "bootstrap",
        messaging_enabled = config.messaging.enabled,
        worker_enabled = config.worker.enabled,
        "agent runtime wired"
    );

    let templates = report::templates()?;

    Ok(Application { config, db_pool, runtime, templates })
}

impl Application {
    pub fn router(&self) -> Router {
        Router::new()
            .merge(inbound::router(self.runtime.conversation()))
            .merge(report::router(self.runtime.leads().clone(), self.templates.clone()))
            .merge(health::router(self.db_pool.clone(), self.runtime.store(), &self.config))
            .layer(TraceLayer::new_for_http())
    }
}
