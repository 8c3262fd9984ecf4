use std::sync::Arc;

use anyhow::{Context, Result};

use casedesk_core::audit::{AuditSink, TracingAuditSink};
use casedesk_core::config::AppConfig;
use casedesk_core::flows::ConversationEngine;
use casedesk_db::repositories::{
    ConversationLogRepository, DeliveryLedger, KnowledgeRepository, LawyerRepository,
    LeadRepository, ManagementLogRepository, StepRepository, SystemConfigRepository,
};
use casedesk_db::RecordStore;
use casedesk_messaging::{sender_from_config, MessageSender};

use crate::conversation::ConversationService;
use crate::llm::{generator_from_config, TextGenerator};
use crate::summary::SummaryComposer;
use crate::worker::{LeadWorker, WorkerSettings};

/// Every service built once over a shared store and shared adapters.
pub struct AgentRuntime {
    store: Arc<dyn RecordStore>,
    conversation: Arc<ConversationService>,
    worker: Arc<LeadWorker>,
    leads: LeadRepository,
}

impl AgentRuntime {
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn RecordStore>,
        sender: Arc<dyn MessageSender>,
        generator: Arc<dyn TextGenerator>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let tabs = &config.store;
        let leads = LeadRepository::new(store.clone(), tabs.leads_tab.clone());

        let conversation = ConversationService::new(
            leads.clone(),
            StepRepository::new(store.clone(), tabs.steps_tab.clone()),
            ConversationLogRepository::new(store.clone(), tabs.conversation_log_tab.clone()),
            ConversationEngine::new(config.flow.end_step()),
            config.flow.default_step(),
            audit.clone(),
        );

        let worker = LeadWorker::new(
            leads.clone(),
            LawyerRepository::new(store.clone(), tabs.lawyers_tab.clone()),
            SystemConfigRepository::new(store.clone(), tabs.system_tab.clone()),
            ManagementLogRepository::new(store.clone(), tabs.management_log_tab.clone()),
            DeliveryLedger::new(store.clone(), tabs.delivery_ledger_tab.clone()),
            KnowledgeRepository::new(store.clone(), tabs.knowledge_tab.clone()),
            sender,
            SummaryComposer::new(generator),
            audit,
            WorkerSettings::from_config(config),
        );

        Self { store, conversation: Arc::new(conversation), worker: Arc::new(worker), leads }
    }

    /// Builds the messaging and text generation adapters from configuration.
    pub fn from_config(config: &AppConfig, store: Arc<dyn RecordStore>) -> Result<Self> {
        let sender = sender_from_config(&config.messaging)
            .context("failed to configure the messaging channel")?;
        let generator =
            generator_from_config(&config.llm).context("failed to configure text generation")?;
        Ok(Self::new(config, store, sender, generator, Arc::new(TracingAuditSink)))
    }

    pub fn store(&self) -> Arc<dyn RecordStore> {
        self.store.clone()
    }

    pub fn conversation(&self) -> Arc<ConversationService> {
        self.conversation.clone()
    }

    pub fn worker(&self) -> Arc<LeadWorker> {
        self.worker.clone()
    }

    pub fn leads(&self) -> &LeadRepository {
        &self.leads
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use casedesk_core::config::AppConfig;
    use casedesk_db::{InMemoryRecordStore, RecordStore, SeedDataset};

    use super::AgentRuntime;

    #[tokio::test]
    async fn default_config_builds_a_working_runtime() {
        let config = AppConfig::default();
        let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
        SeedDataset::load(store.clone(), &config.store, None).await.expect("seed");

        let runtime = AgentRuntime::from_config(&config, store).expect("runtime");
        let reply = runtime
            .conversation()
            .handle_inbound("whatsapp:+5215500000000", "hola")
            .await
            .expect("greeting");
        assert!(!reply.reply.is_empty());

        let report = runtime.worker().run_cycle().await.expect("cycle");
        assert_eq!(report.candidates, 0);
        assert_eq!(runtime.leads().list().await.expect("leads").len(), 1);
    }
}
