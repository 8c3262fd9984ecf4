use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::assignment::AssignmentPolicy;
use crate::domain::lawyer::LawyerId;
use crate::domain::step::StepId;

pub const DEFAULT_CONFIG_FILE: &str = "casedesk.toml";
const NESTED_CONFIG_FILE: &str = "config/casedesk.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub store: StoreConfig,
    pub flow: FlowConfig,
    pub messaging: MessagingConfig,
    pub llm: LlmConfig,
    pub worker: WorkerConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// Tab names inside the record store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    pub leads_tab: String,
    pub steps_tab: String,
    pub lawyers_tab: String,
    pub system_tab: String,
    pub management_log_tab: String,
    pub conversation_log_tab: String,
    pub delivery_ledger_tab: String,
    pub knowledge_tab: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowConfig {
    pub default_step_id: String,
    pub end_step_id: String,
    pub post_process_step_id: String,
}

#[derive(Clone, Debug)]
pub struct MessagingConfig {
    pub enabled: bool,
    pub account_sid: Option<String>,
    pub auth_token: Option<SecretString>,
    pub from_number: Option<String>,
    pub api_base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub max_tokens: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerConfig {
    pub enabled: bool,
    pub poll_interval_secs: u64,
    pub claim_timeout_secs: u64,
    pub high_value_threshold: u64,
    pub senior_lawyer_id: String,
    pub assignment_window: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub public_base_url: Option<String>,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Ollama,
    Disabled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub messaging_enabled: Option<bool>,
    pub worker_enabled: Option<bool>,
    pub server_port: Option<u16>,
    pub public_base_url: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://casedesk.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            store: StoreConfig::default(),
            flow: FlowConfig {
                default_step_id: "INICIO".to_string(),
                end_step_id: "EN_PROCESO".to_string(),
                post_process_step_id: "CLIENTE_MENU".to_string(),
            },
            messaging: MessagingConfig {
                enabled: false,
                account_sid: None,
                auth_token: None,
                from_number: None,
                api_base_url: "https://api.twilio.com".to_string(),
                timeout_secs: 15,
                max_retries: 3,
            },
            llm: LlmConfig {
                provider: LlmProvider::Disabled,
                api_key: None,
                base_url: None,
                model: "gpt-4o-mini".to_string(),
                timeout_secs: 30,
                max_retries: 2,
                max_tokens: 700,
            },
            worker: WorkerConfig {
                enabled: true,
                poll_interval_secs: 10,
                claim_timeout_secs: 180,
                high_value_threshold: 50_000,
                senior_lawyer_id: "A01".to_string(),
                assignment_window: 3,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                public_base_url: None,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            leads_tab: "BD_Leads".to_string(),
            steps_tab: "Config_XimenaAI".to_string(),
            lawyers_tab: "Cat_Abogados".to_string(),
            system_tab: "Config_Sistema".to_string(),
            management_log_tab: "Abogados_Admin".to_string(),
            conversation_log_tab: "Logs".to_string(),
            delivery_ledger_tab: "Entregas".to_string(),
            knowledge_tab: "Conocimiento_AI".to_string(),
        }
    }
}

impl FlowConfig {
    pub fn default_step(&self) -> StepId {
        StepId::new(self.default_step_id.as_str())
    }

    pub fn end_step(&self) -> StepId {
        StepId::new(self.end_step_id.as_str())
    }

    pub fn post_process_step(&self) -> StepId {
        StepId::new(self.post_process_step_id.as_str())
    }
}

impl WorkerConfig {
    pub fn assignment_policy(&self) -> AssignmentPolicy {
        AssignmentPolicy {
            high_value_threshold: Decimal::from(self.high_value_threshold),
            senior_lawyer_id: LawyerId(self.senior_lawyer_id.trim().to_string()),
            window: self.assignment_window,
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            "disabled" | "none" | "off" => Ok(Self::Disabled),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|ollama|disabled)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            set(&mut self.database.url, database.url);
            set(&mut self.database.max_connections, database.max_connections);
            set(&mut self.database.timeout_secs, database.timeout_secs);
        }

        if let Some(store) = patch.store {
            set(&mut self.store.leads_tab, store.leads_tab);
            set(&mut self.store.steps_tab, store.steps_tab);
            set(&mut self.store.lawyers_tab, store.lawyers_tab);
            set(&mut self.store.system_tab, store.system_tab);
            set(&mut self.store.management_log_tab, store.management_log_tab);
            set(&mut self.store.conversation_log_tab, store.conversation_log_tab);
            set(&mut self.store.delivery_ledger_tab, store.delivery_ledger_tab);
            set(&mut self.store.knowledge_tab, store.knowledge_tab);
        }

        if let Some(flow) = patch.flow {
            set(&mut self.flow.default_step_id, flow.default_step_id);
            set(&mut self.flow.end_step_id, flow.end_step_id);
            set(&mut self.flow.post_process_step_id, flow.post_process_step_id);
        }

        if let Some(messaging) = patch.messaging {
            set(&mut self.messaging.enabled, messaging.enabled);
            if let Some(account_sid) = messaging.account_sid {
                self.messaging.account_sid = Some(account_sid);
            }
            if let Some(auth_token) = messaging.auth_token {
                self.messaging.auth_token = Some(secret_value(auth_token));
            }
            if let Some(from_number) = messaging.from_number {
                self.messaging.from_number = Some(from_number);
            }
            set(&mut self.messaging.api_base_url, messaging.api_base_url);
            set(&mut self.messaging.timeout_secs, messaging.timeout_secs);
            set(&mut self.messaging.max_retries, messaging.max_retries);
        }

        if let Some(llm) = patch.llm {
            set(&mut self.llm.provider, llm.provider);
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            set(&mut self.llm.model, llm.model);
            set(&mut self.llm.timeout_secs, llm.timeout_secs);
            set(&mut self.llm.max_retries, llm.max_retries);
            set(&mut self.llm.max_tokens, llm.max_tokens);
        }

        if let Some(worker) = patch.worker {
            set(&mut self.worker.enabled, worker.enabled);
            set(&mut self.worker.poll_interval_secs, worker.poll_interval_secs);
            set(&mut self.worker.claim_timeout_secs, worker.claim_timeout_secs);
            set(&mut self.worker.high_value_threshold, worker.high_value_threshold);
            set(&mut self.worker.senior_lawyer_id, worker.senior_lawyer_id);
            set(&mut self.worker.assignment_window, worker.assignment_window);
        }

        if let Some(server) = patch.server {
            set(&mut self.server.bind_address, server.bind_address);
            set(&mut self.server.port, server.port);
            if let Some(public_base_url) = server.public_base_url {
                self.server.public_base_url = Some(public_base_url);
            }
            set(&mut self.server.graceful_shutdown_secs, server.graceful_shutdown_secs);
        }

        if let Some(logging) = patch.logging {
            set(&mut self.logging.level, logging.level);
            set(&mut self.logging.format, logging.format);
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CASEDESK_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("CASEDESK_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_env("CASEDESK_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("CASEDESK_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("CASEDESK_DATABASE_TIMEOUT_SECS", &value)?;
        }

        for (key, slot) in [
            ("CASEDESK_STORE_LEADS_TAB", &mut self.store.leads_tab),
            ("CASEDESK_STORE_STEPS_TAB", &mut self.store.steps_tab),
            ("CASEDESK_STORE_LAWYERS_TAB", &mut self.store.lawyers_tab),
            ("CASEDESK_STORE_SYSTEM_TAB", &mut self.store.system_tab),
            ("CASEDESK_STORE_MANAGEMENT_LOG_TAB", &mut self.store.management_log_tab),
            ("CASEDESK_STORE_CONVERSATION_LOG_TAB", &mut self.store.conversation_log_tab),
            ("CASEDESK_STORE_DELIVERY_LEDGER_TAB", &mut self.store.delivery_ledger_tab),
            ("CASEDESK_STORE_KNOWLEDGE_TAB", &mut self.store.knowledge_tab),
            ("CASEDESK_FLOW_DEFAULT_STEP_ID", &mut self.flow.default_step_id),
            ("CASEDESK_FLOW_END_STEP_ID", &mut self.flow.end_step_id),
            ("CASEDESK_FLOW_POST_PROCESS_STEP_ID", &mut self.flow.post_process_step_id),
        ] {
            if let Some(value) = read_env(key) {
                *slot = value;
            }
        }

        if let Some(value) = read_env("CASEDESK_MESSAGING_ENABLED") {
            self.messaging.enabled = parse_env("CASEDESK_MESSAGING_ENABLED", &value)?;
        }
        let account_sid =
            read_env("CASEDESK_MESSAGING_ACCOUNT_SID").or_else(|| read_env("TWILIO_ACCOUNT_SID"));
        if let Some(value) = account_sid {
            self.messaging.account_sid = Some(value);
        }
        let auth_token =
            read_env("CASEDESK_MESSAGING_AUTH_TOKEN").or_else(|| read_env("TWILIO_AUTH_TOKEN"));
        if let Some(value) = auth_token {
            self.messaging.auth_token = Some(secret_value(value));
        }
        let from_number = read_env("CASEDESK_MESSAGING_FROM_NUMBER")
            .or_else(|| read_env("TWILIO_WHATSAPP_NUMBER"));
        if let Some(value) = from_number {
            self.messaging.from_number = Some(value);
        }
        if let Some(value) = read_env("CASEDESK_MESSAGING_API_BASE_URL") {
            self.messaging.api_base_url = value;
        }
        if let Some(value) = read_env("CASEDESK_MESSAGING_TIMEOUT_SECS") {
            self.messaging.timeout_secs = parse_env("CASEDESK_MESSAGING_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("CASEDESK_MESSAGING_MAX_RETRIES") {
            self.messaging.max_retries = parse_env("CASEDESK_MESSAGING_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("CASEDESK_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        let api_key = read_env("CASEDESK_LLM_API_KEY").or_else(|| read_env("OPENAI_API_KEY"));
        if let Some(value) = api_key {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("CASEDESK_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        let model = read_env("CASEDESK_LLM_MODEL").or_else(|| read_env("OPENAI_MODEL"));
        if let Some(value) = model {
            self.llm.model = value;
        }
        if let Some(value) = read_env("CASEDESK_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_env("CASEDESK_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("CASEDESK_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_env("CASEDESK_LLM_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("CASEDESK_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_env("CASEDESK_LLM_MAX_TOKENS", &value)?;
        }

        if let Some(value) = read_env("CASEDESK_WORKER_ENABLED") {
            self.worker.enabled = parse_env("CASEDESK_WORKER_ENABLED", &value)?;
        }
        if let Some(value) = read_env("CASEDESK_WORKER_POLL_INTERVAL_SECS") {
            self.worker.poll_interval_secs =
                parse_env("CASEDESK_WORKER_POLL_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("CASEDESK_WORKER_CLAIM_TIMEOUT_SECS") {
            self.worker.claim_timeout_secs =
                parse_env("CASEDESK_WORKER_CLAIM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("CASEDESK_WORKER_HIGH_VALUE_THRESHOLD") {
            self.worker.high_value_threshold =
                parse_env("CASEDESK_WORKER_HIGH_VALUE_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("CASEDESK_WORKER_SENIOR_LAWYER_ID") {
            self.worker.senior_lawyer_id = value;
        }
        if let Some(value) = read_env("CASEDESK_WORKER_ASSIGNMENT_WINDOW") {
            self.worker.assignment_window =
                parse_env("CASEDESK_WORKER_ASSIGNMENT_WINDOW", &value)?;
        }

        if let Some(value) = read_env("CASEDESK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        let port = read_env("CASEDESK_SERVER_PORT").or_else(|| read_env("PORT"));
        if let Some(value) = port {
            self.server.port = parse_env("CASEDESK_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("CASEDESK_SERVER_PUBLIC_BASE_URL") {
            self.server.public_base_url = Some(value);
        }
        if let Some(value) = read_env("CASEDESK_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_env("CASEDESK_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("CASEDESK_LOGGING_LEVEL").or_else(|| read_env("CASEDESK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CASEDESK_LOGGING_FORMAT").or_else(|| read_env("CASEDESK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        set(&mut self.database.url, overrides.database_url);
        set(&mut self.logging.level, overrides.log_level);
        set(&mut self.logging.format, overrides.log_format);
        set(&mut self.llm.provider, overrides.llm_provider);
        set(&mut self.llm.model, overrides.llm_model);
        set(&mut self.messaging.enabled, overrides.messaging_enabled);
        set(&mut self.worker.enabled, overrides.worker_enabled);
        set(&mut self.server.port, overrides.server_port);
        if let Some(public_base_url) = overrides.public_base_url {
            self.server.public_base_url = Some(public_base_url);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_store(&self.store)?;
        validate_flow(&self.flow)?;
        validate_messaging(&self.messaging)?;
        validate_llm(&self.llm)?;
        validate_worker(&self.worker)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

/// The config file that `load` would read, if any.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from(NESTED_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validation(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation(message.into())
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)",
        ));
    }
    if database.max_connections == 0 {
        return Err(validation("database.max_connections must be greater than zero"));
    }
    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(validation("database.timeout_secs must be in range 1..=300"));
    }
    Ok(())
}

fn validate_store(store: &StoreConfig) -> Result<(), ConfigError> {
    let tabs = [
        ("store.leads_tab", &store.leads_tab),
        ("store.steps_tab", &store.steps_tab),
        ("store.lawyers_tab", &store.lawyers_tab),
        ("store.system_tab", &store.system_tab),
        ("store.management_log_tab", &store.management_log_tab),
        ("store.conversation_log_tab", &store.conversation_log_tab),
        ("store.delivery_ledger_tab", &store.delivery_ledger_tab),
        ("store.knowledge_tab", &store.knowledge_tab),
    ];
    if let Some((key, _)) = tabs.iter().find(|(_, name)| name.trim().is_empty()) {
        return Err(validation(format!("{key} must not be empty")));
    }
    Ok(())
}

fn validate_flow(flow: &FlowConfig) -> Result<(), ConfigError> {
    if flow.default_step_id.trim().is_empty() {
        return Err(validation("flow.default_step_id must not be empty"));
    }
    if flow.end_step_id.trim().is_empty() {
        return Err(validation("flow.end_step_id must not be empty"));
    }
    if flow.default_step_id.trim() == flow.end_step_id.trim() {
        return Err(validation("flow.end_step_id must differ from flow.default_step_id"));
    }
    if flow.post_process_step_id.trim().is_empty() {
        return Err(validation("flow.post_process_step_id must not be empty"));
    }
    Ok(())
}

fn validate_messaging(messaging: &MessagingConfig) -> Result<(), ConfigError> {
    if !is_http_url(messaging.api_base_url.trim()) {
        return Err(validation("messaging.api_base_url must start with http:// or https://"));
    }
    if messaging.timeout_secs == 0 || messaging.timeout_secs > 120 {
        return Err(validation("messaging.timeout_secs must be in range 1..=120"));
    }
    if !messaging.enabled {
        return Ok(());
    }

    let blank = |value: Option<&str>| value.map(|value| value.trim().is_empty()).unwrap_or(true);
    if blank(messaging.account_sid.as_deref()) {
        return Err(validation(
            "messaging.account_sid is required when messaging is enabled (Twilio console > Account Info)",
        ));
    }
    if blank(messaging.auth_token.as_ref().map(|token| token.expose_secret())) {
        return Err(validation("messaging.auth_token is required when messaging is enabled"));
    }
    if blank(messaging.from_number.as_deref()) {
        return Err(validation(
            "messaging.from_number is required when messaging is enabled (e.g. `whatsapp:+14155238886`)",
        ));
    }
    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(validation("llm.timeout_secs must be in range 1..=300"));
    }
    if llm.model.trim().is_empty() && llm.provider != LlmProvider::Disabled {
        return Err(validation("llm.model must not be empty"));
    }

    match llm.provider {
        LlmProvider::OpenAi => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(validation("llm.api_key is required for the openai provider"));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(validation("llm.base_url is required for the ollama provider"));
            }
        }
        LlmProvider::Disabled => {}
    }

    if let Some(base_url) = &llm.base_url {
        if !is_http_url(base_url.trim()) {
            return Err(validation("llm.base_url must start with http:// or https://"));
        }
    }
    Ok(())
}

fn validate_worker(worker: &WorkerConfig) -> Result<(), ConfigError> {
    if worker.poll_interval_secs == 0 {
        return Err(validation("worker.poll_interval_secs must be greater than zero"));
    }
    if worker.claim_timeout_secs == 0 {
        return Err(validation("worker.claim_timeout_secs must be greater than zero"));
    }
    if worker.assignment_window == 0 {
        return Err(validation("worker.assignment_window must be greater than zero"));
    }
    if worker.senior_lawyer_id.trim().is_empty() {
        return Err(validation("worker.senior_lawyer_id must not be empty"));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(validation("server.port must be greater than zero"));
    }
    if server.graceful_shutdown_secs == 0 {
        return Err(validation("server.graceful_shutdown_secs must be greater than zero"));
    }
    if let Some(base_url) = &server.public_base_url {
        if !is_http_url(base_url.trim()) {
            return Err(validation("server.public_base_url must start with http:// or https://"));
        }
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(validation("logging.level must be one of trace|debug|info|warn|error")),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    store: Option<StorePatch>,
    flow: Option<FlowPatch>,
    messaging: Option<MessagingPatch>,
    llm: Option<LlmPatch>,
    worker: Option<WorkerPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct StorePatch {
    leads_tab: Option<String>,
    steps_tab: Option<String>,
    lawyers_tab: Option<String>,
    system_tab: Option<String>,
    management_log_tab: Option<String>,
    conversation_log_tab: Option<String>,
    delivery_ledger_tab: Option<String>,
    knowledge_tab: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FlowPatch {
    default_step_id: Option<String>,
    end_step_id: Option<String>,
    post_process_step_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MessagingPatch {
    enabled: Option<bool>,
    account_sid: Option<String>,
    auth_token: Option<String>,
    from_number: Option<String>,
    api_base_url: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    max_tokens: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkerPatch {
    enabled: Option<bool>,
    poll_interval_secs: Option<u64>,
    claim_timeout_secs: Option<u64>,
    high_value_threshold: Option<u64>,
    senior_lawyer_id: Option<String>,
    assignment_window: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    public_base_url: Option<String>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
