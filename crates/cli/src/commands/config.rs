use std::env;
use std::fs;
use std::path::Path;

use casedesk_core::config::{resolve_config_path, AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

/// One rendered setting: dotted key, display value, and the env var that overrides it.
struct Field {
    key: &'static str,
    value: String,
    env_key: &'static str,
}

fn field(key: &'static str, value: impl ToString, env_key: &'static str) -> Field {
    Field { key, value: value.to_string(), env_key }
}

fn optional(value: Option<&str>) -> String {
    value.map(str::to_string).unwrap_or_else(|| "<unset>".to_string())
}

fn secret(value: Option<&SecretString>) -> String {
    value.map(|secret| redact_token(secret.expose_secret())).unwrap_or_else(|| "<unset>".to_string())
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for entry in fields(&config) {
        let source = field_source(
            entry.key,
            Some(entry.env_key),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(entry.key, &entry.value, source));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let tabs = &config.store;
    let messaging = &config.messaging;
    let llm = &config.llm;
    let worker = &config.worker;
    let server = &config.server;

    vec![
        field("database.url", &config.database.url, "CASEDESK_DATABASE_URL"),
        field(
            "database.max_connections",
            config.database.max_connections,
            "CASEDESK_DATABASE_MAX_CONNECTIONS",
        ),
        field("database.timeout_secs", config.database.timeout_secs, "CASEDESK_DATABASE_TIMEOUT_SECS"),
        field("store.leads_tab", &tabs.leads_tab, "CASEDESK_STORE_LEADS_TAB"),
        field("store.steps_tab", &tabs.steps_tab, "CASEDESK_STORE_STEPS_TAB"),
        field("store.lawyers_tab", &tabs.lawyers_tab, "CASEDESK_STORE_LAWYERS_TAB"),
        field("store.system_tab", &tabs.system_tab, "CASEDESK_STORE_SYSTEM_TAB"),
        field(
            "store.management_log_tab",
            &tabs.management_log_tab,
            "CASEDESK_STORE_MANAGEMENT_LOG_TAB",
        ),
        field(
            "store.conversation_log_tab",
            &tabs.conversation_log_tab,
            "CASEDESK_STORE_CONVERSATION_LOG_TAB",
        ),
        field(
            "store.delivery_ledger_tab",
            &tabs.delivery_ledger_tab,
            "CASEDESK_STORE_DELIVERY_LEDGER_TAB",
        ),
        field("store.knowledge_tab", &tabs.knowledge_tab, "CASEDESK_STORE_KNOWLEDGE_TAB"),
        field("flow.default_step_id", &config.flow.default_step_id, "CASEDESK_FLOW_DEFAULT_STEP_ID"),
        field("flow.end_step_id", &config.flow.end_step_id, "CASEDESK_FLOW_END_STEP_ID"),
        field(
            "flow.post_process_step_id",
            &config.flow.post_process_step_id,
            "CASEDESK_FLOW_POST_PROCESS_STEP_ID",
        ),
        field("messaging.enabled", messaging.enabled, "CASEDESK_MESSAGING_ENABLED"),
        field(
            "messaging.account_sid",
            optional(messaging.account_sid.as_deref()),
            "CASEDESK_MESSAGING_ACCOUNT_SID",
        ),
        field(
            "messaging.auth_token",
            secret(messaging.auth_token.as_ref()),
            "CASEDESK_MESSAGING_AUTH_TOKEN",
        ),
        field(
            "messaging.from_number",
            optional(messaging.from_number.as_deref()),
            "CASEDESK_MESSAGING_FROM_NUMBER",
        ),
        field("messaging.api_base_url", &messaging.api_base_url, "CASEDESK_MESSAGING_API_BASE_URL"),
        field("messaging.timeout_secs", messaging.timeout_secs, "CASEDESK_MESSAGING_TIMEOUT_SECS"),
        field("messaging.max_retries", messaging.max_retries, "CASEDESK_MESSAGING_MAX_RETRIES"),
        field("llm.provider", format!("{:?}", llm.provider), "CASEDESK_LLM_PROVIDER"),
        field("llm.model", &llm.model, "CASEDESK_LLM_MODEL"),
        field("llm.base_url", optional(llm.base_url.as_deref()), "CASEDESK_LLM_BASE_URL"),
        field("llm.api_key", secret(llm.api_key.as_ref()), "CASEDESK_LLM_API_KEY"),
        field("llm.timeout_secs", llm.timeout_secs, "CASEDESK_LLM_TIMEOUT_SECS"),
        field("llm.max_retries", llm.max_retries, "CASEDESK_LLM_MAX_RETRIES"),
        field("llm.max_tokens", llm.max_tokens, "CASEDESK_LLM_MAX_TOKENS"),
        field("worker.enabled", worker.enabled, "CASEDESK_WORKER_ENABLED"),
        field(
            "worker.poll_interval_secs",
            worker.poll_interval_secs,
            "CASEDESK_WORKER_POLL_INTERVAL_SECS",
        ),
        field(
            "worker.claim_timeout_secs",
            worker.claim_timeout_secs,
            "CASEDESK_WORKER_CLAIM_TIMEOUT_SECS",
        ),
        field(
            "worker.high_value_threshold",
            worker.high_value_threshold,
            "CASEDESK_WORKER_HIGH_VALUE_THRESHOLD",
        ),
        field("worker.senior_lawyer_id", &worker.senior_lawyer_id, "CASEDESK_WORKER_SENIOR_LAWYER_ID"),
        field(
            "worker.assignment_window",
            worker.assignment_window,
            "CASEDESK_WORKER_ASSIGNMENT_WINDOW",
        ),
        field("server.bind_address", &server.bind_address, "CASEDESK_SERVER_BIND_ADDRESS"),
        field("server.port", server.port, "CASEDESK_SERVER_PORT"),
        field(
            "server.public_base_url",
            optional(server.public_base_url.as_deref()),
            "CASEDESK_SERVER_PUBLIC_BASE_URL",
        ),
        field(
            "server.graceful_shutdown_secs",
            server.graceful_shutdown_secs,
            "CASEDESK_SERVER_GRACEFUL_SHUTDOWN_SECS",
        ),
        field("logging.level", &config.logging.level, "CASEDESK_LOGGING_LEVEL"),
        field("logging.format", format!("{:?}", config.logging.format), "CASEDESK_LOGGING_FORMAT"),
    ]
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps only the last four characters of long secrets.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    let count = trimmed.chars().count();
    if count > 8 {
        let tail: String = trimmed.chars().skip(count - 4).collect();
        return format!("****{tail}");
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::{contains_path, redact_token};

    #[test]
    fn redaction_keeps_only_a_short_suffix() {
        assert_eq!(redact_token("  "), "<empty>");
        assert_eq!(redact_token("short"), "<redacted>");
        assert_eq!(redact_token("0123456789abcdef"), "****cdef");
    }

    #[test]
    fn dotted_paths_are_resolved_in_the_config_file() {
        let doc: Value = "[messaging]\nenabled = true\n".parse().expect("toml");
        assert!(contains_path(&doc, "messaging.enabled"));
        assert!(!contains_path(&doc, "messaging.auth_token"));
        assert!(!contains_path(&doc, "llm.model"));
    }
}
