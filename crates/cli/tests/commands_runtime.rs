use std::env;
use std::sync::{Mutex, OnceLock};

use casedesk_cli::commands::{config, doctor, migrate, process, seed};
use serde_json::Value;

#[test]
fn migrate_returns_success_with_in_memory_database() {
    with_env(&[("CASEDESK_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_invalid_override() {
    with_env(
        &[
            ("CASEDESK_DATABASE_URL", "sqlite::memory:"),
            ("CASEDESK_DATABASE_MAX_CONNECTIONS", "many"),
        ],
        || {
            let result = migrate::run();
            assert_eq!(result.exit_code, 2, "expected config validation failure code");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["status"], "error");
            assert_eq!(payload["error_class"], "config_validation");
        },
    );
}

#[test]
fn process_refuses_to_run_with_incomplete_messaging_credentials() {
    with_env(
        &[("CASEDESK_DATABASE_URL", "sqlite::memory:"), ("CASEDESK_MESSAGING_ENABLED", "true")],
        || {
            let result = process::run();
            assert_eq!(result.exit_code, 2);

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "process");
            assert_eq!(payload["error_class"], "config_validation");
            assert!(payload["message"].as_str().unwrap_or("").contains("messaging.account_sid"));
        },
    );
}

#[test]
fn seed_is_idempotent_and_process_runs_against_the_seeded_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("casedesk.db").display());

    with_env(&[("CASEDESK_DATABASE_URL", url.as_str())], || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");
        let first_payload = parse_payload(&first.output);
        assert_eq!(first_payload["command"], "seed");
        assert_eq!(first_payload["status"], "ok");
        assert_ne!(
            first_payload["message"],
            "seed dataset ready: steps=0 lawyers=0 config_keys=0"
        );

        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");
        let second_payload = parse_payload(&second.output);
        assert_eq!(
            second_payload["message"],
            "seed dataset ready: steps=0 lawyers=0 config_keys=0"
        );

        let processed = process::run();
        assert_eq!(processed.exit_code, 0, "expected an empty cycle to succeed");
        let payload = parse_payload(&processed.output);
        assert_eq!(payload["command"], "process");
        assert_eq!(payload["message"], "scanned=0 candidates=0 processed=0 failed=0");
    });
}

#[test]
fn doctor_reports_missing_layout_then_passes_after_seed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("doctor.db").display());

    with_env(&[("CASEDESK_DATABASE_URL", url.as_str())], || {
        let before: Value = serde_json::from_str(&doctor::run(true)).expect("doctor json");
        assert_eq!(before["overall_status"], "fail");
        let layout = find_check(&before, "store_layout");
        assert_eq!(layout["status"], "fail");

        assert_eq!(seed::run().exit_code, 0);

        let after: Value = serde_json::from_str(&doctor::run(true)).expect("doctor json");
        assert_eq!(after["overall_status"], "pass");
        assert_eq!(find_check(&after, "database_connectivity")["status"], "pass");
        assert_eq!(find_check(&after, "messaging_readiness")["status"], "skipped");
    });
}

#[test]
fn config_output_attributes_sources_and_redacts_secrets() {
    with_env(
        &[
            ("CASEDESK_DATABASE_URL", "sqlite::memory:"),
            ("CASEDESK_MESSAGING_AUTH_TOKEN", "twilio-secret-token-9876"),
        ],
        || {
            let output = config::run();
            assert!(output.contains(
                "- database.url = sqlite::memory: (source: env (CASEDESK_DATABASE_URL))"
            ));
            assert!(output.contains("- messaging.auth_token = ****9876"));
            assert!(!output.contains("twilio-secret"));
            assert!(output.contains("- worker.senior_lawyer_id = A01 (source: default)"));
        },
    );
}

fn find_check<'a>(report: &'a Value, name: &str) -> &'a Value {
    report["checks"]
        .as_array()
        .and_then(|checks| checks.iter().find(|check| check["name"] == name))
        .expect("check should be present")
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "CASEDESK_DATABASE_URL",
        "CASEDESK_DATABASE_MAX_CONNECTIONS",
        "CASEDESK_DATABASE_TIMEOUT_SECS",
        "CASEDESK_MESSAGING_ENABLED",
        "CASEDESK_MESSAGING_ACCOUNT_SID",
        "CASEDESK_MESSAGING_AUTH_TOKEN",
        "CASEDESK_MESSAGING_FROM_NUMBER",
        "TWILIO_ACCOUNT_SID",
        "TWILIO_AUTH_TOKEN",
        "TWILIO_WHATSAPP_NUMBER",
        "CASEDESK_LLM_PROVIDER",
        "CASEDESK_LLM_API_KEY",
        "CASEDESK_LLM_BASE_URL",
        "CASEDESK_LLM_MODEL",
        "OPENAI_API_KEY",
        "OPENAI_MODEL",
        "CASEDESK_WORKER_ENABLED",
        "CASEDESK_WORKER_SENIOR_LAWYER_ID",
        "CASEDESK_SERVER_PORT",
        "CASEDESK_SERVER_PUBLIC_BASE_URL",
        "PORT",
        "CASEDESK_LOGGING_LEVEL",
        "CASEDESK_LOGGING_FORMAT",
        "CASEDESK_LOG_LEVEL",
        "CASEDESK_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
