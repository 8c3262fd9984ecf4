use std::sync::Arc;

use casedesk_agent::generator_from_config;
use casedesk_core::config::{AppConfig, LoadOptions};
use casedesk_db::{connect_with_config, RecordStore, SeedDataset, SqliteRecordStore};
use casedesk_messaging::sender_from_config;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn skipped(name: &'static str) -> DoctorCheck {
    DoctorCheck {
        name,
        status: CheckStatus::Skipped,
        details: "skipped because configuration did not load".to_string(),
    }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_messaging(&config));
            checks.push(check_text_generation(&config));
            checks.extend(check_store(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(skipped("messaging_readiness"));
            checks.push(skipped("text_generation"));
            checks.push(skipped("database_connectivity"));
            checks.push(skipped("store_layout"));
        }
    }

    let any_fail = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_fail { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_fail {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_messaging(config: &AppConfig) -> DoctorCheck {
    let name = "messaging_readiness";
    if !config.messaging.enabled {
        return DoctorCheck {
            name,
            status: CheckStatus::Skipped,
            details: "messaging disabled; notifications are only logged".to_string(),
        };
    }
    match sender_from_config(&config.messaging) {
        Ok(_) => DoctorCheck {
            name,
            status: CheckStatus::Pass,
            details: format!("twilio sender configured against {}", config.messaging.api_base_url),
        },
        Err(error) => DoctorCheck { name, status: CheckStatus::Fail, details: error.to_string() },
    }
}

fn check_text_generation(config: &AppConfig) -> DoctorCheck {
    let name = "text_generation";
    match generator_from_config(&config.llm) {
        Ok(generator) if generator.is_configured() => DoctorCheck {
            name,
            status: CheckStatus::Pass,
            details: format!("{:?} provider with model `{}`", config.llm.provider, config.llm.model),
        },
        Ok(_) => DoctorCheck {
            name,
            status: CheckStatus::Skipped,
            details: "text generation disabled; template summaries are used".to_string(),
        },
        Err(error) => DoctorCheck { name, status: CheckStatus::Fail, details: format!("{error:#}") },
    }
}

fn check_store(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![
                DoctorCheck {
                    name: "database_connectivity",
                    status: CheckStatus::Fail,
                    details: format!("failed to initialize async runtime: {error}"),
                },
                skipped("store_layout"),
            ];
        }
    };

    // Read-only: connect without applying migrations.
    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;
        let store: Arc<dyn RecordStore> = Arc::new(SqliteRecordStore::new(pool.clone()));
        let verification =
            SeedDataset::verify(store, &config.store, &config.flow.default_step()).await;
        pool.close().await;
        Ok::<_, String>(verification)
    });

    let verification = match result {
        Ok(verification) => verification,
        Err(message) => {
            return vec![
                DoctorCheck {
                    name: "database_connectivity",
                    status: CheckStatus::Fail,
                    details: message,
                },
                DoctorCheck {
                    name: "store_layout",
                    status: CheckStatus::Skipped,
                    details: "skipped because the database is unreachable".to_string(),
                },
            ];
        }
    };

    let connectivity = DoctorCheck {
        name: "database_connectivity",
        status: CheckStatus::Pass,
        details: format!("connected using `{}`", config.database.url),
    };
    let layout = match verification {
        Ok(verification) if verification.all_present => DoctorCheck {
            name: "store_layout",
            status: CheckStatus::Pass,
            details: format!("{} layout checks passed", verification.checks.len()),
        },
        Ok(verification) => {
            let missing = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(check.as_str()))
                .collect::<Vec<_>>();
            DoctorCheck {
                name: "store_layout",
                status: CheckStatus::Fail,
                details: format!("missing: {} (run `casedesk seed`)", missing.join(", ")),
            }
        }
        Err(error) => DoctorCheck {
            name: "store_layout",
            status: CheckStatus::Fail,
            details: format!("{error} (run `casedesk migrate`)"),
        },
    };
    vec![connectivity, layout]
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
