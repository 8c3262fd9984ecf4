use casedesk_agent::{AgentRuntime, CycleReport, LeadOutcome};
use casedesk_db::ensure_layout;

use crate::commands::{async_runtime, load_config, open_store, CommandResult, StepFailure};

/// Runs a single worker cycle against the configured store.
pub fn run() -> CommandResult {
    let config = match load_config("process") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match async_runtime("process") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let (pool, store) = open_store(&config).await?;
        let cycle: Result<CycleReport, StepFailure> = async {
            ensure_layout(store.as_ref(), &config.store)
                .await
                .map_err(|error| ("store_layout", error.to_string(), 5u8))?;
            let agent = AgentRuntime::from_config(&config, store.clone())
                .map_err(|error| ("runtime_wiring", format!("{error:#}"), 6u8))?;
            agent
                .worker()
                .run_cycle()
                .await
                .map_err(|error| ("worker_cycle", error.to_string(), 7u8))
        }
        .await;
        pool.close().await;
        cycle
    });

    match result {
        Ok(report) => CommandResult::success("process", cycle_message(&report)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("process", error_class, message, exit_code)
        }
    }
}

fn cycle_message(report: &CycleReport) -> String {
    let mut message = format!(
        "scanned={} candidates={} processed={} failed={}",
        report.scanned,
        report.candidates,
        report.processed(),
        report.failed()
    );
    for (lead_id, outcome) in &report.outcomes {
        let lead = lead_id.as_ref().map(|id| id.0.as_str()).unwrap_or("<no id>");
        let line = match outcome {
            LeadOutcome::Processed { total, lawyer, .. } => format!(
                "{lead}: processed total={total} lawyer={}",
                lawyer.as_ref().map(|id| id.0.as_str()).unwrap_or("<none>")
            ),
            LeadOutcome::ClaimLost => format!("{lead}: claimed by another worker"),
            LeadOutcome::Failed { error } => format!("{lead}: failed ({error})"),
            LeadOutcome::Skipped { reason } => format!("{lead}: skipped ({reason})"),
        };
        message.push('\n');
        message.push_str(&line);
    }
    message
}

#[cfg(test)]
mod tests {
    use casedesk_agent::{CycleReport, DeliveryOutcome, LeadOutcome};
    use casedesk_core::domain::lawyer::LawyerId;
    use casedesk_core::domain::lead::LeadId;
    use rust_decimal::Decimal;

    use super::cycle_message;

    #[test]
    fn cycle_message_lists_every_outcome() {
        let report = CycleReport {
            scanned: 3,
            candidates: 2,
            outcomes: vec![
                (
                    Some(LeadId("L-1".into())),
                    LeadOutcome::Processed {
                        total: Decimal::new(12_509_589, 2),
                        lawyer: Some(LawyerId("A02".into())),
                        delivery: DeliveryOutcome::NoRecipient,
                    },
                ),
                (None, LeadOutcome::Skipped { reason: "lead has no id".into() }),
            ],
        };

        let message = cycle_message(&report);
        assert!(message.starts_with("scanned=3 candidates=2 processed=1 failed=0"));
        assert!(message.contains("L-1: processed total=125095.89 lawyer=A02"));
        assert!(message.contains("<no id>: skipped (lead has no id)"));
    }
}
