use casedesk_db::{SeedDataset, SeedResult};

use crate::commands::{async_runtime, load_config, open_store, CommandResult, StepFailure};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match async_runtime("seed") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let (pool, store) = open_store(&config).await?;
        let report_base = config
            .server
            .public_base_url
            .as_deref()
            .map(|base| format!("{}/reporte", base.trim_end_matches('/')));

        let run_result = async {
            let seeded = SeedDataset::load(store.clone(), &config.store, report_base.as_deref())
                .await
                .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
            let verification =
                SeedDataset::verify(store, &config.store, &config.flow.default_step())
                    .await
                    .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

            let failed_checks = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(check.as_str()))
                .collect::<Vec<_>>();
            if verification.all_present {
                Ok::<SeedResult, StepFailure>(seeded)
            } else {
                Err(("seed_verification", verification_message(&failed_checks), 6u8))
            }
        }
        .await;

        pool.close().await;
        run_result
    });

    match result {
        Ok(seeded) => CommandResult::success("seed", seed_message(&seeded)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn seed_message(seeded: &SeedResult) -> String {
    format!(
        "seed dataset ready: steps={} lawyers={} config_keys={}",
        seeded.steps_seeded, seeded.lawyers_seeded, seeded.config_keys_seeded
    )
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use casedesk_db::SeedResult;

    use super::{seed_message, verification_message};

    #[test]
    fn verification_error_message_targets_failed_checks() {
        assert_eq!(
            verification_message(&["step:INICIO", "lawyers:active"]),
            "Seed verification failed for checks: step:INICIO, lawyers:active"
        );
    }

    #[test]
    fn verification_error_message_falls_back_to_generic_when_no_labels() {
        assert_eq!(verification_message(&[]), "Some seed data failed to load");
    }

    #[test]
    fn seed_message_counts_inserted_rows() {
        let seeded = SeedResult { steps_seeded: 0, lawyers_seeded: 0, config_keys_seeded: 0 };
        assert_eq!(seed_message(&seeded), "seed dataset ready: steps=0 lawyers=0 config_keys=0");
    }
}
