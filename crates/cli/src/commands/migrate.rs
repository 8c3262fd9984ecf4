use casedesk_db::ensure_layout;

use crate::commands::{async_runtime, load_config, open_store, CommandResult};

pub fn run() -> CommandResult {
    let config = match load_config("migrate") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match async_runtime("migrate") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let (pool, store) = open_store(&config).await?;
        let layout = ensure_layout(store.as_ref(), &config.store)
            .await
            .map_err(|error| ("store_layout", error.to_string(), 5u8));
        pool.close().await;
        layout
    });

    match result {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations and sheet layout"),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}
