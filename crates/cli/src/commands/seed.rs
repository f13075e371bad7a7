use crate::commands::{open_migrated_pool, single_thread_runtime, CommandResult, StepError};
use outdial_core::config::{AppConfig, LoadOptions};
use outdial_db::fixtures;

/// Seeds the demo dataset: one company with knowledge entries, one lead, and
/// a pending call task due now. Safe to run repeatedly.
pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match single_thread_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result: Result<(), StepError> = runtime.block_on(async {
        let pool = open_migrated_pool(&config).await?;
        fixtures::seed_demo_company(&pool)
            .await
            .map_err(|error| ("seed", error.to_string(), 5u8))?;
        pool.close().await;
        Ok(())
    });

    match result {
        Ok(()) => CommandResult::success(
            "seed",
            format!(
                "seeded demo data:\n  - company: {} (Acme Widgets)\n  - lead: {} (Dana Demo)\n  - task: {} (pending call, due now)",
                fixtures::demo_company_id().0,
                fixtures::demo_lead_id().0,
                fixtures::demo_task_id().0
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}
