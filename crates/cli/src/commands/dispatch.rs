use chrono::Utc;

use outdial_core::config::LoadOptions;
use outdial_server::bootstrap::{bootstrap, BootstrapError};

use crate::commands::CommandResult;

/// Runs one dispatch sweep right now and prints the JSON report. This is the
/// hook for an external scheduler (cron or similar); the server runs the
/// same sweep on its own interval.
pub fn run() -> CommandResult {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "dispatch",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let app = bootstrap(LoadOptions::default()).await?;
        let report = app.dispatcher.run_once(Utc::now()).await;
        app.db_pool.close().await;
        Ok::<_, BootstrapError>(report)
    });

    match result {
        Ok(report) => {
            let output = serde_json::to_string_pretty(&report)
                .unwrap_or_else(|error| format!("{{\"error\":\"{error}\"}}"));
            CommandResult { exit_code: if report.failed == 0 { 0 } else { 1 }, output }
        }
        Err(BootstrapError::Config(error)) => CommandResult::failure(
            "dispatch",
            "config_validation",
            format!("configuration issue: {error}"),
            2,
        ),
        Err(error) => CommandResult::failure("dispatch", "bootstrap", error.to_string(), 4),
    }
}
