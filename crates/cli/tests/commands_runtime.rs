use std::env;
use std::sync::{Mutex, OnceLock};

use outdial_cli::commands::{config, dispatch, doctor, migrate, seed};
use serde_json::Value;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("OUTDIAL_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("OUTDIAL_DATABASE_URL", "postgres://localhost/outdial")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_loads_the_demo_dataset() {
    with_env(&[("OUTDIAL_DATABASE_URL", "sqlite::memory:?cache=shared")], || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected successful seed run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");

        let message = payload["message"].as_str().unwrap_or("");
        assert!(message.contains("company: C-DEMO"));
        assert!(message.contains("lead: L-DEMO"));
        assert!(message.contains("task: T-DEMO"));
    });
}

#[test]
fn seed_is_idempotent_across_runs() {
    with_env(&[("OUTDIAL_DATABASE_URL", "sqlite::memory:?cache=shared")], || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");

        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");

        let first_payload = parse_payload(&first.output);
        let second_payload = parse_payload(&second.output);
        assert_eq!(first_payload["message"], second_payload["message"]);
    });
}

#[test]
fn dispatch_prints_an_empty_sweep_report_on_a_fresh_database() {
    with_env(&[("OUTDIAL_DATABASE_URL", "sqlite::memory:")], || {
        let result = dispatch::run();
        assert_eq!(result.exit_code, 0, "expected clean dispatch sweep");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["examined"], 0);
        assert_eq!(payload["placed"], 0);
        assert_eq!(payload["failed"], 0);
        assert!(payload["run_at"].as_str().unwrap_or("").contains('T'));
    });
}

#[test]
fn dispatch_surfaces_config_failures() {
    with_env(&[("OUTDIAL_DATABASE_URL", "postgres://localhost/outdial")], || {
        let result = dispatch::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "dispatch");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn doctor_json_reports_no_dial_mode_and_database_health() {
    with_env(&[("OUTDIAL_DATABASE_URL", "sqlite::memory:")], || {
        let output = doctor::run(true);
        let payload: Value =
            serde_json::from_str(&output).expect("doctor output should be valid JSON");

        assert_eq!(payload["overall_status"], "pass");
        let checks = payload["checks"].as_array().expect("checks array");
        assert_eq!(checks.len(), 3);
        let telephony = checks
            .iter()
            .find(|check| check["name"] == "telephony_credentials")
            .expect("telephony check present");
        assert_eq!(telephony["status"], "pass");
        assert!(telephony["details"].as_str().unwrap_or("").contains("no-dial"));
    });
}

#[test]
fn doctor_fails_when_config_is_invalid() {
    with_env(&[("OUTDIAL_LLM_PROVIDER", "openai")], || {
        let output = doctor::run(true);
        let payload: Value =
            serde_json::from_str(&output).expect("doctor output should be valid JSON");

        assert_eq!(payload["overall_status"], "fail");
        let checks = payload["checks"].as_array().expect("checks array");
        assert_eq!(checks[0]["name"], "config_validation");
        assert_eq!(checks[0]["status"], "fail");
        assert_eq!(checks[1]["status"], "skipped");
    });
}

#[test]
fn config_command_attributes_env_overrides() {
    with_env(
        &[
            ("OUTDIAL_DATABASE_URL", "sqlite::memory:"),
            ("OUTDIAL_LLM_MODEL", "llama3.2"),
        ],
        || {
            let output = config::run();

            assert!(output.contains("effective config"));
            assert!(output
                .contains("- database.url = sqlite::memory: (source: env (OUTDIAL_DATABASE_URL))"));
            assert!(output.contains("- llm.model = llama3.2 (source: env (OUTDIAL_LLM_MODEL))"));
            assert!(output.contains("- conversation.max_turns = 10 (source: default)"));
            assert!(output.contains("- telephony.auth_token = <unset>"));
        },
    );
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "OUTDIAL_DATABASE_URL",
        "OUTDIAL_DATABASE_MAX_CONNECTIONS",
        "OUTDIAL_DATABASE_TIMEOUT_SECS",
        "OUTDIAL_TELEPHONY_ACCOUNT_SID",
        "OUTDIAL_TELEPHONY_AUTH_TOKEN",
        "OUTDIAL_TELEPHONY_API_BASE_URL",
        "OUTDIAL_TELEPHONY_CALLER_NUMBER",
        "OUTDIAL_TELEPHONY_CALLBACK_BASE_URL",
        "OUTDIAL_LLM_PROVIDER",
        "OUTDIAL_LLM_API_KEY",
        "OUTDIAL_LLM_BASE_URL",
        "OUTDIAL_LLM_MODEL",
        "OUTDIAL_LLM_TIMEOUT_SECS",
        "OUTDIAL_LLM_MAX_RETRIES",
        "OUTDIAL_CONVERSATION_MAX_TURNS",
        "OUTDIAL_CONVERSATION_GATHER_TIMEOUT_SECS",
        "OUTDIAL_DISPATCHER_TOLERANCE_SECS",
        "OUTDIAL_DISPATCHER_INTERVAL_SECS",
        "OUTDIAL_SERVER_BIND_ADDRESS",
        "OUTDIAL_SERVER_WEBHOOK_PORT",
        "OUTDIAL_SERVER_HEALTH_CHECK_PORT",
        "OUTDIAL_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "OUTDIAL_LOGGING_LEVEL",
        "OUTDIAL_LOGGING_FORMAT",
        "OUTDIAL_LOG_LEVEL",
        "OUTDIAL_LOG_FORMAT",
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
