use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use outdial_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "database.url",
        &config.database.url,
        source("database.url", "OUTDIAL_DATABASE_URL"),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        source("database.max_connections", "OUTDIAL_DATABASE_MAX_CONNECTIONS"),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        source("database.timeout_secs", "OUTDIAL_DATABASE_TIMEOUT_SECS"),
    ));

    lines.push(render_line(
        "telephony.account_sid",
        config.telephony.account_sid.as_deref().unwrap_or("<unset>"),
        source("telephony.account_sid", "OUTDIAL_TELEPHONY_ACCOUNT_SID"),
    ));
    let auth_token = if config.telephony.auth_token.is_some() { "<redacted>" } else { "<unset>" };
    lines.push(render_line(
        "telephony.auth_token",
        auth_token,
        source("telephony.auth_token", "OUTDIAL_TELEPHONY_AUTH_TOKEN"),
    ));
    lines.push(render_line(
        "telephony.caller_number",
        &config.telephony.caller_number,
        source("telephony.caller_number", "OUTDIAL_TELEPHONY_CALLER_NUMBER"),
    ));
    lines.push(render_line(
        "telephony.callback_base_url",
        &config.telephony.callback_base_url,
        source("telephony.callback_base_url", "OUTDIAL_TELEPHONY_CALLBACK_BASE_URL"),
    ));

    lines.push(render_line(
        "llm.provider",
        &format!("{:?}", config.llm.provider),
        source("llm.provider", "OUTDIAL_LLM_PROVIDER"),
    ));
    lines.push(render_line("llm.model", &config.llm.model, source("llm.model", "OUTDIAL_LLM_MODEL")));
    lines.push(render_line(
        "llm.base_url",
        config.llm.base_url.as_deref().unwrap_or("<unset>"),
        source("llm.base_url", "OUTDIAL_LLM_BASE_URL"),
    ));
    let llm_api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    lines.push(render_line(
        "llm.api_key",
        llm_api_key,
        source("llm.api_key", "OUTDIAL_LLM_API_KEY"),
    ));

    lines.push(render_line(
        "conversation.max_turns",
        &config.conversation.max_turns.to_string(),
        source("conversation.max_turns", "OUTDIAL_CONVERSATION_MAX_TURNS"),
    ));
    lines.push(render_line(
        "dispatcher.tolerance_secs",
        &config.dispatcher.tolerance_secs.to_string(),
        source("dispatcher.tolerance_secs", "OUTDIAL_DISPATCHER_TOLERANCE_SECS"),
    ));
    lines.push(render_line(
        "dispatcher.interval_secs",
        &config.dispatcher.interval_secs.to_string(),
        source("dispatcher.interval_secs", "OUTDIAL_DISPATCHER_INTERVAL_SECS"),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", "OUTDIAL_SERVER_BIND_ADDRESS"),
    ));
    lines.push(render_line(
        "server.webhook_port",
        &config.server.webhook_port.to_string(),
        source("server.webhook_port", "OUTDIAL_SERVER_WEBHOOK_PORT"),
    ));
    lines.push(render_line(
        "server.health_check_port",
        &config.server.health_check_port.to_string(),
        source("server.health_check_port", "OUTDIAL_SERVER_HEALTH_CHECK_PORT"),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", "OUTDIAL_LOGGING_LEVEL"),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", "OUTDIAL_LOGGING_FORMAT"),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("outdial.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/outdial.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
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
