use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub telephony: TelephonyConfig,
    pub llm: LlmConfig,
    pub conversation: ConversationConfig,
    pub dispatcher: DispatcherConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct TelephonyConfig {
    /// Absent credentials put the system in no-dial mode: placements go
    /// through the static client and nothing leaves the machine.
    pub account_sid: Option<String>,
    pub auth_token: Option<SecretString>,
    pub api_base_url: String,
    pub caller_number: String,
    pub callback_base_url: String,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct ConversationConfig {
    pub max_turns: u32,
    pub gather_timeout_secs: u32,
}

#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    /// Symmetric tolerance around "now" when selecting due tasks; guards
    /// against clock skew and missed runs.
    pub tolerance_secs: u64,
    pub interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub webhook_port: u16,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub caller_number: Option<String>,
    pub callback_base_url: Option<String>,
    pub max_turns: Option<u32>,
    pub tolerance_secs: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://outdial.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            telephony: TelephonyConfig {
                account_sid: None,
                auth_token: None,
                api_base_url: "https://api.twilio.com/2010-04-01".to_string(),
                caller_number: "+15005550006".to_string(),
                callback_base_url: "http://localhost:8088".to_string(),
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 8,
                max_retries: 2,
            },
            conversation: ConversationConfig { max_turns: 10, gather_timeout_secs: 5 },
            dispatcher: DispatcherConfig { tolerance_secs: 300, interval_secs: 60 },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                webhook_port: 8088,
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("outdial.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(telephony) = patch.telephony {
            if let Some(account_sid) = telephony.account_sid {
                self.telephony.account_sid = Some(account_sid);
            }
            if let Some(auth_token_value) = telephony.auth_token {
                self.telephony.auth_token = Some(auth_token_value.into());
            }
            if let Some(api_base_url) = telephony.api_base_url {
                self.telephony.api_base_url = api_base_url;
            }
            if let Some(caller_number) = telephony.caller_number {
                self.telephony.caller_number = caller_number;
            }
            if let Some(callback_base_url) = telephony.callback_base_url {
                self.telephony.callback_base_url = callback_base_url;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key_value) = llm.api_key {
                self.llm.api_key = Some(api_key_value.into());
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(conversation) = patch.conversation {
            if let Some(max_turns) = conversation.max_turns {
                self.conversation.max_turns = max_turns;
            }
            if let Some(gather_timeout_secs) = conversation.gather_timeout_secs {
                self.conversation.gather_timeout_secs = gather_timeout_secs;
            }
        }

        if let Some(dispatcher) = patch.dispatcher {
            if let Some(tolerance_secs) = dispatcher.tolerance_secs {
                self.dispatcher.tolerance_secs = tolerance_secs;
            }
            if let Some(interval_secs) = dispatcher.interval_secs {
                self.dispatcher.interval_secs = interval_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(webhook_port) = server.webhook_port {
                self.server.webhook_port = webhook_port;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("OUTDIAL_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("OUTDIAL_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("OUTDIAL_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("OUTDIAL_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("OUTDIAL_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("OUTDIAL_TELEPHONY_ACCOUNT_SID") {
            self.telephony.account_sid = Some(value);
        }
        if let Some(value) = read_env("OUTDIAL_TELEPHONY_AUTH_TOKEN") {
            self.telephony.auth_token = Some(value.into());
        }
        if let Some(value) = read_env("OUTDIAL_TELEPHONY_API_BASE_URL") {
            self.telephony.api_base_url = value;
        }
        if let Some(value) = read_env("OUTDIAL_TELEPHONY_CALLER_NUMBER") {
            self.telephony.caller_number = value;
        }
        if let Some(value) = read_env("OUTDIAL_TELEPHONY_CALLBACK_BASE_URL") {
            self.telephony.callback_base_url = value;
        }

        if let Some(value) = read_env("OUTDIAL_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("OUTDIAL_LLM_API_KEY") {
            self.llm.api_key = Some(value.into());
        }
        if let Some(value) = read_env("OUTDIAL_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("OUTDIAL_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("OUTDIAL_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("OUTDIAL_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("OUTDIAL_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("OUTDIAL_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("OUTDIAL_CONVERSATION_MAX_TURNS") {
            self.conversation.max_turns = parse_u32("OUTDIAL_CONVERSATION_MAX_TURNS", &value)?;
        }
        if let Some(value) = read_env("OUTDIAL_CONVERSATION_GATHER_TIMEOUT_SECS") {
            self.conversation.gather_timeout_secs =
                parse_u32("OUTDIAL_CONVERSATION_GATHER_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("OUTDIAL_DISPATCHER_TOLERANCE_SECS") {
            self.dispatcher.tolerance_secs =
                parse_u64("OUTDIAL_DISPATCHER_TOLERANCE_SECS", &value)?;
        }
        if let Some(value) = read_env("OUTDIAL_DISPATCHER_INTERVAL_SECS") {
            self.dispatcher.interval_secs = parse_u64("OUTDIAL_DISPATCHER_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = read_env("OUTDIAL_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("OUTDIAL_SERVER_WEBHOOK_PORT") {
            self.server.webhook_port = parse_u16("OUTDIAL_SERVER_WEBHOOK_PORT", &value)?;
        }
        if let Some(value) = read_env("OUTDIAL_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port = parse_u16("OUTDIAL_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("OUTDIAL_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("OUTDIAL_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("OUTDIAL_LOGGING_LEVEL").or_else(|| read_env("OUTDIAL_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("OUTDIAL_LOGGING_FORMAT").or_else(|| read_env("OUTDIAL_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(llm_api_key.into());
        }
        if let Some(caller_number) = overrides.caller_number {
            self.telephony.caller_number = caller_number;
        }
        if let Some(callback_base_url) = overrides.callback_base_url {
            self.telephony.callback_base_url = callback_base_url;
        }
        if let Some(max_turns) = overrides.max_turns {
            self.conversation.max_turns = max_turns;
        }
        if let Some(tolerance_secs) = overrides.tolerance_secs {
            self.dispatcher.tolerance_secs = tolerance_secs;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_telephony(&self.telephony)?;
        validate_llm(&self.llm)?;
        validate_conversation(&self.conversation)?;
        validate_dispatcher(&self.dispatcher)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("outdial.toml"), PathBuf::from("config/outdial.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_telephony(telephony: &TelephonyConfig) -> Result<(), ConfigError> {
    // Credentials are optional (no-dial mode), but they come as a pair.
    match (&telephony.account_sid, &telephony.auth_token) {
        (Some(_), None) => {
            return Err(ConfigError::Validation(
                "telephony.account_sid is set but telephony.auth_token is missing".to_string(),
            ));
        }
        (None, Some(_)) => {
            return Err(ConfigError::Validation(
                "telephony.auth_token is set but telephony.account_sid is missing".to_string(),
            ));
        }
        _ => {}
    }

    if let Some(token) = &telephony.auth_token {
        if token.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(
                "telephony.auth_token must not be empty when set".to_string(),
            ));
        }
    }

    if telephony.caller_number.trim().is_empty() {
        return Err(ConfigError::Validation("telephony.caller_number is required".to_string()));
    }

    for (key, url) in [
        ("telephony.api_base_url", &telephony.api_base_url),
        ("telephony.callback_base_url", &telephony.callback_base_url),
    ] {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "{key} must start with http:// or https://"
            )));
        }
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_conversation(conversation: &ConversationConfig) -> Result<(), ConfigError> {
    if conversation.max_turns == 0 || conversation.max_turns > 100 {
        return Err(ConfigError::Validation(
            "conversation.max_turns must be in range 1..=100".to_string(),
        ));
    }

    if conversation.gather_timeout_secs == 0 || conversation.gather_timeout_secs > 60 {
        return Err(ConfigError::Validation(
            "conversation.gather_timeout_secs must be in range 1..=60".to_string(),
        ));
    }

    Ok(())
}

fn validate_dispatcher(dispatcher: &DispatcherConfig) -> Result<(), ConfigError> {
    if dispatcher.tolerance_secs == 0 || dispatcher.tolerance_secs > 3600 {
        return Err(ConfigError::Validation(
            "dispatcher.tolerance_secs must be in range 1..=3600".to_string(),
        ));
    }

    if dispatcher.interval_secs == 0 {
        return Err(ConfigError::Validation(
            "dispatcher.interval_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.webhook_port == 0 {
        return Err(ConfigError::Validation(
            "server.webhook_port must be greater than zero".to_string(),
        ));
    }

    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.webhook_port == server.health_check_port {
        return Err(ConfigError::Validation(
            "server.webhook_port and server.health_check_port must differ".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    telephony: Option<TelephonyPatch>,
    llm: Option<LlmPatch>,
    conversation: Option<ConversationPatch>,
    dispatcher: Option<DispatcherPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TelephonyPatch {
    account_sid: Option<String>,
    auth_token: Option<String>,
    api_base_url: Option<String>,
    caller_number: Option<String>,
    callback_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationPatch {
    max_turns: Option<u32>,
    gather_timeout_secs: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct DispatcherPatch {
    tolerance_secs: Option<u64>,
    interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    webhook_port: Option<u16>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_validate_without_any_input() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.dispatcher.tolerance_secs == 300, "default tolerance should be 300s")?;
        ensure(config.conversation.max_turns == 10, "default turn ceiling should be 10")?;
        ensure(config.telephony.account_sid.is_none(), "defaults run in no-dial mode")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_TELEPHONY_SID", "AC-from-env");
        env::set_var("TEST_TELEPHONY_TOKEN", "token-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("outdial.toml");
            fs::write(
                &path,
                r#"
[telephony]
account_sid = "${TEST_TELEPHONY_SID}"
auth_token = "${TEST_TELEPHONY_TOKEN}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.telephony.account_sid.as_deref() == Some("AC-from-env"),
                "account sid should be loaded from environment",
            )?;
            let token = config
                .telephony
                .auth_token
                .as_ref()
                .map(|token| token.expose_secret().to_string());
            ensure(
                token.as_deref() == Some("token-from-env"),
                "auth token should be loaded from environment",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_TELEPHONY_SID", "TEST_TELEPHONY_TOKEN"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("OUTDIAL_DATABASE_URL", "sqlite://from-env.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("outdial.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            Ok(())
        })();

        clear_vars(&["OUTDIAL_DATABASE_URL"]);
        result
    }

    #[test]
    fn lone_telephony_credential_fails_validation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("OUTDIAL_TELEPHONY_ACCOUNT_SID", "AC-lonely");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("telephony.auth_token")
            );
            ensure(has_message, "validation failure should mention telephony.auth_token")
        })();

        clear_vars(&["OUTDIAL_TELEPHONY_ACCOUNT_SID"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("OUTDIAL_TELEPHONY_ACCOUNT_SID", "AC-debug");
        env::set_var("OUTDIAL_TELEPHONY_AUTH_TOKEN", "super-secret-token");
        env::set_var("OUTDIAL_LLM_API_KEY", "sk-super-secret");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("super-secret-token"),
                "debug output should not contain the auth token",
            )?;
            ensure(
                !debug.contains("sk-super-secret"),
                "debug output should not contain the llm api key",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&[
            "OUTDIAL_TELEPHONY_ACCOUNT_SID",
            "OUTDIAL_TELEPHONY_AUTH_TOKEN",
            "OUTDIAL_LLM_API_KEY",
        ]);
        result
    }

    #[test]
    fn out_of_range_turn_ceiling_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let error = match AppConfig::load(LoadOptions {
            overrides: ConfigOverrides { max_turns: Some(0), ..ConfigOverrides::default() },
            ..LoadOptions::default()
        }) {
            Ok(_) => return Err("expected validation failure".to_string()),
            Err(error) => error,
        };

        ensure(
            matches!(error, ConfigError::Validation(ref message) if message.contains("max_turns")),
            "validation failure should mention max_turns",
        )
    }
}
