use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hard ceiling on inline + asynchronous attempts for one logical send.
/// Bounds total provider API load regardless of configuration.
pub const TOTAL_SEND_ATTEMPT_CAP: u32 = 3;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub instagram: InstagramConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub worker: WorkerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct InstagramConfig {
    /// App secret used to verify `X-Hub-Signature-256` on inbound webhooks.
    pub app_secret: SecretString,
    /// Token echoed back during the GET subscription handshake.
    pub verify_token: SecretString,
    pub api_base_url: String,
    pub send_timeout_secs: u64,
    /// Attempt budget for the synchronous webhook path.
    pub inline_max_attempts: u32,
    /// Attempt budget for the dead-letter re-driver.
    pub redrive_max_attempts: u32,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub poll_interval_secs: u64,
    pub batch_size: u32,
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
    pub instagram_app_secret: Option<String>,
    pub instagram_verify_token: Option<String>,
    pub instagram_api_base_url: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
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
                url: "sqlite://replyflow.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            instagram: InstagramConfig {
                app_secret: String::new().into(),
                verify_token: String::new().into(),
                api_base_url: "https://graph.instagram.com/v21.0".to_string(),
                send_timeout_secs: 10,
                inline_max_attempts: 1,
                redrive_max_attempts: 2,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8090,
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            worker: WorkerConfig { poll_interval_secs: 5, batch_size: 20 },
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("replyflow.toml"));
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

        if let Some(instagram) = patch.instagram {
            if let Some(app_secret_value) = instagram.app_secret {
                self.instagram.app_secret = app_secret_value.into();
            }
            if let Some(verify_token_value) = instagram.verify_token {
                self.instagram.verify_token = verify_token_value.into();
            }
            if let Some(api_base_url) = instagram.api_base_url {
                self.instagram.api_base_url = api_base_url;
            }
            if let Some(send_timeout_secs) = instagram.send_timeout_secs {
                self.instagram.send_timeout_secs = send_timeout_secs;
            }
            if let Some(inline_max_attempts) = instagram.inline_max_attempts {
                self.instagram.inline_max_attempts = inline_max_attempts;
            }
            if let Some(redrive_max_attempts) = instagram.redrive_max_attempts {
                self.instagram.redrive_max_attempts = redrive_max_attempts;
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
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(worker) = patch.worker {
            if let Some(poll_interval_secs) = worker.poll_interval_secs {
                self.worker.poll_interval_secs = poll_interval_secs;
            }
            if let Some(batch_size) = worker.batch_size {
                self.worker.batch_size = batch_size;
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
        if let Some(value) = read_env("REPLYFLOW_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("REPLYFLOW_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("REPLYFLOW_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("REPLYFLOW_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("REPLYFLOW_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("REPLYFLOW_INSTAGRAM_APP_SECRET") {
            self.instagram.app_secret = value.into();
        }
        if let Some(value) = read_env("REPLYFLOW_INSTAGRAM_VERIFY_TOKEN") {
            self.instagram.verify_token = value.into();
        }
        if let Some(value) = read_env("REPLYFLOW_INSTAGRAM_API_BASE_URL") {
            self.instagram.api_base_url = value;
        }
        if let Some(value) = read_env("REPLYFLOW_INSTAGRAM_SEND_TIMEOUT_SECS") {
            self.instagram.send_timeout_secs =
                parse_u64("REPLYFLOW_INSTAGRAM_SEND_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("REPLYFLOW_INSTAGRAM_INLINE_MAX_ATTEMPTS") {
            self.instagram.inline_max_attempts =
                parse_u32("REPLYFLOW_INSTAGRAM_INLINE_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("REPLYFLOW_INSTAGRAM_REDRIVE_MAX_ATTEMPTS") {
            self.instagram.redrive_max_attempts =
                parse_u32("REPLYFLOW_INSTAGRAM_REDRIVE_MAX_ATTEMPTS", &value)?;
        }

        if let Some(value) = read_env("REPLYFLOW_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("REPLYFLOW_LLM_API_KEY") {
            self.llm.api_key = Some(value.into());
        }
        if let Some(value) = read_env("REPLYFLOW_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("REPLYFLOW_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("REPLYFLOW_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("REPLYFLOW_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("REPLYFLOW_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("REPLYFLOW_SERVER_PORT") {
            self.server.port = parse_u16("REPLYFLOW_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("REPLYFLOW_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("REPLYFLOW_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("REPLYFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("REPLYFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("REPLYFLOW_WORKER_POLL_INTERVAL_SECS") {
            self.worker.poll_interval_secs =
                parse_u64("REPLYFLOW_WORKER_POLL_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("REPLYFLOW_WORKER_BATCH_SIZE") {
            self.worker.batch_size = parse_u32("REPLYFLOW_WORKER_BATCH_SIZE", &value)?;
        }

        let log_level =
            read_env("REPLYFLOW_LOGGING_LEVEL").or_else(|| read_env("REPLYFLOW_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("REPLYFLOW_LOGGING_FORMAT").or_else(|| read_env("REPLYFLOW_LOG_FORMAT"));
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
        if let Some(app_secret) = overrides.instagram_app_secret {
            self.instagram.app_secret = app_secret.into();
        }
        if let Some(verify_token) = overrides.instagram_verify_token {
            self.instagram.verify_token = verify_token.into();
        }
        if let Some(api_base_url) = overrides.instagram_api_base_url {
            self.instagram.api_base_url = api_base_url;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_instagram(&self.instagram)?;
        validate_llm(&self.llm)?;
        validate_server(&self.server)?;
        validate_worker(&self.worker)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("replyflow.toml"), PathBuf::from("config/replyflow.toml")]
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

fn validate_instagram(instagram: &InstagramConfig) -> Result<(), ConfigError> {
    if instagram.app_secret.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "instagram.app_secret is required to verify webhook signatures".to_string(),
        ));
    }
    if instagram.verify_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "instagram.verify_token is required for the webhook subscription handshake"
                .to_string(),
        ));
    }
    if !instagram.api_base_url.starts_with("http://")
        && !instagram.api_base_url.starts_with("https://")
    {
        return Err(ConfigError::Validation(
            "instagram.api_base_url must start with http:// or https://".to_string(),
        ));
    }
    if instagram.send_timeout_secs == 0 || instagram.send_timeout_secs > 60 {
        return Err(ConfigError::Validation(
            "instagram.send_timeout_secs must be in range 1..=60".to_string(),
        ));
    }
    if instagram.inline_max_attempts == 0 || instagram.redrive_max_attempts == 0 {
        return Err(ConfigError::Validation(
            "instagram attempt budgets must be greater than zero".to_string(),
        ));
    }
    if instagram.inline_max_attempts + instagram.redrive_max_attempts > TOTAL_SEND_ATTEMPT_CAP {
        return Err(ConfigError::Validation(format!(
            "instagram.inline_max_attempts + instagram.redrive_max_attempts must not exceed {TOTAL_SEND_ATTEMPT_CAP}"
        )));
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

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 || server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server ports must be greater than zero".to_string(),
        ));
    }
    if server.port == server.health_check_port {
        return Err(ConfigError::Validation(
            "server.port and server.health_check_port must differ".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_worker(worker: &WorkerConfig) -> Result<(), ConfigError> {
    if worker.poll_interval_secs == 0 || worker.poll_interval_secs > 3600 {
        return Err(ConfigError::Validation(
            "worker.poll_interval_secs must be in range 1..=3600".to_string(),
        ));
    }
    if worker.batch_size == 0 || worker.batch_size > 500 {
        return Err(ConfigError::Validation(
            "worker.batch_size must be in range 1..=500".to_string(),
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
    instagram: Option<InstagramPatch>,
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    worker: Option<WorkerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct InstagramPatch {
    app_secret: Option<String>,
    verify_token: Option<String>,
    api_base_url: Option<String>,
    send_timeout_secs: Option<u64>,
    inline_max_attempts: Option<u32>,
    redrive_max_attempts: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkerPatch {
    poll_interval_secs: Option<u64>,
    batch_size: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
