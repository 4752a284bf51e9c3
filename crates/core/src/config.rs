use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of nearest documents the retriever asks the vector index for.
pub const RETRIEVAL_TOP_K: usize = 5;

/// Number of prior conversation messages fetched for condensation.
pub const HISTORY_WINDOW: usize = 6;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub slack: SlackConfig,
    pub openai: OpenAiConfig,
    pub pinecone: PineconeConfig,
    pub retrieval: RetrievalConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub app_token: SecretString,
    pub bot_token: SecretString,
}

#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub api_key: SecretString,
    pub model: String,
    pub embedding_model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct PineconeConfig {
    pub api_key: SecretString,
    pub environment: String,
    pub index_name: String,
    pub namespace: String,
    pub text_key: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub history_window: usize,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
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
    pub log_level: Option<String>,
    pub slack_app_token: Option<String>,
    pub slack_bot_token: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_model: Option<String>,
    pub pinecone_api_key: Option<String>,
    pub pinecone_environment: Option<String>,
    pub pinecone_index_name: Option<String>,
    pub pinecone_namespace: Option<String>,
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
            slack: SlackConfig { app_token: String::new().into(), bot_token: String::new().into() },
            openai: OpenAiConfig {
                api_key: String::new().into(),
                model: "gpt-3.5-turbo-16k".to_string(),
                embedding_model: "text-embedding-ada-002".to_string(),
                max_tokens: 2000,
                timeout_secs: 120,
            },
            pinecone: PineconeConfig {
                api_key: String::new().into(),
                environment: String::new(),
                index_name: String::new(),
                namespace: String::new(),
                text_key: "combined".to_string(),
                timeout_secs: 30,
            },
            retrieval: RetrievalConfig { top_k: RETRIEVAL_TOP_K, history_window: HISTORY_WINDOW },
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), port: 3000 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("trailhead.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(slack) = patch.slack {
            if let Some(app_token) = slack.app_token {
                self.slack.app_token = app_token.into();
            }
            if let Some(bot_token) = slack.bot_token {
                self.slack.bot_token = bot_token.into();
            }
        }

        if let Some(openai) = patch.openai {
            if let Some(api_key) = openai.api_key {
                self.openai.api_key = api_key.into();
            }
            if let Some(model) = openai.model {
                self.openai.model = model;
            }
            if let Some(embedding_model) = openai.embedding_model {
                self.openai.embedding_model = embedding_model;
            }
            if let Some(max_tokens) = openai.max_tokens {
                self.openai.max_tokens = max_tokens;
            }
            if let Some(timeout_secs) = openai.timeout_secs {
                self.openai.timeout_secs = timeout_secs;
            }
        }

        if let Some(pinecone) = patch.pinecone {
            if let Some(api_key) = pinecone.api_key {
                self.pinecone.api_key = api_key.into();
            }
            if let Some(environment) = pinecone.environment {
                self.pinecone.environment = environment;
            }
            if let Some(index_name) = pinecone.index_name {
                self.pinecone.index_name = index_name;
            }
            if let Some(namespace) = pinecone.namespace {
                self.pinecone.namespace = namespace;
            }
            if let Some(text_key) = pinecone.text_key {
                self.pinecone.text_key = text_key;
            }
            if let Some(timeout_secs) = pinecone.timeout_secs {
                self.pinecone.timeout_secs = timeout_secs;
            }
        }

        if let Some(retrieval) = patch.retrieval {
            if let Some(top_k) = retrieval.top_k {
                self.retrieval.top_k = top_k;
            }
            if let Some(history_window) = retrieval.history_window {
                self.retrieval.history_window = history_window;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
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
        let app_token =
            read_env("TRAILHEAD_SLACK_APP_TOKEN").or_else(|| read_env("SLACK_APP_TOKEN"));
        if let Some(value) = app_token {
            self.slack.app_token = value.into();
        }
        let bot_token =
            read_env("TRAILHEAD_SLACK_BOT_TOKEN").or_else(|| read_env("SLACK_BOT_TOKEN"));
        if let Some(value) = bot_token {
            self.slack.bot_token = value.into();
        }

        let openai_key = read_env("TRAILHEAD_OPENAI_API_KEY").or_else(|| read_env("OPENAI_API_KEY"));
        if let Some(value) = openai_key {
            self.openai.api_key = value.into();
        }
        if let Some(value) = read_env("TRAILHEAD_OPENAI_MODEL") {
            self.openai.model = value;
        }
        if let Some(value) = read_env("TRAILHEAD_OPENAI_EMBEDDING_MODEL") {
            self.openai.embedding_model = value;
        }
        if let Some(value) = read_env("TRAILHEAD_OPENAI_MAX_TOKENS") {
            self.openai.max_tokens = parse_u32("TRAILHEAD_OPENAI_MAX_TOKENS", &value)?;
        }
        if let Some(value) = read_env("TRAILHEAD_OPENAI_TIMEOUT_SECS") {
            self.openai.timeout_secs = parse_u64("TRAILHEAD_OPENAI_TIMEOUT_SECS", &value)?;
        }

        let pinecone_key =
            read_env("TRAILHEAD_PINECONE_API_KEY").or_else(|| read_env("PINECONE_API_KEY"));
        if let Some(value) = pinecone_key {
            self.pinecone.api_key = value.into();
        }
        let environment =
            read_env("TRAILHEAD_PINECONE_ENVIRONMENT").or_else(|| read_env("PINECONE_ENVIRONMENT"));
        if let Some(value) = environment {
            self.pinecone.environment = value;
        }
        let index_name =
            read_env("TRAILHEAD_PINECONE_INDEX_NAME").or_else(|| read_env("PINECONE_INDEX_NAME"));
        if let Some(value) = index_name {
            self.pinecone.index_name = value;
        }
        let namespace =
            read_env("TRAILHEAD_PINECONE_NAMESPACE").or_else(|| read_env("PINECONE_NAME_SPACE"));
        if let Some(value) = namespace {
            self.pinecone.namespace = value;
        }
        if let Some(value) = read_env("TRAILHEAD_PINECONE_TEXT_KEY") {
            self.pinecone.text_key = value;
        }
        if let Some(value) = read_env("TRAILHEAD_PINECONE_TIMEOUT_SECS") {
            self.pinecone.timeout_secs = parse_u64("TRAILHEAD_PINECONE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TRAILHEAD_RETRIEVAL_TOP_K") {
            self.retrieval.top_k = parse_usize("TRAILHEAD_RETRIEVAL_TOP_K", &value)?;
        }
        if let Some(value) = read_env("TRAILHEAD_RETRIEVAL_HISTORY_WINDOW") {
            self.retrieval.history_window =
                parse_usize("TRAILHEAD_RETRIEVAL_HISTORY_WINDOW", &value)?;
        }

        if let Some(value) = read_env("TRAILHEAD_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        let port = read_env("TRAILHEAD_SERVER_PORT").or_else(|| read_env("PORT"));
        if let Some(value) = port {
            self.server.port = parse_u16("TRAILHEAD_SERVER_PORT", &value)?;
        }

        let log_level =
            read_env("TRAILHEAD_LOGGING_LEVEL").or_else(|| read_env("TRAILHEAD_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("TRAILHEAD_LOGGING_FORMAT").or_else(|| read_env("TRAILHEAD_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(slack_app_token) = overrides.slack_app_token {
            self.slack.app_token = slack_app_token.into();
        }
        if let Some(slack_bot_token) = overrides.slack_bot_token {
            self.slack.bot_token = slack_bot_token.into();
        }
        if let Some(openai_api_key) = overrides.openai_api_key {
            self.openai.api_key = openai_api_key.into();
        }
        if let Some(openai_model) = overrides.openai_model {
            self.openai.model = openai_model;
        }
        if let Some(pinecone_api_key) = overrides.pinecone_api_key {
            self.pinecone.api_key = pinecone_api_key.into();
        }
        if let Some(pinecone_environment) = overrides.pinecone_environment {
            self.pinecone.environment = pinecone_environment;
        }
        if let Some(pinecone_index_name) = overrides.pinecone_index_name {
            self.pinecone.index_name = pinecone_index_name;
        }
        if let Some(pinecone_namespace) = overrides.pinecone_namespace {
            self.pinecone.namespace = pinecone_namespace;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_slack(&self.slack)?;
        validate_openai(&self.openai)?;
        validate_pinecone(&self.pinecone)?;
        validate_retrieval(&self.retrieval)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("trailhead.toml"), PathBuf::from("config/trailhead.toml")]
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

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    let app_token = slack.app_token.expose_secret();
    if app_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.app_token is required. Get it from https://api.slack.com/apps > Your App > Basic Information > App-Level Tokens".to_string()
        ));
    }
    if !app_token.starts_with("xapp-") {
        let hint = if app_token.starts_with("xoxb-") {
            " (hint: you may have used the bot token instead of the app token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.app_token must start with `xapp-`{hint}. Get it from https://api.slack.com/apps"
        )));
    }

    let bot_token = slack.bot_token.expose_secret();
    if bot_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.bot_token is required. Get it from https://api.slack.com/apps > Your App > OAuth & Permissions > Bot User OAuth Token".to_string()
        ));
    }
    if !bot_token.starts_with("xoxb-") {
        let hint = if bot_token.starts_with("xapp-") {
            " (hint: you may have used the app token instead of the bot token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.bot_token must start with `xoxb-`{hint}. Get it from https://api.slack.com/apps"
        )));
    }

    Ok(())
}

fn validate_openai(openai: &OpenAiConfig) -> Result<(), ConfigError> {
    if openai.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "openai.api_key is required. Get it from https://platform.openai.com/api-keys"
                .to_string(),
        ));
    }

    if openai.model.trim().is_empty() || openai.embedding_model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "openai.model and openai.embedding_model must not be empty".to_string(),
        ));
    }

    if openai.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "openai.max_tokens must be greater than zero".to_string(),
        ));
    }

    if openai.timeout_secs == 0 || openai.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "openai.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    Ok(())
}

fn validate_pinecone(pinecone: &PineconeConfig) -> Result<(), ConfigError> {
    if pinecone.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "pinecone.api_key is required. Get it from https://app.pinecone.io".to_string(),
        ));
    }

    if pinecone.environment.trim().is_empty() {
        return Err(ConfigError::Validation(
            "pinecone.environment is required (the region string shown next to your index, e.g. `us-east1-gcp`)".to_string(),
        ));
    }

    if pinecone.index_name.trim().is_empty() {
        return Err(ConfigError::Validation("pinecone.index_name is required".to_string()));
    }

    // Empty namespace is valid: it addresses the index's default namespace.
    if pinecone.text_key.trim().is_empty() {
        return Err(ConfigError::Validation(
            "pinecone.text_key must name the metadata field holding document text".to_string(),
        ));
    }

    if pinecone.timeout_secs == 0 || pinecone.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "pinecone.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_retrieval(retrieval: &RetrievalConfig) -> Result<(), ConfigError> {
    if retrieval.top_k == 0 || retrieval.top_k > 100 {
        return Err(ConfigError::Validation(
            "retrieval.top_k must be in range 1..=100".to_string(),
        ));
    }

    if retrieval.history_window == 0 || retrieval.history_window > 100 {
        return Err(ConfigError::Validation(
            "retrieval.history_window must be in range 1..=100".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
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

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    slack: Option<SlackPatch>,
    openai: Option<OpenAiPatch>,
    pinecone: Option<PineconePatch>,
    retrieval: Option<RetrievalPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    app_token: Option<String>,
    bot_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiPatch {
    api_key: Option<String>,
    model: Option<String>,
    embedding_model: Option<String>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PineconePatch {
    api_key: Option<String>,
    environment: Option<String>,
    index_name: Option<String>,
    namespace: Option<String>,
    text_key: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RetrievalPatch {
    top_k: Option<usize>,
    history_window: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
