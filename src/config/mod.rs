use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// Empty means the chat endpoint is not configured.
    pub ws_base_url: String,
    pub heartbeat_interval_secs: u64,
    pub reconnect_delay_ms: u64,
    pub max_retries: u32,
}

impl ChatConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            ws_base_url: String::new(),
            heartbeat_interval_secs: 30,
            reconnect_delay_ms: 1000,
            max_retries: 4,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub path: PathBuf,
    pub passphrase: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub environment: String,
    pub api: ApiConfig,
    pub chat: ChatConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

fn with_defaults(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
    environment: &str,
) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
    builder
        .set_default("environment", environment)?
        .set_default("api.base_url", "http://127.0.0.1:8080")?
        .set_default("api.timeout_secs", 10)?
        .set_default("chat.ws_base_url", "")?
        .set_default("chat.heartbeat_interval_secs", 30)?
        .set_default("chat.reconnect_delay_ms", 1000)?
        .set_default("chat.max_retries", 4)?
        .set_default("storage.path", ".homepage/state.json")?
        .set_default("logging.level", "info")
}

/// `APP_CHAT__MAX_RETRIES=2` sets `chat.max_retries`. The prefix is joined
/// with a single `_`; without it `config` expects `APP__CHAT__...`.
fn environment() -> Environment {
    Environment::with_prefix("app")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = with_defaults(Config::builder(), "development")?
            // Add in settings from the config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(environment())
            .build()?;

        s.try_deserialize()
    }

    #[cfg(test)]
    pub fn new_for_test() -> Result<Self, ConfigError> {
        with_defaults(Config::builder(), "test")?
            .add_source(environment())
            .build()?
            .try_deserialize()
    }
}
