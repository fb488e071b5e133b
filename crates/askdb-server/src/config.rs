//! Server configuration.

use anyhow::Result;
use askdb_core::LlmConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Reporting database, opened read-only.
    #[serde(default = "default_reporting_db_path")]
    pub reporting_db_path: PathBuf,
    /// Chat log database, created if missing.
    #[serde(default = "default_chat_db_path")]
    pub chat_db_path: PathBuf,
    #[serde(default = "default_view_name")]
    pub view_name: String,
    #[serde(default = "default_row_limit")]
    pub row_limit: usize,
    #[serde(default = "default_session_timeout_minutes")]
    pub session_timeout_minutes: u64,
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,
    #[serde(default = "default_schema_cache_ttl_seconds")]
    pub schema_cache_ttl_seconds: u64,
    /// Replaces the built-in column semantics for the view.
    #[serde(default)]
    pub column_guide: Option<String>,
    #[serde(default)]
    pub llm: LlmConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("askdb")
}

fn default_reporting_db_path() -> PathBuf {
    data_dir().join("erp.db")
}

fn default_chat_db_path() -> PathBuf {
    data_dir().join("chat.db")
}

fn default_view_name() -> String {
    "v_open_order".to_string()
}

fn default_row_limit() -> usize {
    100
}

fn default_session_timeout_minutes() -> u64 {
    30
}

fn default_cleanup_interval_seconds() -> u64 {
    60
}

fn default_schema_cache_ttl_seconds() -> u64 {
    3600
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            reporting_db_path: default_reporting_db_path(),
            chat_db_path: default_chat_db_path(),
            view_name: default_view_name(),
            row_limit: default_row_limit(),
            session_timeout_minutes: default_session_timeout_minutes(),
            cleanup_interval_seconds: default_cleanup_interval_seconds(),
            schema_cache_ttl_seconds: default_schema_cache_ttl_seconds(),
            column_guide: None,
            llm: LlmConfig::default(),
        }
    }
}

impl Config {
    /// Load config from a specific file path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load config from default location (config/default.toml) or fall back to defaults.
    pub fn load() -> Result<Self> {
        let config_path = PathBuf::from("config/default.toml");
        if config_path.exists() {
            return Self::load_from(&config_path);
        }
        Ok(Config::default())
    }

    /// Apply ROW_LIMIT, SESSION_TIMEOUT_MINUTES, CLEANUP_INTERVAL_SECONDS,
    /// OPENAI_MODEL and INSIGHT_MODEL from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup. Unparseable numbers are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = parse_var(&lookup, "ROW_LIMIT") {
            self.row_limit = v;
        }
        if let Some(v) = parse_var(&lookup, "SESSION_TIMEOUT_MINUTES") {
            self.session_timeout_minutes = v;
        }
        if let Some(v) = parse_var(&lookup, "CLEANUP_INTERVAL_SECONDS") {
            self.cleanup_interval_seconds = v;
        }
        if let Some(model) = lookup("OPENAI_MODEL").filter(|m| !m.trim().is_empty()) {
            self.llm.sql_model = model;
        }
        if let Some(model) = lookup("INSIGHT_MODEL").filter(|m| !m.trim().is_empty()) {
            self.llm.insight_model = model;
        }
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_minutes * 60)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds.max(1))
    }

    pub fn schema_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.schema_cache_ttl_seconds)
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(target: "askdb::startup", "Ignoring invalid {}={:?}", key, raw);
            None
        }
    }
}
