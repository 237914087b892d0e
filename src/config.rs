//! Runtime configuration read from the environment

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_REVEAL_INTERVAL: Duration = Duration::from_millis(30);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Generation provider configuration
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub gemini_api_key: Option<String>,
    pub model: String,
    /// Override for the Gemini REST endpoint (tests, proxies)
    pub base_url: Option<String>,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            gemini_api_key: std::env::var("GEMINI_API_KEY").ok(),
            model: std::env::var("PARLEY_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            base_url: std::env::var("PARLEY_GEMINI_BASE_URL").ok(),
        }
    }
}

/// Server binary configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub db_path: PathBuf,
    pub port: u16,
    /// Forward earlier turns of the chat to the provider
    pub forward_history: bool,
    /// Remove the persisted prompt again when generation fails
    pub rollback_failed_prompt: bool,
    pub llm: LlmConfig,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let db_path = std::env::var("PARLEY_DB_PATH").map_or_else(
            |_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".parley").join("parley.db")
            },
            PathBuf::from,
        );

        let port = match std::env::var("PARLEY_PORT") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: "PARLEY_PORT",
                value: raw,
            })?,
            Err(_) => DEFAULT_PORT,
        };

        Ok(Self {
            db_path,
            port,
            forward_history: env_flag("PARLEY_FORWARD_HISTORY"),
            rollback_failed_prompt: env_flag("PARLEY_ROLLBACK_FAILED_PROMPT"),
            llm: LlmConfig::from_env(),
        })
    }
}

/// Terminal client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    pub user_id: String,
    pub reveal_interval: Duration,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let user_id = std::env::var("PARLEY_USER_ID")
            .ok()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or(ConfigError::Missing("PARLEY_USER_ID"))?;

        let reveal_interval = match std::env::var("PARLEY_REVEAL_INTERVAL_MS") {
            Ok(raw) => raw
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| ConfigError::Invalid {
                    name: "PARLEY_REVEAL_INTERVAL_MS",
                    value: raw,
                })?,
            Err(_) => DEFAULT_REVEAL_INTERVAL,
        };

        Ok(Self {
            server_url: std::env::var("PARLEY_SERVER_URL")
                .unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string()),
            user_id,
            reveal_interval,
        })
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|v| parse_flag(&v))
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
