use duologue_core::{llm_client::OPENROUTER_BASE_URL, tts_client::GROQ_BASE_URL};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub openrouter_api_key: String,
    pub openrouter_base_url: String,
    /// Speech is unavailable without it; playback then falls back silently.
    pub groq_api_key: Option<String>,
    pub groq_base_url: String,
    pub data_dir: PathBuf,
    /// Prefix for share URLs handed back to clients.
    pub public_base_url: String,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let openrouter_api_key = std::env::var("OPENROUTER_API_KEY")
            .map_err(|_| ConfigError::MissingVar("OPENROUTER_API_KEY".to_string()))?;
        if !openrouter_api_key.starts_with("sk-or") {
            return Err(ConfigError::InvalidValue(
                "OPENROUTER_API_KEY".to_string(),
                "OpenRouter keys start with 'sk-or'".to_string(),
            ));
        }

        let groq_api_key = std::env::var("GROQ_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        if let Some(key) = &groq_api_key {
            if !key.starts_with("gsk_") {
                return Err(ConfigError::InvalidValue(
                    "GROQ_API_KEY".to_string(),
                    "Groq keys start with 'gsk_'".to_string(),
                ));
            }
        }

        let openrouter_base_url = std::env::var("OPENROUTER_BASE_URL")
            .unwrap_or_else(|_| OPENROUTER_BASE_URL.to_string());
        let groq_base_url =
            std::env::var("GROQ_BASE_URL").unwrap_or_else(|_| GROQ_BASE_URL.to_string());

        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));

        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .trim_end_matches('/')
            .to_string();

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            openrouter_api_key,
            openrouter_base_url,
            groq_api_key,
            groq_base_url,
            data_dir,
            public_base_url,
            log_level,
        })
    }
}
