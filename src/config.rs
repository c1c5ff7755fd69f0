use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::env;
use tracing::{info, warn};

use crate::llm_providers::LLMProviderType;
use crate::timeline::HOURS_PER_WEEK;

// Import logging macros
use crate::{log_system_event, log_validation};

/// Complete application configuration loaded from environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub llm: LLMConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub timeline: TimelineConfig,
}

/// Database connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Large Language Model service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LLMConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub provider: LLMProviderType,
    pub model: Option<String>,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

/// Logging system configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_enabled: bool,
    pub console_enabled: bool,
    pub log_directory: String,
}

/// Defaults for timeline requests that do not specify their own capacity
#[derive(Debug, Clone, Deserialize)]
pub struct TimelineConfig {
    pub hours_per_week: f64,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Result<Self> {
        log_system_event!(config, "Loading application configuration from environment variables");

        let config = Config {
            database: DatabaseConfig::from_env()?,
            llm: LLMConfig::from_env()?,
            server: ServerConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            timeline: TimelineConfig::from_env()?,
        };

        log_system_event!(config, "Configuration loaded successfully");
        config.log_configuration_summary();

        Ok(config)
    }

    /// Log a summary of loaded configuration (without sensitive data)
    fn log_configuration_summary(&self) {
        info!(
            database_url_masked = %mask_sensitive_data(&self.database.url),
            llm_provider = ?self.llm.provider,
            llm_model = ?self.llm.model,
            llm_max_retries = self.llm.max_retries,
            server_address = %format!("{}:{}", self.server.host, self.server.port),
            log_level = %self.logging.level,
            hours_per_week = self.timeline.hours_per_week,
            "Configuration summary"
        );
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.database.url.starts_with("sqlite:") {
            return Err(anyhow!("DATABASE_URL must start with 'sqlite:'"));
        }

        if self.server.port == 0 {
            return Err(anyhow!("Server port must be greater than 0"));
        }

        if !(self.timeline.hours_per_week.is_finite() && self.timeline.hours_per_week > 0.0) {
            return Err(anyhow!("TIMELINE_HOURS_PER_WEEK must be a positive number"));
        }

        if self.llm.api_key.is_empty() || self.llm.api_key == "your-api-key" {
            warn!("LLM API key appears to be placeholder or empty - roadmap generation may not work");
        }

        if !["trace", "debug", "info", "warn", "error"]
            .iter()
            .any(|level| self.logging.level.to_lowercase().starts_with(level))
        {
            warn!("Unrecognized log level '{}', EnvFilter may fall back to defaults", self.logging.level);
        }

        log_validation!(success, "configuration", "Configuration validation completed successfully");
        Ok(())
    }
}

impl DatabaseConfig {
    fn from_env() -> Result<Self> {
        let url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:roadmap_planner.db?mode=rwc".to_string());

        Ok(DatabaseConfig { url })
    }
}

/// Map a provider name from the environment, defaulting to OpenAI
pub fn parse_provider(provider_str: &str) -> LLMProviderType {
    match provider_str.to_lowercase().as_str() {
        "gemini" | "google" => LLMProviderType::Gemini,
        "openai" | "chatgpt" | "gpt" => LLMProviderType::OpenAI,
        _ => {
            info!("Unknown LLM provider '{}', defaulting to OpenAI", provider_str);
            LLMProviderType::OpenAI
        }
    }
}

impl LLMConfig {
    fn from_env() -> Result<Self> {
        let api_key = env::var("LLM_API_KEY")
            .unwrap_or_else(|_| "your-api-key".to_string());

        let base_url = env::var("LLM_BASE_URL").ok();

        let provider_str = env::var("LLM_PROVIDER")
            .unwrap_or_else(|_| "openai".to_string());
        let provider = parse_provider(&provider_str);

        let model = env::var("LLM_MODEL").ok();

        let retries_str = env::var("LLM_MAX_RETRIES").unwrap_or_else(|_| "2".to_string());
        let max_retries = retries_str
            .parse::<u32>()
            .map_err(|_| anyhow!("Invalid LLM_MAX_RETRIES value: '{}'", retries_str))?;

        let timeout_str = env::var("LLM_TIMEOUT_SECS").unwrap_or_else(|_| "120".to_string());
        let timeout_secs = timeout_str
            .parse::<u64>()
            .map_err(|_| anyhow!("Invalid LLM_TIMEOUT_SECS value: '{}'", timeout_str))?;

        Ok(LLMConfig {
            api_key,
            base_url,
            provider,
            model,
            max_retries,
            timeout_secs,
        })
    }
}

impl ServerConfig {
    fn from_env() -> Result<Self> {
        let port_str = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string());

        let port = port_str.parse::<u16>()
            .map_err(|_| anyhow!("Invalid PORT value: '{}'. Must be a number between 1-65535", port_str))?;

        let host = env::var("HOST")
            .unwrap_or_else(|_| "0.0.0.0".to_string());

        Ok(ServerConfig { port, host })
    }
}

impl LoggingConfig {
    fn from_env() -> Result<Self> {
        let level = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info,roadmap_planner=debug".to_string());

        let file_enabled = env::var("LOG_FILE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let console_enabled = env::var("LOG_CONSOLE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let log_directory = env::var("LOG_DIRECTORY")
            .unwrap_or_else(|_| "logs".to_string());

        Ok(LoggingConfig {
            level,
            file_enabled,
            console_enabled,
            log_directory,
        })
    }
}

impl TimelineConfig {
    fn from_env() -> Result<Self> {
        let hours_str = match env::var("TIMELINE_HOURS_PER_WEEK") {
            Ok(value) => value,
            Err(_) => return Ok(TimelineConfig::default()),
        };

        let hours_per_week = hours_str
            .parse::<f64>()
            .map_err(|_| anyhow!("Invalid TIMELINE_HOURS_PER_WEEK value: '{}'", hours_str))?;

        Ok(TimelineConfig { hours_per_week })
    }
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            hours_per_week: HOURS_PER_WEEK,
        }
    }
}

/// Mask sensitive data in configuration for safe logging
fn mask_sensitive_data(data: &str) -> String {
    let chars: Vec<char> = data.chars().collect();
    if chars.len() <= 8 {
        "*".repeat(chars.len())
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}***{}", head, tail)
    }
}
