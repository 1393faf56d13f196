//! Configuration loading
//!
//! All configuration arrives through environment variables at startup; a
//! `.env` file is honored for local development. Startup fails fast on a
//! missing required value so the process runners can exit with code 1.

use std::time::Duration;
use thiserror::Error;

/// Configuration loading failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Class monitor settings
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Seconds between poll ticks
    pub poll_interval: Duration,
    /// Maximum ended classes examined per tick
    pub batch_size: u32,
    /// Hard deadline for one outbound webhook call
    pub webhook_timeout: Duration,
}

/// Transcript worker settings
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
    /// Maximum rows claimed per tick
    pub batch_size: u32,
    /// Attempts before a row becomes terminally failed
    pub max_retries: u32,
    /// Exclusive claim duration; a lapsed lease is reclaimable
    pub lease_duration: Duration,
    /// Soft deadline for one exercise-engine call
    pub engine_deadline: Duration,
}

/// Exercise engine settings
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Chat-completions endpoint for the optional LLM path
    pub llm_base_url: String,
    /// Absent key disables the LLM path entirely
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    /// Absent value disables translation
    pub translation_target_language: Option<String>,
    /// Minimum quality score before `quality_passed` flips false
    pub quality_min: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            llm_base_url: "https://api.openai.com/v1/chat/completions".to_string(),
            llm_api_key: None,
            llm_model: "gpt-4o-mini".to_string(),
            translation_target_language: None,
            quality_min: 60,
        }
    }
}

/// Full process configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Connection string for the operational (classes) store
    pub operational_dsn: String,
    /// Base URL of the analytical row store
    pub analytical_url: String,
    /// API key for the analytical row store
    pub analytical_key: String,
    /// Outbound workflow endpoint (required)
    pub webhook_url: String,
    pub monitor: MonitorConfig,
    pub worker: WorkerConfig,
    pub engine: EngineConfig,
    /// Bind address for the HTTP surface
    pub api_bind_address: String,
    /// Replay window for the Idempotency-Key cache
    pub idempotency_window: Duration,
    /// How long in-flight work may finish after a shutdown signal
    pub shutdown_grace: Duration,
}

fn required(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), raw)),
        Err(_) => Ok(default),
    }
}

fn seconds(name: &str, default: u64) -> Result<Duration, ConfigError> {
    Ok(Duration::from_secs(parsed(name, default)?))
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// A `.env` file is consulted for development; tests construct `Config`
    /// values directly and never touch the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let operational_dsn = required("STORE_OPERATIONAL_DSN")?;
        let analytical_url = required("STORE_ANALYTICAL_URL")?;
        let analytical_key = required("STORE_ANALYTICAL_KEY")?;
        let webhook_url = required("WEBHOOK_URL")?;

        let monitor = MonitorConfig {
            poll_interval: seconds("MONITOR_POLL_INTERVAL_SECONDS", 60)?,
            batch_size: parsed("MONITOR_BATCH_SIZE", 50u32)?,
            webhook_timeout: seconds("WEBHOOK_TIMEOUT_SECONDS", 30)?,
        };

        let worker = WorkerConfig {
            poll_interval: seconds("WORKER_POLL_INTERVAL_SECONDS", 60)?,
            batch_size: parsed("WORKER_BATCH_SIZE", 10u32)?,
            max_retries: parsed("WORKER_MAX_RETRIES", 5u32)?,
            lease_duration: seconds("WORKER_LEASE_SECONDS", 600)?,
            engine_deadline: seconds("WORKER_ENGINE_DEADLINE_SECONDS", 60)?,
        };

        let defaults = EngineConfig::default();
        let engine = EngineConfig {
            llm_base_url: std::env::var("LLM_BASE_URL").unwrap_or(defaults.llm_base_url),
            llm_api_key: std::env::var("LLM_API_KEY").ok().filter(|k| !k.is_empty()),
            llm_model: std::env::var("LLM_MODEL").unwrap_or(defaults.llm_model),
            translation_target_language: std::env::var("TRANSLATION_TARGET_LANGUAGE")
                .ok()
                .filter(|l| !l.is_empty()),
            quality_min: parsed("QUALITY_MIN", 60u32)?,
        };

        Ok(Self {
            operational_dsn,
            analytical_url,
            analytical_key,
            webhook_url,
            monitor,
            worker,
            engine,
            api_bind_address: std::env::var("API_BIND_ADDRESS")
                .unwrap_or_else(|_| "127.0.0.1:8080".to_string()),
            idempotency_window: seconds("IDEMPOTENCY_WINDOW_SECONDS", 600)?,
            shutdown_grace: seconds("SHUTDOWN_GRACE_SECONDS", 10)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_defaults() {
        let engine = EngineConfig::default();
        assert!(engine.llm_api_key.is_none());
        assert_eq!(engine.quality_min, 60);
    }
}
