//! Configuration management.
//!
//! Configuration is read from environment variables:
//! - `BUDGET_COMPASS_HOST` / `BUDGET_COMPASS_PORT` - HTTP bind address
//! - `PRICING_CACHE_DB` - Path to the SQLite pricing cache
//! - `OPENROUTER_API_KEY` - Optional. Enables live AI cost estimates
//! - `FLIGHT_API_URL` / `FLIGHT_API_KEY` - Optional. Enables live flight fares
//! - `PROVIDER_TIMEOUT_SECS` - Per provider call timeout
//! - `SESSION_*` - Progressive search session tuning
//! - `BATCH_*` - Cache warming throughput caps
//! - `DESTINATION_CATALOG` - Optional JSON file overriding the built-in catalog

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Tuning for progressive search sessions.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Wall-clock budget from creation before a session is forced to `timeout`
    pub max_duration: Duration,

    /// Sessions not polled for this long are evicted
    pub idle_ttl: Duration,

    /// How long a terminal session stays pollable
    pub terminal_grace: Duration,

    /// Destinations evaluated synchronously before the create call returns
    pub first_page_size: usize,

    /// Upper bound on the synchronous first page
    pub first_page_timeout: Duration,

    /// Destinations evaluated concurrently by the background task
    pub concurrency: usize,

    /// Interval of the eviction sweeper
    pub sweep_interval: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_duration: Duration::from_secs(120),
            idle_ttl: Duration::from_secs(600),
            terminal_grace: Duration::from_secs(300),
            first_page_size: 6,
            first_page_timeout: Duration::from_millis(4000),
            concurrency: 4,
            sweep_interval: Duration::from_secs(30),
        }
    }
}

/// Throughput caps for the cache warming job.
#[derive(Debug, Clone)]
pub struct BatchSettings {
    /// Cities processed concurrently per group
    pub group_size: usize,

    /// Pause between the hotel and daily-cost calls for one city
    pub call_delay: Duration,

    /// Pause between groups
    pub group_delay: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            group_size: 5,
            call_delay: Duration::from_millis(500),
            group_delay: Duration::from_millis(2000),
        }
    }
}

/// Settings for the AI estimation provider.
#[derive(Debug, Clone)]
pub struct EstimationSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    /// USD per million prompt tokens
    pub prompt_usd_per_mtok: f64,
    /// USD per million completion tokens
    pub completion_usd_per_mtok: f64,
}

impl Default for EstimationSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "openai/gpt-4o-mini".to_string(),
            prompt_usd_per_mtok: 0.15,
            completion_usd_per_mtok: 0.60,
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,

    /// SQLite file backing the pricing cache
    pub database_path: PathBuf,

    pub estimation: EstimationSettings,

    /// Live flight fare endpoint; `None` means fares are always estimated
    pub flight_api_url: Option<url::Url>,
    pub flight_api_key: Option<String>,

    /// Per provider call timeout; expiry counts as provider failure
    pub provider_timeout: Duration,

    pub session: SessionSettings,
    pub batch: BatchSettings,

    /// Optional JSON override for the destination catalog
    pub catalog_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            database_path: PathBuf::from("data/pricing_cache.sqlite"),
            estimation: EstimationSettings::default(),
            flight_api_url: None,
            flight_api_key: None,
            provider_timeout: Duration::from_secs(20),
            session: SessionSettings::default(),
            batch: BatchSettings::default(),
            catalog_path: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset variables fall back to defaults; set-but-malformed values are an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let estimation = EstimationSettings {
            api_key: env_string("OPENROUTER_API_KEY"),
            base_url: env_string("OPENROUTER_BASE_URL").unwrap_or(defaults.estimation.base_url),
            model: env_string("ESTIMATION_MODEL").unwrap_or(defaults.estimation.model),
            prompt_usd_per_mtok: env_parse(
                "ESTIMATION_PROMPT_USD_PER_MTOK",
                defaults.estimation.prompt_usd_per_mtok,
            )?,
            completion_usd_per_mtok: env_parse(
                "ESTIMATION_COMPLETION_USD_PER_MTOK",
                defaults.estimation.completion_usd_per_mtok,
            )?,
        };

        let flight_api_url = match env_string("FLIGHT_API_URL") {
            Some(raw) => Some(url::Url::parse(&raw).map_err(|e| {
                ConfigError::InvalidValue("FLIGHT_API_URL".to_string(), e.to_string())
            })?),
            None => None,
        };

        let session = SessionSettings {
            max_duration: env_secs("SESSION_MAX_SECS", defaults.session.max_duration)?,
            idle_ttl: env_secs("SESSION_IDLE_TTL_SECS", defaults.session.idle_ttl)?,
            terminal_grace: env_secs(
                "SESSION_TERMINAL_GRACE_SECS",
                defaults.session.terminal_grace,
            )?,
            first_page_size: env_parse(
                "SESSION_FIRST_PAGE_SIZE",
                defaults.session.first_page_size,
            )?,
            first_page_timeout: env_millis(
                "SESSION_FIRST_PAGE_TIMEOUT_MS",
                defaults.session.first_page_timeout,
            )?,
            concurrency: env_parse("SESSION_CONCURRENCY", defaults.session.concurrency)?.max(1),
            sweep_interval: env_secs("SESSION_SWEEP_SECS", defaults.session.sweep_interval)?,
        };

        let batch = BatchSettings {
            group_size: env_parse("BATCH_GROUP_SIZE", defaults.batch.group_size)?.max(1),
            call_delay: env_millis("BATCH_CALL_DELAY_MS", defaults.batch.call_delay)?,
            group_delay: env_millis("BATCH_GROUP_DELAY_MS", defaults.batch.group_delay)?,
        };

        Ok(Self {
            host: env_string("BUDGET_COMPASS_HOST").unwrap_or(defaults.host),
            port: env_parse("BUDGET_COMPASS_PORT", defaults.port)?,
            database_path: env_string("PRICING_CACHE_DB")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            estimation,
            flight_api_url,
            flight_api_key: env_string("FLIGHT_API_KEY"),
            provider_timeout: env_secs("PROVIDER_TIMEOUT_SECS", defaults.provider_timeout)?,
            session,
            batch,
            catalog_path: env_string("DESTINATION_CATALOG").map(PathBuf::from),
        })
    }

    /// The OpenRouter key, or an error naming the variable.
    pub fn require_estimation_key(&self) -> Result<&str, ConfigError> {
        self.estimation
            .api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("OPENROUTER_API_KEY".to_string()))
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env_string(name) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{raw}: {e}"))),
        None => Ok(default),
    }
}

fn env_secs(name: &str, default: Duration) -> Result<Duration, ConfigError> {
    env_parse(name, default.as_secs()).map(Duration::from_secs)
}

fn env_millis(name: &str, default: Duration) -> Result<Duration, ConfigError> {
    env_parse(name, default.as_millis() as u64).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.batch.group_size, 5);
        assert_eq!(config.session.first_page_size, 6);
        assert!(config.flight_api_url.is_none());
    }

    #[test]
    fn test_env_parse_rejects_garbage() {
        std::env::set_var("BUDGET_COMPASS_TEST_PARSE", "twelve");
        let err = env_parse::<u16>("BUDGET_COMPASS_TEST_PARSE", 1).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue(name, _) if name == "BUDGET_COMPASS_TEST_PARSE"
        ));
        std::env::remove_var("BUDGET_COMPASS_TEST_PARSE");
    }

    #[test]
    fn test_missing_estimation_key_is_reported() {
        let config = Config::default();
        let err = config.require_estimation_key().unwrap_err();
        assert!(err.to_string().contains("OPENROUTER_API_KEY"));
    }
}
