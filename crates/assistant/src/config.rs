//! Assistant configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `ASSISTANT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `OPENAI_API_KEY` - Chat-completions API key
//! - `SCRAPER_API_KEY` - Scraping service API key
//!
//! ## Optional
//! - `ASSISTANT_HOST` - Bind address (default: 127.0.0.1)
//! - `ASSISTANT_PORT` - Listen port (default: 3002)
//! - `OPENAI_MODEL` - Model ID (default: gpt-4o-mini)
//! - `OPENAI_BASE_URL` - API base URL (default: <https://api.openai.com/v1>)
//! - `MODEL_TIMEOUT_SECS` - Per-call model deadline (default: 60)
//! - `SCRAPER_BASE_URL` - Scraping service URL (default: <https://scraping.narf.ai/api/v1/>)
//! - `PROVIDER_TIMEOUT_SECS` - Per-call provider deadline (default: 30)
//! - `MARKETPLACES` - Providers searched in the first fan-out (default: amazon,noon)
//! - `DEFERRED_MARKETPLACES` - Providers searched on resume (default: none)
//! - `DEFAULT_COUNTRY` - Country for new sessions (default: ae)
//! - `SEARCH_RESULT_LIMIT` - Products per provider shown to the model (default: 10)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Traces sample rate (default: 0.1)
//! - `LOG_FORMAT` - `json` or `text` (default: text)

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

use cartwise_core::{Country, Platform};

const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_SCRAPER_BASE_URL: &str = "https://scraping.narf.ai/api/v1/";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "xxx",
    "todo",
    "insert",
    "put-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Assistant application configuration.
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Chat model configuration
    pub openai: OpenAiConfig,
    /// Scraping service configuration
    pub scraper: ScraperConfig,
    /// Marketplace fan-out configuration
    pub marketplaces: MarketplaceConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "staging", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate for performance monitoring (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
    /// Log output format
    pub log_format: LogFormat,
}

/// Chat-completions API configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: SecretString,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Scraping service configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct ScraperConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for ScraperConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScraperConfig")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Which providers run in which search stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketplaceConfig {
    /// Searched concurrently when the model first calls `search_products`.
    pub primary: Vec<Platform>,
    /// Searched by the `secondary_search` resume step.
    pub deferred: Vec<Platform>,
    /// Country assigned to sessions created without one.
    pub default_country: Country,
    /// Products per provider included in the model-facing table.
    pub search_result_limit: usize,
}

impl MarketplaceConfig {
    /// All configured providers, primary first. This is the preference order
    /// for resolving bare product ids.
    #[must_use]
    pub fn all(&self) -> Vec<Platform> {
        self.primary
            .iter()
            .chain(self.deferred.iter())
            .copied()
            .collect()
    }
}

impl AssistantConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("ASSISTANT_DATABASE_URL")?;
        let host = parse_env("ASSISTANT_HOST", "127.0.0.1")?;
        let port = parse_env("ASSISTANT_PORT", "3002")?;

        let openai = OpenAiConfig::from_env()?;
        let scraper = ScraperConfig::from_env()?;
        let marketplaces = MarketplaceConfig::from_env()?;

        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.1);
        let log_format = parse_log_format(&get_env_or_default("LOG_FORMAT", "text"))?;

        Ok(Self {
            database_url,
            host,
            port,
            openai,
            scraper,
            marketplaces,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
            log_format,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl OpenAiConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: get_validated_secret("OPENAI_API_KEY")?,
            model: get_env_or_default("OPENAI_MODEL", DEFAULT_OPENAI_MODEL),
            base_url: get_env_or_default("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL),
            timeout: Duration::from_secs(parse_env("MODEL_TIMEOUT_SECS", "60")?),
        })
    }
}

impl ScraperConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let base_url = get_env_or_default("SCRAPER_BASE_URL", DEFAULT_SCRAPER_BASE_URL);
        url::Url::parse(&base_url)
            .map_err(|e| ConfigError::InvalidEnvVar("SCRAPER_BASE_URL".to_string(), e.to_string()))?;

        Ok(Self {
            api_key: get_validated_secret("SCRAPER_API_KEY")?,
            base_url,
            timeout: Duration::from_secs(parse_env("PROVIDER_TIMEOUT_SECS", "30")?),
        })
    }
}

impl MarketplaceConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let primary = parse_platforms("MARKETPLACES", &get_env_or_default("MARKETPLACES", "amazon,noon"))?;
        let deferred = parse_platforms(
            "DEFERRED_MARKETPLACES",
            &get_env_or_default("DEFERRED_MARKETPLACES", ""),
        )?;

        if primary.is_empty() {
            return Err(ConfigError::InvalidEnvVar(
                "MARKETPLACES".to_string(),
                "at least one marketplace is required".to_string(),
            ));
        }
        if let Some(dup) = deferred.iter().find(|p| primary.contains(p)) {
            return Err(ConfigError::InvalidEnvVar(
                "DEFERRED_MARKETPLACES".to_string(),
                format!("{dup} is already listed in MARKETPLACES"),
            ));
        }

        let default_country = Country::parse(&get_env_or_default("DEFAULT_COUNTRY", "ae"))
            .map_err(|e| ConfigError::InvalidEnvVar("DEFAULT_COUNTRY".to_string(), e.to_string()))?;
        let search_result_limit: usize = parse_env("SEARCH_RESULT_LIMIT", "10")?;
        if search_result_limit == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "SEARCH_RESULT_LIMIT".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            primary,
            deferred,
            default_country,
            search_result_limit,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable (or its default) with `FromStr`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Parse a comma-separated platform list, ignoring blanks and duplicates.
fn parse_platforms(key: &str, raw: &str) -> Result<Vec<Platform>, ConfigError> {
    let mut platforms = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let platform: Platform = part
            .parse()
            .map_err(|e: cartwise_core::PlatformError| {
                ConfigError::InvalidEnvVar(key.to_string(), e.to_string())
            })?;
        if !platforms.contains(&platform) {
            platforms.push(platform);
        }
    }
    Ok(platforms)
}

fn parse_log_format(raw: &str) -> Result<LogFormat, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "text" | "" => Ok(LogFormat::Text),
        "json" => Ok(LogFormat::Json),
        other => Err(ConfigError::InvalidEnvVar(
            "LOG_FORMAT".to_string(),
            format!("expected json or text, got {other}"),
        )),
    }
}

/// Reject obvious placeholder values for API keys.
fn validate_secret(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    if lower.trim().is_empty() {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            "is empty".to_string(),
        ));
    }

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret(&value, key)?;
    Ok(SecretString::from(value))
}
