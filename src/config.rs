use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::info;
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_CACHE_TYPE: &str = "in-memory";
const DEFAULT_CACHE_TTL_SECS: u64 = 3600;
const DEFAULT_LISTING_PURGE_PAGES: u64 = 20;
const DEFAULT_LOW_STOCK_THRESHOLD: i32 = 10;
const DEFAULT_PAGE_SIZE: u64 = 10;
const DEFAULT_DIGEST_HOUR: u32 = 18;
const DEFAULT_DIGEST_MINUTE: u32 = 0;

/// Cache configuration
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Type of cache to use: "in-memory" or "redis"
    #[serde(default = "default_cache_type")]
    pub cache_type: String,

    /// Redis connection URL for cache
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// TTL for cached catalog entries in seconds
    #[serde(default = "default_cache_ttl")]
    pub default_ttl_secs: u64,

    /// Pages per sort combination cleared by the enumeration purge fallback
    #[serde(default = "default_listing_purge_pages")]
    pub listing_purge_pages: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_type: default_cache_type(),
            redis_url: default_redis_url(),
            default_ttl_secs: default_cache_ttl(),
            listing_purge_pages: default_listing_purge_pages(),
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// Stock level at or below which a still-sellable product is flagged low
    #[serde(default = "default_low_stock_threshold")]
    #[validate(range(min = 1))]
    pub low_stock_threshold: i32,

    /// Catalog listing page size
    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, max = 100))]
    pub page_size: u64,

    /// Recipient of low-stock alerts and the daily sales digest
    #[serde(default = "default_admin_email")]
    pub admin_email: String,

    /// Local hour at which the daily sales digest fires
    #[serde(default = "default_digest_hour")]
    #[validate(range(max = 23))]
    pub digest_hour: u32,

    /// Local minute at which the daily sales digest fires
    #[serde(default = "default_digest_minute")]
    #[validate(range(max = 59))]
    pub digest_minute: u32,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,
}

fn default_cache_type() -> String {
    DEFAULT_CACHE_TYPE.to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_cache_ttl() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}

fn default_listing_purge_pages() -> u64 {
    DEFAULT_LISTING_PURGE_PAGES
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_low_stock_threshold() -> i32 {
    DEFAULT_LOW_STOCK_THRESHOLD
}

fn default_page_size() -> u64 {
    DEFAULT_PAGE_SIZE
}

fn default_admin_email() -> String {
    "admin@example.com".to_string()
}

fn default_digest_hour() -> u32 {
    DEFAULT_DIGEST_HOUR
}

fn default_digest_minute() -> u32 {
    DEFAULT_DIGEST_MINUTE
}

impl AppConfig {
    /// Constructs a configuration directly, bypassing file/env loading.
    /// Intended for tests and embedded setups.
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            cache: CacheConfig::default(),
            auto_migrate: false,
            low_stock_threshold: default_low_stock_threshold(),
            page_size: default_page_size(),
            admin_email: default_admin_email(),
            digest_hour: default_digest_hour(),
            digest_minute: default_digest_minute(),
            cors_allowed_origins: None,
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development" || self.environment == "test"
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration error: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Loads configuration from `config/default`, an environment-specific file,
/// and `APP__`-prefixed environment variables, in that order of precedence.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;
    app_config.validate()?;

    Ok(app_config)
}

/// Initializes the global tracing subscriber.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("storefront_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::try_new(filter_directive)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_observed_behavior() {
        let cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            8080,
            "test".to_string(),
        );

        assert_eq!(cfg.low_stock_threshold, 10);
        assert_eq!(cfg.cache.default_ttl_secs, 3600);
        assert_eq!(cfg.page_size, 10);
        assert_eq!(cfg.digest_hour, 18);
        assert_eq!(cfg.cache.listing_purge_pages, 20);
    }

    #[test]
    fn validation_rejects_zero_threshold() {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            8080,
            "test".to_string(),
        );
        cfg.low_stock_threshold = 0;
        assert!(cfg.validate().is_err());
    }
}
