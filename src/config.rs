use crate::adapters::outbound::HttpGeoResolverConfig;
use crate::application::ResolverSettings;
use crate::infrastructure::{BackoffKind, RetryPolicy};
use std::str::FromStr;
use std::time::Duration;

/// One hundred years.
const MAX_STALENESS_MINUTES: u64 = 100 * 365 * 24 * 60;

/// Which Document Store adapter the binary wires in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(format!("unknown store backend: {}", other)),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("retry base delay ({base_ms}ms) exceeds max delay ({max_ms}ms)")]
    DelayOrder { base_ms: u64, max_ms: u64 },
    #[error("TIMEVAULT_GEO_API_KEY is required for the HTTP geo resolver")]
    MissingGeoApiKey,
}

#[derive(Debug, Clone)]
pub struct Config {
    // Cache settings
    pub staleness_minutes: u64,

    // Concurrency settings
    pub max_concurrent_store_requests: usize,
    pub max_concurrent_geo_requests: usize,

    // Retry settings
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub retry_backoff: BackoffKind,
    pub retry_jitter: bool,
    pub call_timeout_ms: u64,

    // Batch settings
    pub geo_batch_size: usize,
    pub store_batch_size: usize,

    // Adapter settings
    pub store_backend: StoreBackend,
    pub sqlite_path: String,
    pub geo_api_url: String,
    pub geo_api_key: Option<String>,

    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            staleness_minutes: 43_200,
            max_concurrent_store_requests: 8,
            max_concurrent_geo_requests: 4,
            retry_max_attempts: 3,
            retry_base_delay_ms: 200,
            retry_max_delay_ms: 5_000,
            retry_backoff: BackoffKind::Exponential,
            retry_jitter: true,
            call_timeout_ms: 10_000,
            geo_batch_size: 100,
            store_batch_size: 50,
            store_backend: StoreBackend::Memory,
            sqlite_path: "timevault.db".to_string(),
            geo_api_url: "https://atlas.microsoft.com".to_string(),
            geo_api_key: None,
            debug: false,
        }
    }
}

impl Config {
    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.staleness_minutes == 0 {
            return Err(ConfigError::Zero("TIMEVAULT_STALENESS_MINUTES"));
        }
        if self.max_concurrent_store_requests == 0 {
            return Err(ConfigError::Zero("TIMEVAULT_MAX_CONCURRENT_STORE_REQUESTS"));
        }
        if self.max_concurrent_geo_requests == 0 {
            return Err(ConfigError::Zero("TIMEVAULT_MAX_CONCURRENT_GEO_REQUESTS"));
        }
        if self.retry_max_attempts == 0 {
            return Err(ConfigError::Zero("TIMEVAULT_RETRY_MAX_ATTEMPTS"));
        }
        if self.call_timeout_ms == 0 {
            return Err(ConfigError::Zero("TIMEVAULT_CALL_TIMEOUT_MS"));
        }
        if self.geo_batch_size == 0 {
            return Err(ConfigError::Zero("TIMEVAULT_GEO_BATCH_SIZE"));
        }
        if self.store_batch_size == 0 {
            return Err(ConfigError::Zero("TIMEVAULT_STORE_BATCH_SIZE"));
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err(ConfigError::DelayOrder {
                base_ms: self.retry_base_delay_ms,
                max_ms: self.retry_max_delay_ms,
            });
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            backoff: self.retry_backoff,
            jitter: self.retry_jitter,
            call_timeout: Duration::from_millis(self.call_timeout_ms),
        }
    }

    /// Settings handed to the resolution services.
    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            staleness: chrono::Duration::minutes(
                i64::try_from(self.staleness_minutes.min(MAX_STALENESS_MINUTES)).unwrap_or(0),
            ),
            max_concurrent_store_requests: self.max_concurrent_store_requests,
            max_concurrent_geo_requests: self.max_concurrent_geo_requests,
            retry: self.retry_policy(),
            geo_batch_size: self.geo_batch_size,
            store_batch_size: self.store_batch_size,
        }
    }

    pub fn geo_resolver_config(&self) -> Result<HttpGeoResolverConfig, ConfigError> {
        let api_key = self
            .geo_api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingGeoApiKey)?;
        Ok(HttpGeoResolverConfig {
            api_url: self.geo_api_url.clone(),
            api_key,
            request_timeout: Duration::from_millis(self.call_timeout_ms),
            max_concurrent_requests: self.max_concurrent_geo_requests,
        })
    }
}

fn parse_var<T: FromStr>(var: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    var(name).and_then(|v| v.trim().parse().ok())
}

pub fn load_config() -> anyhow::Result<Config> {
    load_config_from(|name| std::env::var(name).ok())
}

/// Build a config from an arbitrary variable source.
pub fn load_config_from<F>(var: F) -> anyhow::Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = Config::default();
    let flag = |name: &str, default: bool| {
        var(name)
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(default)
    };

    let staleness_minutes =
        parse_var(&var, "TIMEVAULT_STALENESS_MINUTES").unwrap_or(defaults.staleness_minutes);

    let max_concurrent_store_requests = parse_var(&var, "TIMEVAULT_MAX_CONCURRENT_STORE_REQUESTS")
        .unwrap_or(defaults.max_concurrent_store_requests);

    let max_concurrent_geo_requests = parse_var(&var, "TIMEVAULT_MAX_CONCURRENT_GEO_REQUESTS")
        .unwrap_or(defaults.max_concurrent_geo_requests);

    // Retry settings
    let retry_max_attempts =
        parse_var(&var, "TIMEVAULT_RETRY_MAX_ATTEMPTS").unwrap_or(defaults.retry_max_attempts);

    let retry_base_delay_ms =
        parse_var(&var, "TIMEVAULT_RETRY_BASE_DELAY_MS").unwrap_or(defaults.retry_base_delay_ms);

    let retry_max_delay_ms =
        parse_var(&var, "TIMEVAULT_RETRY_MAX_DELAY_MS").unwrap_or(defaults.retry_max_delay_ms);

    let retry_backoff = parse_var(&var, "TIMEVAULT_RETRY_BACKOFF").unwrap_or(defaults.retry_backoff);

    let retry_jitter = flag("TIMEVAULT_RETRY_JITTER", defaults.retry_jitter);

    let call_timeout_ms = parse_var(&var, "TIMEVAULT_CALL_TIMEOUT_MS").unwrap_or(defaults.call_timeout_ms);

    // Batch settings
    let geo_batch_size = parse_var(&var, "TIMEVAULT_GEO_BATCH_SIZE").unwrap_or(defaults.geo_batch_size);

    let store_batch_size =
        parse_var(&var, "TIMEVAULT_STORE_BATCH_SIZE").unwrap_or(defaults.store_batch_size);

    // Adapter settings
    let store_backend = parse_var(&var, "TIMEVAULT_STORE_BACKEND").unwrap_or(defaults.store_backend);

    let sqlite_path = var("TIMEVAULT_SQLITE_PATH").unwrap_or(defaults.sqlite_path);

    let geo_api_url = var("TIMEVAULT_GEO_API_URL").unwrap_or(defaults.geo_api_url);

    let geo_api_key = var("TIMEVAULT_GEO_API_KEY");

    let debug = var("DEBUG").is_some();

    let config = Config {
        staleness_minutes,
        max_concurrent_store_requests,
        max_concurrent_geo_requests,
        retry_max_attempts,
        retry_base_delay_ms,
        retry_max_delay_ms,
        retry_backoff,
        retry_jitter,
        call_timeout_ms,
        geo_batch_size,
        store_batch_size,
        store_backend,
        sqlite_path,
        geo_api_url,
        geo_api_key,
        debug,
    };
    config.validate()?;
    Ok(config)
}
