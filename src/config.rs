use dotenv::dotenv;
use std::env;
use std::time::Duration;

pub const DEFAULT_RATES_URL: &str = "https://api.frankfurter.app";

/// Runtime settings, read from the environment (and `.env` when present).
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub rates_url: String,
    pub http_timeout_secs: u64,
    pub rate_ttl_secs: i64,
    pub rate_retention_days: u32,
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rates_url: DEFAULT_RATES_URL.to_string(),
            http_timeout_secs: 10,
            rate_ttl_secs: 300,
            rate_retention_days: 365,
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset or unparsable values
    /// keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            rates_url: lookup("BALANCE_ENGINE_RATES_URL").unwrap_or(defaults.rates_url),
            http_timeout_secs: lookup("BALANCE_ENGINE_HTTP_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.http_timeout_secs),
            rate_ttl_secs: lookup("BALANCE_ENGINE_RATE_TTL_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.rate_ttl_secs),
            rate_retention_days: lookup("BALANCE_ENGINE_RATE_RETENTION_DAYS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.rate_retention_days),
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn rate_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.rate_ttl_secs)
    }
}
