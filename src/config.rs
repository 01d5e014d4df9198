use anyhow::{anyhow, Result};
use std::env;
use std::time::Duration;

pub const DEFAULT_FAPI_BASE_URL: &str = "https://fapi.binance.com";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_FETCH_DEADLINE_SECS: u64 = 60;

/// Runtime settings read from the environment. Every value has a default, so
/// the binary runs against production Binance with no configuration at all.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub base_url: String,
    /// Per-request timeout applied to the shared HTTP client.
    pub http_timeout: Duration,
    /// Overall bound for one paged fetch, covering all of its pages.
    pub fetch_deadline: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            base_url: DEFAULT_FAPI_BASE_URL.to_string(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            fetch_deadline: Duration::from_secs(DEFAULT_FETCH_DEADLINE_SECS),
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self> {
        let base_url = env_value("REPLAY_FAPI_URL")
            .map(|value| value.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_FAPI_BASE_URL.to_string());
        let http_timeout = Duration::from_secs(env_u64_setting(
            "REPLAY_HTTP_TIMEOUT_SECS",
            DEFAULT_HTTP_TIMEOUT_SECS,
        )?);
        let fetch_deadline = Duration::from_secs(env_u64_setting(
            "REPLAY_FETCH_DEADLINE_SECS",
            DEFAULT_FETCH_DEADLINE_SECS,
        )?);

        Ok(RuntimeConfig {
            base_url,
            http_timeout,
            fetch_deadline,
        })
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        RuntimeConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            ..RuntimeConfig::default()
        }
    }
}

fn env_value(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_u64_setting(name: &str, default: u64) -> Result<u64> {
    let raw = match env_value(name) {
        Some(raw) => raw,
        None => return Ok(default),
    };
    let parsed = raw
        .parse::<u64>()
        .map_err(|_| anyhow!("{} must be an integer number of seconds (value: {})", name, raw))?;
    if parsed == 0 {
        return Err(anyhow!("{} must be greater than zero", name));
    }
    Ok(parsed)
}
