//! Configuration loading from environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use ledger_types::GatewayConfig;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("LOG_FORMAT must be `text` or `json`, got `{}`", other),
        }
    }
}

/// Application configuration.
#[derive(Debug)]
pub struct Config {
    pub database_url: String,
    pub gateway: GatewayConfig,
    /// Fixed seed for the simulated bank; random when unset
    pub gateway_seed: Option<u64>,
    pub request_timeout: Duration,
    pub log_format: LogFormat,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration through `lookup`, applying defaults for unset keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let defaults = GatewayConfig::default();
        let delay_ms: u64 = parse_or(&lookup, "GATEWAY_PROCESSING_DELAY_MS", 200)?;
        let failure_rate: f64 = parse_or(&lookup, "GATEWAY_FAILURE_RATE", defaults.failure_rate)?;
        if !(0.0..=1.0).contains(&failure_rate) {
            anyhow::bail!("GATEWAY_FAILURE_RATE must be within [0, 1], got {}", failure_rate);
        }

        let gateway_seed = lookup("GATEWAY_SEED")
            .map(|v| v.trim().parse::<u64>())
            .transpose()
            .map_err(|e| anyhow::anyhow!("Invalid GATEWAY_SEED: {}", e))?;

        let timeout_ms: u64 = parse_or(&lookup, "REQUEST_TIMEOUT_MS", 5_000)?;
        let log_format = parse_or(&lookup, "LOG_FORMAT", LogFormat::Text)?;

        Ok(Self {
            database_url,
            gateway: GatewayConfig {
                processing_delay: Duration::from_millis(delay_ms),
                failure_rate,
            },
            gateway_seed,
            request_timeout: Duration::from_millis(timeout_ms),
            log_format,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {}: {}", key, e)),
    }
}
