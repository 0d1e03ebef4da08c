use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::application::scheduler::SweepConfig;
use crate::application::CoreSettings;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} has invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// `None` runs the service on in-memory stores.
    pub database_url: Option<String>,
    pub host: String,
    pub port: u16,
    pub db_pool_size: u32,
    pub db_connect_timeout: Duration,
    pub core: CoreSettings,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or(&lookup, "PORT", 8080u16)?;
        let db_pool_size = parse_or(&lookup, "DB_POOL_SIZE", 10u32)?;
        if db_pool_size == 0 {
            return Err(ConfigError::Invalid {
                name: "DB_POOL_SIZE",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        let db_connect_timeout =
            Duration::from_millis(positive(&lookup, "DB_CONNECT_TIMEOUT_MS", 5000)?);
        let lock_timeout = Duration::from_millis(positive(&lookup, "LOCK_TIMEOUT_MS", 2000)?);
        let period = Duration::from_secs(positive(&lookup, "RECONCILE_PERIOD_SECS", 60)?);
        let threshold = Duration::from_secs(parse_or(&lookup, "DELIVERY_THRESHOLD_SECS", 120u64)?);

        Ok(Self {
            database_url,
            host,
            port,
            db_pool_size,
            db_connect_timeout,
            core: CoreSettings {
                lock_timeout,
                sweep: SweepConfig { period, threshold },
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn positive<F>(lookup: &F, name: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = parse_or(lookup, name, default)?;
    if value == 0 {
        return Err(ConfigError::Invalid {
            name,
            value: "0".to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}
