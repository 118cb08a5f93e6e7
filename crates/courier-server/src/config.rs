use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use courier_db::{CacheConfig, DbConfig};

/// Server settings, read from `COURIER_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub db: DbConfig,
    pub notification_text: String,
    pub reaper_interval: Duration,
    pub prune_interval: Duration,
    /// Push is disabled unless both are set.
    pub push_endpoint: Option<String>,
    pub push_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = DbConfig::default();

        Ok(Self {
            host: lookup("COURIER_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse(&lookup, "COURIER_PORT", 5010)?,
            db_path: PathBuf::from(lookup("COURIER_DB_PATH").unwrap_or_else(|| "courier.db".into())),
            db: DbConfig {
                token_size: parse(&lookup, "COURIER_TOKEN_SIZE", defaults.token_size)?,
                max_message_size: parse(&lookup, "COURIER_MAX_MESSAGE_SIZE", defaults.max_message_size)?,
                cache: CacheConfig {
                    capacity: parse(&lookup, "COURIER_CACHE_CAPACITY", defaults.cache.capacity)?,
                    sliding: Duration::from_secs(parse(&lookup, "COURIER_CACHE_SLIDING_SECS", 60)?),
                    absolute: Duration::from_secs(parse(&lookup, "COURIER_CACHE_ABSOLUTE_SECS", 600)?),
                },
            },
            notification_text: lookup("COURIER_NOTIFICATION_TEXT").unwrap_or_else(|| "New message arrived".into()),
            reaper_interval: Duration::from_secs(parse(&lookup, "COURIER_REAPER_INTERVAL_SECS", 5)?),
            prune_interval: Duration::from_secs(parse(&lookup, "COURIER_PRUNE_INTERVAL_SECS", 3600)?),
            push_endpoint: lookup("COURIER_PUSH_ENDPOINT").filter(|v| !v.is_empty()),
            push_key: lookup("COURIER_PUSH_KEY").filter(|v| !v.is_empty()),
        })
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}
