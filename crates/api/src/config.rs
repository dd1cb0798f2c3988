//! Server configuration loaded from `ESTORE_*` environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use estore_infra::SubscriptionOptions;
use estore_infra::event_store::PoolSettings;
use thiserror::Error;

pub const BIND_ADDR_ENV: &str = "ESTORE_BIND_ADDR";
pub const BACKEND_ENV: &str = "ESTORE_BACKEND";
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
pub const POOL_SIZE_ENV: &str = "ESTORE_POOL_SIZE";
pub const POOL_TIMEOUT_ENV: &str = "ESTORE_POOL_TIMEOUT_MS";
pub const POLL_INTERVAL_ENV: &str = "ESTORE_POLL_INTERVAL_MS";
pub const FEED_BATCH_ENV: &str = "ESTORE_FEED_BATCH";
pub const SUBSCRIBER_BUFFER_ENV: &str = "ESTORE_SUBSCRIBER_BUFFER";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be set when ESTORE_BACKEND=postgres")]
    Missing { name: &'static str },

    #[error("{name}={value:?} is invalid: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Which `EventLog` implementation backs the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Postgres { database_url: String },
    /// Process-local log; state is lost on restart.
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub backend: Backend,
    pub pool: PoolSettings,
    pub subscription: SubscriptionOptions,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = match get(BIND_ADDR_ENV) {
            Some(raw) => raw.parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                name: BIND_ADDR_ENV,
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => SocketAddr::from(([0, 0, 0, 0], 8080)),
        };

        let backend = match get(BACKEND_ENV).as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("postgres") | Some("postgresql") => Backend::Postgres {
                database_url: get(DATABASE_URL_ENV).ok_or(ConfigError::Missing {
                    name: DATABASE_URL_ENV,
                })?,
            },
            Some("memory") => Backend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: BACKEND_ENV,
                    value: other.to_string(),
                    reason: "expected `postgres` or `memory`".to_string(),
                });
            }
        };

        let defaults = PoolSettings::default();
        let pool = PoolSettings {
            max_connections: positive(get(POOL_SIZE_ENV), POOL_SIZE_ENV)?
                .unwrap_or(defaults.max_connections),
            acquire_timeout: positive::<u64>(get(POOL_TIMEOUT_ENV), POOL_TIMEOUT_ENV)?
                .map(Duration::from_millis)
                .unwrap_or(defaults.acquire_timeout),
        };

        let defaults = SubscriptionOptions::default();
        let subscription = SubscriptionOptions {
            poll_interval: positive::<u64>(get(POLL_INTERVAL_ENV), POLL_INTERVAL_ENV)?
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            batch_size: positive(get(FEED_BATCH_ENV), FEED_BATCH_ENV)?.unwrap_or(defaults.batch_size),
            buffer: positive(get(SUBSCRIBER_BUFFER_ENV), SUBSCRIBER_BUFFER_ENV)?.unwrap_or(defaults.buffer),
        };

        Ok(Self {
            bind_addr,
            backend,
            pool,
            subscription,
        })
    }
}

fn positive<T>(raw: Option<String>, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let Some(raw) = raw else {
        return Ok(None);
    };
    match raw.parse::<T>() {
        Ok(value) if value > T::default() => Ok(Some(value)),
        _ => Err(ConfigError::Invalid {
            name,
            value: raw,
            reason: "expected a positive integer".to_string(),
        }),
    }
}
