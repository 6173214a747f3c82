use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_SLOT_GRANULARITY_MINUTES: u32 = 30;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub bind_addr: SocketAddr,
    pub db_max_connections: u32,
    pub store_timeout: Duration,
    pub slot_granularity_minutes: u32,
    /// `None` disables the background expiry sweep.
    pub sweep_interval: Option<Duration>,
    pub cors_allowed_origins: Option<String>,
    pub is_production: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a config from any variable source. `from_env` passes the
    /// process environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store_backend = match lookup("STORE_BACKEND").as_deref() {
            None | Some("postgres") => StoreBackend::Postgres,
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "STORE_BACKEND",
                    value: other.to_string(),
                    reason: "expected 'postgres' or 'memory'".to_string(),
                })
            }
        };

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let bind_addr = parse_or(&lookup, "BIND_ADDR", || {
            DEFAULT_BIND_ADDR
                .parse()
                .map_err(|e: std::net::AddrParseError| e.to_string())
        })?;
        let db_max_connections: u32 =
            parse_or(&lookup, "DB_MAX_CONNECTIONS", || Ok(DEFAULT_DB_MAX_CONNECTIONS))?;
        if db_max_connections == 0 {
            return Err(invalid("DB_MAX_CONNECTIONS", "0", "must be at least 1"));
        }

        let store_timeout_ms: u64 =
            parse_or(&lookup, "STORE_TIMEOUT_MS", || Ok(DEFAULT_STORE_TIMEOUT_MS))?;
        if store_timeout_ms == 0 {
            return Err(invalid("STORE_TIMEOUT_MS", "0", "must be at least 1"));
        }

        let slot_granularity_minutes: u32 = parse_or(&lookup, "SLOT_GRANULARITY_MINUTES", || {
            Ok(DEFAULT_SLOT_GRANULARITY_MINUTES)
        })?;
        if !(1..=1440).contains(&slot_granularity_minutes) {
            return Err(invalid(
                "SLOT_GRANULARITY_MINUTES",
                &slot_granularity_minutes.to_string(),
                "must be between 1 and 1440",
            ));
        }

        let sweep_secs: u64 = parse_or(&lookup, "TOKEN_SWEEP_INTERVAL_SECS", || {
            Ok(DEFAULT_SWEEP_INTERVAL_SECS)
        })?;

        let is_production = lookup("RUST_ENV")
            .map(|v| v.to_lowercase() == "production")
            .unwrap_or(false);

        Ok(Self {
            store_backend,
            database_url,
            bind_addr,
            db_max_connections,
            store_timeout: Duration::from_millis(store_timeout_ms),
            slot_granularity_minutes,
            sweep_interval: (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs)),
            cors_allowed_origins: lookup("CORS_ALLOWED_ORIGINS"),
            is_production,
        })
    }
}

fn invalid(name: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_or<F, T, D>(lookup: &F, name: &'static str, default: D) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    D: FnOnce() -> Result<T, String>,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(name, &raw, &e.to_string())),
        None => default().map_err(|reason| invalid(name, "<default>", &reason)),
    }
}
