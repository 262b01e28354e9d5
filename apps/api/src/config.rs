use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::coaching::store::PersistencePolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Redis,
    Memory,
}

impl StoreBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreBackend::Postgres => "postgres",
            StoreBackend::Redis => "redis",
            StoreBackend::Memory => "memory",
        }
    }
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(StoreBackend::Postgres),
            "redis" => Ok(StoreBackend::Redis),
            "memory" | "in_memory" | "inmemory" => Ok(StoreBackend::Memory),
            other => bail!("SESSION_STORE must be postgres, redis or memory, got '{other}'"),
        }
    }
}

/// Application configuration loaded from environment variables.
/// Startup fails if a variable required by the chosen session store is missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreBackend,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub coaching_config_path: Option<PathBuf>,
    pub persistence: PersistencePolicy,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let store: StoreBackend = std::env::var("SESSION_STORE")
            .unwrap_or_else(|_| "postgres".to_string())
            .parse()?;

        let database_url = optional_env("DATABASE_URL");
        let redis_url = optional_env("REDIS_URL");
        match store {
            StoreBackend::Postgres if database_url.is_none() => {
                bail!("Required environment variable 'DATABASE_URL' is not set")
            }
            StoreBackend::Redis if redis_url.is_none() => {
                bail!("Required environment variable 'REDIS_URL' is not set")
            }
            _ => {}
        }

        let defaults = PersistencePolicy::default();
        let persistence = PersistencePolicy {
            timeout: Duration::from_millis(parse_env(
                "PERSISTENCE_TIMEOUT_MS",
                defaults.timeout.as_millis() as u64,
            )?),
            max_attempts: parse_env("PERSISTENCE_MAX_ATTEMPTS", defaults.max_attempts)?,
            base_backoff: Duration::from_millis(parse_env(
                "PERSISTENCE_BACKOFF_MS",
                defaults.base_backoff.as_millis() as u64,
            )?),
        };
        if persistence.max_attempts == 0 {
            bail!("PERSISTENCE_MAX_ATTEMPTS must be at least 1");
        }

        Ok(Config {
            store,
            database_url,
            redis_url,
            coaching_config_path: optional_env("COACHING_CONFIG_PATH").map(PathBuf::from),
            persistence,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        None => Ok(default),
    }
}
