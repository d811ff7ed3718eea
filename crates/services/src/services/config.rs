//! Process configuration read from the environment at startup.

use std::{path::PathBuf, time::Duration};

use chrono_tz::Tz;
use thiserror::Error;

use super::notes_board::GridConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base URL of the data store (`sqlite://…`)
    pub database_url: String,
    /// Public key clients present in the `apikey` header
    pub api_key: String,
    pub host: String,
    pub port: u16,
    pub storage_dir: PathBuf,
    pub public_base_url: String,
    /// Zone in which routine period boundaries (days, weeks, months) are computed
    pub timezone: Tz,
    pub notes_grid: GridConfig,
    pub scheduler_enabled: bool,
    pub scheduler_interval: Duration,
    pub sentry_dsn: Option<String>,
    pub environment: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let database_url = required("DATABASE_URL")?;
        let api_key = required("API_KEY")?;
        let host = get("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = parse_or("PORT", get("PORT"), 3001u16)?;
        let storage_dir = PathBuf::from(get("STORAGE_DIR").unwrap_or_else(|| "./storage".into()));
        let public_base_url = get("PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("http://{host}:{port}"))
            .trim_end_matches('/')
            .to_string();
        let timezone = parse_or("APP_TIMEZONE", get("APP_TIMEZONE"), chrono_tz::America::Sao_Paulo)?;
        let defaults = GridConfig::default();
        let notes_grid = GridConfig {
            cell_width: parse_positive("NOTES_GRID_WIDTH", get("NOTES_GRID_WIDTH"), defaults.cell_width)?,
            cell_height: parse_positive("NOTES_GRID_HEIGHT", get("NOTES_GRID_HEIGHT"), defaults.cell_height)?,
            ..defaults
        };
        let scheduler_enabled = parse_or("SCHEDULER_ENABLED", get("SCHEDULER_ENABLED"), true)?;
        let scheduler_interval = Duration::from_secs(parse_positive(
            "SCHEDULER_INTERVAL_SECS",
            get("SCHEDULER_INTERVAL_SECS"),
            60,
        )? as u64);

        Ok(Self {
            database_url,
            api_key,
            host,
            port,
            storage_dir,
            public_base_url,
            timezone,
            notes_grid,
            scheduler_enabled,
            scheduler_interval,
            sentry_dsn: get("SENTRY_DSN"),
            environment: get("APP_ENV").unwrap_or_else(|| "development".into()),
        })
    }
}

fn parse_or<T>(var: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn parse_positive(var: &'static str, value: Option<String>, default: i64) -> Result<i64, ConfigError> {
    let parsed = parse_or(var, value, default)?;
    if parsed <= 0 {
        return Err(ConfigError::Invalid {
            var,
            value: parsed.to_string(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(parsed)
}
