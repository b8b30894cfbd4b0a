//! Terminal configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `KADE_API_URL` - Base URL of the hosted backend
//! - `KADE_API_KEY` - Backend API key (sent as `apikey` and bearer token)
//!
//! ## Optional
//! - `KADE_DB_PATH` - Local SQLite file (default: `{data_dir}/kade/offline.db`)
//! - `KADE_SYNC_MIN_RETRY_SECS` - Cooldown after a failed sync pass (default: 5)
//! - `KADE_HTTP_TIMEOUT_SECS` - Per-request timeout (default: 10)
//! - `KADE_SHOP_NAME` - Name printed on receipts (default: Kade)
//! - `KADE_LOG_FORMAT` - `json` or `pretty`, read by `kade-observability`

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

const DEFAULT_SYNC_MIN_RETRY_SECS: u64 = 5;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("No data directory available; set KADE_DB_PATH")]
    NoDataDir,
}

/// Terminal configuration. `Debug` never prints the API key.
#[derive(Debug, Clone)]
pub struct TerminalConfig {
    pub api_url: String,
    pub api_key: SecretString,
    pub db_path: PathBuf,
    pub sync_min_retry: Duration,
    pub http_timeout: Duration,
    pub shop_name: String,
}

impl TerminalConfig {
    /// Load configuration from the process environment, after reading `.env`
    /// if one is present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()));
        let seconds = |key: &str, default: u64| -> Result<Duration, ConfigError> {
            match get(key) {
                None => Ok(Duration::from_secs(default)),
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
            }
        };

        let api_url = required("KADE_API_URL")?;
        if !(api_url.starts_with("http://") || api_url.starts_with("https://")) {
            return Err(ConfigError::InvalidEnvVar(
                "KADE_API_URL".to_string(),
                "must start with http:// or https://".to_string(),
            ));
        }

        let api_key = SecretString::from(required("KADE_API_KEY")?);

        let db_path = match get("KADE_DB_PATH") {
            Some(path) => PathBuf::from(path),
            None => default_db_path()?,
        };

        Ok(Self {
            api_url,
            api_key,
            db_path,
            sync_min_retry: seconds("KADE_SYNC_MIN_RETRY_SECS", DEFAULT_SYNC_MIN_RETRY_SECS)?,
            http_timeout: seconds("KADE_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?,
            shop_name: get("KADE_SHOP_NAME").unwrap_or_else(|| "Kade".to_string()),
        })
    }
}

fn default_db_path() -> Result<PathBuf, ConfigError> {
    dirs::data_dir()
        .map(|dir| dir.join("kade").join("offline.db"))
        .ok_or(ConfigError::NoDataDir)
}
