use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

const DEFAULT_DATABASE_URL: &str = "sqlite://jobs.db";
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const MAX_RETENTION_DAYS: i64 = 36_500;

/// Application configuration loaded from environment variables.
/// Only malformed values fail startup; a missing Gemini key fails jobs instead.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub search_grounding: bool,
    pub port: u16,
    pub poll_interval: Duration,
    pub ai_timeout: Duration,
    /// Terminal jobs and read notifications older than this are purged. `None` keeps everything.
    pub retention: Option<chrono::Duration>,
    pub max_upload_bytes: usize,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let retention = retention_window(optional_env("RETENTION_DAYS")?)?;

        Ok(Config {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            gemini_api_key: std::env::var("GEMINI_API_KEY")
                .ok()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            gemini_model: std::env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.to_string()),
            gemini_base_url: std::env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_GEMINI_BASE_URL.to_string()),
            search_grounding: optional_env("GEMINI_SEARCH_GROUNDING")?.unwrap_or(true),
            port: optional_env("PORT")?.unwrap_or(3000),
            poll_interval: Duration::from_secs(optional_env("POLL_INTERVAL_SECS")?.unwrap_or(5)),
            ai_timeout: Duration::from_secs(optional_env("AI_TIMEOUT_SECS")?.unwrap_or(120)),
            retention,
            max_upload_bytes: optional_env("MAX_UPLOAD_BYTES")?.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn optional_env<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("Environment variable '{key}' has an invalid value: {raw}")),
        _ => Ok(None),
    }
}

/// Converts `RETENTION_DAYS` into a purge window. Zero or negative windows
/// would delete jobs the moment they finish.
fn retention_window(days: Option<i64>) -> Result<Option<chrono::Duration>> {
    match days {
        None => Ok(None),
        Some(days) if (1..=MAX_RETENTION_DAYS).contains(&days) => {
            Ok(Some(chrono::Duration::days(days)))
        }
        Some(days) => anyhow::bail!(
            "RETENTION_DAYS must be between 1 and {MAX_RETENTION_DAYS}, got {days}"
        ),
    }
}

#[cfg(test)]
impl Config {
    /// Defaults for unit tests, independent of the process environment.
    pub fn for_tests() -> Self {
        Config {
            database_url: "sqlite::memory:".to_string(),
            gemini_api_key: Some("AIzaTestKey123456".to_string()),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            search_grounding: true,
            port: 0,
            poll_interval: Duration::from_millis(20),
            ai_timeout: Duration::from_secs(5),
            retention: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            rust_log: "info".to_string(),
        }
    }
}
