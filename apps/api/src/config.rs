use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub gemini_api_key: String,
    pub jwt_secret: String,
    pub jwt_ttl: Duration,
    pub generation_timeout: Duration,
    pub rate_limit_max_requests: usize,
    pub rate_limit_window: Duration,
    /// Credits granted to every newly registered account.
    pub signup_credits: i32,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            db_max_connections: optional_env("DB_MAX_CONNECTIONS", 20)?,
            gemini_api_key: require_env("GEMINI_API_KEY")?,
            jwt_secret: require_env("JWT_SECRET")?,
            jwt_ttl: Duration::from_secs(60 * optional_env::<u64>("JWT_TTL_MINUTES", 30)?),
            generation_timeout: Duration::from_secs(optional_env("GENERATION_TIMEOUT_SECS", 300)?),
            rate_limit_max_requests: optional_env("RATE_LIMIT_MAX_REQUESTS", 100)?,
            rate_limit_window: Duration::from_secs(optional_env("RATE_LIMIT_WINDOW_SECS", 60)?),
            signup_credits: optional_env("SIGNUP_CREDITS", 10)?,
            port: optional_env("PORT", 8000)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}
