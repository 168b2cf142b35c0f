//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use domain::{BookingPolicy, Markup};

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL URL; the in-memory store is used when unset
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `5`)
/// - `REDIS_URL`: Redis URL; the in-memory counter is used when unset
/// - `SWEEP_INTERVAL_SECS`: expiry sweep period (default: `60`)
/// - `PAYMENT_WINDOW_MINUTES`: payment window (default: `15`)
/// - `PRICE_MARKUP`: markup multiplier (default: `1.15`)
/// - `LOCK_TIMEOUT_MS`: bound on row lock waits (default: `5000`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub redis_url: Option<String>,
    pub sweep_interval: Duration,
    pub payment_window_minutes: i64,
    pub markup: Markup,
    pub lock_timeout: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable source.
    ///
    /// Unparseable values fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            database_url: lookup("DATABASE_URL").filter(|v| !v.is_empty()),
            database_max_connections: parse_var(&lookup, "DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            redis_url: lookup("REDIS_URL").filter(|v| !v.is_empty()),
            sweep_interval: parse_var(&lookup, "SWEEP_INTERVAL_SECS")
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            payment_window_minutes: parse_var(&lookup, "PAYMENT_WINDOW_MINUTES")
                .filter(|minutes: &i64| *minutes > 0)
                .unwrap_or(defaults.payment_window_minutes),
            markup: parse_var(&lookup, "PRICE_MARKUP").unwrap_or(defaults.markup),
            lock_timeout: parse_var(&lookup, "LOCK_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.lock_timeout),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the business settings for the booking lifecycle.
    pub fn policy(&self) -> BookingPolicy {
        BookingPolicy {
            payment_window: chrono::Duration::minutes(self.payment_window_minutes),
            markup: self.markup,
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            database_max_connections: 5,
            redis_url: None,
            sweep_interval: Duration::from_secs(60),
            payment_window_minutes: 15,
            markup: Markup::default(),
            lock_timeout: Duration::from_millis(5000),
        }
    }
}
