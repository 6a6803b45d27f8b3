//! Application configuration loaded from environment variables.
//!
//! Values are read once at startup. Session tuning knobs have defaults that
//! match the mobile client's expectations (2 hour inactivity timeout, fixes
//! every 5 seconds / 10 meters).

use crate::services::location::WatchOptions;
use crate::services::proximity::DEFAULT_THRESHOLD_MILES;
use crate::time_utils::{MILLIS_PER_HOUR, MILLIS_PER_MINUTE};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Tuning for the crawl session engine.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Inactivity window after which an active crawl stops itself
    pub inactivity_timeout_ms: i64,
    /// How often the deadline ticker compares the clock to the deadline
    pub tick_interval: Duration,
    /// Throttling requested from the location source
    pub watch: WatchOptions,
    /// Upper bound on the one-shot position lookup for photo updates
    pub position_timeout: Duration,
    /// Radius for "near a bar"
    pub proximity_threshold_miles: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_ms: 2 * MILLIS_PER_HOUR,
            tick_interval: Duration::from_secs(30),
            watch: WatchOptions::default(),
            position_timeout: Duration::from_secs(10),
            proximity_threshold_miles: DEFAULT_THRESHOLD_MILES,
        }
    }
}

impl SessionConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            inactivity_timeout_ms: parse_or(
                "INACTIVITY_TIMEOUT_MINUTES",
                defaults.inactivity_timeout_ms / MILLIS_PER_MINUTE,
            )? * MILLIS_PER_MINUTE,
            tick_interval: Duration::from_secs(parse_or(
                "TIMEOUT_TICK_SECONDS",
                defaults.tick_interval.as_secs(),
            )?),
            watch: WatchOptions {
                min_interval_ms: parse_or("LOCATION_INTERVAL_MS", defaults.watch.min_interval_ms)?,
                min_distance_meters: parse_or(
                    "LOCATION_DISTANCE_METERS",
                    defaults.watch.min_distance_meters,
                )?,
            },
            position_timeout: Duration::from_secs(parse_or(
                "POSITION_TIMEOUT_SECONDS",
                defaults.position_timeout.as_secs(),
            )?),
            proximity_threshold_miles: parse_or(
                "PROXIMITY_THRESHOLD_MILES",
                defaults.proximity_threshold_miles,
            )?,
        })
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Frontend URL allowed by CORS
    pub frontend_url: String,
    /// Server port
    pub port: u16,
    /// Optional GeoJSON bar catalog; the built-in catalog is used otherwise
    pub bar_catalog_path: Option<String>,
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// Session engine tuning
    pub session: SessionConfig,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            frontend_url: "http://localhost:8081".to_string(),
            port: 8080,
            bar_catalog_path: None,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            session: SessionConfig::default(),
        }
    }
}

impl Config {
    /// Config for tests.
    pub fn test_default() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:8081".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            bar_catalog_path: env::var("BAR_CATALOG_PATH")
                .ok()
                .filter(|p| !p.trim().is_empty()),
            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
            session: SessionConfig::from_env()?,
        })
    }
}

/// Parse an optional env var, falling back to `default` when unset.
fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
