//! Daemon configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::error::{DaemonError, DaemonResult};
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Monitor engine configuration
    pub monitor: MonitorConfig,

    /// Durable store configuration
    pub store: StoreConfig,

    /// Environment (test, development, production)
    pub environment: Environment,
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
}

/// Monitor engine configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Period of the price-check tick in milliseconds
    pub price_tick_ms: u64,
    /// Period of the reconciliation tick in milliseconds
    pub sync_tick_ms: u64,
    /// Per-price-fetch bound in milliseconds
    pub price_fetch_timeout_ms: u64,
    /// Trailing band width (0.01 = 1%)
    pub trailing_stop_epsilon: Decimal,
    /// Initial per-position trailing flag when the request does not override
    pub trailing_stop_default: bool,
    /// Grace period for in-flight work during shutdown, in milliseconds
    pub shutdown_grace_ms: u64,
}

/// Durable store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Backing store endpoint; in-memory store when unset
    pub database_url: Option<String>,
    /// Table holding the position records
    pub positions_table: String,
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment (uses stubs)
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            price_tick_ms: 30_000,
            sync_tick_ms: 60_000,
            price_fetch_timeout_ms: 10_000,
            trailing_stop_epsilon: Decimal::new(1, 2), // 0.01
            trailing_stop_default: true,
            shutdown_grace_ms: 5_000,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let environment = Self::load_environment()?;
        let api = Self::load_api_config()?;
        let monitor = Self::load_monitor_config()?;
        let store = Self::load_store_config();

        Ok(Self { api, monitor, store, environment })
    }

    /// Create test configuration with fast tick periods.
    pub fn test() -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
            },
            monitor: MonitorConfig {
                price_tick_ms: 50,
                sync_tick_ms: 100,
                price_fetch_timeout_ms: 1_000,
                trailing_stop_epsilon: Decimal::new(1, 2), // 0.01
                trailing_stop_default: true,
                shutdown_grace_ms: 500,
            },
            store: StoreConfig {
                database_url: None,
                positions_table: "positions".to_string(),
            },
            environment: Environment::Test,
        }
    }

    fn load_environment() -> DaemonResult<Environment> {
        let env_str = env::var("KEEPER_ENV").unwrap_or_else(|_| "development".to_string());

        match env_str.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(DaemonError::Config(format!(
                "Invalid KEEPER_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }

    fn load_api_config() -> DaemonResult<ApiConfig> {
        let host = env::var("KEEPER_API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port_str = env::var("KEEPER_API_PORT").unwrap_or_else(|_| "8080".to_string());

        let port = port_str
            .parse::<u16>()
            .map_err(|_| DaemonError::Config(format!("Invalid KEEPER_API_PORT: {}", port_str)))?;

        Ok(ApiConfig { host, port })
    }

    fn load_monitor_config() -> DaemonResult<MonitorConfig> {
        let defaults = MonitorConfig::default();

        let price_tick_ms = Self::load_u64_env("KEEPER_PRICE_TICK_MS", defaults.price_tick_ms)?;
        let sync_tick_ms = Self::load_u64_env("KEEPER_SYNC_TICK_MS", defaults.sync_tick_ms)?;
        let price_fetch_timeout_ms =
            Self::load_u64_env("KEEPER_PRICE_FETCH_TIMEOUT_MS", defaults.price_fetch_timeout_ms)?;
        let shutdown_grace_ms =
            Self::load_u64_env("KEEPER_SHUTDOWN_GRACE_MS", defaults.shutdown_grace_ms)?;

        let trailing_stop_epsilon = Self::load_decimal_env(
            "KEEPER_TRAILING_STOP_EPSILON",
            defaults.trailing_stop_epsilon,
        )?;

        let trailing_stop_default = match env::var("KEEPER_TRAILING_STOP_DEFAULT") {
            Ok(val) => val.parse::<bool>().map_err(|_| {
                DaemonError::Config(format!("Invalid KEEPER_TRAILING_STOP_DEFAULT: {}", val))
            })?,
            Err(_) => defaults.trailing_stop_default,
        };

        if price_tick_ms == 0 || sync_tick_ms == 0 {
            return Err(DaemonError::Config("Tick periods must be non-zero".to_string()));
        }

        Ok(MonitorConfig {
            price_tick_ms,
            sync_tick_ms,
            price_fetch_timeout_ms,
            trailing_stop_epsilon,
            trailing_stop_default,
            shutdown_grace_ms,
        })
    }

    fn load_store_config() -> StoreConfig {
        StoreConfig {
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty()),
            positions_table: env::var("KEEPER_POSITIONS_TABLE")
                .unwrap_or_else(|_| "positions".to_string()),
        }
    }

    fn load_u64_env(key: &str, default: u64) -> DaemonResult<u64> {
        match env::var(key) {
            Ok(val) => val
                .parse::<u64>()
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }

    fn load_decimal_env(key: &str, default: Decimal) -> DaemonResult<Decimal> {
        match env::var(key) {
            Ok(val) => Decimal::from_str(&val)
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig { host: "0.0.0.0".to_string(), port: 8080 },
            monitor: MonitorConfig::default(),
            store: StoreConfig {
                database_url: None,
                positions_table: "positions".to_string(),
            },
            environment: Environment::Development,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
