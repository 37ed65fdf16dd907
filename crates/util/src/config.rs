use std::{env, fmt, time::Duration};

use staffdb_core::adjustment::AdjustmentPolicy;

use super::DEFAULT_DATABASE_URL;

const DEFAULT_DB_CONNECT_ATTEMPTS: u32 = 3;
const DEFAULT_DB_CONNECT_BACKOFF_MS: u64 = 1000;

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns `true` when the current environment should behave as development.
    pub fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }

    /// Returns the canonical name used for logging labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub environment: Environment,
    pub adjustment_policy: AdjustmentPolicy,
    pub db_connect_attempts: u32,
    pub db_connect_backoff: Duration,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());

        let policy_value =
            env::var("APP_ADJUSTMENT_POLICY").unwrap_or_else(|_| "new-period".to_string());
        let adjustment_policy = AdjustmentPolicy::parse(&policy_value)
            .ok_or(ConfigError::InvalidPolicy(policy_value))?;

        let db_connect_attempts = read_number("APP_DB_CONNECT_ATTEMPTS", DEFAULT_DB_CONNECT_ATTEMPTS)?;
        let backoff_ms = read_number("APP_DB_CONNECT_BACKOFF_MS", DEFAULT_DB_CONNECT_BACKOFF_MS)?;

        Ok(Self {
            database_url,
            environment,
            adjustment_policy,
            db_connect_attempts,
            db_connect_backoff: Duration::from_millis(backoff_ms),
        })
    }
}

fn read_number<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value.parse().map_err(|_| ConfigError::InvalidNumber {
            name,
            value,
        }),
        Err(_) => Ok(default),
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    InvalidPolicy(String),
    InvalidNumber { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::InvalidPolicy(value) => write!(
                f,
                "APP_ADJUSTMENT_POLICY must be 'in-place' or 'new-period' (got {value})"
            ),
            Self::InvalidNumber { name, value } => {
                write!(f, "{name} must be a positive integer (got {value})")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
