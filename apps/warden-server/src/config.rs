//! Server configuration loaded from environment variables.
//!
//! Fail-fast: a required variable that is missing or malformed stops startup
//! with a message naming the variable.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use warden_api_auth::{CookieConfig, LifecycleConfig};
use warden_auth::TokenConfig;
use warden_authorization::OrchestratorConfig;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_ACCESS_TTL_SECS: u64 = 900;
pub const DEFAULT_REFRESH_TTL_DAYS: u64 = 7;
pub const DEFAULT_DECISION_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_LOG_FILTER: &str = "info";
/// Shortest signing secret accepted in production.
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },
}

impl ConfigError {
    fn invalid(var: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            var: var.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Production,
}

impl AppEnvironment {
    /// Unset or unrecognised values mean development.
    pub fn from_env_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" | "" => Self::Development,
            other => {
                tracing::warn!(value = other, "Unrecognized APP_ENV value, defaulting to Development");
                Self::Development
            }
        }
    }

    #[must_use]
    pub fn is_production(&self) -> bool {
        *self == Self::Production
    }
}

impl fmt::Display for AppEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct ServerConfig {
    pub app_env: AppEnvironment,
    pub bind_addr: SocketAddr,
    /// `None` runs on the in-memory store.
    pub database_url: Option<String>,
    pub jwt_access_secret: String,
    pub jwt_refresh_secret: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub decision_timeout: Duration,
    pub trust_identity_headers: bool,
    pub default_role: String,
    pub login_path: String,
    pub rust_log: String,
}

// Secrets stay out of logs.
impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("app_env", &self.app_env)
            .field("bind_addr", &self.bind_addr)
            .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
            .field("jwt_access_secret", &"[REDACTED]")
            .field("jwt_refresh_secret", &"[REDACTED]")
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("decision_timeout", &self.decision_timeout)
            .field("trust_identity_headers", &self.trust_identity_headers)
            .field("default_role", &self.default_role)
            .field("login_path", &self.login_path)
            .field("rust_log", &self.rust_log)
            .finish()
    }
}

impl ServerConfig {
    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    #[cfg(test)]
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| var(key).ok_or_else(|| ConfigError::MissingVar(key.to_string()));

        let app_env = AppEnvironment::from_env_str(&var("APP_ENV").unwrap_or_default());

        let bind_raw = var("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw
            .parse()
            .map_err(|e| ConfigError::invalid("BIND_ADDR", format!("{e}")))?;

        let database_url = var("DATABASE_URL");
        if database_url.is_none() && app_env.is_production() {
            return Err(ConfigError::MissingVar("DATABASE_URL".to_string()));
        }

        let jwt_access_secret = required("JWT_ACCESS_SECRET")?;
        let jwt_refresh_secret = required("JWT_REFRESH_SECRET")?;
        if app_env.is_production() {
            for (name, secret) in [
                ("JWT_ACCESS_SECRET", &jwt_access_secret),
                ("JWT_REFRESH_SECRET", &jwt_refresh_secret),
            ] {
                if secret.len() < MIN_SECRET_LEN {
                    return Err(ConfigError::invalid(
                        name,
                        format!("must be at least {MIN_SECRET_LEN} bytes in production"),
                    ));
                }
            }
            if jwt_access_secret == jwt_refresh_secret {
                return Err(ConfigError::invalid(
                    "JWT_REFRESH_SECRET",
                    "must differ from JWT_ACCESS_SECRET",
                ));
            }
        }

        let access_secs = parse_u64(&var, "ACCESS_TOKEN_TTL_SECS", DEFAULT_ACCESS_TTL_SECS)?;
        let refresh_days = parse_u64(&var, "REFRESH_TOKEN_TTL_DAYS", DEFAULT_REFRESH_TTL_DAYS)?;
        let timeout_ms = parse_u64(&var, "DECISION_TIMEOUT_MS", DEFAULT_DECISION_TIMEOUT_MS)?;
        for (name, value) in [
            ("ACCESS_TOKEN_TTL_SECS", access_secs),
            ("REFRESH_TOKEN_TTL_DAYS", refresh_days),
            ("DECISION_TIMEOUT_MS", timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(name, "must be greater than zero"));
            }
        }

        let trust_identity_headers = match var("TRUST_IDENTITY_HEADERS") {
            Some(raw) => parse_bool("TRUST_IDENTITY_HEADERS", &raw)?,
            None => false,
        };

        let login_path = var("LOGIN_PATH").unwrap_or_else(|| "/login".to_string());
        if !login_path.starts_with('/') || login_path.starts_with("//") {
            return Err(ConfigError::invalid("LOGIN_PATH", "must be a relative path"));
        }

        Ok(Self {
            app_env,
            bind_addr,
            database_url,
            jwt_access_secret,
            jwt_refresh_secret,
            access_token_ttl: Duration::from_secs(access_secs),
            refresh_token_ttl: Duration::from_secs(refresh_days * 86_400),
            decision_timeout: Duration::from_millis(timeout_ms),
            trust_identity_headers,
            default_role: var("DEFAULT_ROLE").unwrap_or_else(|| "USER".to_string()),
            login_path,
            rust_log: var("RUST_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        })
    }

    #[must_use]
    pub fn token_config(&self) -> TokenConfig {
        TokenConfig {
            access_ttl: self.access_token_ttl,
            refresh_ttl: self.refresh_token_ttl,
            ..TokenConfig::new(
                self.jwt_access_secret.as_bytes().to_vec(),
                self.jwt_refresh_secret.as_bytes().to_vec(),
            )
        }
    }

    #[must_use]
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            decision_timeout: self.decision_timeout,
            trust_identity_headers: self.trust_identity_headers,
            ..OrchestratorConfig::default()
        }
    }

    #[must_use]
    pub fn lifecycle_config(&self) -> LifecycleConfig {
        LifecycleConfig {
            default_role: self.default_role.clone(),
            ..LifecycleConfig::default()
        }
    }

    /// Cookies are `Secure` only in production; max-age follows the refresh lifetime.
    #[must_use]
    pub fn cookie_config(&self) -> CookieConfig {
        CookieConfig {
            secure: self.app_env.is_production(),
            max_age: self.refresh_token_ttl.as_secs(),
        }
    }
}

fn parse_u64<F>(var: &F, key: &str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::invalid(key, format!("'{raw}' is not a non-negative integer"))),
        None => Ok(default),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::invalid(key, format!("'{raw}' is not a boolean"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        let mut map: HashMap<String, String> = [
            ("JWT_ACCESS_SECRET", "access-secret-for-tests-0123456789abcdef"),
            ("JWT_REFRESH_SECRET", "refresh-secret-for-tests-0123456789abcde"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in pairs {
            map.insert((*k).to_string(), (*v).to_string());
        }
        map
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_map(&vars(&[])).unwrap();
        assert_eq!(config.app_env, AppEnvironment::Development);
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert!(config.database_url.is_none());
        assert_eq!(config.access_token_ttl, Duration::from_secs(900));
        assert_eq!(config.refresh_token_ttl, Duration::from_secs(7 * 86_400));
        assert_eq!(config.decision_timeout, Duration::from_millis(2000));
        assert!(!config.trust_identity_headers);
        assert_eq!(config.default_role, "USER");
        assert_eq!(config.login_path, "/login");
        assert!(!config.cookie_config().secure);
        assert_eq!(config.cookie_config().max_age, 604_800);
    }

    #[test]
    fn test_missing_secret_is_reported_by_name() {
        let mut map = vars(&[]);
        map.remove("JWT_REFRESH_SECRET");
        assert_eq!(
            ServerConfig::from_map(&map).unwrap_err(),
            ConfigError::MissingVar("JWT_REFRESH_SECRET".into())
        );
    }

    #[test]
    fn test_production_requires_database_and_long_secrets() {
        let err = ServerConfig::from_map(&vars(&[("APP_ENV", "production")])).unwrap_err();
        assert_eq!(err, ConfigError::MissingVar("DATABASE_URL".into()));

        let err = ServerConfig::from_map(&vars(&[
            ("APP_ENV", "production"),
            ("DATABASE_URL", "postgres://localhost/warden"),
            ("JWT_ACCESS_SECRET", "short"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref var, .. } if var == "JWT_ACCESS_SECRET"));

        let config = ServerConfig::from_map(&vars(&[
            ("APP_ENV", "production"),
            ("DATABASE_URL", "postgres://localhost/warden"),
        ]))
        .unwrap();
        assert!(config.cookie_config().secure);
    }

    #[test]
    fn test_invalid_numbers_and_flags() {
        for (key, value) in [
            ("ACCESS_TOKEN_TTL_SECS", "fifteen"),
            ("DECISION_TIMEOUT_MS", "0"),
            ("TRUST_IDENTITY_HEADERS", "maybe"),
            ("BIND_ADDR", "not-an-addr"),
            ("LOGIN_PATH", "https://evil.example"),
        ] {
            let err = ServerConfig::from_map(&vars(&[(key, value)])).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { ref var, .. } if var == key),
                "{key}={value} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_overrides_flow_into_library_configs() {
        let config = ServerConfig::from_map(&vars(&[
            ("ACCESS_TOKEN_TTL_SECS", "60"),
            ("REFRESH_TOKEN_TTL_DAYS", "1"),
            ("DECISION_TIMEOUT_MS", "250"),
            ("TRUST_IDENTITY_HEADERS", "true"),
            ("DEFAULT_ROLE", "VIEWER"),
        ]))
        .unwrap();
        assert_eq!(config.token_config().access_ttl, Duration::from_secs(60));
        assert_eq!(config.token_config().refresh_ttl, Duration::from_secs(86_400));
        assert_eq!(config.orchestrator_config().decision_timeout, Duration::from_millis(250));
        assert!(config.orchestrator_config().trust_identity_headers);
        assert_eq!(config.lifecycle_config().default_role, "VIEWER");
        assert_eq!(config.cookie_config().max_age, 86_400);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let rendered = format!("{:?}", ServerConfig::from_map(&vars(&[])).unwrap());
        assert!(!rendered.contains("access-secret-for-tests"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
