//! Service configuration
//!
//! Loaded from a TOML file or from `HARMONY_<SECTION>_<KEY>` environment
//! variables on top of the defaults. Durations use humantime syntax
//! (`50ms`, `3s`, `5m`).

mod error;

pub use error::ConfigError;

use crate::membership::SagaPolicy;
use humantime_serde::re::humantime;
use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Shortest accepted token secret, in bytes
pub const MIN_SECRET_LEN: usize = 16;

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub membership: MembershipConfig,
    pub handles: HandleConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: SocketAddr,

    /// Base for invite links; the request's Host header is used when unset
    pub public_url: Option<String>,

    /// Per-request budget enforced by the HTTP layer
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// How long in-flight requests get after a shutdown signal
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(StoreBackend::Memory),
            "sqlite" => Ok(StoreBackend::Sqlite),
            other => Err(format!("unknown backend `{}` (expected memory or sqlite)", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// SQLite database file
    pub database_path: PathBuf,

    pub pool_size: u32,

    /// Deadline applied to every store call
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,

    /// SQLite lock wait; must stay below `operation_timeout` so a write
    /// gives up before its caller reports a timeout
    #[serde(with = "humantime_serde")]
    pub busy_timeout: Duration,
}

/// Saga and invite timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MembershipConfig {
    #[serde(with = "humantime_serde")]
    pub saga_deadline: Duration,

    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,

    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,

    #[serde(with = "humantime_serde")]
    pub invite_ttl: Duration,
}

impl MembershipConfig {
    pub fn saga_policy(&self) -> SagaPolicy {
        SagaPolicy {
            deadline: self.saga_deadline,
            initial_backoff: self.initial_backoff,
            max_backoff: self.max_backoff,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandleConfig {
    /// Reservation commits tried before reporting contention
    pub max_attempts: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 shared secret for bearer tokens
    pub token_secret: String,

    /// Lifetime of tokens minted by `harmony token`
    #[serde(with = "humantime_serde")]
    pub token_ttl: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,
    pub json_format: bool,
    pub with_target: bool,
    pub with_thread_ids: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8080)),
            public_url: None,
            request_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            database_path: PathBuf::from("./data/harmony.db"),
            pool_size: 8,
            operation_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(2),
        }
    }
}

impl Default for MembershipConfig {
    fn default() -> Self {
        let policy = SagaPolicy::default();
        Self {
            saga_deadline: policy.deadline,
            initial_backoff: policy.initial_backoff,
            max_backoff: policy.max_backoff,
            invite_ttl: crate::invite::DEFAULT_INVITE_TTL,
        }
    }
}

impl Default for HandleConfig {
    fn default() -> Self {
        Self {
            max_attempts: crate::handle::DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: "harmony-development-secret".to_string(),
            token_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_target: true,
            with_thread_ids: false,
        }
    }
}

fn parse_value<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key,
        reason: e.to_string(),
    })
}

/// Parse a humantime duration, naming `key` in the error
pub fn parse_duration(key: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(raw.trim()).map_err(|e| ConfigError::InvalidValue {
        key,
        reason: e.to_string(),
    })
}

impl Config {
    /// Defaults overridden by `HARMONY_*` environment variables
    ///
    /// Example: `HARMONY_STORE_BACKEND=memory`, `HARMONY_MEMBERSHIP_INVITE_TTL=10m`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Same as [`Config::from_env`] with an arbitrary variable source
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_vars(lookup)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        // Server
        if let Some(v) = lookup("HARMONY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = parse_value("server.bind_address", &v)?;
        }
        if let Some(v) = lookup("HARMONY_SERVER_PUBLIC_URL") {
            self.server.public_url = Some(v.trim().to_string()).filter(|u| !u.is_empty());
        }
        if let Some(v) = lookup("HARMONY_SERVER_REQUEST_TIMEOUT") {
            self.server.request_timeout = parse_duration("server.request_timeout", &v)?;
        }
        if let Some(v) = lookup("HARMONY_SERVER_SHUTDOWN_TIMEOUT") {
            self.server.shutdown_timeout = parse_duration("server.shutdown_timeout", &v)?;
        }

        // Store
        if let Some(v) = lookup("HARMONY_STORE_BACKEND") {
            self.store.backend = parse_value("store.backend", &v)?;
        }
        if let Some(v) = lookup("HARMONY_STORE_DATABASE_PATH") {
            self.store.database_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("HARMONY_STORE_POOL_SIZE") {
            self.store.pool_size = parse_value("store.pool_size", &v)?;
        }
        if let Some(v) = lookup("HARMONY_STORE_OPERATION_TIMEOUT") {
            self.store.operation_timeout = parse_duration("store.operation_timeout", &v)?;
        }
        if let Some(v) = lookup("HARMONY_STORE_BUSY_TIMEOUT") {
            self.store.busy_timeout = parse_duration("store.busy_timeout", &v)?;
        }

        // Membership
        if let Some(v) = lookup("HARMONY_MEMBERSHIP_SAGA_DEADLINE") {
            self.membership.saga_deadline = parse_duration("membership.saga_deadline", &v)?;
        }
        if let Some(v) = lookup("HARMONY_MEMBERSHIP_INITIAL_BACKOFF") {
            self.membership.initial_backoff = parse_duration("membership.initial_backoff", &v)?;
        }
        if let Some(v) = lookup("HARMONY_MEMBERSHIP_MAX_BACKOFF") {
            self.membership.max_backoff = parse_duration("membership.max_backoff", &v)?;
        }
        if let Some(v) = lookup("HARMONY_MEMBERSHIP_INVITE_TTL") {
            self.membership.invite_ttl = parse_duration("membership.invite_ttl", &v)?;
        }

        // Handles
        if let Some(v) = lookup("HARMONY_HANDLES_MAX_ATTEMPTS") {
            self.handles.max_attempts = parse_value("handles.max_attempts", &v)?;
        }

        // Auth
        if let Some(v) = lookup("HARMONY_AUTH_TOKEN_SECRET") {
            self.auth.token_secret = v;
        }
        if let Some(v) = lookup("HARMONY_AUTH_TOKEN_TTL") {
            self.auth.token_ttl = parse_duration("auth.token_ttl", &v)?;
        }

        // Logging
        if let Some(v) = lookup("HARMONY_LOG_LEVEL") {
            self.logging.level = v.trim().to_lowercase();
        }
        if let Some(v) = lookup("HARMONY_LOG_JSON") {
            self.logging.json_format = parse_value("logging.json_format", &v)?;
        }

        Ok(())
    }

    /// Load a TOML file; missing keys take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_vars(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let nonzero = [
            ("server.request_timeout", self.server.request_timeout),
            ("store.operation_timeout", self.store.operation_timeout),
            ("store.busy_timeout", self.store.busy_timeout),
            ("membership.saga_deadline", self.membership.saga_deadline),
            ("membership.initial_backoff", self.membership.initial_backoff),
            ("membership.invite_ttl", self.membership.invite_ttl),
            ("auth.token_ttl", self.auth.token_ttl),
        ];
        for (key, value) in nonzero {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!("{} must be greater than 0", key)));
            }
        }

        if let Some(url) = &self.server.public_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!(
                    "server.public_url must start with http:// or https://, got {}",
                    url
                )));
            }
        }

        if self.store.pool_size == 0 {
            return Err(ConfigError::Invalid(
                "store.pool_size must be greater than 0".to_string(),
            ));
        }
        if self.store.backend == StoreBackend::Sqlite && self.store.database_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "store.database_path is required for the sqlite backend".to_string(),
            ));
        }

        if self.store.busy_timeout >= self.store.operation_timeout {
            return Err(ConfigError::Invalid(
                "store.busy_timeout must be shorter than store.operation_timeout".to_string(),
            ));
        }

        // A request must outlive one store call plus the account-side retries
        let saga_budget = self.store.operation_timeout + self.membership.saga_deadline;
        if self.server.request_timeout <= saga_budget {
            return Err(ConfigError::Invalid(format!(
                "server.request_timeout must exceed store.operation_timeout + membership.saga_deadline ({}ms)",
                saga_budget.as_millis()
            )));
        }

        if self.membership.initial_backoff > self.membership.max_backoff {
            return Err(ConfigError::Invalid(
                "membership.initial_backoff must not exceed membership.max_backoff".to_string(),
            ));
        }

        if self.handles.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "handles.max_attempts must be greater than 0".to_string(),
            ));
        }

        if self.auth.token_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::Invalid(format!(
                "auth.token_secret must be at least {} bytes",
                MIN_SECRET_LEN
            )));
        }

        if !VALID_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.membership.invite_ttl, Duration::from_secs(300));
        assert_eq!(config.handles.max_attempts, crate::handle::DEFAULT_MAX_ATTEMPTS);
        assert!(config.store.busy_timeout < config.store.operation_timeout);
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_vars(vars(&[
            ("HARMONY_STORE_BACKEND", "memory"),
            ("HARMONY_MEMBERSHIP_INVITE_TTL", "10m"),
            ("HARMONY_MEMBERSHIP_SAGA_DEADLINE", "1500ms"),
            ("HARMONY_SERVER_PUBLIC_URL", "https://harmony.example"),
            ("HARMONY_LOG_LEVEL", "DEBUG"),
        ]))
        .unwrap();
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.membership.invite_ttl, Duration::from_secs(600));
        assert_eq!(config.membership.saga_deadline, Duration::from_millis(1500));
        assert_eq!(config.server.public_url.as_deref(), Some("https://harmony.example"));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_bad_env_values_rejected() {
        let err = Config::from_vars(vars(&[("HARMONY_STORE_POOL_SIZE", "many")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "store.pool_size", .. }));

        let err = Config::from_vars(vars(&[("HARMONY_MEMBERSHIP_INVITE_TTL", "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = Config::from_vars(vars(&[("HARMONY_STORE_BACKEND", "mongo")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.auth.token_secret = "short".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.membership.initial_backoff = Duration::from_secs(2);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.store.operation_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.public_url = Some("ftp://nope".into());
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.level = "verbose".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_request_timeout_covers_saga() {
        let mut config = Config::default();
        config.server.request_timeout = Duration::from_secs(5);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("server.request_timeout"));

        // exactly the budget is still too short
        config.server.request_timeout = config.store.operation_timeout + config.membership.saga_deadline;
        assert!(config.validate().is_err());

        config.server.request_timeout += Duration::from_millis(1);
        assert!(config.validate().is_ok());

        let err = Config::from_vars(vars(&[("HARMONY_MEMBERSHIP_SAGA_DEADLINE", "30s")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_busy_timeout_below_operation_timeout() {
        let mut config = Config::default();
        config.store.busy_timeout = config.store.operation_timeout;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("store.busy_timeout"));

        let config = Config::from_vars(vars(&[("HARMONY_STORE_BUSY_TIMEOUT", "750ms")])).unwrap();
        assert_eq!(config.store.busy_timeout, Duration::from_millis(750));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harmony.toml");

        let mut config = Config::default();
        config.store.backend = StoreBackend::Memory;
        config.membership.invite_ttl = Duration::from_secs(90);
        config.save_to_file(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("invite_ttl = \"1m 30s\""));
        assert_eq!(Config::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[store]\nbackend = \"memory\"\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.server, ServerConfig::default());
    }
}
