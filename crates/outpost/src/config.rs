//! Server configuration.
//!
//! Everything has a default, so an empty environment runs a usable server.
//! The binary reads overrides from `OUTPOST_*` environment variables.

use std::str::FromStr;
use std::time::Duration;

use outpost_protocol::DEFAULT_MAX_ID_LEN;
use outpost_session::SessionConfig;

/// Environment variable overriding [`ServerConfig::bind_addr`].
pub const ENV_BIND: &str = "OUTPOST_BIND";
/// Environment variable overriding [`ServerConfig::idle_timeout`], in
/// whole seconds.
pub const ENV_IDLE_TIMEOUT_SECS: &str = "OUTPOST_IDLE_TIMEOUT_SECS";
/// Environment variable overriding [`ServerConfig::write_timeout`], in
/// whole seconds.
pub const ENV_WRITE_TIMEOUT_SECS: &str = "OUTPOST_WRITE_TIMEOUT_SECS";
/// Environment variable overriding [`SessionConfig::map_size`].
pub const ENV_MAP_SIZE: &str = "OUTPOST_MAP_SIZE";
/// Environment variable overriding [`SessionConfig::resource_count`].
pub const ENV_RESOURCE_COUNT: &str = "OUTPOST_RESOURCE_COUNT";

/// Longest accepted [`ServerConfig::idle_timeout`].
pub const MAX_IDLE_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// A configuration value was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Configuration for an [`OutpostServer`](crate::OutpostServer).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub bind_addr: String,

    /// How long a connection may stay silent before the server sends it a
    /// ping. At most [`MAX_IDLE_TIMEOUT`].
    pub idle_timeout: Duration,

    /// How long one frame may take to be written to a socket. A peer that
    /// stops reading is disconnected once a write exceeds this.
    pub write_timeout: Duration,

    /// Capacity of each connection's outbound queue, in frames. A
    /// connection whose queue is full when a broadcast arrives is dropped.
    pub outbound_capacity: usize,

    /// Maximum length of a session or player id, in bytes.
    pub max_id_len: usize,

    /// Applied to every new session.
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
            idle_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(10),
            outbound_capacity: 64,
            max_id_len: DEFAULT_MAX_ID_LEN,
            session: SessionConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Builds a config from the process environment, starting from the
    /// defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup, starting from the
    /// defaults. Missing keys keep their default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup(ENV_BIND) {
            config.bind_addr = addr;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, ENV_IDLE_TIMEOUT_SECS)? {
            config.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, ENV_WRITE_TIMEOUT_SECS)? {
            config.write_timeout = Duration::from_secs(secs);
        }
        if let Some(size) = parse_var(&lookup, ENV_MAP_SIZE)? {
            config.session.map_size = size;
        }
        if let Some(count) = parse_var(&lookup, ENV_RESOURCE_COUNT)? {
            config.session.resource_count = count;
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks values that would make the server unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.idle_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                key: ENV_IDLE_TIMEOUT_SECS,
                value: "0".into(),
                reason: "idle timeout must be positive".into(),
            });
        }
        if self.idle_timeout > MAX_IDLE_TIMEOUT {
            return Err(ConfigError::Invalid {
                key: ENV_IDLE_TIMEOUT_SECS,
                value: self.idle_timeout.as_secs().to_string(),
                reason: format!(
                    "idle timeout must be at most {}s",
                    MAX_IDLE_TIMEOUT.as_secs()
                ),
            });
        }
        if self.write_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                key: ENV_WRITE_TIMEOUT_SECS,
                value: "0".into(),
                reason: "write timeout must be positive".into(),
            });
        }
        if self.outbound_capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "outbound_capacity",
                value: "0".into(),
                reason: "outbound queue needs room for at least one frame".into(),
            });
        }
        if self.max_id_len == 0 {
            return Err(ConfigError::Invalid {
                key: "max_id_len",
                value: "0".into(),
                reason: "identifiers cannot be empty".into(),
            });
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        })
}
