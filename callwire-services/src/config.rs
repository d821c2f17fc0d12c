//! Server configuration read from the environment.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use callwire::{MessageLimits, ServerConfig};
use tracing::Level;

use crate::greet::DEFAULT_REPETITIONS;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Listening port on all interfaces.
    pub port: u16,
    /// Upper bound on any call's duration, regardless of the client's timeout.
    pub server_timeout: Option<Duration>,
    pub max_message_bytes: usize,
    /// Frames buffered per stream direction.
    pub stream_buffer: usize,
    pub greet_repetitions: u64,
    pub log_level: Level,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            server_timeout: None,
            max_message_bytes: callwire::DEFAULT_MAX_MESSAGE_SIZE,
            stream_buffer: callwire::DEFAULT_STREAM_BUFFER,
            greet_repetitions: DEFAULT_REPETITIONS,
            log_level: Level::INFO,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source; unset variables keep their
    /// defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(port) = parse_var(&lookup, "PORT", "must be a port number (0-65535)")? {
            config.port = port;
        }
        if let Some(ms) = parse_var::<u64, _>(
            &lookup,
            "CALLWIRE_SERVER_TIMEOUT_MS",
            "must be milliseconds",
        )? {
            config.server_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(bytes) = parse_var(&lookup, "CALLWIRE_MAX_MESSAGE_BYTES", "must be a byte count")? {
            config.max_message_bytes = bytes;
        }
        if let Some(frames) = parse_var::<usize, _>(
            &lookup,
            "CALLWIRE_STREAM_BUFFER",
            "must be a positive frame count",
        )? {
            if frames == 0 {
                return Err(invalid("CALLWIRE_STREAM_BUFFER", "0", "must be a positive frame count"));
            }
            config.stream_buffer = frames;
        }
        if let Some(repetitions) = parse_var(&lookup, "CALLWIRE_GREET_REPETITIONS", "must be a count")? {
            config.greet_repetitions = repetitions;
        }
        if let Some(level) = parse_var(&lookup, "CALLWIRE_LOG", "must be trace, debug, info, warn or error")? {
            config.log_level = level;
        }

        Ok(config)
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            server_timeout: self.server_timeout,
            limits: MessageLimits::new(self.max_message_bytes),
            stream_buffer: self.stream_buffer,
        }
    }
}

fn invalid(var: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_owned(),
        reason: reason.to_owned(),
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str, reason: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| invalid(var, &value, reason)),
    }
}
