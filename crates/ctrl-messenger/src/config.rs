//! # Messenger Configuration
//!
//! Timeouts and limits for the dispatcher. All values have defaults and can
//! be overridden from the environment.
//!
//! ## Environment Variables
//!
//! - `CTRL_REQUEST_TIMEOUT_MS`: outbound call timeout when the caller's
//!   context has no deadline (default: 10000)
//! - `CTRL_HANDLER_TIMEOUT_MS`: handler invocation deadline (default: 5000)
//! - `CTRL_SHUTDOWN_GRACE_MS`: how long `close_server` waits for in-flight
//!   handlers (default: 2000)
//! - `CTRL_MAX_MESSAGE_SIZE`: largest encoded envelope in bytes (default: 65536)

use std::env;
use std::time::Duration;
use thiserror::Error;

/// Smallest accepted message size limit; below this no envelope fits.
pub const MIN_MESSAGE_SIZE: usize = 512;

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable could not be parsed.
    #[error("Invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },

    /// A timeout was configured as zero.
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    /// The message size limit is too small to hold an envelope.
    #[error("max_message_size {0} is below the minimum of {MIN_MESSAGE_SIZE}")]
    MessageSizeTooSmall(usize),
}

/// Dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessengerConfig {
    /// Timeout applied to outbound calls whose context has no deadline.
    pub request_timeout: Duration,
    /// Deadline for one handler invocation.
    pub handler_timeout: Duration,
    /// Grace period for in-flight handlers during `close_server`.
    pub shutdown_grace: Duration,
    /// Largest encoded envelope sent or accepted.
    pub max_message_size: usize,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            handler_timeout: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(2),
            max_message_size: 64 * 1024,
        }
    }
}

impl MessengerConfig {
    /// Build from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let millis = |key: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            match lookup(key) {
                Some(value) => value
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .map_err(|_| ConfigError::InvalidValue { key, value }),
                None => Ok(default),
            }
        };

        let max_message_size = match lookup("CTRL_MAX_MESSAGE_SIZE") {
            Some(value) => value
                .trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidValue {
                    key: "CTRL_MAX_MESSAGE_SIZE",
                    value,
                })?,
            None => defaults.max_message_size,
        };

        let config = Self {
            request_timeout: millis("CTRL_REQUEST_TIMEOUT_MS", defaults.request_timeout)?,
            handler_timeout: millis("CTRL_HANDLER_TIMEOUT_MS", defaults.handler_timeout)?,
            shutdown_grace: millis("CTRL_SHUTDOWN_GRACE_MS", defaults.shutdown_grace)?,
            max_message_size,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that timeouts are non-zero and the size limit is usable.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("request_timeout"));
        }
        if self.handler_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("handler_timeout"));
        }
        if self.max_message_size < MIN_MESSAGE_SIZE {
            return Err(ConfigError::MessageSizeTooSmall(self.max_message_size));
        }
        Ok(())
    }
}
