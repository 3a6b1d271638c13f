//! # Node Configuration
//!
//! Runtime parameters for one control node, loaded from the environment.
//!
//! ## Environment Variables
//!
//! | Variable                    | Default          | Meaning                                   |
//! |-----------------------------|------------------|-------------------------------------------|
//! | `CTRL_LISTEN_ADDR`          | `0.0.0.0:30041`  | UDP bind address                          |
//! | `CTRL_ISD_AS`               | `1-ff00:0:110`   | Local issuer identity                     |
//! | `CTRL_HMAC_SECRET`          | 32 zero bytes    | Local signing secret, hex                 |
//! | `CTRL_TRUSTED`              | empty            | `ia=hexsecret,...` trusted peers          |
//! | `CTRL_KEEPALIVE_PEERS`      | empty            | `addr,...` targets for outbound keepalives|
//! | `CTRL_KEEPALIVE_INTERVAL_MS`| `1000`           | Keepalive period                          |
//! | `CTRL_LOG_LEVEL`            | `info`           | Filter when `RUST_LOG` is unset           |
//! | `CTRL_JSON_LOGS`            | `false`          | Emit JSON log lines                       |
//!
//! Messenger timeouts are read by `MessengerConfig::from_env`.
//!
//! ## Security Requirements
//!
//! - `hmac_secret` MUST NOT be the default zero value in production

use ctrl_messenger::{ConfigError as MessengerConfigError, MessengerConfig};
use ctrl_types::{AddrParseError, IsdAs};
use ctrl_verify::VerifierConfig;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Length of a signing secret in bytes.
pub const SECRET_LEN: usize = 32;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum NodeConfigError {
    #[error("Invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid issuer address: {0}")]
    IsdAs(#[from] AddrParseError),

    #[error(transparent)]
    Messenger(#[from] MessengerConfigError),

    /// HMAC secret is not set (zero value).
    #[error(
        "SECURITY VIOLATION: HMAC secret is default zero value. \
         Set CTRL_HMAC_SECRET environment variable."
    )]
    InsecureHmacSecret,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Complete node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub listen_addr: SocketAddr,
    pub local_ia: IsdAs,
    pub hmac_secret: [u8; SECRET_LEN],
    /// Peers whose signatures are accepted, besides the node itself.
    pub trusted: Vec<(IsdAs, Vec<u8>)>,
    pub keepalive_peers: Vec<SocketAddr>,
    pub keepalive_interval: Duration,
    pub log: LogConfig,
    pub messenger: MessengerConfig,
    pub verifier: VerifierConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 30041)),
            local_ia: IsdAs {
                isd: 1,
                asn: 0xff00_0000_0110,
            },
            hmac_secret: [0u8; SECRET_LEN],
            trusted: Vec::new(),
            keepalive_peers: Vec::new(),
            keepalive_interval: Duration::from_secs(1),
            log: LogConfig::default(),
            messenger: MessengerConfig::default(),
            verifier: VerifierConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Build from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `NodeConfigError` if a variable is set but invalid.
    pub fn from_env() -> Result<Self, NodeConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, NodeConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self {
            messenger: MessengerConfig::from_lookup(&lookup)?,
            ..Self::default()
        };

        if let Some(value) = lookup("CTRL_LISTEN_ADDR") {
            config.listen_addr = parse_addr("CTRL_LISTEN_ADDR", &value)?;
        }
        if let Some(value) = lookup("CTRL_ISD_AS") {
            config.local_ia = value.trim().parse()?;
        }
        if let Some(value) = lookup("CTRL_HMAC_SECRET") {
            config.hmac_secret = parse_secret("CTRL_HMAC_SECRET", &value)?;
        }
        if let Some(value) = lookup("CTRL_TRUSTED") {
            config.trusted = parse_trusted(&value)?;
        }
        if let Some(value) = lookup("CTRL_KEEPALIVE_PEERS") {
            config.keepalive_peers = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| parse_addr("CTRL_KEEPALIVE_PEERS", s))
                .collect::<Result<_, _>>()?;
        }
        if let Some(value) = lookup("CTRL_KEEPALIVE_INTERVAL_MS") {
            let millis = value
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|ms| *ms > 0)
                .ok_or_else(|| {
                    invalid("CTRL_KEEPALIVE_INTERVAL_MS", &value, "expected milliseconds > 0")
                })?;
            config.keepalive_interval = Duration::from_millis(millis);
        }
        if let Some(value) = lookup("CTRL_LOG_LEVEL") {
            config.log.level = value.trim().to_string();
        }
        if let Some(value) = lookup("CTRL_JSON_LOGS") {
            config.log.json = matches!(value.trim(), "1" | "true" | "yes");
        }

        Ok(config)
    }

    /// Validate configuration for production readiness.
    ///
    /// # Returns
    ///
    /// Returns `Err` if:
    /// - HMAC secret is the default zero value
    pub fn validate_for_production(&self) -> Result<(), NodeConfigError> {
        if self.hmac_secret == [0u8; SECRET_LEN] {
            return Err(NodeConfigError::InsecureHmacSecret);
        }
        Ok(())
    }
}

fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> NodeConfigError {
    NodeConfigError::InvalidValue {
        key,
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse_addr(key: &'static str, value: &str) -> Result<SocketAddr, NodeConfigError> {
    value
        .trim()
        .parse()
        .map_err(|e: std::net::AddrParseError| invalid(key, value, e.to_string()))
}

fn parse_secret(key: &'static str, value: &str) -> Result<[u8; SECRET_LEN], NodeConfigError> {
    let bytes = hex::decode(value.trim()).map_err(|e| invalid(key, value, e.to_string()))?;
    <[u8; SECRET_LEN]>::try_from(bytes.as_slice())
        .map_err(|_| invalid(key, "<redacted>", format!("must be {SECRET_LEN} bytes")))
}

/// Parse `ia=hexsecret,ia=hexsecret`.
fn parse_trusted(value: &str) -> Result<Vec<(IsdAs, Vec<u8>)>, NodeConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| -> Result<(IsdAs, Vec<u8>), NodeConfigError> {
            let (ia, secret) = entry
                .split_once('=')
                .ok_or_else(|| invalid("CTRL_TRUSTED", entry, "expected ia=hexsecret"))?;
            let ia: IsdAs = ia.trim().parse()?;
            let secret = parse_secret("CTRL_TRUSTED", secret)?;
            Ok((ia, secret.to_vec()))
        })
        .collect()
}
