//! Transport error types

use crypto_session::CryptoError;
use sensor::SensorError;
use telemetry_protocol::{AttributeId, ProtocolError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Link unavailable: {0}")]
    LinkUnavailable(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Attribute not found: {0}")]
    AttributeNotFound(AttributeId),

    #[error("Attribute {attribute} does not support {operation}")]
    Unsupported {
        attribute: AttributeId,
        operation: &'static str,
    },

    #[error("Failed to start worker: {0}")]
    Spawn(String),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),
}

impl TransportError {
    /// Errors confined to a single message; the loop drops it and continues
    pub fn is_per_message(&self) -> bool {
        match self {
            TransportError::Protocol(_)
            | TransportError::Sensor(_)
            | TransportError::LinkUnavailable(_)
            | TransportError::NotConnected => true,
            TransportError::Crypto(e) => !e.is_fatal(),
            _ => false,
        }
    }
}

/// Configuration rejected at load or validation time
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid key `{field}`: {reason}")]
    InvalidKey { field: &'static str, reason: String },

    #[error("Pairing is required but no secret is configured")]
    EmptyPairingSecret,

    #[error("Pairing secret too long: {len} bytes (max: {max})")]
    PairingSecretTooLong { len: usize, max: usize },

    #[error("Invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

pub type TransportResult<T> = Result<T, TransportError>;
