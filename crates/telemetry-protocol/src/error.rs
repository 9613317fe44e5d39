//! Error types for the protocol

use thiserror::Error;

use crate::MessageType;

/// Protocol error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Truncated frame: need {needed} bytes, got {available}")]
    Truncated { needed: usize, available: usize },

    #[error("Payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Invalid message type: {0:#04x}")]
    InvalidMessageType(u8),

    #[error("Malformed {kind:?} value: expected {expected} bytes, got {actual}")]
    Malformed {
        kind: MessageType,
        expected: usize,
        actual: usize,
    },

    #[error("Frame type mismatch: outer {outer:?}, inner {inner:?}")]
    TypeMismatch {
        outer: MessageType,
        inner: MessageType,
    },
}

/// Result type alias for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;
