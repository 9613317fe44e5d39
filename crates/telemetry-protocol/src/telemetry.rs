//! Telemetry values carried inside frames

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{Frame, MessageType, ProtocolError, ProtocolResult};

/// Length of a [`Telemetry::Nonce`] value
pub const NONCE_VALUE_LEN: usize = 4;

/// Length of a [`Telemetry::WaterLevel`] value (IEEE-754 single, little-endian)
pub const WATER_LEVEL_LEN: usize = 4;

/// Decoded telemetry handed to consumers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Telemetry {
    Heartbeat,
    /// Fill level in centimetres
    WaterLevel(f32),
    Nonce([u8; NONCE_VALUE_LEN]),
}

impl Telemetry {
    pub fn kind(&self) -> MessageType {
        match self {
            Telemetry::Heartbeat => MessageType::Heartbeat,
            Telemetry::WaterLevel(_) => MessageType::WaterLevel,
            Telemetry::Nonce(_) => MessageType::Nonce,
        }
    }

    /// Frame this value for sealing
    pub fn to_frame(&self) -> Frame {
        let value = match self {
            Telemetry::Heartbeat => Bytes::new(),
            Telemetry::WaterLevel(level) => Bytes::copy_from_slice(&level.to_le_bytes()),
            Telemetry::Nonce(nonce) => Bytes::copy_from_slice(nonce),
        };
        Frame {
            kind: self.kind(),
            value,
        }
    }

    /// Interpret a decoded frame
    pub fn from_frame(frame: &Frame) -> ProtocolResult<Self> {
        let value = frame.value();
        match frame.kind() {
            MessageType::Heartbeat => Ok(Telemetry::Heartbeat),
            MessageType::WaterLevel => {
                let bytes: [u8; WATER_LEVEL_LEN] =
                    value.try_into().map_err(|_| ProtocolError::Malformed {
                        kind: MessageType::WaterLevel,
                        expected: WATER_LEVEL_LEN,
                        actual: value.len(),
                    })?;
                Ok(Telemetry::WaterLevel(f32::from_le_bytes(bytes)))
            }
            MessageType::Nonce => {
                let bytes: [u8; NONCE_VALUE_LEN] =
                    value.try_into().map_err(|_| ProtocolError::Malformed {
                        kind: MessageType::Nonce,
                        expected: NONCE_VALUE_LEN,
                        actual: value.len(),
                    })?;
                Ok(Telemetry::Nonce(bytes))
            }
        }
    }
}
