//! Sensor error types

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SensorError {
    #[error("Sensor not available")]
    NotAvailable,

    #[error("Incorrect checksum: expected {expected:#04x}, got {actual:#04x}")]
    Checksum { expected: u8, actual: u8 },

    #[error("No valid packet after {attempts} attempts")]
    Timeout { attempts: u32 },
}

pub type SensorResult<T> = Result<T, SensorError>;
