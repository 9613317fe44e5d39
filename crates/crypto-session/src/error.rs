//! Crypto session error types

use thiserror::Error;

/// Cryptographic operation error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Invalid key: degenerate public point")]
    InvalidKey,

    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: authentication tag mismatch")]
    AuthFailure,

    #[error("Truncated payload: need {needed} bytes, got {available}")]
    Truncated { needed: usize, available: usize },
}

impl CryptoError {
    /// Randomness exhaustion; the process cannot continue safely
    pub fn is_fatal(&self) -> bool {
        matches!(self, CryptoError::KeyGeneration(_))
    }
}

pub type CryptoResult<T> = Result<T, CryptoError>;
