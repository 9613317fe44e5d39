//! Crypto Session - link encryption for the telemetry channel
//!
//! X25519 key agreement, HKDF-SHA256 key derivation and ChaCha20Poly1305
//! sealing, in two schemes:
//! - ephemeral-static: a fresh sender key pair per message against the
//!   receiver's long-term public key
//! - static-static: one session key derived from both long-term keys

mod cipher;
mod envelope;
mod error;
mod keys;
mod session;

pub use cipher::*;
pub use envelope::*;
pub use error::*;
pub use keys::*;
pub use session::*;

pub use x25519_dalek::PublicKey;

/// Nonce size for ChaCha20Poly1305 (96 bits / 12 bytes)
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size (128 bits / 16 bytes)
pub const TAG_SIZE: usize = 16;

/// Public key size (256 bits / 32 bytes)
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Private scalar size (256 bits / 32 bytes)
pub const SECRET_KEY_SIZE: usize = 32;

/// Shared secret size (256 bits / 32 bytes)
pub const SHARED_SECRET_SIZE: usize = 32;

/// Symmetric key size (256 bits / 32 bytes)
pub const KEY_SIZE: usize = 32;
