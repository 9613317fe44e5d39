//! Telemetry Protocol - wire definitions shared by the peripheral and companion
//!
//! This crate contains the TLV frame codec, the telemetry value types carried
//! inside frames, and the attribute identifiers both sides agree on at build
//! time.

mod error;
mod frame;
mod gatt;
mod telemetry;

pub use error::*;
pub use frame::*;
pub use gatt::*;
pub use telemetry::*;

/// Size of the `[type][length]` frame header
pub const FRAME_HEADER_SIZE: usize = 2;

/// Largest value a single frame can carry (the length field is one byte)
pub const MAX_FRAME_VALUE: usize = u8::MAX as usize;
