//! Link Transport - telemetry over a small attribute-addressed link
//!
//! Provides the peripheral publish loop and the companion receive path on
//! top of abstract attribute primitives, with a pairing gate deciding when
//! telemetry may leave the peripheral.

mod config;
mod error;
mod gate;
mod loopback;
mod publisher;
mod receiver;
mod retry;
mod traits;

pub use config::*;
pub use error::*;
pub use gate::*;
pub use loopback::*;
pub use publisher::*;
pub use receiver::*;
pub use retry::*;
pub use traits::*;

/// Default publish period of the peripheral
pub const DEFAULT_PUBLISH_INTERVAL_MS: u64 = 3000;

/// Default capacity of the companion handoff queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;
