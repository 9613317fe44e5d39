//! Sensor - fill level sources for the peripheral
//!
//! Provides the [`Sensor`] abstraction the publish loop reads from:
//! - Depth: serial ultrasonic ranger
//! - Scripted: queued readings for demos and tests

mod depth;
mod error;
mod scripted;
mod traits;

pub use depth::*;
pub use error::*;
pub use scripted::*;
pub use traits::*;
