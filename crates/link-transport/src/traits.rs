//! Attribute primitives provided by the radio stack
//!
//! The stack itself (advertising, discovery, connection management) lives
//! outside this crate; both sides only see attribute reads, writes and
//! notifications.

use std::sync::Arc;

use telemetry_protocol::{AttributeId, Telemetry};

use crate::TransportResult;

/// Callback invoked by the stack with each notification value
///
/// Runs on the stack's own delivery context; implementations must not call
/// back into the link.
pub type NotifyHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Attribute table as seen by the peripheral
pub trait PeripheralLink: Send + Sync {
    /// Update an attribute value and notify subscribers
    ///
    /// Fails with `LinkUnavailable` when the stack cannot accept writes yet.
    fn write(&self, attribute: AttributeId, value: &[u8]) -> TransportResult<()>;
}

/// Connection and write events raised by the peripheral's stack
pub trait PeripheralEvents: Send + Sync {
    fn on_connect(&self);

    fn on_disconnect(&self);

    /// A central wrote `value` to a writable attribute
    fn on_write(&self, attribute: AttributeId, value: &[u8]);
}

/// Remote attribute table as seen by the companion
pub trait CentralLink: Send + Sync {
    fn write(&self, attribute: AttributeId, value: &[u8]) -> TransportResult<()>;

    fn read(&self, attribute: AttributeId) -> TransportResult<Vec<u8>>;

    /// Subscribe to notifications of `attribute`
    fn on_notify(&self, attribute: AttributeId, handler: NotifyHandler) -> TransportResult<()>;
}

/// Consumer of decrypted telemetry
pub trait TelemetrySink: Send {
    fn deliver(&mut self, telemetry: Telemetry);
}

impl<F> TelemetrySink for F
where
    F: FnMut(Telemetry) + Send,
{
    fn deliver(&mut self, telemetry: Telemetry) {
        self(telemetry)
    }
}
