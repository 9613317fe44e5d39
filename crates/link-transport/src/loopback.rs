//! In-memory link joining a peripheral and a companion in one process
//!
//! Models the parts of the attribute table both sides rely on: connection
//! events, the auth write, telemetry notifications and device information.
//! Handlers are always invoked with the internal lock released.

use std::sync::Arc;

use parking_lot::Mutex;
use telemetry_protocol::{
    Advertisement, AttributeId, DeviceInfo, AUTH_ID, FIRMWARE_REVISION_ID, MANUFACTURER_NAME_ID,
    TELEMETRY_ID,
};
use tracing::{debug, info};

use crate::{
    CentralLink, NotifyHandler, PeripheralEvents, PeripheralLink, TransportError, TransportResult,
};

struct LoopbackState {
    available: bool,
    connected: bool,
    telemetry: Vec<u8>,
    subscribers: Vec<NotifyHandler>,
    events: Option<Arc<dyn PeripheralEvents>>,
    notifications: u64,
}

/// Shared in-memory attribute table
#[derive(Clone)]
pub struct LoopbackLink {
    state: Arc<Mutex<LoopbackState>>,
    advertisement: Advertisement,
    device_info: DeviceInfo,
}

impl Default for LoopbackLink {
    fn default() -> Self {
        Self::new(Advertisement::default(), DeviceInfo::default())
    }
}

impl LoopbackLink {
    pub fn new(advertisement: Advertisement, device_info: DeviceInfo) -> Self {
        Self {
            state: Arc::new(Mutex::new(LoopbackState {
                available: true,
                connected: false,
                telemetry: Vec::new(),
                subscribers: Vec::new(),
                events: None,
                notifications: 0,
            })),
            advertisement,
            device_info,
        }
    }

    /// Route connection and write events to the peripheral
    pub fn set_peripheral_events(&self, events: Arc<dyn PeripheralEvents>) {
        self.state.lock().events = Some(events);
    }

    /// Simulate the stack going down or coming back
    pub fn set_available(&self, available: bool) {
        self.state.lock().available = available;
    }

    pub fn advertisement(&self) -> &Advertisement {
        &self.advertisement
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Notifications delivered to subscribers so far
    pub fn notifications(&self) -> u64 {
        self.state.lock().notifications
    }

    /// Central connects
    pub fn connect(&self) -> TransportResult<()> {
        let events = {
            let mut state = self.state.lock();
            if !state.available {
                return Err(TransportError::LinkUnavailable("radio off".to_string()));
            }
            state.connected = true;
            state.events.clone()
        };
        info!("Loopback connected to {}", self.advertisement.local_name);
        if let Some(events) = events {
            events.on_connect();
        }
        Ok(())
    }

    /// Central disconnects; its subscriptions go with it
    pub fn disconnect(&self) {
        let events = {
            let mut state = self.state.lock();
            state.connected = false;
            state.subscribers.clear();
            state.events.clone()
        };
        info!("Loopback disconnected");
        if let Some(events) = events {
            events.on_disconnect();
        }
    }

    fn require_connected(&self) -> TransportResult<()> {
        if self.state.lock().connected {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }
}

impl PeripheralLink for LoopbackLink {
    fn write(&self, attribute: AttributeId, value: &[u8]) -> TransportResult<()> {
        if attribute != TELEMETRY_ID {
            return Err(TransportError::Unsupported {
                attribute,
                operation: "notify",
            });
        }

        let subscribers = {
            let mut state = self.state.lock();
            if !state.available {
                return Err(TransportError::LinkUnavailable("radio off".to_string()));
            }
            state.telemetry = value.to_vec();
            state.notifications += state.subscribers.len() as u64;
            state.subscribers.clone()
        };

        debug!("Notifying {} subscriber(s)", subscribers.len());
        for handler in subscribers {
            handler(value);
        }
        Ok(())
    }
}

impl CentralLink for LoopbackLink {
    fn write(&self, attribute: AttributeId, value: &[u8]) -> TransportResult<()> {
        self.require_connected()?;
        if attribute != AUTH_ID {
            return Err(TransportError::Unsupported {
                attribute,
                operation: "write",
            });
        }
        let events = self.state.lock().events.clone();
        if let Some(events) = events {
            events.on_write(attribute, value);
        }
        Ok(())
    }

    fn read(&self, attribute: AttributeId) -> TransportResult<Vec<u8>> {
        self.require_connected()?;
        if attribute == TELEMETRY_ID {
            return Ok(self.state.lock().telemetry.clone());
        }
        if attribute == AUTH_ID {
            return Err(TransportError::Unsupported {
                attribute,
                operation: "read",
            });
        }
        if attribute == MANUFACTURER_NAME_ID || attribute == FIRMWARE_REVISION_ID {
            if let Some(value) = self.device_info.read(attribute) {
                return Ok(value.to_vec());
            }
        }
        Err(TransportError::AttributeNotFound(attribute))
    }

    fn on_notify(&self, attribute: AttributeId, handler: NotifyHandler) -> TransportResult<()> {
        self.require_connected()?;
        if attribute != TELEMETRY_ID {
            return Err(TransportError::Unsupported {
                attribute,
                operation: "notify",
            });
        }
        self.state.lock().subscribers.push(handler);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{read_device_info, PairingConfig, PairingGate, PairingState};
    use telemetry_protocol::NONCE_ID;

    fn linked_gate() -> (LoopbackLink, Arc<PairingGate>) {
        let link = LoopbackLink::default();
        let gate = Arc::new(PairingGate::new(&PairingConfig::required("0000")).unwrap());
        link.set_peripheral_events(gate.clone());
        (link, gate)
    }

    #[test]
    fn test_central_needs_connection() {
        let link = LoopbackLink::default();
        assert!(matches!(
            CentralLink::write(&link, AUTH_ID, b"0000"),
            Err(TransportError::NotConnected)
        ));
    }

    #[test]
    fn test_auth_write_reaches_gate() {
        let (link, gate) = linked_gate();
        link.connect().unwrap();
        CentralLink::write(&link, AUTH_ID, b"0000").unwrap();
        assert_eq!(gate.state(), PairingState::Authenticated);

        link.disconnect();
        assert_eq!(gate.state(), PairingState::Unauthenticated);
    }

    #[test]
    fn test_notifications_fan_out_and_stop_on_disconnect() {
        let (link, _gate) = linked_gate();
        link.connect().unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        link.on_notify(
            TELEMETRY_ID,
            Arc::new(move |value: &[u8]| sink.lock().push(value.to_vec())),
        )
        .unwrap();

        PeripheralLink::write(&link, TELEMETRY_ID, &[1, 0]).unwrap();
        assert_eq!(CentralLink::read(&link, TELEMETRY_ID).unwrap(), vec![1, 0]);

        link.disconnect();
        PeripheralLink::write(&link, TELEMETRY_ID, &[1, 0]).unwrap();
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(link.notifications(), 1);
    }

    #[test]
    fn test_unavailable_radio() {
        let link = LoopbackLink::default();
        link.set_available(false);
        assert!(matches!(
            PeripheralLink::write(&link, TELEMETRY_ID, &[1, 0]),
            Err(TransportError::LinkUnavailable(_))
        ));
        assert!(matches!(
            link.connect(),
            Err(TransportError::LinkUnavailable(_))
        ));
    }

    #[test]
    fn test_device_information() {
        let link = LoopbackLink::default();
        link.connect().unwrap();
        let info = read_device_info(&link).unwrap();
        assert_eq!(info, DeviceInfo::default());
        assert!(matches!(
            CentralLink::read(&link, NONCE_ID),
            Err(TransportError::AttributeNotFound(_))
        ));
        assert!(matches!(
            CentralLink::read(&link, AUTH_ID),
            Err(TransportError::Unsupported { .. })
        ));
    }
}
