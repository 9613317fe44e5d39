//! Pairing gate: holds telemetry back until the connected central proves it
//! knows the pairing secret

use parking_lot::Mutex;
use subtle::ConstantTimeEq;
use telemetry_protocol::{AttributeId, AUTH_ID};
use tracing::{debug, info, warn};

use crate::{ConfigError, PairingConfig, PairingSecret, PeripheralEvents};

/// Authentication state of the current connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingState {
    Unauthenticated,
    Authenticated,
}

/// Peripheral-side pairing state machine
///
/// Connection callbacks and auth writes arrive from the stack while the
/// publish loop reads the state; all of them go through one lock.
///
/// Mismatched submissions are not counted or rate limited.
pub struct PairingGate {
    required: bool,
    secret: PairingSecret,
    state: Mutex<PairingState>,
}

impl PairingGate {
    /// Build a closed gate; a required pairing needs a non-empty secret
    pub fn new(config: &PairingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            required: config.required,
            secret: config.secret.clone(),
            state: Mutex::new(PairingState::Unauthenticated),
        })
    }

    pub fn state(&self) -> PairingState {
        *self.state.lock()
    }

    fn allows(&self, state: PairingState) -> bool {
        !self.required || state == PairingState::Authenticated
    }

    /// Whether telemetry may be sent right now
    pub fn is_open(&self) -> bool {
        self.allows(self.state())
    }

    /// Run `f` only if the gate is open, keeping it from closing meanwhile
    ///
    /// Connection callbacks wait until `f` returns. `f` must not call back
    /// into the gate.
    pub fn while_open<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let state = self.state.lock();
        if self.allows(*state) {
            Some(f())
        } else {
            None
        }
    }

    /// Check a candidate secret and update the state
    ///
    /// The lengths must match exactly; equal-length candidates are compared
    /// in constant time. A mismatch leaves the state unchanged.
    pub fn submit(&self, candidate: &[u8]) -> PairingState {
        let expected = self.secret.as_bytes();
        let matches = candidate.len() == expected.len() && bool::from(candidate.ct_eq(expected));

        let mut state = self.state.lock();
        if matches {
            if *state != PairingState::Authenticated {
                info!("Central authenticated");
            }
            *state = PairingState::Authenticated;
        } else {
            warn!("Rejected pairing secret ({} bytes)", candidate.len());
        }
        *state
    }

    /// Drop back to `Unauthenticated`
    pub fn reset(&self) {
        *self.state.lock() = PairingState::Unauthenticated;
    }
}

impl PeripheralEvents for PairingGate {
    fn on_connect(&self) {
        info!("Central connected");
        self.reset();
    }

    fn on_disconnect(&self) {
        info!("Central disconnected");
        self.reset();
    }

    fn on_write(&self, attribute: AttributeId, value: &[u8]) {
        if attribute == AUTH_ID {
            self.submit(value);
        } else {
            debug!("Ignoring write to {}", attribute);
        }
    }
}
