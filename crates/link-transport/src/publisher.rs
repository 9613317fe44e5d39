//! Peripheral publish loop: read, frame, seal, frame again, write

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crypto_session::Sealer;
use sensor::Sensor;
use telemetry_protocol::{encode, Telemetry, TELEMETRY_ID};
use tracing::{debug, info, warn};

use crate::{
    retry_link, PairingGate, PeripheralConfig, PeripheralLink, RetryPolicy, TransportError,
    TransportResult,
};

/// What happened to one message handed to [`Publisher::send`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Written to the telemetry attribute
    Sent,
    /// Dropped because the central has not authenticated
    Gated,
    /// Dropped after the link stayed unavailable through every retry
    LinkUnavailable,
}

/// Publisher statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublisherStats {
    pub ticks: u64,
    pub sent: u64,
    pub gated: u64,
    pub link_unavailable: u64,
    pub sensor_failures: u64,
}

/// Peripheral side of the link
pub struct Publisher<L: ?Sized> {
    sealer: Sealer,
    link: Arc<L>,
    gate: Arc<PairingGate>,
    sensor: Box<dyn Sensor>,
    interval: Duration,
    retry: RetryPolicy,
    last_level: Option<f32>,
    stats: PublisherStats,
}

impl<L: PeripheralLink + ?Sized> Publisher<L> {
    /// Build a publisher from a validated configuration
    ///
    /// The pairing gate comes from the same configuration; register
    /// [`Publisher::gate`] with the link to receive connection events.
    pub fn new(
        config: PeripheralConfig,
        link: Arc<L>,
        sensor: Box<dyn Sensor>,
    ) -> TransportResult<Self> {
        config.validate()?;
        Ok(Self {
            sealer: config.scheme.sealer()?,
            gate: Arc::new(PairingGate::new(&config.pairing)?),
            link,
            sensor,
            interval: config.publish_interval(),
            retry: config.retry,
            last_level: None,
            stats: PublisherStats::default(),
        })
    }

    pub fn gate(&self) -> &Arc<PairingGate> {
        &self.gate
    }

    pub fn stats(&self) -> PublisherStats {
        self.stats.clone()
    }

    /// Reading to publish this tick
    ///
    /// A failed read republishes the previous level; before the first
    /// successful read there is nothing to republish, so a heartbeat goes
    /// out instead.
    fn next_reading(&mut self) -> Telemetry {
        match self.sensor.read() {
            Ok(level) => {
                self.last_level = Some(level);
                Telemetry::WaterLevel(level)
            }
            Err(e) => {
                self.stats.sensor_failures += 1;
                warn!("Sensor read failed: {}", e);
                match self.last_level {
                    Some(level) => Telemetry::WaterLevel(level),
                    None => Telemetry::Heartbeat,
                }
            }
        }
    }

    /// Build the bytes written to the telemetry attribute
    pub fn seal(&self, telemetry: &Telemetry) -> TransportResult<Vec<u8>> {
        let inner = telemetry.to_frame().to_bytes();
        let payload = self.sealer.seal(&inner)?;
        Ok(encode(telemetry.kind(), &payload)?)
    }

    /// Send one message, unless the gate is closed
    ///
    /// Every write attempt holds the gate open, so a reconnect between
    /// sealing and writing drops the message instead of leaking it.
    pub fn send(&mut self, telemetry: Telemetry) -> TransportResult<SendOutcome> {
        if !self.gate.is_open() {
            return Ok(self.gated(&telemetry));
        }

        let bytes = self.seal(&telemetry)?;
        let (link, gate) = (&self.link, &self.gate);
        let written = retry_link(&self.retry, "publish", || {
            gate.while_open(|| link.write(TELEMETRY_ID, &bytes)).transpose()
        });
        match written {
            Ok(Some(())) => {
                self.stats.sent += 1;
                debug!("Published {:?} ({} bytes)", telemetry.kind(), bytes.len());
                Ok(SendOutcome::Sent)
            }
            Ok(None) => Ok(self.gated(&telemetry)),
            Err(TransportError::LinkUnavailable(reason)) => {
                self.stats.link_unavailable += 1;
                warn!("Dropping {:?}: link unavailable ({})", telemetry.kind(), reason);
                Ok(SendOutcome::LinkUnavailable)
            }
            Err(e) => Err(e),
        }
    }

    fn gated(&mut self, telemetry: &Telemetry) -> SendOutcome {
        self.stats.gated += 1;
        debug!("Gate closed, dropping {:?}", telemetry.kind());
        SendOutcome::Gated
    }

    /// One publish cycle
    pub fn tick(&mut self) -> TransportResult<SendOutcome> {
        self.stats.ticks += 1;
        let reading = self.next_reading();
        self.send(reading)
    }

    /// Publish every interval until `running` is cleared
    ///
    /// Per-message failures are logged and skipped; anything else stops the
    /// loop and is returned.
    pub fn run(&mut self, running: &AtomicBool) -> TransportResult<()> {
        info!("Publish loop started ({:?} interval)", self.interval);

        while running.load(Ordering::SeqCst) {
            let loop_start = Instant::now();

            match self.tick() {
                Ok(_) => {}
                Err(e) if e.is_per_message() => warn!("Publish failed: {}", e),
                Err(e) => {
                    warn!("Publish loop stopping: {}", e);
                    return Err(e);
                }
            }

            // Rate limiting
            let elapsed = loop_start.elapsed();
            if elapsed < self.interval {
                thread::sleep(self.interval - elapsed);
            }
        }

        info!("Publish loop ended");
        Ok(())
    }
}
