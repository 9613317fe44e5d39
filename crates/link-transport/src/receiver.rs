//! Companion receive path
//!
//! Notifications are handed from the stack's delivery context to a worker
//! thread through a bounded queue; the worker decodes, opens and dispatches.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, Sender};
use crypto_session::Opener;
use parking_lot::Mutex;
use telemetry_protocol::{
    decode, DeviceInfo, ProtocolError, Telemetry, AUTH_ID, FIRMWARE_REVISION_ID,
    MANUFACTURER_NAME_ID, TELEMETRY_ID,
};
use tracing::{debug, info, warn};

use crate::{
    retry_link, CentralLink, CompanionConfig, NotifyHandler, PairingSecret, RetryPolicy,
    TelemetrySink, TransportError, TransportResult,
};

/// Decode, open and interpret one notification value
///
/// The outer frame's type must match the sealed inner frame's type.
pub fn open_telemetry(opener: &Opener, data: &[u8]) -> TransportResult<Telemetry> {
    let outer = decode(data)?;
    let plaintext = opener.open(outer.value())?;
    let inner = decode(&plaintext)?;
    if inner.kind() != outer.kind() {
        return Err(ProtocolError::TypeMismatch {
            outer: outer.kind(),
            inner: inner.kind(),
        }
        .into());
    }
    Ok(Telemetry::from_frame(&inner)?)
}

/// Receiver statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    pub received: u64,
    pub delivered: u64,
    pub dropped: u64,
}

/// Companion side of the link
pub struct Receiver {
    handoff: Sender<Vec<u8>>,
    shutdown: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
    stats: Arc<Mutex<ReceiverStats>>,
    pairing_secret: Option<PairingSecret>,
    retry: RetryPolicy,
}

impl Receiver {
    /// Validate `config` and start the worker feeding `sink`
    pub fn spawn<S>(config: CompanionConfig, sink: S) -> TransportResult<Self>
    where
        S: TelemetrySink + 'static,
    {
        config.validate()?;
        let opener = config.scheme.opener()?;

        let (handoff_tx, handoff_rx) = bounded(config.queue_capacity);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let stats = Arc::new(Mutex::new(ReceiverStats::default()));

        let worker_stats = stats.clone();
        let worker = thread::Builder::new()
            .name("telemetry-receiver".to_string())
            .spawn(move || worker_loop(opener, handoff_rx, shutdown_rx, sink, worker_stats))
            .map_err(|e| TransportError::Spawn(e.to_string()))?;

        info!(
            "Receiver started (queue capacity {})",
            config.queue_capacity
        );

        Ok(Self {
            handoff: handoff_tx,
            shutdown: Some(shutdown_tx),
            worker: Some(worker),
            stats,
            pairing_secret: config.pairing_secret,
            retry: config.retry,
        })
    }

    /// Handler to register with the stack for telemetry notifications
    ///
    /// Blocks the caller while the queue is full.
    pub fn notify_handler(&self) -> NotifyHandler {
        let handoff = self.handoff.clone();
        Arc::new(move |value: &[u8]| {
            if handoff.send(value.to_vec()).is_err() {
                debug!("Receiver stopped, dropping notification");
            }
        })
    }

    /// Subscribe to telemetry and present the pairing secret, if any
    pub fn attach<C: CentralLink + ?Sized>(&self, link: &C) -> TransportResult<()> {
        retry_link(&self.retry, "subscribe", || {
            link.on_notify(TELEMETRY_ID, self.notify_handler())
        })?;
        info!("Subscribed to {}", TELEMETRY_ID);

        if let Some(secret) = &self.pairing_secret {
            retry_link(&self.retry, "pairing", || {
                link.write(AUTH_ID, secret.as_bytes())
            })?;
            info!("Pairing secret submitted");
        }
        Ok(())
    }

    pub fn stats(&self) -> ReceiverStats {
        self.stats.lock().clone()
    }

    /// Process what is already queued, stop the worker and return final stats
    pub fn shutdown(mut self) -> ReceiverStats {
        self.stop();
        self.stats()
    }

    fn stop(&mut self) {
        // Dropping the sender wakes the worker
        self.shutdown.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Receiver worker panicked");
            }
        }
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop<S: TelemetrySink>(
    opener: Opener,
    handoff: crossbeam_channel::Receiver<Vec<u8>>,
    shutdown: crossbeam_channel::Receiver<()>,
    mut sink: S,
    stats: Arc<Mutex<ReceiverStats>>,
) {
    let mut process = |data: Vec<u8>| {
        stats.lock().received += 1;
        match open_telemetry(&opener, &data) {
            Ok(telemetry) => {
                debug!("Received {:?}", telemetry);
                stats.lock().delivered += 1;
                sink.deliver(telemetry);
            }
            Err(e) => {
                stats.lock().dropped += 1;
                warn!("Dropping notification ({} bytes): {}", data.len(), e);
            }
        }
    };

    loop {
        select! {
            recv(handoff) -> msg => match msg {
                Ok(data) => process(data),
                Err(_) => break,
            },
            recv(shutdown) -> _ => {
                for data in handoff.try_iter() {
                    process(data);
                }
                break;
            }
        }
    }

    info!("Receiver worker ended");
}

/// Read the peripheral's identification attributes
pub fn read_device_info<C: CentralLink + ?Sized>(link: &C) -> TransportResult<DeviceInfo> {
    let manufacturer = link.read(MANUFACTURER_NAME_ID)?;
    let firmware = link.read(FIRMWARE_REVISION_ID)?;
    Ok(DeviceInfo {
        manufacturer_name: String::from_utf8_lossy(&manufacturer).into_owned(),
        firmware_revision: String::from_utf8_lossy(&firmware).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CompanionScheme, KeyMaterial};
    use crypto_session::{CryptoError, KeyPair, Sealer};
    use telemetry_protocol::{encode, MessageType};

    fn keys() -> (KeyPair, Sealer) {
        let companion = KeyPair::generate().unwrap();
        let sealer = Sealer::ephemeral_static(companion.public_key()).unwrap();
        (companion, sealer)
    }

    fn wire(sealer: &Sealer, outer: MessageType, inner: &Telemetry) -> Vec<u8> {
        let payload = sealer.seal(&inner.to_frame().to_bytes()).unwrap();
        encode(outer, &payload).unwrap()
    }

    #[test]
    fn test_open_water_level() {
        let (companion, sealer) = keys();
        let data = wire(&sealer, MessageType::WaterLevel, &Telemetry::WaterLevel(10.0));
        let opener = Opener::ephemeral_static(companion);
        assert_eq!(
            open_telemetry(&opener, &data).unwrap(),
            Telemetry::WaterLevel(10.0)
        );
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let (companion, sealer) = keys();
        let data = wire(&sealer, MessageType::Heartbeat, &Telemetry::WaterLevel(10.0));
        let opener = Opener::ephemeral_static(companion);
        assert!(matches!(
            open_telemetry(&opener, &data),
            Err(TransportError::Protocol(ProtocolError::TypeMismatch {
                outer: MessageType::Heartbeat,
                inner: MessageType::WaterLevel
            }))
        ));
    }

    #[test]
    fn test_padded_notification_accepted() {
        let (companion, sealer) = keys();
        let mut data = wire(&sealer, MessageType::WaterLevel, &Telemetry::WaterLevel(3.5));
        data.extend_from_slice(&[0xAA; 10]);
        let opener = Opener::ephemeral_static(companion);
        assert_eq!(
            open_telemetry(&opener, &data).unwrap(),
            Telemetry::WaterLevel(3.5)
        );
    }

    #[test]
    fn test_tampered_payload_is_auth_failure() {
        let (companion, sealer) = keys();
        let mut data = wire(&sealer, MessageType::WaterLevel, &Telemetry::WaterLevel(1.0));
        data[20] ^= 0x01;
        let opener = Opener::ephemeral_static(companion);
        assert!(matches!(
            open_telemetry(&opener, &data),
            Err(TransportError::Crypto(CryptoError::AuthFailure))
        ));
    }

    #[test]
    fn test_worker_drops_bad_messages_and_continues() {
        let (companion, sealer) = keys();
        let config = CompanionConfig::new(
            CompanionScheme::EphemeralStatic {
                static_secret: KeyMaterial::from_bytes(*companion.secret_bytes()),
            },
            None,
        );

        let (tx, rx) = crossbeam_channel::unbounded();
        let receiver = Receiver::spawn(config, move |t: Telemetry| {
            let _ = tx.send(t);
        })
        .unwrap();
        let handler = receiver.notify_handler();

        handler(&[0x02]);
        handler(&wire(&sealer, MessageType::WaterLevel, &Telemetry::WaterLevel(4.0)));
        handler(&[0x08, 0x00]);
        handler(&wire(&sealer, MessageType::Heartbeat, &Telemetry::Heartbeat));

        let stats = receiver.shutdown();
        assert_eq!(stats.received, 4);
        assert_eq!(stats.delivered, 2);
        assert_eq!(stats.dropped, 2);
        assert_eq!(
            rx.try_iter().collect::<Vec<_>>(),
            vec![Telemetry::WaterLevel(4.0), Telemetry::Heartbeat]
        );
    }

    #[test]
    fn test_full_queue_blocks_notifications_without_dropping() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::time::Duration;

        let (companion, sealer) = keys();
        let mut config = CompanionConfig::new(
            CompanionScheme::EphemeralStatic {
                static_secret: KeyMaterial::from_bytes(*companion.secret_bytes()),
            },
            None,
        );
        config.queue_capacity = 1;

        let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
        let receiver = Receiver::spawn(config, move |t: Telemetry| {
            let _ = entered_tx.send(t);
            let _ = release_rx.recv();
        })
        .unwrap();

        let handler = receiver.notify_handler();
        let completed = Arc::new(AtomicUsize::new(0));
        let producer_completed = completed.clone();
        let messages: Vec<_> = (0..5)
            .map(|i| wire(&sealer, MessageType::WaterLevel, &Telemetry::WaterLevel(i as f32)))
            .collect();
        let producer = thread::spawn(move || {
            for data in &messages {
                handler(data);
                producer_completed.fetch_add(1, Ordering::SeqCst);
            }
        });

        // One message held by the stalled sink, one in the queue
        entered_rx.recv().unwrap();
        thread::sleep(Duration::from_millis(100));
        assert!(completed.load(Ordering::SeqCst) <= 2);

        drop(release_tx);
        producer.join().unwrap();
        assert_eq!(completed.load(Ordering::SeqCst), 5);

        let stats = receiver.shutdown();
        assert_eq!(
            stats,
            ReceiverStats {
                received: 5,
                delivered: 5,
                dropped: 0
            }
        );
        assert_eq!(
            entered_rx.try_iter().count() + 1,
            5,
            "every message reaches the sink"
        );
    }

    #[test]
    fn test_handler_after_shutdown_does_not_block() {
        let (companion, _) = keys();
        let config = CompanionConfig::new(
            CompanionScheme::EphemeralStatic {
                static_secret: KeyMaterial::from_bytes(*companion.secret_bytes()),
            },
            None,
        );
        let receiver = Receiver::spawn(config, |_: Telemetry| {}).unwrap();
        let handler = receiver.notify_handler();
        receiver.shutdown();
        handler(&[0x01, 0x00]);
    }
}
