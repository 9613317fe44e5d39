//! Loopback demo: one peripheral, one companion, one process

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use crossbeam_channel::unbounded;
use crypto_session::KeyPair;
use link_transport::{
    read_device_info, CompanionConfig, CompanionScheme, KeyMaterial, LoopbackLink, PairingConfig,
    PairingSecret, PeripheralConfig, PeripheralScheme, Publisher, Receiver,
};
use sensor::{ScriptedSensor, SensorError};
use serde::Deserialize;
use telemetry_protocol::{Telemetry, COMPANY_ID, SERVICE_NAME};
use tracing::{info, warn};

const DEMO_PIN: &str = "246810";

/// Both halves of the link, as loaded from a demo config file
#[derive(Debug, Deserialize)]
struct DemoConfig {
    peripheral: PeripheralConfig,
    companion: CompanionConfig,
}

impl DemoConfig {
    /// Fresh keys, ephemeral-static scheme, pairing on, fast publishing
    fn generated() -> anyhow::Result<Self> {
        let companion = KeyPair::generate().context("random source unavailable")?;

        let mut peripheral = PeripheralConfig::new(
            PeripheralScheme::EphemeralStatic {
                recipient_public: KeyMaterial::from_bytes(companion.public_key_bytes()),
            },
            PairingConfig::required(DEMO_PIN),
        );
        peripheral.publish_interval_ms = 250;

        let companion = CompanionConfig::new(
            CompanionScheme::EphemeralStatic {
                static_secret: KeyMaterial::from_bytes(*companion.secret_bytes()),
            },
            Some(PairingSecret::new(DEMO_PIN)),
        );

        Ok(Self {
            peripheral,
            companion,
        })
    }
}

/// Simulated bottle draining, with one failed read along the way
fn scripted_readings(ticks: u32) -> ScriptedSensor {
    let sensor = ScriptedSensor::new();
    for i in 0..ticks {
        if i == 2 {
            sensor.push_error(SensorError::Timeout { attempts: 10 });
        } else {
            sensor.push(24.0 - i as f32 * 1.5);
        }
    }
    sensor
}

pub fn run(config: Option<String>, ticks: u32) -> anyhow::Result<()> {
    let config = match config {
        Some(json) => serde_json::from_str::<DemoConfig>(&json).context("parsing demo config")?,
        None => DemoConfig::generated()?,
    };
    config.peripheral.validate()?;
    config.companion.validate()?;

    let interval = config.peripheral.publish_interval();
    let link = LoopbackLink::default();
    let sensor = scripted_readings(ticks);
    let mut publisher =
        Publisher::new(config.peripheral, Arc::new(link.clone()), Box::new(sensor))?;
    link.set_peripheral_events(publisher.gate().clone());

    let (telemetry_tx, telemetry_rx) = unbounded();
    let receiver = Receiver::spawn(config.companion, move |telemetry: Telemetry| {
        match serde_json::to_string(&telemetry) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("Failed to render telemetry: {}", e),
        }
        let _ = telemetry_tx.send(telemetry);
    })?;

    let advertisement = link.advertisement();
    if !advertisement.matches(Some(SERVICE_NAME), [COMPANY_ID]) {
        anyhow::bail!("peripheral not found");
    }
    info!(
        "Found {} (company {:#06x})",
        advertisement.local_name, advertisement.company_id
    );

    link.connect()?;
    let device = read_device_info(&link)?;
    info!(
        "Device: {} firmware {}",
        device.manufacturer_name, device.firmware_revision
    );
    receiver.attach(&link)?;

    let running = Arc::new(AtomicBool::new(true));
    let publisher_running = running.clone();
    let publish_loop = thread::Builder::new()
        .name("publisher".to_string())
        .spawn(move || {
            let result = publisher.run(&publisher_running);
            (result, publisher.stats())
        })
        .context("starting publisher")?;

    // Wait for the scripted readings to come through
    let deadline = interval * (ticks + 2);
    let mut received = 0;
    while received < ticks {
        match telemetry_rx.recv_timeout(deadline) {
            Ok(_) => received += 1,
            Err(_) => {
                warn!("Timed out after {} of {} readings", received, ticks);
                break;
            }
        }
    }

    info!("Disconnecting; publishing is gated until the next pairing");
    link.disconnect();
    thread::sleep(interval * 2 + Duration::from_millis(50));

    running.store(false, Ordering::SeqCst);
    let (result, stats) = publish_loop
        .join()
        .map_err(|_| anyhow::anyhow!("publisher thread panicked"))?;
    result?;

    let receiver_stats = receiver.shutdown();
    info!(
        "Publisher: {} sent, {} gated, {} sensor failures; receiver: {} delivered, {} dropped",
        stats.sent,
        stats.gated,
        stats.sensor_failures,
        receiver_stats.delivered,
        receiver_stats.dropped
    );
    Ok(())
}
