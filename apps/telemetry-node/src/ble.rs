//! Companion over a real radio via btleplug
//!
//! btleplug is async; the link traits are blocking. Calls are bridged with
//! the runtime handle from blocking threads, and notifications are pumped on
//! a dedicated thread into the receiver's handoff queue.

use std::collections::BTreeSet;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use link_transport::{
    read_device_info, CentralLink, CompanionConfig, NotifyHandler, Receiver, TransportError,
    TransportResult,
};
use telemetry_protocol::{Advertisement, AttributeId, Telemetry, AUTH_ID};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

const SCAN_DURATION: Duration = Duration::from_secs(5);

fn link_error(e: btleplug::Error) -> TransportError {
    match e {
        btleplug::Error::NotConnected => TransportError::NotConnected,
        other => TransportError::LinkUnavailable(other.to_string()),
    }
}

/// Get the default Bluetooth adapter
async fn adapter() -> anyhow::Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters
        .into_iter()
        .next()
        .context("no Bluetooth adapter found")
}

/// Scan until a device matching the advertisement shows up
async fn discover(adapter: &Adapter, advertisement: &Advertisement) -> anyhow::Result<Peripheral> {
    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(SCAN_DURATION).await;

    let mut found = None;
    for peripheral in adapter.peripherals().await? {
        let Some(props) = peripheral.properties().await? else {
            continue;
        };
        if advertisement.matches(
            props.local_name.as_deref(),
            props.manufacturer_data.keys().copied(),
        ) {
            info!("Found {} at {}", advertisement.local_name, peripheral.address());
            found = Some(peripheral);
            break;
        }
        debug!("Skipping {:?}", props.local_name);
    }

    adapter.stop_scan().await?;
    found.with_context(|| format!("no {} in range", advertisement.local_name))
}

/// Connected peripheral behind the blocking link interface
struct BleCentral {
    runtime: Handle,
    peripheral: Peripheral,
    characteristics: BTreeSet<Characteristic>,
}

impl BleCentral {
    fn characteristic(&self, attribute: AttributeId) -> TransportResult<&Characteristic> {
        self.characteristics
            .iter()
            .find(|c| c.uuid == attribute.uuid())
            .ok_or(TransportError::AttributeNotFound(attribute))
    }
}

impl CentralLink for BleCentral {
    fn write(&self, attribute: AttributeId, value: &[u8]) -> TransportResult<()> {
        let characteristic = self.characteristic(attribute)?;
        let write_type = if attribute == AUTH_ID {
            WriteType::WithoutResponse
        } else {
            WriteType::WithResponse
        };
        self.runtime
            .block_on(self.peripheral.write(characteristic, value, write_type))
            .map_err(link_error)
    }

    fn read(&self, attribute: AttributeId) -> TransportResult<Vec<u8>> {
        let characteristic = self.characteristic(attribute)?;
        self.runtime
            .block_on(self.peripheral.read(characteristic))
            .map_err(link_error)
    }

    fn on_notify(&self, attribute: AttributeId, handler: NotifyHandler) -> TransportResult<()> {
        let characteristic = self.characteristic(attribute)?.clone();
        let peripheral = self.peripheral.clone();
        let uuid = attribute.uuid();

        let mut notifications = self.runtime.block_on(async {
            peripheral.subscribe(&characteristic).await?;
            peripheral.notifications().await
        })
        .map_err(link_error)?;

        let runtime = self.runtime.clone();
        thread::Builder::new()
            .name("ble-notify".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    while let Some(notification) = notifications.next().await {
                        if notification.uuid == uuid {
                            handler(&notification.value);
                        }
                    }
                });
                info!("Notification stream ended");
            })
            .map_err(|e| TransportError::Spawn(e.to_string()))?;
        Ok(())
    }
}

pub async fn run(config: CompanionConfig) -> anyhow::Result<()> {
    let adapter = adapter().await?;
    let peripheral = discover(&adapter, &Advertisement::default()).await?;

    peripheral.connect().await.context("connecting")?;
    peripheral.discover_services().await?;

    let receiver = Receiver::spawn(config, |telemetry: Telemetry| {
        match serde_json::to_string(&telemetry) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("Failed to render telemetry: {}", e),
        }
    })?;

    let central = BleCentral {
        runtime: Handle::current(),
        peripheral: peripheral.clone(),
        characteristics: peripheral.characteristics(),
    };
    let receiver = tokio::task::spawn_blocking(move || -> anyhow::Result<Receiver> {
        let device = read_device_info(&central)?;
        info!(
            "Device: {} firmware {}",
            device.manufacturer_name, device.firmware_revision
        );
        receiver.attach(&central)?;
        Ok(receiver)
    })
    .await??;

    info!("Receiving telemetry, Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    if let Err(e) = peripheral.disconnect().await {
        warn!("Disconnect failed: {}", e);
    }
    let stats = tokio::task::spawn_blocking(move || receiver.shutdown()).await?;
    info!(
        "Received {} messages ({} dropped)",
        stats.received, stats.dropped
    );
    Ok(())
}
