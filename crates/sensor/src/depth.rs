//! Serial ultrasonic depth sensor
//!
//! The ranger streams 4-byte packets `[0xFF][hi][lo][sum]` where
//! `sum = (0xFF + hi + lo) & 0xFF` and the distance is `hi * 256 + lo` mm.

use std::thread;

use tracing::{debug, warn};

use crate::{Sensor, SensorConfig, SensorError, SensorResult, SensorStats};

/// First byte of every packet
pub const PACKET_HEADER: u8 = 0xFF;

/// Bytes per packet including the header
pub const PACKET_LEN: usize = 4;

/// Readings at or below this distance are inside the blind zone
pub const MIN_RANGE_MM: u16 = 30;

/// Byte source the decoder reads from
pub trait SerialPort: Send {
    /// Read one byte, `None` if nothing arrived within the port's timeout
    fn read_byte(&mut self) -> SensorResult<Option<u8>>;
}

/// Convert a raw distance to a fill level in centimetres
pub fn distance_to_level(distance_mm: u16) -> f32 {
    if distance_mm > MIN_RANGE_MM {
        f32::from(distance_mm) / 10.0
    } else {
        0.0
    }
}

/// Validate a packet and convert it to a level
pub fn decode_packet(packet: &[u8; PACKET_LEN]) -> SensorResult<f32> {
    let expected = packet[0].wrapping_add(packet[1]).wrapping_add(packet[2]);
    if expected != packet[3] {
        return Err(SensorError::Checksum {
            expected,
            actual: packet[3],
        });
    }
    let distance = u16::from_be_bytes([packet[1], packet[2]]);
    Ok(distance_to_level(distance))
}

/// Depth sensor over a serial port
pub struct DepthSensor<P> {
    port: P,
    config: SensorConfig,
    stats: SensorStats,
}

impl<P: SerialPort> DepthSensor<P> {
    pub fn new(port: P, config: SensorConfig) -> Self {
        Self {
            port,
            config,
            stats: SensorStats::default(),
        }
    }

    /// Resynchronise on the header and collect one packet
    ///
    /// At most two packets' worth of bytes are skipped looking for the header.
    fn read_packet(&mut self) -> SensorResult<Option<[u8; PACKET_LEN]>> {
        let mut skipped = 0;
        loop {
            match self.port.read_byte()? {
                Some(PACKET_HEADER) => break,
                Some(_) if skipped < 2 * PACKET_LEN => skipped += 1,
                _ => return Ok(None),
            }
        }

        let mut packet = [PACKET_HEADER, 0, 0, 0];
        for slot in packet.iter_mut().skip(1) {
            match self.port.read_byte()? {
                Some(byte) => *slot = byte,
                None => return Ok(None),
            }
        }
        Ok(Some(packet))
    }

    fn read_with_retry(&mut self) -> SensorResult<f32> {
        let attempts = self.config.max_read_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.read_packet() {
                Ok(Some(packet)) => {
                    debug!("Depth packet: {:02x?}", packet);
                    match decode_packet(&packet) {
                        Ok(level) => return Ok(level),
                        Err(e) => {
                            warn!("Depth sensor attempt {}/{}: {}", attempt, attempts, e);
                            last_error = Some(e);
                        }
                    }
                }
                Ok(None) => debug!("No depth packet on attempt {}/{}", attempt, attempts),
                Err(e) => {
                    warn!("Depth sensor attempt {}/{}: {}", attempt, attempts, e);
                    last_error = Some(e);
                }
            }

            if attempt < attempts && !self.config.retry_delay.is_zero() {
                thread::sleep(self.config.retry_delay);
            }
        }

        Err(last_error.unwrap_or(SensorError::Timeout { attempts }))
    }
}

impl<P: SerialPort> Sensor for DepthSensor<P> {
    fn read(&mut self) -> SensorResult<f32> {
        let result = self.read_with_retry();
        self.stats.record(&result);
        result
    }

    fn stats(&self) -> SensorStats {
        self.stats.clone()
    }
}
