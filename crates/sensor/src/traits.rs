//! Sensor trait abstraction

use std::time::Duration;

use crate::SensorResult;

/// Read configuration
#[derive(Debug, Clone)]
pub struct SensorConfig {
    /// Attempts before a read gives up
    pub max_read_attempts: u32,
    /// Pause between attempts
    pub retry_delay: Duration,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            max_read_attempts: 10,
            retry_delay: Duration::from_millis(100),
        }
    }
}

/// Source of fill level readings
pub trait Sensor: Send {
    /// Take one reading in centimetres (blocking, retries internally)
    fn read(&mut self) -> SensorResult<f32>;

    /// Get current read statistics
    fn stats(&self) -> SensorStats;
}

/// Sensor statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorStats {
    /// Successful readings
    pub readings: u64,
    /// Reads that returned an error
    pub failures: u64,
    /// Most recent successful reading
    pub last_value: Option<f32>,
}

impl SensorStats {
    pub(crate) fn record(&mut self, result: &SensorResult<f32>) {
        match result {
            Ok(value) => {
                self.readings += 1;
                self.last_value = Some(*value);
            }
            Err(_) => self.failures += 1,
        }
    }
}
