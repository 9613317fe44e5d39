//! Scripted sensor for demos and tests

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{Sensor, SensorError, SensorResult, SensorStats};

/// Sensor that replays queued results
///
/// Clones share the same queue, so a test can keep a handle and push more
/// readings after the sensor has been moved into a publisher. Once the queue
/// is empty every read fails with [`SensorError::NotAvailable`].
#[derive(Clone, Default)]
pub struct ScriptedSensor {
    script: Arc<Mutex<VecDeque<SensorResult<f32>>>>,
    stats: Arc<Mutex<SensorStats>>,
}

impl ScriptedSensor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_readings<I>(readings: I) -> Self
    where
        I: IntoIterator<Item = f32>,
    {
        let sensor = Self::new();
        for reading in readings {
            sensor.push(reading);
        }
        sensor
    }

    pub fn push(&self, reading: f32) {
        self.script.lock().push_back(Ok(reading));
    }

    pub fn push_error(&self, error: SensorError) {
        self.script.lock().push_back(Err(error));
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

impl Sensor for ScriptedSensor {
    fn read(&mut self) -> SensorResult<f32> {
        let result = self
            .script
            .lock()
            .pop_front()
            .unwrap_or(Err(SensorError::NotAvailable));
        self.stats.lock().record(&result);
        result
    }

    fn stats(&self) -> SensorStats {
        self.stats.lock().clone()
    }
}
