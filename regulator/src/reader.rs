use crate::{
  buffer::SampleBuffer,
  state::{lock, SharedState},
  transport::{PersistenceSink, SensorTransport},
};
use jeflog::{fail, pass, task, warn};
use std::{
  panic::{self, AssertUnwindSafe},
  sync::{Arc, Mutex},
  thread,
  time::{Duration, Instant},
};

/// Turns raw sensor reads into smoothed pressure.
///
/// Sole owner of the sensor and of the sample buffer.
pub struct PressureReader {
  sensor: Box<dyn SensorTransport>,
  buffer: SampleBuffer,
  pressure_max: f64,
  sensor_missing: bool,
}

impl PressureReader {
  pub fn new(
    sensor: Box<dyn SensorTransport>,
    buffer_capacity: usize,
    pressure_max: f64,
  ) -> Self {
    PressureReader {
      sensor,
      buffer: SampleBuffer::new(buffer_capacity),
      pressure_max,
      sensor_missing: false,
    }
  }

  /// Takes one reading and returns the new smoothed pressure in kPa.
  ///
  /// A missing reading, a reading from a sensor that reports itself
  /// unavailable, or a sensor that panics while reading, counts as 0 so that
  /// every call advances the buffer by exactly one sample.
  pub fn sample(&mut self) -> f64 {
    let sensor = &mut self.sensor;
    let normalized =
      match panic::catch_unwind(AssertUnwindSafe(|| sensor.read_normalized())) {
        Ok(reading) => reading.filter(|_| sensor.is_available()),
        Err(_) => {
          fail!("Pressure sensor panicked during a read, substituting zero.");
          None
        }
      };

    match normalized {
      Some(_) if self.sensor_missing => {
        pass!("Pressure sensor is reporting again.");
        self.sensor_missing = false;
      }
      None if !self.sensor_missing => {
        warn!("Pressure sensor has no reading, substituting zero.");
        self.sensor_missing = true;
      }
      _ => {}
    }

    let normalized = normalized.filter(|value| !value.is_nan()).unwrap_or(0.0);
    self.buffer.push(normalized.clamp(0.0, 1.0) * self.pressure_max);

    self.buffer.smoothed(self.pressure_max)
  }

  pub fn buffer(&self) -> &SampleBuffer {
    &self.buffer
  }

  /// Gives the sensor back at the end of a session.
  pub fn release(&mut self) {
    self.sensor.release();
  }
}

/// The acquisition loop: one [`PressureReader::sample`] per period until the
/// `acquiring` flag drops, then a single flush of the whole session log.
pub(crate) struct AcquisitionTask {
  pub shared: SharedState,
  pub reader: Arc<Mutex<PressureReader>>,
  pub sink: Arc<Mutex<Box<dyn PersistenceSink>>>,
  pub epoch: Instant,
  pub period: Duration,
}

impl AcquisitionTask {
  pub fn run(self) {
    let mut next_tick = Instant::now();

    while self.shared.with(|status| status.acquiring) {
      let pressure = lock(&self.reader).sample();
      let elapsed = self.epoch.elapsed().as_secs_f64();

      self.shared.with(|status| {
        status.pressure = pressure;
        status.log.append(elapsed, pressure);
      });

      next_tick += self.period;
      let now = Instant::now();

      if next_tick > now {
        thread::sleep(next_tick - now);
      } else {
        next_tick = now;
      }
    }

    self.finish();
  }

  fn finish(&self) {
    let samples = self.shared.with(|status| status.log.samples().to_vec());

    task!("Flushing {} samples to persistent storage...", samples.len());

    match lock(&self.sink).flush(&samples) {
      Ok(()) => pass!("Flushed {} samples.", samples.len()),
      Err(error) => fail!("Failed to persist the sample log: {error}."),
    }

    lock(&self.reader).release();
  }
}
