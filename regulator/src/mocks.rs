//! Recording stand-ins for the sensor, actuator and persistence transports.
//!
//! Every mock is a cheap handle around shared state, so a test can hand one
//! clone to the supervisor and keep another to inspect or steer it.

use crate::{
  error::{RegulatorError, RegulatorResult},
  state::lock,
  transport::{ActuatorTransport, PersistenceSink, SensorTransport},
};
use common::comm::Sample;
use std::{
  io,
  sync::{Arc, Mutex},
  thread,
  time::{Duration, Instant},
};

#[derive(Debug, Default)]
struct SensorState {
  level: Option<f64>,
  available: bool,
  reads: usize,
  releases: usize,
  panic_next: bool,
}

#[derive(Clone, Debug)]
pub struct MockSensor {
  inner: Arc<Mutex<SensorState>>,
}

impl MockSensor {
  /// A connected sensor reporting `level` of full scale.
  pub fn new(level: f64) -> Self {
    MockSensor {
      inner: Arc::new(Mutex::new(SensorState {
        level: Some(level),
        available: true,
        ..Default::default()
      })),
    }
  }

  pub fn set_level(&self, level: Option<f64>) {
    lock(&self.inner).level = level;
  }

  /// Changes what `is_available` reports. Reads keep returning the level, as
  /// a transport holding a stale value would.
  pub fn set_available(&self, available: bool) {
    lock(&self.inner).available = available;
  }

  /// Makes the next read panic.
  pub fn panic_on_next_read(&self) {
    lock(&self.inner).panic_next = true;
  }

  pub fn reads(&self) -> usize {
    lock(&self.inner).reads
  }

  pub fn releases(&self) -> usize {
    lock(&self.inner).releases
  }
}

impl SensorTransport for MockSensor {
  fn read_normalized(&mut self) -> Option<f64> {
    let (level, explode) = {
      let mut state = lock(&self.inner);
      state.reads += 1;

      let explode = state.panic_next;
      state.panic_next = false;

      (state.level, explode)
    };

    if explode {
      panic!("mock sensor exploded");
    }

    level
  }

  fn is_available(&self) -> bool {
    lock(&self.inner).available
  }

  fn release(&mut self) {
    lock(&self.inner).releases += 1;
  }
}

#[derive(Debug)]
struct ActuatorState {
  writes: Vec<(u32, bool)>,
  open: bool,
  panic_on_open: bool,
}

#[derive(Clone, Debug)]
pub struct MockActuator {
  inner: Arc<Mutex<ActuatorState>>,
}

impl MockActuator {
  pub fn new() -> Self {
    MockActuator {
      inner: Arc::new(Mutex::new(ActuatorState {
        writes: Vec::new(),
        open: true,
        panic_on_open: false,
      })),
    }
  }

  /// Every `(channel, high)` write issued so far, oldest first.
  pub fn writes(&self) -> Vec<(u32, bool)> {
    lock(&self.inner).writes.clone()
  }

  pub fn clear(&self) {
    lock(&self.inner).writes.clear();
  }

  /// Level of the most recent write to `channel`.
  pub fn level(&self, channel: u32) -> Option<bool> {
    lock(&self.inner)
      .writes
      .iter()
      .rev()
      .find(|(written, _)| *written == channel)
      .map(|(_, high)| *high)
  }

  pub fn set_open(&self, open: bool) {
    lock(&self.inner).open = open;
  }

  /// While set, any attempt to drive a channel high panics. Low writes still
  /// go through.
  pub fn set_panic_on_open(&self, panic: bool) {
    lock(&self.inner).panic_on_open = panic;
  }
}

impl Default for MockActuator {
  fn default() -> Self {
    MockActuator::new()
  }
}

impl ActuatorTransport for MockActuator {
  fn write_digital(&mut self, channel: u32, high: bool) {
    let explode = {
      let mut state = lock(&self.inner);

      if high && state.panic_on_open {
        true
      } else {
        state.writes.push((channel, high));
        false
      }
    };

    if explode {
      panic!("mock actuator exploded on channel {channel}");
    }
  }

  fn is_open(&self) -> bool {
    lock(&self.inner).open
  }
}

#[derive(Debug, Default)]
struct SinkState {
  flushes: Vec<Vec<Sample>>,
  failing: bool,
}

#[derive(Clone, Debug, Default)]
pub struct MockSink {
  inner: Arc<Mutex<SinkState>>,
}

impl MockSink {
  pub fn new() -> Self {
    MockSink::default()
  }

  /// Contents of every flush attempted so far, including failed ones.
  pub fn flushes(&self) -> Vec<Vec<Sample>> {
    lock(&self.inner).flushes.clone()
  }

  pub fn set_failing(&self, failing: bool) {
    lock(&self.inner).failing = failing;
  }
}

impl PersistenceSink for MockSink {
  fn flush(&mut self, samples: &[Sample]) -> RegulatorResult<()> {
    let mut state = lock(&self.inner);
    state.flushes.push(samples.to_vec());

    if state.failing {
      Err(RegulatorError::Io(io::Error::new(
        io::ErrorKind::Other,
        "mock sink is failing",
      )))
    } else {
      Ok(())
    }
  }
}

/// Polls `condition` until it holds or `timeout` elapses. Returns whether it
/// held.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
  let deadline = Instant::now() + timeout;

  loop {
    if condition() {
      return true;
    }

    if Instant::now() >= deadline {
      return false;
    }

    thread::sleep(Duration::from_millis(1));
  }
}
