//! Seams between the regulator core and the outside world.
//!
//! The core never talks to hardware or storage directly; it is handed one
//! implementation of each trait and owns it from then on.

use crate::error::RegulatorResult;
use common::comm::Sample;

/// Source of analog pressure readings.
pub trait SensorTransport: Send {
  /// Reads one sample normalized to `[0, 1]` of full scale, or `None` if the
  /// sensor has nothing to report yet.
  ///
  /// Implementations may return values slightly outside the unit range; the
  /// reader clamps them.
  fn read_normalized(&mut self) -> Option<f64>;

  /// Whether the underlying device is connected.
  fn is_available(&self) -> bool;

  /// Lets go of the underlying device at the end of a session. A later read
  /// may reacquire it.
  fn release(&mut self) {}
}

/// Sink for digital actuator writes.
///
/// Writes never fail from the caller's point of view: a transport that has
/// lost its device drops the write and reports `is_open() == false`.
pub trait ActuatorTransport: Send {
  /// Drives `channel` high (`true`) or low (`false`).
  fn write_digital(&mut self, channel: u32, high: bool);

  /// Whether writes currently reach the device.
  fn is_open(&self) -> bool;
}

/// Durable storage for the session log.
pub trait PersistenceSink: Send {
  /// Persists the full log. Called once at the end of each session.
  fn flush(&mut self, samples: &[Sample]) -> RegulatorResult<()>;
}
