use crate::sample_log::SampleLog;
use common::comm::{ControlState, RegulatorSnapshot, ValveCommand};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Every field the acquisition task, the control task and the operator
/// share.
#[derive(Debug, Default)]
pub struct Status {
  /// Lifecycle state. Written only by the supervisor and, on a fault, by the
  /// controller task leaving `ControllingEnabled`.
  pub state: ControlState,

  /// Latest smoothed pressure, in kPa.
  pub pressure: f64,

  /// Last accepted setpoint, in kPa.
  pub setpoint: Option<f64>,

  /// Run flag polled once per tick by the acquisition task.
  pub acquiring: bool,

  /// Run flag polled once per tick by the control task.
  pub controlling: bool,

  /// Last valve command that reached the actuators.
  pub valves: ValveCommand,

  /// Most recent controller fault.
  pub fault: Option<String>,

  /// Session log, appended once per acquisition tick.
  pub log: SampleLog,
}

/// Handle to the single mutual-exclusion domain around [`Status`].
///
/// Access goes through [`SharedState::with`], so the lock can only be held
/// for the duration of a closure and never across a sleep or transport I/O.
#[derive(Clone, Debug, Default)]
pub struct SharedState {
  status: Arc<Mutex<Status>>,
}

impl SharedState {
  pub fn new() -> Self {
    SharedState::default()
  }

  /// Runs `access` with the status locked.
  pub fn with<R>(&self, access: impl FnOnce(&mut Status) -> R) -> R {
    access(&mut lock(&self.status))
  }

  pub fn snapshot(&self) -> RegulatorSnapshot {
    self.with(|status| RegulatorSnapshot {
      state: status.state,
      pressure: status.pressure,
      elapsed: status.log.last().map(|sample| sample.time).unwrap_or(0.0),
      setpoint: status.setpoint,
      valves: status.valves,
      fault: status.fault.clone(),
      samples: status.log.len(),
    })
  }
}

/// Locks `mutex`, recovering the guard if a panicking thread poisoned it.
///
/// Controller faults are caught and handled, so a poisoned lock carries no
/// information the supervisor does not already have.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
