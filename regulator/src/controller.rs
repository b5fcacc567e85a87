use crate::{
  setpoint::Setpoint,
  state::{lock, SharedState},
  valve::ValveDriver,
};
use common::comm::{ControlState, ValveCommand};
use jeflog::{fail, pass, task};
use std::{
  any::Any,
  panic::{self, AssertUnwindSafe},
  sync::{Arc, Mutex},
  thread,
  time::{Duration, Instant},
};

/// Two-position control law with a dead band of `tolerance` either side of
/// `target`. The band edges themselves count as inside.
pub fn decide(current: f64, target: f64, tolerance: f64) -> ValveCommand {
  if current < target - tolerance {
    ValveCommand::FILL
  } else if current > target + tolerance {
    ValveCommand::VENT
  } else {
    ValveCommand::CLOSED
  }
}

/// A setpoint and the dead band around it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HysteresisController {
  setpoint: Setpoint,
  tolerance: f64,
}

impl HysteresisController {
  pub fn new(setpoint: Setpoint, tolerance: f64) -> Self {
    HysteresisController {
      setpoint,
      tolerance,
    }
  }

  pub fn setpoint(&self) -> Setpoint {
    self.setpoint
  }

  pub fn command(&self, current: f64) -> ValveCommand {
    decide(current, self.setpoint.kpa(), self.tolerance)
  }
}

/// The control loop. Owns the valves while the `controlling` flag is set and
/// always leaves them closed when it returns.
pub(crate) struct ControlTask {
  pub shared: SharedState,
  pub valves: Arc<Mutex<ValveDriver>>,
  pub controller: HysteresisController,
  pub period: Duration,
}

impl ControlTask {
  pub fn run(self) {
    task!(
      "Controlling to {} \u{b1} {} kPa.",
      self.controller.setpoint(),
      self.controller.tolerance
    );

    let mut next_tick = Instant::now();
    let mut fault = None;

    while self.shared.with(|status| status.controlling) {
      if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| self.tick()))
      {
        fault = Some(describe_panic(payload.as_ref()));
        break;
      }

      next_tick += self.period;
      let now = Instant::now();

      if next_tick > now {
        thread::sleep(next_tick - now);
      } else {
        next_tick = now;
      }
    }

    let closed =
      panic::catch_unwind(AssertUnwindSafe(|| lock(&self.valves).close_all()));

    let valves = match closed {
      Ok(valves) => valves,
      Err(payload) => {
        fail!(
          "Final valve close panicked: {}.",
          describe_panic(payload.as_ref())
        );
        lock(&self.valves).current()
      }
    };

    match fault {
      Some(message) => {
        fail!("Controller faulted, valves closed: {message}.");

        self.shared.with(|status| {
          status.valves = valves;
          status.controlling = false;
          status.fault = Some(message);

          if status.state == ControlState::ControllingEnabled {
            status.state = ControlState::Acquiring;
          }
        });
      }
      None => {
        self.shared.with(|status| status.valves = valves);
        pass!("Controller stopped, valves closed.");
      }
    }
  }

  fn tick(&self) {
    let current = self.shared.with(|status| status.pressure);
    let command = self.controller.command(current);
    let valves = lock(&self.valves).apply(command);

    self.shared.with(|status| status.valves = valves);
  }
}

fn describe_panic(payload: &(dyn Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    (*message).to_owned()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "unknown panic".to_owned()
  }
}
