use crate::{
  config::RegulatorConfig,
  controller::{ControlTask, HysteresisController},
  error::{RegulatorError, RegulatorResult},
  reader::{AcquisitionTask, PressureReader},
  sample_log::SampleLog,
  setpoint::Setpoint,
  state::{lock, SharedState},
  transport::{ActuatorTransport, PersistenceSink, SensorTransport},
  valve::ValveDriver,
};
use common::comm::{ControlState, RegulatorSnapshot, Sample, Valve, ValveCommand};
use jeflog::{fail, pass, task, warn};
use std::{
  sync::{Arc, Mutex},
  thread::{self, JoinHandle},
  time::Instant,
};

/// Handles to the running tasks. Only ever touched with the lifecycle lock
/// held, which serializes every operator command.
struct Tasks {
  acquisition: Option<JoinHandle<()>>,
  controller: Option<JoinHandle<()>>,
  epoch: Instant,
}

/// Owns the regulator's transports and shared state and drives the
/// lifecycle:
///
/// ```text
/// Idle --start--> Acquiring --enable_control--> ControllingEnabled
///  ^                 |  ^                              |
///  +------stop-------+  +--------disable_control-------+
/// ```
///
/// Every method takes `&self` and may be called from any thread.
pub struct ControlSupervisor {
  config: RegulatorConfig,
  shared: SharedState,
  reader: Arc<Mutex<PressureReader>>,
  valves: Arc<Mutex<ValveDriver>>,
  sink: Arc<Mutex<Box<dyn PersistenceSink>>>,
  lifecycle: Mutex<Tasks>,
}

impl ControlSupervisor {
  pub fn new(
    config: RegulatorConfig,
    sensor: impl SensorTransport + 'static,
    actuator: impl ActuatorTransport + 'static,
    sink: impl PersistenceSink + 'static,
  ) -> RegulatorResult<Self> {
    config.validate()?;

    let reader = PressureReader::new(
      Box::new(sensor),
      config.buffer_capacity,
      config.pressure_max,
    );

    let valves = ValveDriver::new(
      Box::new(actuator),
      config.inlet_channel,
      config.outlet_channel,
    );

    let sink: Box<dyn PersistenceSink> = Box::new(sink);

    Ok(ControlSupervisor {
      config,
      shared: SharedState::new(),
      reader: Arc::new(Mutex::new(reader)),
      valves: Arc::new(Mutex::new(valves)),
      sink: Arc::new(Mutex::new(sink)),
      lifecycle: Mutex::new(Tasks {
        acquisition: None,
        controller: None,
        epoch: Instant::now(),
      }),
    })
  }

  pub fn config(&self) -> &RegulatorConfig {
    &self.config
  }

  /// Starts the acquisition task. Only valid from `Idle`.
  pub fn start(&self) -> RegulatorResult<()> {
    let mut tasks = lock(&self.lifecycle);
    let state = self.state();

    if state != ControlState::Idle {
      return Err(RegulatorError::InvalidTransition {
        command: "start acquisition",
        state,
      });
    }

    task!("Starting acquisition.");

    self.shared.with(|status| {
      status.acquiring = true;
      status.state = ControlState::Acquiring;
    });

    let acquisition = AcquisitionTask {
      shared: self.shared.clone(),
      reader: self.reader.clone(),
      sink: self.sink.clone(),
      epoch: tasks.epoch,
      period: self.config.acquisition_period(),
    };

    tasks.acquisition = Some(thread::spawn(move || acquisition.run()));

    pass!("Acquisition started.");
    Ok(())
  }

  /// Stops control, then acquisition, then closes both valves. Returns once
  /// the log has been flushed and the sensor released. Does nothing when
  /// already idle.
  pub fn stop(&self) {
    let mut tasks = lock(&self.lifecycle);

    if self.state() == ControlState::Idle {
      return;
    }

    task!("Stopping the regulator.");
    self.halt_controller(&mut tasks);

    self.shared.with(|status| status.acquiring = false);

    if let Some(handle) = tasks.acquisition.take() {
      if handle.join().is_err() {
        fail!("Acquisition task panicked.");
      }
    }

    let valves = lock(&self.valves).close_all();

    self.shared.with(|status| {
      status.valves = valves;
      status.state = ControlState::Idle;
    });

    pass!("Regulator stopped.");
  }

  /// Starts, or restarts, the controller at `setpoint` kPa. An out of range
  /// setpoint is refused without touching any state.
  pub fn enable_control(&self, setpoint: f64) -> RegulatorResult<()> {
    let setpoint = Setpoint::new(setpoint, self.config.pressure_max)?;

    let mut tasks = lock(&self.lifecycle);
    let state = self.state();

    if state == ControlState::Idle {
      return Err(RegulatorError::InvalidTransition {
        command: "enable control",
        state,
      });
    }

    self.halt_controller(&mut tasks);
    self.spawn_controller(&mut tasks, setpoint);
    Ok(())
  }

  /// Stops the controller and waits for its final closing write. Disabling
  /// a regulator that is not controlling is a no-op.
  pub fn disable_control(&self) {
    let mut tasks = lock(&self.lifecycle);

    self.halt_controller(&mut tasks);

    self.shared.with(|status| {
      if status.state == ControlState::ControllingEnabled {
        status.state = ControlState::Acquiring;
      }
    });
  }

  /// Enables control at the stored setpoint, or disables it.
  pub fn set_control_enabled(&self, enabled: bool) -> RegulatorResult<()> {
    if !enabled {
      self.disable_control();
      return Ok(());
    }

    let setpoint = self
      .shared
      .with(|status| status.setpoint)
      .ok_or(RegulatorError::MissingSetpoint)?;

    self.enable_control(setpoint)
  }

  /// Stores a new setpoint. While controlling, the controller is restarted
  /// so the new target takes effect immediately.
  pub fn set_setpoint(&self, setpoint: f64) -> RegulatorResult<()> {
    let setpoint = Setpoint::new(setpoint, self.config.pressure_max)?;

    let mut tasks = lock(&self.lifecycle);

    if self.state() == ControlState::ControllingEnabled {
      self.halt_controller(&mut tasks);
      self.spawn_controller(&mut tasks, setpoint);
    } else {
      self.shared.with(|status| status.setpoint = Some(setpoint.kpa()));
    }

    Ok(())
  }

  /// [`ControlSupervisor::set_setpoint`] for operator text.
  pub fn set_setpoint_text(&self, text: &str) -> RegulatorResult<()> {
    let setpoint = Setpoint::parse(text, self.config.pressure_max);

    if let Err(error) = &setpoint {
      warn!("Rejected setpoint: {error}.");
    }

    self.set_setpoint(setpoint?.kpa())
  }

  /// Flips the inlet valve. Only permitted while acquiring without control.
  pub fn toggle_inlet_manual(&self) -> RegulatorResult<ValveCommand> {
    self.toggle_manual(Valve::Inlet)
  }

  /// Flips the outlet valve. Only permitted while acquiring without control.
  pub fn toggle_outlet_manual(&self) -> RegulatorResult<ValveCommand> {
    self.toggle_manual(Valve::Outlet)
  }

  /// Starts the next session with an empty log and elapsed time counted from
  /// now. Only permitted while idle.
  pub fn reset_log(&self) -> RegulatorResult<()> {
    let mut tasks = lock(&self.lifecycle);
    let state = self.state();

    if state != ControlState::Idle {
      return Err(RegulatorError::InvalidTransition {
        command: "reset the log",
        state,
      });
    }

    tasks.epoch = Instant::now();
    self.shared.with(|status| status.log = SampleLog::new());
    Ok(())
  }

  pub fn state(&self) -> ControlState {
    self.shared.with(|status| status.state)
  }

  /// Latest smoothed pressure, in kPa.
  pub fn pressure(&self) -> f64 {
    self.shared.with(|status| status.pressure)
  }

  pub fn setpoint(&self) -> Option<f64> {
    self.shared.with(|status| status.setpoint)
  }

  /// Seconds since the start of the log at the most recent sample.
  pub fn elapsed(&self) -> f64 {
    self
      .shared
      .with(|status| status.log.last().map(|sample| sample.time))
      .unwrap_or(0.0)
  }

  /// Copy of the full session log.
  pub fn samples(&self) -> Vec<Sample> {
    self.shared.with(|status| status.log.samples().to_vec())
  }

  pub fn snapshot(&self) -> RegulatorSnapshot {
    self.shared.snapshot()
  }

  fn toggle_manual(&self, valve: Valve) -> RegulatorResult<ValveCommand> {
    let _tasks = lock(&self.lifecycle);
    let state = self.state();

    if state != ControlState::Acquiring {
      warn!("Ignored manual {valve} toggle while {state}.");

      return Err(RegulatorError::InvalidTransition {
        command: match valve {
          Valve::Inlet => "toggle the inlet valve",
          Valve::Outlet => "toggle the outlet valve",
        },
        state,
      });
    }

    let valves = {
      let mut driver = lock(&self.valves);
      let open = !driver.current().is_open(valve);

      driver.set(valve, open)?;
      driver.current()
    };

    self.shared.with(|status| status.valves = valves);
    Ok(valves)
  }

  fn halt_controller(&self, tasks: &mut Tasks) {
    self.shared.with(|status| status.controlling = false);

    if let Some(handle) = tasks.controller.take() {
      if handle.join().is_err() {
        fail!("Control task panicked outside a tick, closing valves.");

        let valves = lock(&self.valves).close_all();
        self.shared.with(|status| status.valves = valves);
      }
    }
  }

  fn spawn_controller(&self, tasks: &mut Tasks, setpoint: Setpoint) {
    self.shared.with(|status| {
      status.setpoint = Some(setpoint.kpa());
      status.controlling = true;
      status.state = ControlState::ControllingEnabled;
      status.fault = None;
    });

    let control = ControlTask {
      shared: self.shared.clone(),
      valves: self.valves.clone(),
      controller: HysteresisController::new(
        setpoint,
        self.config.pressure_tolerance,
      ),
      period: self.config.control_period(),
    };

    tasks.controller = Some(thread::spawn(move || control.run()));
  }
}

impl Drop for ControlSupervisor {
  fn drop(&mut self) {
    self.stop();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::mocks::{wait_until, MockActuator, MockSensor, MockSink};
  use std::time::Duration;

  const TIMEOUT: Duration = Duration::from_secs(5);
  const INLET: u32 = 9;
  const OUTLET: u32 = 10;

  struct Rig {
    supervisor: ControlSupervisor,
    sensor: MockSensor,
    actuator: MockActuator,
    sink: MockSink,
  }

  fn rig(level: f64) -> Rig {
    let config = RegulatorConfig {
      acquisition_period_ms: 3,
      control_period_ms: 2,
      ..Default::default()
    };

    let sensor = MockSensor::new(level);
    let actuator = MockActuator::new();
    let sink = MockSink::new();

    let supervisor = ControlSupervisor::new(
      config,
      sensor.clone(),
      actuator.clone(),
      sink.clone(),
    )
    .unwrap();

    Rig {
      supervisor,
      sensor,
      actuator,
      sink,
    }
  }

  #[test]
  fn end_to_end_regulation() {
    let rig = rig(0.5);
    rig.supervisor.start().unwrap();

    assert!(wait_until(TIMEOUT, || rig.supervisor.pressure() == 350.0));

    rig.supervisor.enable_control(380.0).unwrap();
    assert_eq!(rig.supervisor.state(), ControlState::ControllingEnabled);
    assert!(wait_until(TIMEOUT, || rig.actuator.level(INLET) == Some(true)));

    rig.sensor.set_level(Some(390.0 / 700.0));
    assert!(wait_until(TIMEOUT, || rig.supervisor.pressure() > 385.0));
    assert!(wait_until(TIMEOUT, || {
      rig.actuator.level(OUTLET) == Some(true)
        && rig.actuator.level(INLET) == Some(false)
    }));

    rig.supervisor.stop();
    assert_eq!(rig.supervisor.state(), ControlState::Idle);

    let writes = rig.actuator.writes();
    assert_eq!(&writes[writes.len() - 2..], &[(INLET, false), (OUTLET, false)]);

    let flushes = rig.sink.flushes();
    assert_eq!(flushes.len(), 1);
    assert_eq!(flushes[0].len(), rig.sensor.reads());
    assert_eq!(rig.sensor.releases(), 1);
  }

  #[test]
  fn smoothed_pressure_stays_in_range() {
    let rig = rig(3.0);
    rig.supervisor.start().unwrap();

    assert!(wait_until(TIMEOUT, || rig.supervisor.samples().len() >= 10));
    rig.supervisor.stop();

    for sample in rig.supervisor.samples() {
      assert!((0.0..=700.0).contains(&sample.pressure));
    }
  }

  #[test]
  fn lifecycle_transitions_are_checked() {
    let rig = rig(0.5);

    assert!(matches!(
      rig.supervisor.enable_control(100.0),
      Err(RegulatorError::InvalidTransition { .. })
    ));
    assert!(rig.supervisor.toggle_inlet_manual().is_err());

    rig.supervisor.start().unwrap();
    assert!(matches!(
      rig.supervisor.start(),
      Err(RegulatorError::InvalidTransition { .. })
    ));
    assert!(matches!(
      rig.supervisor.reset_log(),
      Err(RegulatorError::InvalidTransition { .. })
    ));

    rig.supervisor.stop();
    rig.supervisor.stop();
    assert_eq!(rig.supervisor.state(), ControlState::Idle);
  }

  #[test]
  fn rejected_setpoint_changes_nothing() {
    let rig = rig(0.5);
    rig.supervisor.start().unwrap();
    rig.supervisor.enable_control(200.0).unwrap();

    assert!(rig.supervisor.enable_control(701.0).is_err());
    assert!(rig.supervisor.set_setpoint_text("lots").is_err());
    assert!(rig.supervisor.set_setpoint(-3.0).is_err());

    assert_eq!(rig.supervisor.setpoint(), Some(200.0));
    assert_eq!(rig.supervisor.state(), ControlState::ControllingEnabled);
  }

  #[test]
  fn disabling_writes_closed_before_returning() {
    let rig = rig(0.1);
    rig.supervisor.start().unwrap();
    rig.supervisor.enable_control(600.0).unwrap();

    assert!(wait_until(TIMEOUT, || rig.actuator.level(INLET) == Some(true)));

    rig.supervisor.disable_control();
    assert_eq!(rig.supervisor.state(), ControlState::Acquiring);

    let writes = rig.actuator.writes();
    assert_eq!(&writes[writes.len() - 2..], &[(INLET, false), (OUTLET, false)]);

    thread::sleep(Duration::from_millis(20));
    assert_eq!(rig.actuator.writes(), writes);
  }

  #[test]
  fn disabling_without_a_controller_is_a_no_op() {
    let rig = rig(0.5);

    rig.supervisor.disable_control();
    assert_eq!(rig.supervisor.state(), ControlState::Idle);

    rig.supervisor.start().unwrap();
    rig.supervisor.disable_control();
    rig.supervisor.set_control_enabled(false).unwrap();
    assert_eq!(rig.supervisor.state(), ControlState::Acquiring);
    assert!(rig.actuator.writes().is_empty());
  }

  #[test]
  fn setpoint_change_restarts_controller() {
    let rig = rig(0.5);
    rig.supervisor.start().unwrap();
    assert!(wait_until(TIMEOUT, || rig.supervisor.pressure() == 350.0));

    rig.supervisor.enable_control(500.0).unwrap();
    assert!(wait_until(TIMEOUT, || rig.actuator.level(INLET) == Some(true)));

    rig.supervisor.set_setpoint(100.0).unwrap();
    assert_eq!(rig.supervisor.setpoint(), Some(100.0));
    assert_eq!(rig.supervisor.state(), ControlState::ControllingEnabled);

    // the old controller's closing write precedes the new controller's vent
    let writes = rig.actuator.writes();
    let closed_at = writes
      .windows(2)
      .rposition(|pair| pair == [(INLET, false), (OUTLET, false)])
      .unwrap();
    assert!(writes[closed_at..].iter().all(|write| *write != (INLET, true)));

    assert!(wait_until(TIMEOUT, || rig.actuator.level(OUTLET) == Some(true)));
  }

  #[test]
  fn manual_toggles_only_while_acquiring() {
    let rig = rig(0.5);
    rig.supervisor.start().unwrap();

    assert_eq!(
      rig.supervisor.toggle_inlet_manual().unwrap(),
      ValveCommand::FILL
    );
    assert!(matches!(
      rig.supervisor.toggle_outlet_manual(),
      Err(RegulatorError::ValveInterlock {
        valve: Valve::Outlet
      })
    ));
    assert_eq!(
      rig.supervisor.toggle_inlet_manual().unwrap(),
      ValveCommand::CLOSED
    );
    assert_eq!(
      rig.supervisor.toggle_outlet_manual().unwrap(),
      ValveCommand::VENT
    );

    rig.supervisor.enable_control(350.0).unwrap();
    assert!(rig.supervisor.toggle_inlet_manual().is_err());
    assert!(rig.supervisor.toggle_outlet_manual().is_err());
    assert_eq!(rig.supervisor.state(), ControlState::ControllingEnabled);

    rig.supervisor.disable_control();
    assert_eq!(rig.supervisor.snapshot().valves, ValveCommand::CLOSED);
  }

  #[test]
  fn control_toggle_uses_stored_setpoint() {
    let rig = rig(0.5);
    rig.supervisor.start().unwrap();

    assert!(matches!(
      rig.supervisor.set_control_enabled(true),
      Err(RegulatorError::MissingSetpoint)
    ));

    rig.supervisor.set_setpoint_text(" 420 ").unwrap();
    assert_eq!(rig.supervisor.state(), ControlState::Acquiring);

    rig.supervisor.set_control_enabled(true).unwrap();
    assert_eq!(rig.supervisor.state(), ControlState::ControllingEnabled);

    rig.supervisor.set_control_enabled(false).unwrap();
    assert_eq!(rig.supervisor.state(), ControlState::Acquiring);
  }

  #[test]
  fn controller_fault_does_not_stop_acquisition() {
    let rig = rig(0.1);
    rig.actuator.set_panic_on_open(true);
    rig.supervisor.start().unwrap();
    rig.supervisor.enable_control(600.0).unwrap();

    assert!(wait_until(TIMEOUT, || rig.supervisor.state()
      == ControlState::Acquiring));

    let snapshot = rig.supervisor.snapshot();
    assert!(snapshot.fault.is_some());
    assert_eq!(snapshot.valves, ValveCommand::CLOSED);

    let samples = rig.supervisor.samples().len();
    assert!(wait_until(TIMEOUT, || rig.supervisor.samples().len() > samples));

    rig.supervisor.disable_control();
    rig.supervisor.stop();
    assert_eq!(rig.supervisor.state(), ControlState::Idle);
  }

  #[test]
  fn flush_failure_does_not_block_stop() {
    let rig = rig(0.5);
    rig.sink.set_failing(true);

    rig.supervisor.start().unwrap();
    assert!(wait_until(TIMEOUT, || !rig.supervisor.samples().is_empty()));
    rig.supervisor.stop();

    assert_eq!(rig.supervisor.state(), ControlState::Idle);
    assert_eq!(rig.sink.flushes().len(), 1);
  }

  #[test]
  fn sessions_append_to_the_same_log() {
    let rig = rig(0.5);

    rig.supervisor.start().unwrap();
    assert!(wait_until(TIMEOUT, || rig.supervisor.samples().len() >= 2));
    rig.supervisor.stop();
    let first = rig.supervisor.samples().len();

    rig.supervisor.start().unwrap();
    assert!(wait_until(TIMEOUT, || rig.supervisor.samples().len() > first));
    rig.supervisor.stop();

    let flushes = rig.sink.flushes();
    assert_eq!(flushes.len(), 2);
    assert_eq!(flushes[0].len(), first);
    assert_eq!(flushes[1].len(), rig.supervisor.samples().len());

    let times: Vec<f64> = flushes[1].iter().map(|sample| sample.time).collect();
    assert!(times.windows(2).all(|pair| pair[0] <= pair[1]));

    rig.supervisor.reset_log().unwrap();
    assert!(rig.supervisor.samples().is_empty());
    assert_eq!(rig.supervisor.elapsed(), 0.0);
  }

  #[test]
  fn drop_stops_and_flushes() {
    let rig = rig(0.5);
    rig.supervisor.start().unwrap();
    assert!(wait_until(TIMEOUT, || !rig.supervisor.samples().is_empty()));

    let Rig {
      supervisor,
      actuator,
      sink,
      ..
    } = rig;
    drop(supervisor);

    assert_eq!(sink.flushes().len(), 1);
    assert_eq!(actuator.level(INLET), Some(false));
    assert_eq!(actuator.level(OUTLET), Some(false));
  }
}
