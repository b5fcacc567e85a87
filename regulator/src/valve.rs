use crate::{
  error::{RegulatorError, RegulatorResult},
  transport::ActuatorTransport,
};
use common::comm::{Valve, ValveCommand};
use jeflog::{pass, warn};

/// Owner of the inlet and outlet actuators.
///
/// Tracks what each valve was last driven to and refuses any change that
/// would leave both open. When the transport reports itself closed, writes
/// are dropped and the tracked state is left as it was.
pub struct ValveDriver {
  transport: Box<dyn ActuatorTransport>,
  inlet_channel: u32,
  outlet_channel: u32,
  current: ValveCommand,
  transport_lost: bool,
}

impl ValveDriver {
  pub fn new(
    transport: Box<dyn ActuatorTransport>,
    inlet_channel: u32,
    outlet_channel: u32,
  ) -> Self {
    ValveDriver {
      transport,
      inlet_channel,
      outlet_channel,
      current: ValveCommand::CLOSED,
      transport_lost: false,
    }
  }

  /// Valve states as last written to the transport.
  pub fn current(&self) -> ValveCommand {
    self.current
  }

  pub fn set_inlet(&mut self, open: bool) -> RegulatorResult<()> {
    self.set(Valve::Inlet, open)
  }

  pub fn set_outlet(&mut self, open: bool) -> RegulatorResult<()> {
    self.set(Valve::Outlet, open)
  }

  /// Drives a single valve, leaving the other untouched.
  pub fn set(&mut self, valve: Valve, open: bool) -> RegulatorResult<()> {
    if self.current.with(valve, open).is_none() {
      warn!(
        "Refused to open the {valve} valve while the {} valve is open.",
        valve.opposite()
      );
      return Err(RegulatorError::ValveInterlock { valve });
    }

    self.write(valve, open);
    Ok(())
  }

  /// Drives both valves to `command` and returns the resulting state.
  ///
  /// The valve being closed is written before the valve being opened, so
  /// there is no instant at which both are commanded open.
  pub fn apply(&mut self, command: ValveCommand) -> ValveCommand {
    let (first, second) = if command.inlet() {
      (Valve::Outlet, Valve::Inlet)
    } else {
      (Valve::Inlet, Valve::Outlet)
    };

    for valve in [first, second] {
      let open = command.is_open(valve);

      // only reachable when the closing write above was dropped
      if self.current.with(valve, open).is_none() {
        continue;
      }

      self.write(valve, open);
    }

    self.current
  }

  /// Closes both valves.
  pub fn close_all(&mut self) -> ValveCommand {
    self.apply(ValveCommand::CLOSED)
  }

  fn channel(&self, valve: Valve) -> u32 {
    match valve {
      Valve::Inlet => self.inlet_channel,
      Valve::Outlet => self.outlet_channel,
    }
  }

  fn write(&mut self, valve: Valve, open: bool) {
    if !self.transport.is_open() {
      if !self.transport_lost {
        warn!("Actuator transport is closed, valve writes are being dropped.");
        self.transport_lost = true;
      }

      return;
    }

    if self.transport_lost {
      pass!("Actuator transport is open again.");
      self.transport_lost = false;
    }

    let channel = self.channel(valve);
    self.transport.write_digital(channel, open);

    if let Some(updated) = self.current.with(valve, open) {
      self.current = updated;
    }
  }
}
