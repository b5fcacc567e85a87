use crate::ToPrettyString;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of the regulator, as driven by the supervisor.
#[derive(
  Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ControlState {
  /// No acquisition, no control, valves closed.
  #[default]
  Idle,

  /// Acquisition running, control disabled. Manual valve toggles are
  /// permitted.
  Acquiring,

  /// Acquisition and the hysteresis controller running. The controller owns
  /// the valves exclusively.
  ControllingEnabled,
}

impl fmt::Display for ControlState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}",
      match self {
        Self::Idle => "idle",
        Self::Acquiring => "acquiring",
        Self::ControllingEnabled => "controlling",
      }
    )
  }
}

impl ToPrettyString for ControlState {
  fn to_pretty_string(&self) -> String {
    match self {
      Self::Idle => "\x1b[38;5;248midle\x1b[0m",
      Self::Acquiring => "\x1b[33macquiring\x1b[0m",
      Self::ControllingEnabled => "\x1b[32mcontrolling\x1b[0m",
    }
    .to_owned()
  }
}

/// One of the two actuators on the vessel.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Valve {
  /// Admits fluid into the vessel, raising pressure.
  Inlet,

  /// Vents fluid out of the vessel, lowering pressure.
  Outlet,
}

impl Valve {
  /// The valve on the other side of the vessel.
  pub fn opposite(self) -> Self {
    match self {
      Self::Inlet => Self::Outlet,
      Self::Outlet => Self::Inlet,
    }
  }
}

impl fmt::Display for Valve {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Inlet => write!(f, "inlet"),
      Self::Outlet => write!(f, "outlet"),
    }
  }
}

/// Open/closed pair for the inlet and outlet valves.
///
/// Both valves are never open at once: every constructor refuses that
/// combination, so any `ValveCommand` that exists satisfies the interlock.
#[derive(
  Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize,
)]
#[serde(try_from = "RawValveCommand")]
pub struct ValveCommand {
  inlet: bool,
  outlet: bool,
}

#[derive(Deserialize)]
struct RawValveCommand {
  inlet: bool,
  outlet: bool,
}

impl TryFrom<RawValveCommand> for ValveCommand {
  type Error = &'static str;

  fn try_from(raw: RawValveCommand) -> Result<Self, Self::Error> {
    ValveCommand::new(raw.inlet, raw.outlet)
      .ok_or("inlet and outlet may not both be open")
  }
}

impl ValveCommand {
  /// Both valves closed. This is the fail-safe state.
  pub const CLOSED: Self = Self {
    inlet: false,
    outlet: false,
  };

  /// Inlet open, outlet closed: pressure rises.
  pub const FILL: Self = Self {
    inlet: true,
    outlet: false,
  };

  /// Inlet closed, outlet open: pressure falls.
  pub const VENT: Self = Self {
    inlet: false,
    outlet: true,
  };

  /// Builds a command from raw flags, returning `None` if both would be open.
  pub fn new(inlet: bool, outlet: bool) -> Option<Self> {
    if inlet && outlet {
      None
    } else {
      Some(Self { inlet, outlet })
    }
  }

  /// Whether the inlet valve is open.
  pub fn inlet(&self) -> bool {
    self.inlet
  }

  /// Whether the outlet valve is open.
  pub fn outlet(&self) -> bool {
    self.outlet
  }

  /// Whether the given valve is open.
  pub fn is_open(&self, valve: Valve) -> bool {
    match valve {
      Valve::Inlet => self.inlet,
      Valve::Outlet => self.outlet,
    }
  }

  /// Returns this command with a single valve changed, or `None` if the
  /// result would open both valves.
  pub fn with(&self, valve: Valve, open: bool) -> Option<Self> {
    match valve {
      Valve::Inlet => Self::new(open, self.outlet),
      Valve::Outlet => Self::new(self.inlet, open),
    }
  }
}

impl fmt::Display for ValveCommand {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let describe = |open: bool| if open { "open" } else { "closed" };

    write!(
      f,
      "inlet {}, outlet {}",
      describe(self.inlet),
      describe(self.outlet)
    )
  }
}

impl ToPrettyString for ValveCommand {
  fn to_pretty_string(&self) -> String {
    let describe = |open: bool| {
      if open {
        "\x1b[32mopen\x1b[0m"
      } else {
        "\x1b[31mclosed\x1b[0m"
      }
    };

    format!(
      "inlet {}, outlet {}",
      describe(self.inlet),
      describe(self.outlet)
    )
  }
}

/// A single entry of the session log.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct Sample {
  /// Seconds elapsed since the regulator was created.
  pub time: f64,

  /// Smoothed pressure at that instant, in kPa.
  pub pressure: f64,
}

/// Point-in-time view of the regulator for display.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct RegulatorSnapshot {
  /// Current lifecycle state.
  pub state: ControlState,

  /// Latest smoothed pressure, in kPa.
  pub pressure: f64,

  /// Elapsed time of the latest logged sample, in seconds.
  pub elapsed: f64,

  /// Last accepted setpoint, if one has been given.
  pub setpoint: Option<f64>,

  /// Last valve command that reached the actuators.
  pub valves: ValveCommand,

  /// Description of the most recent controller fault, if any.
  pub fault: Option<String>,

  /// Number of entries in the session log.
  pub samples: usize,
}

impl ToPrettyString for RegulatorSnapshot {
  fn to_pretty_string(&self) -> String {
    let setpoint = self
      .setpoint
      .map(|setpoint| format!("{setpoint:.2} kPa"))
      .unwrap_or_else(|| "none".to_owned());

    let mut pretty = format!(
      "\x1b[1mState:\x1b[0m {}\n\
       \x1b[1mTime:\x1b[0m {:.2} s\n\
       \x1b[1mPressure:\x1b[0m {:.2} kPa\n\
       \x1b[1mSetpoint:\x1b[0m {setpoint}\n\
       \x1b[1mValves:\x1b[0m {}\n\
       \x1b[1mSamples:\x1b[0m {}",
      self.state.to_pretty_string(),
      self.elapsed,
      self.pressure,
      self.valves.to_pretty_string(),
      self.samples,
    );

    if let Some(fault) = &self.fault {
      pretty.push_str(&format!("\n\x1b[1;31mFault:\x1b[0m {fault}"));
    }

    pretty
  }
}
