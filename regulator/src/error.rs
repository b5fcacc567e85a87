use common::comm::{ControlState, Valve};
use std::{fmt, io};

/// Any error the regulator can hand back to whoever issued a command.
#[derive(Debug)]
pub enum RegulatorError {
  /// The setpoint text could not be parsed as a number.
  UnparsableSetpoint(String),

  /// The setpoint lies outside `[0, pressure_max]`.
  SetpointOutOfRange { value: f64, max: f64 },

  /// Control was requested before any setpoint was accepted.
  MissingSetpoint,

  /// The command is not valid in the current lifecycle state.
  InvalidTransition {
    command: &'static str,
    state: ControlState,
  },

  /// Opening `valve` would have opened both valves at once.
  ValveInterlock { valve: Valve },

  /// The configuration failed validation.
  Config(String),

  /// Error originating from the file system.
  Io(io::Error),

  /// Error originating from the CSV encoder.
  Csv(csv::Error),

  /// Error originating from the sensor or actuator hardware.
  Hardware(String),
}

impl From<io::Error> for RegulatorError {
  fn from(error: io::Error) -> Self {
    RegulatorError::Io(error)
  }
}

impl From<csv::Error> for RegulatorError {
  fn from(error: csv::Error) -> Self {
    RegulatorError::Csv(error)
  }
}

impl From<serde_json::Error> for RegulatorError {
  fn from(error: serde_json::Error) -> Self {
    RegulatorError::Config(error.to_string())
  }
}

impl fmt::Display for RegulatorError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::UnparsableSetpoint(text) => {
        write!(f, "'{text}' is not a valid setpoint")
      }
      Self::SetpointOutOfRange { value, max } => {
        write!(f, "setpoint {value} kPa is outside [0, {max}] kPa")
      }
      Self::MissingSetpoint => write!(f, "no setpoint has been entered"),
      Self::InvalidTransition { command, state } => {
        write!(f, "cannot {command} while {state}")
      }
      Self::ValveInterlock { valve } => write!(
        f,
        "refusing to open the {valve} valve while the {} valve is open",
        valve.opposite()
      ),
      Self::Config(message) => write!(f, "invalid configuration: {message}"),
      Self::Io(error) => write!(f, "IO error: {error}"),
      Self::Csv(error) => write!(f, "CSV error: {error}"),
      Self::Hardware(message) => write!(f, "hardware error: {message}"),
    }
  }
}

impl std::error::Error for RegulatorError {}

/// A `Result` type containing a `RegulatorError` as its `Err` variant.
pub type RegulatorResult<T> = Result<T, RegulatorError>;
