//! Line-oriented operator console on top of a [`ControlSupervisor`].

use crate::{
  error::RegulatorResult,
  setpoint::Setpoint,
  supervisor::ControlSupervisor,
};
use common::ToPrettyString;
use jeflog::{fail, pass, warn};
use std::{
  fmt,
  io::{self, BufRead, Write},
};

/// One operator command.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
  Start,
  Stop,
  Setpoint(String),
  Enable(Option<String>),
  Disable,
  Inlet,
  Outlet,
  Status,
  Reset,
  Help,
  Quit,
}

/// Why a line could not be understood.
#[derive(Clone, Debug, PartialEq)]
pub enum ParseError {
  Empty,
  Unknown(String),
  MissingArgument(&'static str),
  TrailingArguments(String),
}

impl fmt::Display for ParseError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Empty => write!(f, "empty command"),
      Self::Unknown(word) => write!(f, "unknown command '{word}'"),
      Self::MissingArgument(command) => {
        write!(f, "'{command}' needs a value in kPa")
      }
      Self::TrailingArguments(rest) => write!(f, "unexpected '{rest}'"),
    }
  }
}

pub const HELP: &str = "\
commands:
  start              begin acquisition
  stop               stop control and acquisition, flush the log
  setpoint <kPa>     set the target pressure
  enable [kPa]       start the controller, optionally with a new setpoint
  disable            stop the controller
  inlet | outlet     toggle a valve by hand (acquiring only)
  status             show the current state
  reset              clear the log (idle only)
  quit";

impl Command {
  pub fn parse(line: &str) -> Result<Command, ParseError> {
    let mut words = line.split_whitespace();
    let Some(word) = words.next() else {
      return Err(ParseError::Empty);
    };

    let argument = words.next().map(str::to_owned);
    let rest: Vec<&str> = words.collect();

    if !rest.is_empty() {
      return Err(ParseError::TrailingArguments(rest.join(" ")));
    }

    let command = match (word.to_lowercase().as_str(), argument) {
      ("setpoint" | "sp", Some(value)) => Command::Setpoint(value),
      ("setpoint" | "sp", None) => {
        return Err(ParseError::MissingArgument("setpoint"))
      }
      ("enable", value) => Command::Enable(value),
      (_, Some(extra)) => return Err(ParseError::TrailingArguments(extra)),
      ("start", None) => Command::Start,
      ("stop", None) => Command::Stop,
      ("disable", None) => Command::Disable,
      ("inlet", None) => Command::Inlet,
      ("outlet", None) => Command::Outlet,
      ("status", None) => Command::Status,
      ("reset", None) => Command::Reset,
      ("help" | "?", None) => Command::Help,
      ("quit" | "exit", None) => Command::Quit,
      (_, None) => return Err(ParseError::Unknown(word.to_owned())),
    };

    Ok(command)
  }

  /// Runs the command and returns the text to show the operator.
  pub fn execute(&self, supervisor: &ControlSupervisor) -> RegulatorResult<String> {
    match self {
      Command::Start => {
        supervisor.start()?;
        Ok("acquiring".to_owned())
      }
      Command::Stop => {
        supervisor.stop();
        Ok(format!("stopped, {} samples logged", supervisor.samples().len()))
      }
      Command::Setpoint(text) => {
        supervisor.set_setpoint_text(text)?;
        Ok(format!("setpoint {} kPa", text.trim()))
      }
      Command::Enable(Some(text)) => {
        let setpoint = Setpoint::parse(text, supervisor.config().pressure_max)?;
        supervisor.enable_control(setpoint.kpa())?;
        Ok(format!("controlling to {setpoint}"))
      }
      Command::Enable(None) => {
        supervisor.set_control_enabled(true)?;
        Ok("controlling".to_owned())
      }
      Command::Disable => {
        supervisor.disable_control();
        Ok("control disabled".to_owned())
      }
      Command::Inlet => {
        let valves = supervisor.toggle_inlet_manual()?;
        Ok(valves.to_pretty_string())
      }
      Command::Outlet => {
        let valves = supervisor.toggle_outlet_manual()?;
        Ok(valves.to_pretty_string())
      }
      Command::Status => Ok(supervisor.snapshot().to_pretty_string()),
      Command::Reset => {
        supervisor.reset_log()?;
        Ok("log cleared".to_owned())
      }
      Command::Help => Ok(HELP.to_owned()),
      Command::Quit => Ok("bye".to_owned()),
    }
  }
}

/// Reads commands from `input` until `quit` or end of input. Bad input is
/// reported and skipped.
pub fn run(
  supervisor: &ControlSupervisor,
  input: impl BufRead,
  mut output: impl Write,
) -> io::Result<()> {
  writeln!(output, "{HELP}")?;
  write!(output, "> ")?;
  output.flush()?;

  for line in input.lines() {
    let line = line?;

    match Command::parse(&line) {
      Ok(Command::Quit) => break,
      Ok(command) => match command.execute(supervisor) {
        Ok(message) => {
          pass!("{message}");
        }
        Err(error) => fail!("{error}"),
      },
      Err(ParseError::Empty) => {}
      Err(error) => warn!("{error}, type 'help' for a list of commands."),
    }

    write!(output, "> ")?;
    output.flush()?;
  }

  Ok(())
}
