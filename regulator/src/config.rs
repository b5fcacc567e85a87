use crate::error::{RegulatorError, RegulatorResult};
use serde::Deserialize;
use std::{
  fs,
  path::{Path, PathBuf},
  time::Duration,
};

/// Tunables for one regulator instance.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegulatorConfig {
  /// Full-scale pressure of the sensor, in kPa. Readings and setpoints are
  /// clamped or validated against `[0, pressure_max]`.
  pub pressure_max: f64,

  /// Half-width of the dead band around the setpoint, in kPa.
  pub pressure_tolerance: f64,

  /// Number of raw readings averaged into the smoothed pressure.
  pub buffer_capacity: usize,

  /// Period of the acquisition loop.
  pub acquisition_period_ms: u64,

  /// Period of the control loop.
  pub control_period_ms: u64,

  /// Actuator channel driving the inlet valve.
  pub inlet_channel: u32,

  /// Actuator channel driving the outlet valve.
  pub outlet_channel: u32,

  /// Directory where session logs are written.
  pub log_dir: PathBuf,

  /// Explicit log file. When absent a timestamped name inside `log_dir` is
  /// used.
  pub log_file: Option<PathBuf>,
}

impl Default for RegulatorConfig {
  fn default() -> Self {
    Self {
      pressure_max: 700.0,
      pressure_tolerance: 5.0,
      buffer_capacity: 7,
      acquisition_period_ms: 600,
      control_period_ms: 500,
      inlet_channel: 9,
      outlet_channel: 10,
      log_dir: default_log_dir(),
      log_file: None,
    }
  }
}

fn default_log_dir() -> PathBuf {
  std::env::var("HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| PathBuf::from("."))
    .join("pressure_logs")
}

impl RegulatorConfig {
  /// Reads a JSON configuration file. Missing fields keep their defaults.
  pub fn from_file(path: &Path) -> RegulatorResult<Self> {
    let text = fs::read_to_string(path)?;
    let config: RegulatorConfig = serde_json::from_str(&text)?;
    config.validate()?;
    Ok(config)
  }

  /// Checks that the configuration describes a usable regulator.
  pub fn validate(&self) -> RegulatorResult<()> {
    if !(self.pressure_max.is_finite() && self.pressure_max > 0.0) {
      return Err(RegulatorError::Config(format!(
        "pressure_max must be positive, got {}",
        self.pressure_max
      )));
    }

    if !(self.pressure_tolerance.is_finite() && self.pressure_tolerance >= 0.0)
    {
      return Err(RegulatorError::Config(format!(
        "pressure_tolerance must be non-negative, got {}",
        self.pressure_tolerance
      )));
    }

    if self.buffer_capacity == 0 {
      return Err(RegulatorError::Config(
        "buffer_capacity must be at least 1".to_owned(),
      ));
    }

    if self.acquisition_period_ms == 0 || self.control_period_ms == 0 {
      return Err(RegulatorError::Config(
        "loop periods must be non-zero".to_owned(),
      ));
    }

    if self.inlet_channel == self.outlet_channel {
      return Err(RegulatorError::Config(format!(
        "inlet and outlet share channel {}",
        self.inlet_channel
      )));
    }

    Ok(())
  }

  /// Period of the acquisition loop.
  pub fn acquisition_period(&self) -> Duration {
    Duration::from_millis(self.acquisition_period_ms)
  }

  /// Period of the control loop.
  pub fn control_period(&self) -> Duration {
    Duration::from_millis(self.control_period_ms)
  }

  /// Where the session log is persisted.
  pub fn log_path(&self) -> PathBuf {
    match &self.log_file {
      Some(path) => path.clone(),
      None => self.log_dir.join(timestamped_log_name()),
    }
  }
}

fn timestamped_log_name() -> String {
  use chrono::Local;

  let now = Local::now();
  format!("pressure_{}.csv", now.format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_are_valid() {
    let config = RegulatorConfig::default();
    config.validate().unwrap();
    assert_eq!(config.pressure_max, 700.0);
    assert_eq!(config.buffer_capacity, 7);
    assert_eq!(config.acquisition_period(), Duration::from_millis(600));
    assert_eq!(config.control_period(), Duration::from_millis(500));
  }

  #[test]
  fn partial_json_keeps_defaults() {
    let config: RegulatorConfig =
      serde_json::from_str(r#"{ "pressure_max": 250.0, "buffer_capacity": 3 }"#)
        .unwrap();

    assert_eq!(config.pressure_max, 250.0);
    assert_eq!(config.buffer_capacity, 3);
    assert_eq!(config.pressure_tolerance, 5.0);
    assert_eq!(config.inlet_channel, 9);
  }

  #[test]
  fn validation_rejects_nonsense() {
    let bad = [
      RegulatorConfig {
        pressure_max: 0.0,
        ..Default::default()
      },
      RegulatorConfig {
        pressure_tolerance: f64::NAN,
        ..Default::default()
      },
      RegulatorConfig {
        buffer_capacity: 0,
        ..Default::default()
      },
      RegulatorConfig {
        control_period_ms: 0,
        ..Default::default()
      },
      RegulatorConfig {
        outlet_channel: 9,
        ..Default::default()
      },
    ];

    for config in bad {
      assert!(matches!(config.validate(), Err(RegulatorError::Config(_))));
    }
  }

  #[test]
  fn explicit_log_file_wins() {
    let config = RegulatorConfig {
      log_file: Some(PathBuf::from("/tmp/run.csv")),
      ..Default::default()
    };
    assert_eq!(config.log_path(), PathBuf::from("/tmp/run.csv"));

    let generated = RegulatorConfig::default().log_path();
    let name = generated.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("pressure_") && name.ends_with(".csv"));
  }
}
