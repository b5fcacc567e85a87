use crate::error::{RegulatorError, RegulatorResult};
use std::fmt;

/// Target pressure in kPa, known to lie within `[0, pressure_max]`.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct Setpoint(f64);

impl Setpoint {
  /// Accepts `value` if it is a number within `[0, max]`.
  pub fn new(value: f64, max: f64) -> RegulatorResult<Self> {
    if value.is_nan() {
      return Err(RegulatorError::UnparsableSetpoint(value.to_string()));
    }

    if !(0.0..=max).contains(&value) {
      return Err(RegulatorError::SetpointOutOfRange { value, max });
    }

    Ok(Setpoint(value))
  }

  /// Parses operator text such as `" 380 "` or `"412.5"`.
  pub fn parse(text: &str, max: f64) -> RegulatorResult<Self> {
    let trimmed = text.trim();

    let value = trimmed
      .parse::<f64>()
      .map_err(|_| RegulatorError::UnparsableSetpoint(trimmed.to_owned()))?;

    Setpoint::new(value, max)
  }

  pub fn kpa(self) -> f64 {
    self.0
  }
}

impl fmt::Display for Setpoint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:.2} kPa", self.0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn accepts_the_closed_range() {
    assert_eq!(Setpoint::new(0.0, 700.0).unwrap().kpa(), 0.0);
    assert_eq!(Setpoint::new(700.0, 700.0).unwrap().kpa(), 700.0);
    assert_eq!(Setpoint::parse(" 380 ", 700.0).unwrap().kpa(), 380.0);
  }

  #[test]
  fn rejects_out_of_range() {
    assert!(matches!(
      Setpoint::new(700.5, 700.0),
      Err(RegulatorError::SetpointOutOfRange { .. })
    ));
    assert!(matches!(
      Setpoint::parse("-1", 700.0),
      Err(RegulatorError::SetpointOutOfRange { .. })
    ));
    assert!(matches!(
      Setpoint::parse("inf", 700.0),
      Err(RegulatorError::SetpointOutOfRange { .. })
    ));
  }

  #[test]
  fn rejects_garbage() {
    for text in ["", "abc", "12kPa", "NaN"] {
      assert!(matches!(
        Setpoint::parse(text, 700.0),
        Err(RegulatorError::UnparsableSetpoint(_))
      ));
    }
  }
}
