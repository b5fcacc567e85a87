//! A crude vessel model for running the regulator without hardware.

use crate::{
  state::lock,
  transport::{ActuatorTransport, SensorTransport},
};
use jeflog::warn;
use rand::Rng;
use std::{
  sync::{Arc, Mutex},
  time::Instant,
};

/// Fraction of full scale gained per second with the inlet open.
const FILL_RATE: f64 = 0.08;

/// Fraction of full scale lost per second with the outlet open.
const VENT_RATE: f64 = 0.10;

/// Proportional leak, per second.
const LEAK_RATE: f64 = 0.005;

/// Peak sensor noise, as a fraction of full scale.
const NOISE: f64 = 0.003;

#[derive(Debug)]
struct Vessel {
  level: f64,
  inlet_open: bool,
  outlet_open: bool,
  last_update: Instant,
}

impl Vessel {
  fn step(&mut self, dt: f64) {
    let mut rate = -LEAK_RATE * self.level;

    if self.inlet_open {
      rate += FILL_RATE;
    }

    if self.outlet_open {
      rate -= VENT_RATE;
    }

    self.level = (self.level + rate * dt).clamp(0.0, 1.0);
  }

  fn advance(&mut self) {
    let now = Instant::now();
    let dt = now.duration_since(self.last_update).as_secs_f64();

    self.last_update = now;
    self.step(dt);
  }
}

/// Shared plant. Hand [`EmulatedVessel::sensor`] and
/// [`EmulatedVessel::valves`] to the supervisor and they act on the same
/// model.
#[derive(Clone, Debug)]
pub struct EmulatedVessel {
  vessel: Arc<Mutex<Vessel>>,
  inlet_channel: u32,
  outlet_channel: u32,
}

impl EmulatedVessel {
  /// A vessel at `level` of full scale with both valves closed.
  pub fn new(level: f64, inlet_channel: u32, outlet_channel: u32) -> Self {
    EmulatedVessel {
      vessel: Arc::new(Mutex::new(Vessel {
        level: level.clamp(0.0, 1.0),
        inlet_open: false,
        outlet_open: false,
        last_update: Instant::now(),
      })),
      inlet_channel,
      outlet_channel,
    }
  }

  pub fn sensor(&self) -> EmulatedSensor {
    EmulatedSensor {
      vessel: self.clone(),
    }
  }

  pub fn valves(&self) -> EmulatedValves {
    EmulatedValves {
      vessel: self.clone(),
    }
  }

  /// True level, without sensor noise.
  pub fn level(&self) -> f64 {
    let mut vessel = lock(&self.vessel);
    vessel.advance();
    vessel.level
  }
}

pub struct EmulatedSensor {
  vessel: EmulatedVessel,
}

impl SensorTransport for EmulatedSensor {
  fn read_normalized(&mut self) -> Option<f64> {
    let noise = rand::thread_rng().gen_range(-NOISE..=NOISE);
    Some(self.vessel.level() + noise)
  }

  fn is_available(&self) -> bool {
    true
  }
}

pub struct EmulatedValves {
  vessel: EmulatedVessel,
}

impl ActuatorTransport for EmulatedValves {
  fn write_digital(&mut self, channel: u32, high: bool) {
    let mut vessel = lock(&self.vessel.vessel);
    vessel.advance();

    if channel == self.vessel.inlet_channel {
      vessel.inlet_open = high;
    } else if channel == self.vessel.outlet_channel {
      vessel.outlet_open = high;
    } else {
      warn!("Emulated vessel has nothing on channel {channel}.");
    }
  }

  fn is_open(&self) -> bool {
    true
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn vessel(level: f64) -> Vessel {
    Vessel {
      level,
      inlet_open: false,
      outlet_open: false,
      last_update: Instant::now(),
    }
  }

  #[test]
  fn inlet_fills_and_outlet_vents() {
    let mut filling = vessel(0.5);
    filling.inlet_open = true;
    filling.step(1.0);
    assert!(filling.level > 0.5);

    let mut venting = vessel(0.5);
    venting.outlet_open = true;
    venting.step(1.0);
    assert!(venting.level < 0.5);
  }

  #[test]
  fn closed_vessel_leaks_slowly() {
    let mut closed = vessel(0.5);
    closed.step(1.0);
    assert!(closed.level < 0.5 && closed.level > 0.49);
  }

  #[test]
  fn level_stays_in_unit_range() {
    let mut full = vessel(0.99);
    full.inlet_open = true;
    full.step(100.0);
    assert_eq!(full.level, 1.0);

    let mut empty = vessel(0.01);
    empty.outlet_open = true;
    empty.step(100.0);
    assert_eq!(empty.level, 0.0);
  }

  #[test]
  fn valve_writes_reach_the_model() {
    let plant = EmulatedVessel::new(0.2, 9, 10);
    let mut valves = plant.valves();

    valves.write_digital(9, true);
    assert!(lock(&plant.vessel).inlet_open);

    valves.write_digital(9, false);
    valves.write_digital(10, true);
    let vessel = lock(&plant.vessel);
    assert!(!vessel.inlet_open && vessel.outlet_open);
  }

  #[test]
  fn sensor_reads_near_the_true_level() {
    let plant = EmulatedVessel::new(0.4, 9, 10);
    let mut sensor = plant.sensor();

    let reading = sensor.read_normalized().unwrap();
    assert!((reading - 0.4).abs() < 0.01);
  }
}
