//! Transports for the BeagleBone board: an ADC on SPI for pressure and GPIO
//! lines for the valve relays.

use crate::{
  error::{RegulatorError, RegulatorResult},
  transport::{ActuatorTransport, SensorTransport},
};
use common::comm::gpio::{
  Gpio, Pin, PinMode, PinValue, GPIO_CONTROLLER_COUNT, PINS_PER_CONTROLLER,
};
use jeflog::{fail, warn};
use once_cell::sync::OnceCell;
use spidev::{
  spidevioctl::SpidevTransfer, SpiModeFlags, Spidev, SpidevOptions,
};
use std::{collections::HashMap, io};

/// Reads the most recent conversion without a start command.
const RDATA: u8 = 0x12;

static GPIO_CONTROLLERS: OnceCell<Vec<Gpio>> = OnceCell::new();

fn gpio_controllers() -> io::Result<&'static [Gpio]> {
  GPIO_CONTROLLERS
    .get_or_try_init(|| {
      (0..GPIO_CONTROLLER_COUNT).map(Gpio::open_controller).collect()
    })
    .map(Vec::as_slice)
}

fn open_spi(bus: &str) -> io::Result<Spidev> {
  let mut spi = Spidev::open(bus)?;
  let options = SpidevOptions::new()
    .bits_per_word(8)
    .max_speed_hz(10_000_000)
    .lsb_first(false)
    .mode(SpiModeFlags::SPI_MODE_1)
    .build();
  spi.configure(&options)?;
  Ok(spi)
}

/// Pressure transducer behind a 16-bit ADC on a spidev bus.
pub struct SpiPressureSensor {
  bus: String,
  spi: Option<Spidev>,
}

impl SpiPressureSensor {
  /// Opens `bus` (such as `/dev/spidev0.0`).
  pub fn open(bus: &str) -> RegulatorResult<Self> {
    let spi = open_spi(bus)
      .map_err(|error| RegulatorError::Hardware(format!("{bus}: {error}")))?;

    Ok(SpiPressureSensor {
      bus: bus.to_owned(),
      spi: Some(spi),
    })
  }

  fn read_code(spi: &Spidev) -> io::Result<i16> {
    let mut tx_buf = [RDATA, 0x00, 0x00];
    let mut rx_buf = [0x00; 3];

    let mut transfer = SpidevTransfer::read_write(&mut tx_buf, &mut rx_buf);
    spi.transfer(&mut transfer)?;

    Ok(i16::from_be_bytes([rx_buf[1], rx_buf[2]]))
  }
}

impl SensorTransport for SpiPressureSensor {
  fn read_normalized(&mut self) -> Option<f64> {
    if self.spi.is_none() {
      match open_spi(&self.bus) {
        Ok(spi) => self.spi = Some(spi),
        Err(error) => {
          warn!("Could not reopen {}: {error}.", self.bus);
          return None;
        }
      }
    }

    let spi = self.spi.as_ref()?;

    match Self::read_code(spi) {
      Ok(code) => Some(f64::from(code) / f64::from(i16::MAX)),
      Err(error) => {
        fail!("SPI read on {} failed: {error}.", self.bus);
        self.spi = None;
        None
      }
    }
  }

  fn is_available(&self) -> bool {
    self.spi.is_some()
  }

  fn release(&mut self) {
    self.spi = None;
  }
}

/// Valve relays on GPIO pins, addressed by channel number.
pub struct GpioValves {
  pins: HashMap<u32, Pin>,
}

impl GpioValves {
  /// Claims one output pin per channel. Pins are numbered globally, so
  /// channel 9 is pin 9 of controller 0 and channel 42 is pin 10 of
  /// controller 1.
  pub fn open(channels: &[u32]) -> RegulatorResult<Self> {
    let controllers = gpio_controllers()
      .map_err(|error| RegulatorError::Hardware(format!("GPIO: {error}")))?;

    let mut pins = HashMap::new();

    for &channel in channels {
      let index = channel as usize;
      let controller = controllers
        .get(index / PINS_PER_CONTROLLER)
        .ok_or_else(|| {
          RegulatorError::Hardware(format!("no GPIO line for channel {channel}"))
        })?;

      let mut pin = controller
        .get_pin(index % PINS_PER_CONTROLLER)
        .map_err(|error| RegulatorError::Hardware(error.to_string()))?;

      pin.mode(PinMode::Output);
      pin.digital_write(PinValue::Low);
      pins.insert(channel, pin);
    }

    Ok(GpioValves { pins })
  }
}

impl ActuatorTransport for GpioValves {
  fn write_digital(&mut self, channel: u32, high: bool) {
    match self.pins.get_mut(&channel) {
      Some(pin) => pin.digital_write(PinValue::from(high)),
      None => warn!("No GPIO pin claimed for channel {channel}."),
    }
  }

  fn is_open(&self) -> bool {
    !self.pins.is_empty()
  }
}
