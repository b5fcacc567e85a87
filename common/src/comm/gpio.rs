use libc::{c_int, c_void, off_t, size_t};
use std::{
  ffi::CString,
  io,
  ptr::{read_volatile, write_volatile},
  sync::Mutex,
};

const GPIO_BASE_REGISTERS: [off_t; 4] =
  [0x44E0_7000, 0x4804_C000, 0x481A_C000, 0x481A_E000];
const GPIO_REGISTER_SIZE: size_t = 0xFFF;

const GPIO_OE_REGISTER: isize = 0x134;
const GPIO_DATAOUT_REGISTER: isize = 0x13C;
const GPIO_DATAIN_REGISTER: isize = 0x138;

/// Number of GPIO controllers on the AM335x.
pub const GPIO_CONTROLLER_COUNT: usize = 4;

/// Number of pins on each controller.
pub const PINS_PER_CONTROLLER: usize = 32;

/// Logic level of a pin.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PinValue {
  /// Driven or read low.
  Low = 0,

  /// Driven or read high.
  High = 1,
}

impl From<bool> for PinValue {
  fn from(high: bool) -> Self {
    if high {
      PinValue::High
    } else {
      PinValue::Low
    }
  }
}

/// Direction of a pin.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PinMode {
  /// Pin drives its line.
  Output,

  /// Pin samples its line.
  Input,
}

/// One memory-mapped GPIO controller.
///
/// Register access goes through a single mutex so read-modify-write cycles
/// on the shared data-out register cannot interleave between pins.
pub struct Gpio {
  fd: c_int,
  base: *mut c_void,
  registers: Mutex<Registers>,
}

struct Registers {
  direction: *mut u32,
  dataout: *mut u32,
  datain: *const u32,
}

unsafe impl Sync for Gpio {}
unsafe impl Send for Gpio {}

/// A single pin of a [`Gpio`] controller.
pub struct Pin {
  gpio: &'static Gpio,
  index: usize,
}

impl Drop for Gpio {
  fn drop(&mut self) {
    unsafe {
      libc::munmap(self.base, GPIO_REGISTER_SIZE);
      libc::close(self.fd);
    };
  }
}

impl Gpio {
  /// Maps the registers of controller `controller_index` through `/dev/mem`.
  pub fn open_controller(controller_index: usize) -> io::Result<Gpio> {
    let Some(&offset) = GPIO_BASE_REGISTERS.get(controller_index) else {
      return Err(io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("no GPIO controller {controller_index}"),
      ));
    };

    let path = CString::new("/dev/mem")?;
    let fd = unsafe { libc::open(path.as_ptr(), libc::O_RDWR | libc::O_SYNC) };

    if fd < 0 {
      return Err(io::Error::last_os_error());
    }

    // the returned address is virtual; the kernel routes accesses to the
    // physical register block at `offset`
    let base = unsafe {
      libc::mmap(
        std::ptr::null_mut(),
        GPIO_REGISTER_SIZE,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_SHARED,
        fd,
        offset,
      )
    };

    if base == libc::MAP_FAILED || base.is_null() {
      let error = io::Error::last_os_error();
      unsafe { libc::close(fd) };
      return Err(error);
    }

    let registers = unsafe {
      Registers {
        direction: base.offset(GPIO_OE_REGISTER) as *mut u32,
        dataout: base.offset(GPIO_DATAOUT_REGISTER) as *mut u32,
        datain: base.offset(GPIO_DATAIN_REGISTER) as *const u32,
      }
    };

    Ok(Gpio {
      fd,
      base,
      registers: Mutex::new(registers),
    })
  }

  /// Hands out pin `index` of this controller.
  pub fn get_pin(&'static self, index: usize) -> io::Result<Pin> {
    if index >= PINS_PER_CONTROLLER {
      return Err(io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("no GPIO pin {index}"),
      ));
    }

    Ok(Pin { gpio: self, index })
  }

  fn registers(&self) -> std::sync::MutexGuard<'_, Registers> {
    self
      .registers
      .lock()
      .unwrap_or_else(std::sync::PoisonError::into_inner)
  }
}

impl Pin {
  /// Sets the direction of the pin.
  pub fn mode(&mut self, mode: PinMode) {
    let registers = self.gpio.registers();
    let mut direction_bits = unsafe { read_volatile(registers.direction) };

    // output enable is active low
    direction_bits = match mode {
      PinMode::Output => direction_bits & !(1 << self.index),
      PinMode::Input => direction_bits | (1 << self.index),
    };

    unsafe { write_volatile(registers.direction, direction_bits) };
  }

  /// Drives the pin to `value`.
  pub fn digital_write(&mut self, value: PinValue) {
    let registers = self.gpio.registers();
    let mut dataout_bits = unsafe { read_volatile(registers.dataout) };

    dataout_bits = match value {
      PinValue::Low => dataout_bits & !(1 << self.index),
      PinValue::High => dataout_bits | (1 << self.index),
    };

    unsafe { write_volatile(registers.dataout, dataout_bits) };
  }

  /// Samples the level on the pin.
  pub fn digital_read(&self) -> PinValue {
    let registers = self.gpio.registers();
    let datain_bits = unsafe { read_volatile(registers.datain) };

    if datain_bits & (1 << self.index) != 0 {
      PinValue::High
    } else {
      PinValue::Low
    }
  }
}
