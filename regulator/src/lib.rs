#![warn(clippy::correctness)]

//! Two-position pressure regulator: periodic acquisition through a moving
//! average, a hysteresis controller driving an inlet and an outlet valve, and
//! a supervisor that starts, stops and interlocks the two.

/// Fixed-capacity moving-average buffer.
pub mod buffer;

/// Regulator tunables and where they come from.
pub mod config;

/// The control law and the control task.
pub mod controller;

/// Operator console commands.
pub mod console;

/// Vessel model used when no hardware is attached.
pub mod emulator;

/// Errors handed back to callers.
pub mod error;

/// SPI pressure sensor and GPIO valve transports.
#[cfg(feature = "hardware")]
pub mod hardware;

/// Recording transports for tests.
#[cfg(any(test, feature = "test_mode"))]
pub mod mocks;

/// The acquisition task and sensor scaling.
pub mod reader;

/// In-memory session log and its CSV persistence.
pub mod sample_log;

/// Validated target pressure.
pub mod setpoint;

/// State shared between the tasks and the operator.
pub mod state;

/// Lifecycle owner of the regulator.
pub mod supervisor;

/// Traits the regulator uses to reach hardware and storage.
pub mod transport;

/// Interlocked valve driver.
pub mod valve;

pub use config::RegulatorConfig;
pub use error::{RegulatorError, RegulatorResult};
pub use supervisor::ControlSupervisor;
