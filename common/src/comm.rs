/// Deals with the state exchanged between the regulator core and the operator
/// (control state, valve commands, snapshots and samples).
pub mod regulator;

pub use regulator::*;

/// Memory-mapped access to the BeagleBone GPIO controllers.
#[cfg(feature = "gpio")]
pub mod gpio;
