#![warn(missing_docs)]

//! Common consists of the types shared between the pressure regulator core
//! and anything that presents or drives it. The status snapshot, valve
//! commands and logged samples all live here, alongside the memory-mapped
//! GPIO access used by the valve hardware.

/// All structs and definitions related to communication between the
/// regulator and its operator-facing layers.
pub mod comm;

/// Trait providing a method to create a pretty, terminal-friendly
/// representation of the underlying.
pub trait ToPrettyString {
  /// Provides a representation of the underlying which is preferable when
  /// displaying to the console but not as a raw string.
  ///
  /// ANSI codes such as color codes, for example, can be used in a "pretty
  /// string" but would be atypical in a `fmt::Display` implementation.
  fn to_pretty_string(&self) -> String;
}
