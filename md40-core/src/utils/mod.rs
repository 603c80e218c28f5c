//! Utility re-exports for the MD40 driver.
//!
//! - `protocol`: register map, wire codec and command frames
//! - `controllers`: bus transport, motor channels and the device facade

pub mod controllers;
pub mod protocol;

pub use controllers::{Md40, Md40Command, Md40Config, Md40Error, Motor, MotorCommand, PollPolicy, Report};
pub use protocol::registers::{DEFAULT_ADDRESS, MOTOR_COUNT};
