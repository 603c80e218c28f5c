//! Driver for the MD40 four-channel motor controller on no-std embedded platforms.
//!
//! The controller sits on a shared I2C bus. Every motion or configuration
//! request goes through a staged command slot and a completion flag; telemetry
//! is read straight from per-channel state registers.
#![no_std]

pub mod utils;
