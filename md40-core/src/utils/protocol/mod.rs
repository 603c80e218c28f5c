//! Wire-level knowledge of the MD40 peripheral.
//!
//! Nothing in here touches the bus: register addresses, little-endian
//! encoding of typed values and command frames are pure data.

pub mod codec;
pub mod command;
pub mod registers;

pub use command::{Command, CommandKind, PhaseRelation, PidGain};
pub use registers::Field;
