//! Controllers for the MD40 motor board.
//!
//! - `transport`: bus transactions and the command handshake
//! - `motor`: one channel's configuration, motion and telemetry
//! - `md40`: the device facade owning all four channels

pub mod md40;
pub mod motor;
pub mod transport;

use serde::{Deserialize, Serialize};

use crate::utils::protocol::command::{PhaseRelation, PidGain};

pub use md40::{DeviceName, FirmwareVersion, Md40, Md40Config};
pub use motor::{Motor, State};
pub use transport::{Md40Error, PollPolicy, Transport};

/// Per-channel command variants.
///
/// Serialized as JSON with tag `"mc"`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(tag = "mc", rename_all = "snake_case")]
pub enum MotorCommand {
    // Configuration
    Reset,
    /// Encoder mode: pulses per revolution, reduction ratio, phase relation.
    EncoderMode {
        ppr: u16,
        ratio: u16,
        #[serde(default)]
        phase: PhaseRelation,
    },
    DcMode,
    SetGain { gain: PidGain, value: f32 },
    Gain { gain: PidGain },

    // Motion
    SetPosition { position: i32 },
    SetPulseCount { count: i32 },
    Stop,
    RunSpeed { rpm: i32 },
    RunPwmDuty { duty: i16 },
    MoveTo { position: i32, speed: i32 },
    MoveBy { offset: i32, speed: i32 },

    // Telemetry
    State,
    Speed,
    Position,
    PulseCount,
    PwmDuty,
}

/// Device-level command variants.
///
/// Serialized as JSON with tag `"dc"`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(tag = "dc", rename_all = "snake_case")]
pub enum Md40Command {
    /// Reset every channel in order.
    Init,
    FirmwareVersion,
    DeviceId,
    Name,
    /// Forward a command to the channel at `index`.
    Motor { index: u8, command: MotorCommand },
}

/// Result of a read command.
#[derive(Debug, Serialize, Clone, Copy, PartialEq)]
#[serde(tag = "r", rename_all = "snake_case")]
pub enum Report {
    State { state: State },
    Speed { rpm: i32 },
    Position { position: i32 },
    PulseCount { count: i32 },
    PwmDuty { duty: i16 },
    Gain { gain: PidGain, value: f32 },
    FirmwareVersion { version: FirmwareVersion },
    DeviceId { id: u8 },
    Name { name: DeviceName },
}
