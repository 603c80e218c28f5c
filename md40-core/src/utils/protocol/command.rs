//! Command frames staged in the MD40 command slot.
//!
//! A frame is written in one transaction starting at `COMMAND_TYPE`:
//! `[COMMAND_TYPE, kind, channel, payload...]`.

use serde::{Deserialize, Serialize};

use super::{
    codec,
    registers::{Field, COMMAND_PARAM_LEN, COMMAND_TYPE},
};

/// Command type codes understood by the firmware.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Setup = 1,
    Reset = 2,
    SetSpeedPidP = 3,
    SetSpeedPidI = 4,
    SetSpeedPidD = 5,
    SetPositionPidP = 6,
    SetPositionPidI = 7,
    SetPositionPidD = 8,
    SetPosition = 9,
    SetPulseCount = 10,
    Stop = 11,
    RunPwmDuty = 12,
    RunSpeed = 13,
    MoveTo = 14,
    Move = 15,
}

/// Which quadrature phase leads while the motor turns forward.
#[repr(u8)]
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PhaseRelation {
    #[default]
    APhaseLeads = 0,
    BPhaseLeads = 1,
}

/// The six PID gains held per channel.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PidGain {
    SpeedP,
    SpeedI,
    SpeedD,
    PositionP,
    PositionI,
    PositionD,
}

impl PidGain {
    /// Command that writes this gain.
    pub const fn command_kind(self) -> CommandKind {
        match self {
            PidGain::SpeedP => CommandKind::SetSpeedPidP,
            PidGain::SpeedI => CommandKind::SetSpeedPidI,
            PidGain::SpeedD => CommandKind::SetSpeedPidD,
            PidGain::PositionP => CommandKind::SetPositionPidP,
            PidGain::PositionI => CommandKind::SetPositionPidI,
            PidGain::PositionD => CommandKind::SetPositionPidD,
        }
    }

    /// Register this gain is read back from.
    pub const fn field(self) -> Field {
        match self {
            PidGain::SpeedP => Field::SpeedP,
            PidGain::SpeedI => Field::SpeedI,
            PidGain::SpeedD => Field::SpeedD,
            PidGain::PositionP => Field::PositionP,
            PidGain::PositionI => Field::PositionI,
            PidGain::PositionD => Field::PositionD,
        }
    }
}

/// Length of the longest frame: slot address, kind, channel, full param region.
pub const FRAME_CAPACITY: usize = 3 + COMMAND_PARAM_LEN;

/// A command kind with its encoded parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    kind: CommandKind,
    payload: [u8; COMMAND_PARAM_LEN],
    len: usize,
}

impl Command {
    /// A command with no parameters.
    pub const fn new(kind: CommandKind) -> Self {
        Command {
            kind,
            payload: [0; COMMAND_PARAM_LEN],
            len: 0,
        }
    }

    /// Append raw parameter bytes.
    ///
    /// Panics if the parameters would overflow the command slot; every
    /// constructor below stays well inside it.
    fn with(
        mut self,
        bytes: &[u8],
    ) -> Self {
        let end = self.len + bytes.len();
        assert!(end <= COMMAND_PARAM_LEN, "command parameters overflow slot");
        self.payload[self.len..end].copy_from_slice(bytes);
        self.len = end;
        self
    }

    pub const fn reset() -> Self {
        Command::new(CommandKind::Reset)
    }

    pub const fn stop() -> Self {
        Command::new(CommandKind::Stop)
    }

    /// Switch to encoder mode: PPR, reduction ratio, then phase relation.
    pub fn setup_encoder(
        ppr: u16,
        reduction_ratio: u16,
        phase_relation: PhaseRelation,
    ) -> Self {
        Command::new(CommandKind::Setup)
            .with(&codec::encode_u16(ppr))
            .with(&codec::encode_u16(reduction_ratio))
            .with(&[phase_relation as u8])
    }

    /// Switch to plain DC mode.
    pub fn setup_dc() -> Self {
        Command::new(CommandKind::Setup).with(&[0, 0, 0])
    }

    pub fn set_gain(
        gain: PidGain,
        value: f32,
    ) -> Self {
        Command::new(gain.command_kind()).with(&codec::encode_i16(codec::gain_to_wire(value)))
    }

    pub fn set_position(position: i32) -> Self {
        Command::new(CommandKind::SetPosition).with(&codec::encode_i32(position))
    }

    pub fn set_pulse_count(count: i32) -> Self {
        Command::new(CommandKind::SetPulseCount).with(&codec::encode_i32(count))
    }

    pub fn run_pwm_duty(duty: i16) -> Self {
        Command::new(CommandKind::RunPwmDuty).with(&codec::encode_i16(duty))
    }

    pub fn run_speed(rpm: i32) -> Self {
        Command::new(CommandKind::RunSpeed).with(&codec::encode_i32(rpm))
    }

    pub fn move_to(
        position: i32,
        speed: i32,
    ) -> Self {
        Command::new(CommandKind::MoveTo)
            .with(&codec::encode_i32(position))
            .with(&codec::encode_i32(speed))
    }

    pub fn move_by(
        offset: i32,
        speed: i32,
    ) -> Self {
        Command::new(CommandKind::Move)
            .with(&codec::encode_i32(offset))
            .with(&codec::encode_i32(speed))
    }

    pub const fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.len]
    }

    /// Lay out the full slot write for the channel at `index` into `buf`.
    pub fn encode_frame<'b>(
        &self,
        index: u8,
        buf: &'b mut [u8; FRAME_CAPACITY],
    ) -> &'b [u8] {
        buf[0] = COMMAND_TYPE;
        buf[1] = self.kind as u8;
        buf[2] = index;
        buf[3..3 + self.len].copy_from_slice(self.payload());
        &buf[..3 + self.len]
    }
}
