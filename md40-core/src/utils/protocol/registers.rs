//! Register map of the MD40 peripheral.
//!
//! Device-scope registers live at fixed offsets. Per-channel registers repeat
//! every [`CHANNEL_STRIDE`] bytes, so a channel's copy of a field sits at
//! `field.base() + index * CHANNEL_STRIDE`.

/// Default I2C address of the controller.
pub const DEFAULT_ADDRESS: u8 = 0x16;
/// Number of motor channels on the board.
pub const MOTOR_COUNT: usize = 4;
/// Distance between two consecutive channels' state blocks.
pub const CHANNEL_STRIDE: u8 = 0x20;

pub const DEVICE_ID: u8 = 0x00;
/// First of three version bytes (major, minor, patch).
pub const VERSION: u8 = 0x01;
pub const NAME: u8 = 0x04;
/// The name field is always read in full, no terminator is expected.
pub const NAME_LEN: usize = 8;

/// Command slot: type byte, then channel index, then parameters.
pub const COMMAND_TYPE: u8 = 0x11;
pub const COMMAND_INDEX: u8 = 0x12;
pub const COMMAND_PARAM: u8 = 0x13;
/// Execute trigger on write, queue-empty flag on read (0 = idle).
pub const COMMAND_EXECUTE: u8 = 0x23;
/// Bytes available for parameters between `COMMAND_PARAM` and `COMMAND_EXECUTE`.
pub const COMMAND_PARAM_LEN: usize = (COMMAND_EXECUTE - COMMAND_PARAM) as usize;

/// Per-channel register fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    State,
    SpeedP,
    SpeedI,
    SpeedD,
    PositionP,
    PositionI,
    PositionD,
    Speed,
    Position,
    PulseCount,
    PwmDuty,
}

impl Field {
    pub const ALL: [Field; 11] = [
        Field::State,
        Field::SpeedP,
        Field::SpeedI,
        Field::SpeedD,
        Field::PositionP,
        Field::PositionI,
        Field::PositionD,
        Field::Speed,
        Field::Position,
        Field::PulseCount,
        Field::PwmDuty,
    ];

    /// Address of the field for channel 0.
    pub const fn base(self) -> u8 {
        match self {
            Field::State => 0x24,
            Field::SpeedP => 0x26,
            Field::SpeedI => 0x28,
            Field::SpeedD => 0x2A,
            Field::PositionP => 0x2C,
            Field::PositionI => 0x2E,
            Field::PositionD => 0x30,
            Field::Speed => 0x34,
            Field::Position => 0x38,
            Field::PulseCount => 0x3C,
            Field::PwmDuty => 0x40,
        }
    }

    /// Width of the field on the wire, in bytes.
    pub const fn width(self) -> usize {
        match self {
            Field::State => 1,
            Field::SpeedP
            | Field::SpeedI
            | Field::SpeedD
            | Field::PositionP
            | Field::PositionI
            | Field::PositionD
            | Field::PwmDuty => 2,
            Field::Speed | Field::Position | Field::PulseCount => 4,
        }
    }
}

/// Bus address of `field` for the channel at `index`.
///
/// `index` must be below [`MOTOR_COUNT`]; callers check this at the API
/// boundary.
pub const fn address(
    field: Field,
    index: u8,
) -> u8 {
    debug_assert!((index as usize) < MOTOR_COUNT);
    field.base() + index * CHANNEL_STRIDE
}
