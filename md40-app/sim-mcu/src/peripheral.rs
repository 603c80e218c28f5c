//! In-process stand-in for an MD40 board.
//!
//! Holds the 256-byte register file the real firmware exposes and answers
//! I2C transactions against it. The first byte of every write moves the
//! register pointer; only the command slot accepts data. Reads stream out of
//! the register file from the pointer onward.

use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};
use md40_core::utils::protocol::{
    codec,
    command::{CommandKind, PhaseRelation, PidGain},
    registers::{
        self, Field, COMMAND_EXECUTE, COMMAND_INDEX, COMMAND_PARAM, COMMAND_TYPE, DEVICE_ID,
        MOTOR_COUNT, NAME, NAME_LEN, VERSION,
    },
};
use tracing::{debug, warn};

/// Operating mode a channel was last set up with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Dc,
    Encoder {
        ppr: u16,
        ratio: u16,
        phase: PhaseRelation,
    },
}

/// Simulated MD40 register file behind an I2C address.
pub struct SimulatedMd40 {
    address: u8,
    regs: [u8; 256],
    pointer: u8,
    busy_polls: u32,
    busy_left: u32,
    modes: [Mode; MOTOR_COUNT],
}

impl SimulatedMd40 {
    pub fn new(address: u8) -> Self {
        let mut sim = SimulatedMd40 {
            address,
            regs: [0; 256],
            pointer: 0,
            busy_polls: 0,
            busy_left: 0,
            modes: [Mode::Dc; MOTOR_COUNT],
        };
        sim.set_identity(0x28, [1, 0, 0], *b"MD40\0\0\0\0");
        sim
    }

    /// Report the execute flag as busy for `polls` reads after every command.
    pub fn with_busy_polls(
        mut self,
        polls: u32,
    ) -> Self {
        self.busy_polls = polls;
        self
    }

    pub fn set_identity(
        &mut self,
        device_id: u8,
        version: [u8; 3],
        name: [u8; NAME_LEN],
    ) {
        self.regs[DEVICE_ID as usize] = device_id;
        self.regs[VERSION as usize..VERSION as usize + 3].copy_from_slice(&version);
        self.regs[NAME as usize..NAME as usize + NAME_LEN].copy_from_slice(&name);
    }

    pub fn mode(
        &self,
        index: usize,
    ) -> Mode {
        self.modes[index]
    }

    fn field_mut(
        &mut self,
        field: Field,
        index: u8,
    ) -> &mut [u8] {
        let start = registers::address(field, index) as usize;
        &mut self.regs[start..start + field.width()]
    }

    fn field_i32(
        &self,
        field: Field,
        index: u8,
    ) -> i32 {
        let start = registers::address(field, index) as usize;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.regs[start..start + 4]);
        codec::decode_i32(raw)
    }

    fn set_i32(
        &mut self,
        field: Field,
        index: u8,
        value: i32,
    ) {
        self.field_mut(field, index)
            .copy_from_slice(&codec::encode_i32(value));
    }

    fn set_state(
        &mut self,
        index: u8,
        state: u8,
    ) {
        self.field_mut(Field::State, index)[0] = state;
    }

    fn param_i32(
        &self,
        offset: usize,
    ) -> i32 {
        let start = COMMAND_PARAM as usize + offset;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.regs[start..start + 4]);
        codec::decode_i32(raw)
    }

    fn param_2(
        &self,
        offset: usize,
    ) -> [u8; 2] {
        let start = COMMAND_PARAM as usize + offset;
        [self.regs[start], self.regs[start + 1]]
    }

    fn kind(raw: u8) -> Option<CommandKind> {
        use CommandKind::*;
        [
            Setup,
            Reset,
            SetSpeedPidP,
            SetSpeedPidI,
            SetSpeedPidD,
            SetPositionPidP,
            SetPositionPidI,
            SetPositionPidD,
            SetPosition,
            SetPulseCount,
            Stop,
            RunPwmDuty,
            RunSpeed,
            MoveTo,
            Move,
        ]
        .into_iter()
        .find(|k| *k as u8 == raw)
    }

    fn gain_for(kind: CommandKind) -> Option<PidGain> {
        match kind {
            CommandKind::SetSpeedPidP => Some(PidGain::SpeedP),
            CommandKind::SetSpeedPidI => Some(PidGain::SpeedI),
            CommandKind::SetSpeedPidD => Some(PidGain::SpeedD),
            CommandKind::SetPositionPidP => Some(PidGain::PositionP),
            CommandKind::SetPositionPidI => Some(PidGain::PositionI),
            CommandKind::SetPositionPidD => Some(PidGain::PositionD),
            _ => None,
        }
    }

    /// Pulses seen for an absolute position, given the channel's gearing.
    fn pulses_at(
        &self,
        index: u8,
        position: i32,
    ) -> i32 {
        match self.modes[index as usize] {
            Mode::Dc => 0,
            Mode::Encoder { ppr, ratio, .. } => {
                (position as i64 * ppr as i64 * ratio as i64 / 360) as i32
            }
        }
    }

    /// Run the command staged in the slot.
    fn execute(&mut self) {
        let raw_kind = self.regs[COMMAND_TYPE as usize];
        let index = self.regs[COMMAND_INDEX as usize];
        if index as usize >= MOTOR_COUNT {
            warn!(index, "simulated MD40: command for missing channel ignored");
            return;
        }
        let Some(kind) = Self::kind(raw_kind) else {
            warn!(raw_kind, "simulated MD40: unknown command ignored");
            return;
        };
        debug!(?kind, index, "simulated MD40 executing");

        match kind {
            CommandKind::Setup => {
                let ppr = u16::from_le_bytes(self.param_2(0));
                self.modes[index as usize] = if ppr == 0 {
                    Mode::Dc
                } else {
                    Mode::Encoder {
                        ppr,
                        ratio: u16::from_le_bytes(self.param_2(2)),
                        phase: if self.regs[COMMAND_PARAM as usize + 4] == 1 {
                            PhaseRelation::BPhaseLeads
                        } else {
                            PhaseRelation::APhaseLeads
                        },
                    }
                };
            }
            CommandKind::Reset => {
                self.modes[index as usize] = Mode::Dc;
                self.set_state(index, 0);
                for field in [Field::Speed, Field::Position, Field::PulseCount] {
                    self.set_i32(field, index, 0);
                }
                self.field_mut(Field::PwmDuty, index).fill(0);
            }
            CommandKind::SetPosition => {
                let position = self.param_i32(0);
                self.set_i32(Field::Position, index, position);
            }
            CommandKind::SetPulseCount => {
                let count = self.param_i32(0);
                self.set_i32(Field::PulseCount, index, count);
            }
            CommandKind::Stop => {
                self.set_state(index, 0);
                self.set_i32(Field::Speed, index, 0);
                self.field_mut(Field::PwmDuty, index).fill(0);
            }
            CommandKind::RunPwmDuty => {
                let duty = self.param_2(0);
                self.set_state(index, 1);
                self.field_mut(Field::PwmDuty, index).copy_from_slice(&duty);
            }
            CommandKind::RunSpeed => {
                let rpm = self.param_i32(0);
                self.set_state(index, 2);
                self.set_i32(Field::Speed, index, rpm);
            }
            CommandKind::MoveTo | CommandKind::Move => {
                let target = if kind == CommandKind::MoveTo {
                    self.param_i32(0)
                } else {
                    self.field_i32(Field::Position, index)
                        .wrapping_add(self.param_i32(0))
                };
                // Moves complete instantly in the simulation.
                self.set_state(index, 4);
                self.set_i32(Field::Speed, index, 0);
                self.set_i32(Field::Position, index, target);
                let pulses = self.pulses_at(index, target);
                self.set_i32(Field::PulseCount, index, pulses);
            }
            gain_kind => {
                if let Some(gain) = Self::gain_for(gain_kind) {
                    let raw = self.param_2(0);
                    self.field_mut(gain.field(), index).copy_from_slice(&raw);
                }
            }
        }
    }

    fn write_bytes(
        &mut self,
        bytes: &[u8],
    ) {
        let Some((&register, data)) = bytes.split_first() else {
            return;
        };
        self.pointer = register;
        for &byte in data {
            match self.pointer {
                COMMAND_EXECUTE => {
                    if byte == 1 {
                        self.execute();
                        self.busy_left = self.busy_polls;
                    }
                }
                r if (COMMAND_TYPE..COMMAND_EXECUTE).contains(&r) => {
                    self.regs[r as usize] = byte;
                }
                // Telemetry and metadata are read-only.
                _ => {}
            }
            self.pointer = self.pointer.wrapping_add(1);
        }
    }

    fn read_bytes(
        &mut self,
        buf: &mut [u8],
    ) {
        for out in buf.iter_mut() {
            *out = if self.pointer == COMMAND_EXECUTE {
                if self.busy_left > 0 {
                    self.busy_left -= 1;
                    1
                } else {
                    0
                }
            } else {
                self.regs[self.pointer as usize]
            };
            self.pointer = self.pointer.wrapping_add(1);
        }
    }
}

impl ErrorType for SimulatedMd40 {
    type Error = ErrorKind;
}

impl I2c for SimulatedMd40 {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if address != self.address {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }
        for op in operations {
            match op {
                Operation::Write(bytes) => self.write_bytes(bytes),
                Operation::Read(buf) => self.read_bytes(buf),
            }
        }
        Ok(())
    }
}
