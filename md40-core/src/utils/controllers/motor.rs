//! One motor channel of the MD40.
//!
//! Positions and offsets are accumulated degrees (360 = one revolution), speed
//! is signed RPM and PWM duty is signed in `-1023..=1023`. Range limits are
//! enforced by the firmware, not here.

use core::fmt;

use embedded_hal::i2c::I2c;
use serde::{Deserialize, Serialize};

use super::{
    transport::{Md40Error, PollPolicy, Transport},
    MotorCommand, Report,
};
use crate::utils::protocol::{
    codec,
    command::{Command, PhaseRelation, PidGain},
    registers::{self, Field, MOTOR_COUNT},
};

/// Runtime state reported by a channel.
#[repr(u8)]
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum State {
    Idle = 0,
    RunningPwmDuty = 1,
    RunningSpeed = 2,
    RunningToPosition = 3,
    ReachedPosition = 4,
}

impl TryFrom<u8> for State {
    type Error = u8;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(State::Idle),
            1 => Ok(State::RunningPwmDuty),
            2 => Ok(State::RunningSpeed),
            3 => Ok(State::RunningToPosition),
            4 => Ok(State::ReachedPosition),
            other => Err(other),
        }
    }
}

/// Handle to a single channel. Owns its own view of the bus.
pub struct Motor<B> {
    transport: Transport<B>,
    index: u8,
}

impl<B, E> Motor<B>
where
    B: I2c<Error = E>,
    E: fmt::Debug,
{
    /// Create the handle for channel `index` of the device at `address`.
    ///
    /// # Panics
    ///
    /// If `index` is not below [`MOTOR_COUNT`].
    pub fn new(
        bus: B,
        address: u8,
        index: u8,
        poll: PollPolicy,
    ) -> Self {
        assert!(
            (index as usize) < MOTOR_COUNT,
            "motor index {} out of range",
            index
        );
        Motor {
            transport: Transport::new(bus, address, poll),
            index,
        }
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn set_poll_policy(
        &mut self,
        poll: PollPolicy,
    ) {
        self.transport.set_poll_policy(poll);
    }

    /// Give the bus back.
    pub fn release(self) -> B {
        self.transport.release()
    }

    fn send(
        &mut self,
        command: Command,
    ) -> Result<(), Md40Error<E>> {
        self.transport.send_command(self.index, &command)
    }

    fn telemetry<const N: usize>(
        &mut self,
        field: Field,
    ) -> Result<[u8; N], Md40Error<E>> {
        let bytes = self
            .transport
            .read_telemetry::<N>(registers::address(field, self.index))?;
        tracing::debug!(index = self.index, ?field, ?bytes, "MD40 telemetry");
        Ok(bytes)
    }

    // Configuration

    /// Return the channel to its power-on state. Required once before use.
    pub fn reset(&mut self) -> Result<(), Md40Error<E>> {
        self.send(Command::reset())
    }

    /// Drive a geared motor with a quadrature encoder.
    pub fn set_encoder_mode(
        &mut self,
        ppr: u16,
        reduction_ratio: u16,
        phase_relation: PhaseRelation,
    ) -> Result<(), Md40Error<E>> {
        self.send(Command::setup_encoder(ppr, reduction_ratio, phase_relation))
    }

    /// Drive a plain DC motor without feedback.
    pub fn set_dc_mode(&mut self) -> Result<(), Md40Error<E>> {
        self.send(Command::setup_dc())
    }

    // PID gains

    /// Read a gain. Resolution is 0.01.
    pub fn gain(
        &mut self,
        gain: PidGain,
    ) -> Result<f32, Md40Error<E>> {
        let raw = self
            .transport
            .read_register::<2>(registers::address(gain.field(), self.index))?;
        Ok(codec::gain_from_wire(codec::decode_i16(raw)))
    }

    /// Write a gain, truncated to 0.01.
    pub fn set_gain(
        &mut self,
        gain: PidGain,
        value: f32,
    ) -> Result<(), Md40Error<E>> {
        self.send(Command::set_gain(gain, value))
    }

    pub fn speed_pid_p(&mut self) -> Result<f32, Md40Error<E>> {
        self.gain(PidGain::SpeedP)
    }

    pub fn set_speed_pid_p(
        &mut self,
        value: f32,
    ) -> Result<(), Md40Error<E>> {
        self.set_gain(PidGain::SpeedP, value)
    }

    pub fn speed_pid_i(&mut self) -> Result<f32, Md40Error<E>> {
        self.gain(PidGain::SpeedI)
    }

    pub fn set_speed_pid_i(
        &mut self,
        value: f32,
    ) -> Result<(), Md40Error<E>> {
        self.set_gain(PidGain::SpeedI, value)
    }

    pub fn speed_pid_d(&mut self) -> Result<f32, Md40Error<E>> {
        self.gain(PidGain::SpeedD)
    }

    pub fn set_speed_pid_d(
        &mut self,
        value: f32,
    ) -> Result<(), Md40Error<E>> {
        self.set_gain(PidGain::SpeedD, value)
    }

    pub fn position_pid_p(&mut self) -> Result<f32, Md40Error<E>> {
        self.gain(PidGain::PositionP)
    }

    pub fn set_position_pid_p(
        &mut self,
        value: f32,
    ) -> Result<(), Md40Error<E>> {
        self.set_gain(PidGain::PositionP, value)
    }

    pub fn position_pid_i(&mut self) -> Result<f32, Md40Error<E>> {
        self.gain(PidGain::PositionI)
    }

    pub fn set_position_pid_i(
        &mut self,
        value: f32,
    ) -> Result<(), Md40Error<E>> {
        self.set_gain(PidGain::PositionI, value)
    }

    pub fn position_pid_d(&mut self) -> Result<f32, Md40Error<E>> {
        self.gain(PidGain::PositionD)
    }

    pub fn set_position_pid_d(
        &mut self,
        value: f32,
    ) -> Result<(), Md40Error<E>> {
        self.set_gain(PidGain::PositionD, value)
    }

    // Motion

    /// Overwrite the accumulated position without moving.
    pub fn set_position(
        &mut self,
        position: i32,
    ) -> Result<(), Md40Error<E>> {
        self.send(Command::set_position(position))
    }

    /// Overwrite the encoder pulse counter.
    pub fn set_pulse_count(
        &mut self,
        count: i32,
    ) -> Result<(), Md40Error<E>> {
        self.send(Command::set_pulse_count(count))
    }

    pub fn stop(&mut self) -> Result<(), Md40Error<E>> {
        self.send(Command::stop())
    }

    /// Hold a closed-loop speed in RPM. Negative turns backwards.
    pub fn run_speed(
        &mut self,
        rpm: i32,
    ) -> Result<(), Md40Error<E>> {
        self.send(Command::run_speed(rpm))
    }

    /// Open-loop drive at a raw duty cycle.
    pub fn run_pwm_duty(
        &mut self,
        duty: i16,
    ) -> Result<(), Md40Error<E>> {
        self.send(Command::run_pwm_duty(duty))
    }

    /// Move to an absolute position at `speed` RPM.
    pub fn move_to(
        &mut self,
        position: i32,
        speed: i32,
    ) -> Result<(), Md40Error<E>> {
        self.send(Command::move_to(position, speed))
    }

    /// Move by `offset` relative to the current position at `speed` RPM.
    pub fn move_by(
        &mut self,
        offset: i32,
        speed: i32,
    ) -> Result<(), Md40Error<E>> {
        self.send(Command::move_by(offset, speed))
    }

    // Telemetry

    pub fn state(&mut self) -> Result<State, Md40Error<E>> {
        let [raw] = self.telemetry::<1>(Field::State)?;
        State::try_from(raw).map_err(|raw| {
            tracing::warn!(index = self.index, raw, "MD40 reported unknown state");
            Md40Error::InvalidState(raw)
        })
    }

    /// Current speed in RPM.
    pub fn speed(&mut self) -> Result<i32, Md40Error<E>> {
        self.telemetry::<4>(Field::Speed).map(codec::decode_i32)
    }

    /// Accumulated position in degrees.
    pub fn position(&mut self) -> Result<i32, Md40Error<E>> {
        self.telemetry::<4>(Field::Position).map(codec::decode_i32)
    }

    pub fn pulse_count(&mut self) -> Result<i32, Md40Error<E>> {
        self.telemetry::<4>(Field::PulseCount).map(codec::decode_i32)
    }

    pub fn pwm_duty(&mut self) -> Result<i16, Md40Error<E>> {
        self.telemetry::<2>(Field::PwmDuty).map(codec::decode_i16)
    }

    /// Execute a `MotorCommand` on this channel.
    ///
    /// Reads return `Some(report)`, everything else returns `None`.
    pub fn execute(
        &mut self,
        command: MotorCommand,
    ) -> Result<Option<Report>, Md40Error<E>> {
        match command {
            MotorCommand::Reset => self.reset().map(|_| None),
            MotorCommand::EncoderMode { ppr, ratio, phase } => {
                self.set_encoder_mode(ppr, ratio, phase).map(|_| None)
            }
            MotorCommand::DcMode => self.set_dc_mode().map(|_| None),
            MotorCommand::SetGain { gain, value } => self.set_gain(gain, value).map(|_| None),
            MotorCommand::Gain { gain } => {
                let value = self.gain(gain)?;
                Ok(Some(Report::Gain { gain, value }))
            }
            MotorCommand::SetPosition { position } => self.set_position(position).map(|_| None),
            MotorCommand::SetPulseCount { count } => self.set_pulse_count(count).map(|_| None),
            MotorCommand::Stop => self.stop().map(|_| None),
            MotorCommand::RunSpeed { rpm } => self.run_speed(rpm).map(|_| None),
            MotorCommand::RunPwmDuty { duty } => self.run_pwm_duty(duty).map(|_| None),
            MotorCommand::MoveTo { position, speed } => self.move_to(position, speed).map(|_| None),
            MotorCommand::MoveBy { offset, speed } => self.move_by(offset, speed).map(|_| None),
            MotorCommand::State => Ok(Some(Report::State { state: self.state()? })),
            MotorCommand::Speed => Ok(Some(Report::Speed { rpm: self.speed()? })),
            MotorCommand::Position => Ok(Some(Report::Position { position: self.position()? })),
            MotorCommand::PulseCount => Ok(Some(Report::PulseCount { count: self.pulse_count()? })),
            MotorCommand::PwmDuty => Ok(Some(Report::PwmDuty { duty: self.pwm_duty()? })),
        }
    }
}
