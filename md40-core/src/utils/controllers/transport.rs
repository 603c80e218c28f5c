//! Bus transactions and the command handshake of the MD40.
//!
//! A command runs in four steps, each one aborting the call on the first bus
//! fault:
//!
//! 1. poll the execute flag until the command queue is empty,
//! 2. write the frame into the command slot,
//! 3. write `1` to the execute flag,
//! 4. poll the flag again until the peripheral has consumed the command.
//!
//! Polling has no bound unless a [`PollPolicy`] says otherwise.

use core::fmt;

use embedded_hal::i2c::I2c;
use serde::{Deserialize, Serialize};

use crate::utils::protocol::{
    command::{Command, FRAME_CAPACITY},
    registers::COMMAND_EXECUTE,
};

/// Errors that can occur while talking to the MD40.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Md40Error<E> {
    /// A bus transaction failed. Nothing after it was sent.
    Bus(E),
    /// The execute flag stayed set for every poll the policy allowed.
    CommandTimeout { polls: u32 },
    /// The state register held a value outside the known states.
    InvalidState(u8),
    /// A channel index at or past the channel count.
    InvalidChannel(u8),
}

impl<E: fmt::Debug> fmt::Display for Md40Error<E> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Md40Error::Bus(e) => write!(f, "i2c transaction failed: {:?}", e),
            Md40Error::CommandTimeout { polls } => {
                write!(f, "command queue still busy after {} polls", polls)
            }
            Md40Error::InvalidState(raw) => write!(f, "unknown motor state 0x{:02X}", raw),
            Md40Error::InvalidChannel(index) => write!(f, "no motor channel {}", index),
        }
    }
}

impl<E: fmt::Debug> core::error::Error for Md40Error<E> {}

/// How long to keep polling the execute flag.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollPolicy {
    /// Busy reads tolerated before giving up. `None` waits forever.
    pub max_polls: Option<u32>,
}

impl PollPolicy {
    pub const fn unbounded() -> Self {
        PollPolicy { max_polls: None }
    }

    pub const fn bounded(max_polls: u32) -> Self {
        PollPolicy {
            max_polls: Some(max_polls),
        }
    }
}

/// Transaction layer for one MD40 at a fixed bus address.
pub struct Transport<B> {
    bus: B,
    address: u8,
    poll: PollPolicy,
}

impl<B, E> Transport<B>
where
    B: I2c<Error = E>,
    E: fmt::Debug,
{
    pub fn new(
        bus: B,
        address: u8,
        poll: PollPolicy,
    ) -> Self {
        Transport { bus, address, poll }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn poll_policy(&self) -> PollPolicy {
        self.poll
    }

    pub fn set_poll_policy(
        &mut self,
        poll: PollPolicy,
    ) {
        self.poll = poll;
    }

    /// Give the bus back.
    pub fn release(self) -> B {
        self.bus
    }

    fn write(
        &mut self,
        bytes: &[u8],
    ) -> Result<(), Md40Error<E>> {
        self.bus.write(self.address, bytes).map_err(Md40Error::Bus)
    }

    fn read<const N: usize>(&mut self) -> Result<[u8; N], Md40Error<E>> {
        let mut buf = [0u8; N];
        self.bus.read(self.address, &mut buf).map_err(Md40Error::Bus)?;
        Ok(buf)
    }

    /// Poll the execute flag until it reads zero.
    ///
    /// Returns the number of flag reads it took, the final zero included.
    pub fn wait_command_emptied(&mut self) -> Result<u32, Md40Error<E>> {
        let mut polls = 0u32;
        loop {
            self.write(&[COMMAND_EXECUTE])?;
            let [flag] = self.read::<1>()?;
            polls = polls.saturating_add(1);
            if flag == 0 {
                return Ok(polls);
            }
            if let Some(max) = self.poll.max_polls {
                if polls >= max {
                    tracing::warn!(polls, "MD40 command queue never emptied");
                    return Err(Md40Error::CommandTimeout { polls });
                }
            }
        }
    }

    fn write_command(
        &mut self,
        index: u8,
        command: &Command,
    ) -> Result<(), Md40Error<E>> {
        let mut buf = [0u8; FRAME_CAPACITY];
        let frame = command.encode_frame(index, &mut buf);
        self.bus.write(self.address, frame).map_err(Md40Error::Bus)
    }

    fn execute_command(&mut self) -> Result<(), Md40Error<E>> {
        self.write(&[COMMAND_EXECUTE, 0x01])?;
        self.wait_command_emptied()?;
        Ok(())
    }

    /// Run `command` against the channel at `index` and wait for it to finish.
    pub fn send_command(
        &mut self,
        index: u8,
        command: &Command,
    ) -> Result<(), Md40Error<E>> {
        tracing::debug!(index, kind = ?command.kind(), "MD40 command");
        self.wait_command_emptied()?;
        self.write_command(index, command)?;
        self.execute_command()
    }

    /// Read `N` bytes starting at `register`.
    pub fn read_register<const N: usize>(
        &mut self,
        register: u8,
    ) -> Result<[u8; N], Md40Error<E>> {
        self.write(&[register])?;
        self.read::<N>()
    }

    /// Read `N` bytes of channel telemetry at `register`.
    ///
    /// The firmware expects `[register, 0]` before the plain address write;
    /// both go out, in that order.
    pub fn read_telemetry<const N: usize>(
        &mut self,
        register: u8,
    ) -> Result<[u8; N], Md40Error<E>> {
        self.write(&[register, 0])?;
        self.write(&[register])?;
        self.read::<N>()
    }
}
