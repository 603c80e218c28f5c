//! Device facade for the MD40 motor board.
//!
//! `Md40` borrows a shared I2C bus and hands each of its four channels its own
//! `RefCellDevice`, so other drivers can keep using the same bus between calls.
//! Nothing here locks: callers sharing one `Md40` across threads must
//! serialize access themselves.

use core::{
    cell::RefCell,
    fmt,
    ops::{Index, IndexMut},
};

use embedded_hal::i2c::I2c;
use embedded_hal_bus::i2c::RefCellDevice;
use serde::{Deserialize, Serialize, Serializer};

use super::{
    motor::Motor,
    transport::{Md40Error, PollPolicy, Transport},
    Md40Command, Report,
};
use crate::utils::protocol::registers::{
    DEFAULT_ADDRESS, DEVICE_ID, MOTOR_COUNT, NAME, NAME_LEN, VERSION,
};

/// Bus address and polling behaviour of one board.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct Md40Config {
    pub address: u8,
    pub poll_policy: PollPolicy,
}

impl Default for Md40Config {
    fn default() -> Self {
        Md40Config {
            address: DEFAULT_ADDRESS,
            poll_policy: PollPolicy::unbounded(),
        }
    }
}

/// Firmware version, formatted as `major.minor.patch`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl fmt::Display for FirmwareVersion {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// The fixed 8-byte name field. Every byte is shown as one character,
/// padding included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceName(pub [u8; NAME_LEN]);

impl DeviceName {
    pub fn as_bytes(&self) -> &[u8; NAME_LEN] {
        &self.0
    }

    pub fn chars(&self) -> impl Iterator<Item = char> + '_ {
        self.0.iter().map(|&b| char::from(b))
    }
}

impl fmt::Display for DeviceName {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        self.chars().try_for_each(|c| fmt::Write::write_char(f, c))
    }
}

impl Serialize for DeviceName {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// High-level driver for one MD40 board on a shared I2C bus.
pub struct Md40<'a, I2C> {
    device: Transport<RefCellDevice<'a, I2C>>,
    motors: [Motor<RefCellDevice<'a, I2C>>; MOTOR_COUNT],
}

impl<'a, I2C, E> Md40<'a, I2C>
where
    I2C: I2c<Error = E>,
    E: fmt::Debug,
{
    /// Create the driver. No bus traffic happens until `init`.
    pub fn new(
        i2c_bus: &'a RefCell<I2C>,
        config: Md40Config,
    ) -> Self {
        Md40 {
            device: Transport::new(RefCellDevice::new(i2c_bus), config.address, config.poll_policy),
            motors: core::array::from_fn(|i| {
                Motor::new(
                    RefCellDevice::new(i2c_bus),
                    config.address,
                    i as u8,
                    config.poll_policy,
                )
            }),
        }
    }

    pub fn address(&self) -> u8 {
        self.device.address()
    }

    /// Apply a poll policy to the device and every channel.
    pub fn set_poll_policy(
        &mut self,
        poll: PollPolicy,
    ) {
        self.device.set_poll_policy(poll);
        for motor in self.motors.iter_mut() {
            motor.set_poll_policy(poll);
        }
    }

    /// Reset every channel, in index order.
    ///
    /// Must run once before any other channel operation.
    pub fn init(&mut self) -> Result<(), Md40Error<E>> {
        for motor in self.motors.iter_mut() {
            motor.reset()?;
        }
        tracing::info!(address = self.device.address(), "MD40 channels reset");
        Ok(())
    }

    pub fn firmware_version(&mut self) -> Result<FirmwareVersion, Md40Error<E>> {
        let [major, minor, patch] = self.device.read_register::<3>(VERSION)?;
        Ok(FirmwareVersion {
            major,
            minor,
            patch,
        })
    }

    pub fn device_id(&mut self) -> Result<u8, Md40Error<E>> {
        let [id] = self.device.read_register::<1>(DEVICE_ID)?;
        Ok(id)
    }

    pub fn name(&mut self) -> Result<DeviceName, Md40Error<E>> {
        self.device
            .read_register::<NAME_LEN>(NAME)
            .map(DeviceName)
    }

    /// The channel at `index`, or `None` past the last channel.
    pub fn motor_mut(
        &mut self,
        index: usize,
    ) -> Option<&mut Motor<RefCellDevice<'a, I2C>>> {
        self.motors.get_mut(index)
    }

    pub fn motors_mut(&mut self) -> impl Iterator<Item = &mut Motor<RefCellDevice<'a, I2C>>> {
        self.motors.iter_mut()
    }

    /// Execute an `Md40Command`, forwarding channel commands.
    ///
    /// A channel index past the last channel is rejected with
    /// `InvalidChannel` before any bus traffic.
    pub fn execute_command(
        &mut self,
        command: Md40Command,
    ) -> Result<Option<Report>, Md40Error<E>> {
        match command {
            Md40Command::Init => self.init().map(|_| None),
            Md40Command::FirmwareVersion => Ok(Some(Report::FirmwareVersion {
                version: self.firmware_version()?,
            })),
            Md40Command::DeviceId => Ok(Some(Report::DeviceId {
                id: self.device_id()?,
            })),
            Md40Command::Name => Ok(Some(Report::Name { name: self.name()? })),
            Md40Command::Motor { index, command } => self
                .motor_mut(index as usize)
                .ok_or(Md40Error::InvalidChannel(index))?
                .execute(command),
        }
    }
}

impl<'a, I2C> Index<usize> for Md40<'a, I2C> {
    type Output = Motor<RefCellDevice<'a, I2C>>;

    fn index(
        &self,
        index: usize,
    ) -> &Self::Output {
        assert!(index < MOTOR_COUNT, "motor index {} out of range", index);
        &self.motors[index]
    }
}

impl<'a, I2C> IndexMut<usize> for Md40<'a, I2C> {
    fn index_mut(
        &mut self,
        index: usize,
    ) -> &mut Self::Output {
        assert!(index < MOTOR_COUNT, "motor index {} out of range", index);
        &mut self.motors[index]
    }
}
