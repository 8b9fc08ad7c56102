//! # Control request encoding
//!
//! Requests use the Linux `_IOC` layout so that a C client built with
//! `_IOR('h', 1, unsigned long)` and this device agree on the number.
//!
//! Layout (LSB→MSB):
//! - bits 0..7: sequence number (`nr`)
//! - bits 8..15: type / magic byte
//! - bits 16..29: argument size in bytes
//! - bits 30..31: direction, from the caller's point of view

use crate::DeviceError;
use bitfield_struct::bitfield;
use hugemem_info::device::{IOCTL_MAGIC, IOCTL_NR_GET_PHYS_ADDR, PHYS_ADDR_WIDTH};

/// Data direction of a request, as seen by the caller.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    None = 0,
    /// Caller writes, device reads (`_IOW`).
    Write = 1,
    /// Device writes, caller reads (`_IOR`).
    Read = 2,
    ReadWrite = 3,
}

impl Direction {
    const fn into_bits(self) -> u8 {
        self as u8
    }

    const fn from_bits(value: u8) -> Self {
        match value & 0b11 {
            0 => Self::None,
            1 => Self::Write,
            2 => Self::Read,
            _ => Self::ReadWrite,
        }
    }
}

/// A raw 32-bit ioctl request word.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct IoctlCommand {
    /// Sequence number within the device's request set.
    pub nr: u8,
    /// Type (magic) byte identifying the device family.
    pub kind: u8,
    /// Size of the argument the request transfers.
    #[bits(14)]
    pub size: u16,
    #[bits(2)]
    pub direction: Direction,
}

impl IoctlCommand {
    /// `_IOR(kind, nr, size)`: the device writes `size` bytes back to the caller.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn ior(kind: u8, nr: u8, size: usize) -> Self {
        Self::new()
            .with_nr(nr)
            .with_kind(kind)
            .with_size(size as u16)
            .with_direction(Direction::Read)
    }
}

/// `_IOR('h', 1, unsigned long)`: report the reserved region's physical base.
pub const GET_PHYS_ADDR: IoctlCommand =
    IoctlCommand::ior(IOCTL_MAGIC, IOCTL_NR_GET_PHYS_ADDR, PHYS_ADDR_WIDTH);

/// Requests the device understands.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Request {
    GetPhysAddr,
}

impl Request {
    /// Decode a raw request word.
    ///
    /// # Errors
    /// [`DeviceError::UnknownRequest`] (`ENOTTY`) for anything that is not an
    /// exact match of a known request, including size or direction mismatches.
    pub fn decode(cmd: u32) -> Result<Self, DeviceError> {
        if cmd == GET_PHYS_ADDR.into_bits() {
            Ok(Self::GetPhysAddr)
        } else {
            Err(DeviceError::UnknownRequest { cmd })
        }
    }

    #[must_use]
    pub const fn command(self) -> IoctlCommand {
        match self {
            Self::GetPhysAddr => GET_PHYS_ADDR,
        }
    }
}
