//! Linux errno values returned across the device boundary.

use core::fmt;

/// The subset of errno values this device can produce.
#[repr(i32)]
#[allow(clippy::upper_case_acronyms)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Errno {
    /// Bad file descriptor (operation on a released session).
    EBADF = 9,
    /// Try again (the page-table install was refused).
    EAGAIN = 11,
    /// Out of memory (the region could not be mapped at load).
    ENOMEM = 12,
    /// Bad address (result could not be copied to the caller).
    EFAULT = 14,
    /// Device or resource busy.
    EBUSY = 16,
    /// File exists.
    EEXIST = 17,
    /// No such device (region not mapped).
    ENODEV = 19,
    /// Invalid argument.
    EINVAL = 22,
    /// Inappropriate ioctl for device.
    ENOTTY = 25,
}

impl Errno {
    #[inline]
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// The negative value a file operation returns for this error.
    #[inline]
    #[must_use]
    pub const fn as_return(self) -> isize {
        -(self as isize)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EBADF => "EBADF",
            Self::EAGAIN => "EAGAIN",
            Self::ENOMEM => "ENOMEM",
            Self::EFAULT => "EFAULT",
            Self::EBUSY => "EBUSY",
            Self::EEXIST => "EEXIST",
            Self::ENODEV => "ENODEV",
            Self::EINVAL => "EINVAL",
            Self::ENOTTY => "ENOTTY",
        }
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.code())
    }
}
