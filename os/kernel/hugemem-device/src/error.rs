use crate::Errno;
use crate::user::{Fault, RemapError};
use hugemem_region::AccessError;

/// Coarse classification of a [`DeviceError`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// No live mapping: not yet installed, or already torn down.
    NotReady,
    /// The caller asked for something the region cannot satisfy.
    InvalidArgument,
    /// The client's address space refused the page-table install.
    MappingRejected,
    /// The reply could not be copied back to the caller.
    BadTransfer,
    /// Unrecognized control request.
    UnknownRequest,
    /// Operation on a released session.
    SessionClosed,
    /// Teardown with sessions or user mappings outstanding.
    Busy,
    /// A mapping is already installed.
    AlreadyInitialized,
}

impl ErrorKind {
    /// The errno a file operation reports for this kind.
    #[must_use]
    pub const fn errno(self) -> Errno {
        match self {
            Self::NotReady => Errno::ENODEV,
            Self::InvalidArgument => Errno::EINVAL,
            Self::MappingRejected => Errno::EAGAIN,
            Self::BadTransfer => Errno::EFAULT,
            Self::UnknownRequest => Errno::ENOTTY,
            Self::SessionClosed => Errno::EBADF,
            Self::Busy => Errno::EBUSY,
            Self::AlreadyInitialized => Errno::EEXIST,
        }
    }
}

/// Errors reported by device and session operations.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("reserved region is not mapped")]
    NotReady,
    #[error("requested {requested:#x} bytes at page offset {offset}, region holds {available:#x}")]
    TooLong {
        requested: u64,
        offset: u64,
        available: u64,
    },
    #[error("empty mapping request")]
    EmptyRange,
    #[error("invalid mapping request: {0}")]
    Range(#[from] AccessError),
    #[error("mapping rejected: {0}")]
    MappingRejected(#[source] RemapError),
    #[error("failed to copy result to user: {0}")]
    BadTransfer(#[from] Fault),
    #[error("unknown ioctl request {cmd:#010x}")]
    UnknownRequest { cmd: u32 },
    #[error("session is already released")]
    SessionClosed,
    #[error("device busy: {sessions} open session(s), {mappings} user mapping(s)")]
    Busy { sessions: usize, mappings: usize },
    #[error("reserved region is already mapped")]
    AlreadyInitialized,
}

impl DeviceError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotReady => ErrorKind::NotReady,
            Self::TooLong { .. } | Self::EmptyRange | Self::Range(_) => ErrorKind::InvalidArgument,
            Self::MappingRejected(_) => ErrorKind::MappingRejected,
            Self::BadTransfer(_) => ErrorKind::BadTransfer,
            Self::UnknownRequest { .. } => ErrorKind::UnknownRequest,
            Self::SessionClosed => ErrorKind::SessionClosed,
            Self::Busy { .. } => ErrorKind::Busy,
            Self::AlreadyInitialized => ErrorKind::AlreadyInitialized,
        }
    }

    #[must_use]
    pub const fn errno(&self) -> Errno {
        self.kind().errno()
    }
}

/// Collapse an operation result into the `0` / `-errno` convention.
#[must_use]
pub fn into_return(result: Result<(), DeviceError>) -> isize {
    match result {
        Ok(()) => 0,
        Err(err) => err.errno().as_return(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::RemapError;
    use hugemem_addresses::VirtualAddress;

    #[test]
    fn errors_map_to_negative_errno() {
        let cases = [
            (DeviceError::NotReady, -19),
            (
                DeviceError::TooLong {
                    requested: 0x80_0000,
                    offset: 0,
                    available: 0x40_0000,
                },
                -22,
            ),
            (DeviceError::EmptyRange, -22),
            (
                DeviceError::MappingRejected(RemapError::Misaligned {
                    start: VirtualAddress::new(0x10),
                }),
                -11,
            ),
            (DeviceError::BadTransfer(Fault), -14),
            (DeviceError::UnknownRequest { cmd: 0 }, -25),
            (DeviceError::SessionClosed, -9),
            (
                DeviceError::Busy {
                    sessions: 1,
                    mappings: 0,
                },
                -16,
            ),
            (DeviceError::AlreadyInitialized, -17),
        ];

        for (err, ret) in cases {
            assert_eq!(into_return(Err(err)), ret, "{err}");
        }
        assert_eq!(into_return(Ok(())), 0);
    }

    #[test]
    fn range_errors_are_invalid_arguments() {
        let err: DeviceError = AccessError::Misaligned {
            offset: 0x10,
            align: 4096,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(err.errno(), Errno::EINVAL);
    }
}
