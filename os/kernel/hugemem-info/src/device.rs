//! # Character Device Naming and Control Requests

/// Device node name, as in `/dev/hugepage_dev`.
pub const DEVICE_NAME: &str = "hugepage_dev";

/// Device class name.
pub const CLASS_NAME: &str = "huge";

/// ioctl "type" byte shared by every request of this device.
pub const IOCTL_MAGIC: u8 = b'h';

/// Sequence number of the "get physical address" request.
pub const IOCTL_NR_GET_PHYS_ADDR: u8 = 1;

/// Size of the value returned by "get physical address" (an `unsigned long`).
pub const PHYS_ADDR_WIDTH: usize = size_of::<u64>();
