//! # Huge Page Device
//!
//! The client-facing half of the service: a character device that tells a
//! client where the reserved region lives and maps its frames into the
//! client's address space for zero-copy access.
//!
//! ## File operations
//!
//! | Operation | Method | Failure |
//! |---|---|---|
//! | `open` | [`HugePageDevice::open`] | never |
//! | `ioctl(GET_PHYS_ADDR)` | [`Session::ioctl`] | `EFAULT`, `ENOTTY`, `ENODEV` |
//! | `mmap` | [`Session::establish_mapping`] | `EINVAL`, `EAGAIN` |
//! | `release` | [`Session::release`] / drop | `EBADF` on double release |
//!
//! Every error is a [`DeviceError`]; [`DeviceError::errno`] and
//! [`into_return`] give the `-errno` a file operation returns.
//!
//! ## Example
//! ```ignore
//! let module = HugePageModule::load(remap, RegionConfig::default(), registry)?;
//! let session = module.open();
//! let mut reply = [0u8; 8];
//! session.ioctl(GET_PHYS_ADDR.into_bits(), &mut reply)?;
//! assert_eq!(u64::from_le_bytes(reply), 0x8_5700_0000);
//!
//! let vma = Vma::new(start, 4096, Protection::READ_WRITE);
//! let mapping = session.establish_mapping(&mut space, &vma)?;
//! ```

#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod device;
mod errno;
mod error;
pub mod ioctl;
mod mapping;
mod module;
mod session;
pub mod user;

pub use device::HugePageDevice;
pub use errno::Errno;
pub use error::{DeviceError, ErrorKind, into_return};
pub use ioctl::{GET_PHYS_ADDR, IoctlCommand, Request};
pub use mapping::UserMapping;
pub use module::{CharDevRegistry, DeviceNode, HugePageModule, ModuleError, RegistryError};
pub use session::{Session, SessionState};
pub use user::{Fault, Protection, RemapError, UserAddressSpace, UserBuffer, Vma};
