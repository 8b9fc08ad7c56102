//! # Host simulation of the kernel primitives
//!
//! Stand-ins for what the huge page device needs from a kernel, so the whole
//! service can run and be tested as an ordinary process:
//!
//! - [`PhysicalMemory`]: a page-aligned heap block posing as physical memory
//!   at a fixed base; implements [`IoRemap`](hugemem_region::IoRemap).
//! - [`ClientAddressSpace`]: one client's page tables; implements
//!   [`UserAddressSpace`](hugemem_device::UserAddressSpace) and performs
//!   loads and stores through the installed translations.
//! - [`SimRegistry`]: a table of published device nodes; implements
//!   [`CharDevRegistry`](hugemem_device::CharDevRegistry).
//!
//! Two address spaces mapping the same region see each other's writes,
//! because every translation ends in the same [`PhysicalMemory`] block.

#![allow(unsafe_code)]

mod client;
mod memory;
mod registry;

pub use client::{AccessFault, ClientAddressSpace, MMAP_BASE};
pub use memory::{MemoryError, PhysicalMemory};
pub use registry::{DYNAMIC_MAJOR, DevNumber, SimRegistry};
