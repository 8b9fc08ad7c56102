//! # Reserved Region Configuration
//!
//! Build-time defaults for the reserved physical memory service, shared by
//! the region mapper, the device layer and the tooling.
//!
//! ## Memory
//! The [`memory`] module names the physical extent a boot-time reservation
//! (`memmap=4M$0x857000000` or a device-tree `reserved-memory` node) sets
//! aside. These values **must** match what was actually reserved; mapping a
//! range the kernel still hands out to its allocator corrupts memory.
//!
//! ## Device
//! The [`device`] module names the character device and its single control
//! request.

#![cfg_attr(not(test), no_std)]

pub mod device;
pub mod memory;
