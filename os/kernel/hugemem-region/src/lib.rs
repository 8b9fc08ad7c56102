//! # Reserved Region Mapper
//!
//! Owns the single translation between the externally reserved physical
//! extent and a kernel-visible virtual mapping.
//!
//! ## Lifecycle
//!
//! ```text
//!  RegionConfig ──region()──► ReservedRegion ──initialize()──► ActiveMapping
//!                                                                  │
//!                                      lease() per user mapping ◄──┤
//!                                                                  │
//!                              teardown() (refused while leased) ◄─┘
//! ```
//!
//! - [`ReservedRegion`] validates the `(base, order)` pair once.
//! - [`ActiveMapping::initialize`] maps it through an [`IoRemap`] primitive;
//!   failure is fatal for the service.
//! - [`ActiveMapping::physical_base`] and [`ActiveMapping::first_frame`]
//!   are what the device layer reports to and maps for clients.
//! - [`ActiveMapping::teardown`] unmaps, but only once no
//!   [`MappingLease`] remains.
//!
//! ## Example
//! ```ignore
//! use hugemem_region::{ActiveMapping, RegionConfig};
//! let region = RegionConfig::default().region()?;
//! let mapping = ActiveMapping::initialize(&remap, region)?;
//! assert_eq!(mapping.physical_base().as_u64(), 0x8_5700_0000);
//! mapping.teardown()?;
//! ```

#![cfg_attr(not(test), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod lease;
mod mapping;
mod region;
mod remap;

pub use lease::MappingLease;
pub use mapping::{AccessError, ActiveMapping, MapError, TeardownError};
pub use region::{RegionConfig, RegionError, ReservedRegion};
pub use remap::IoRemap;
