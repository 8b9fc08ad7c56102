//! # Reserved Region Description
//!
//! A [`ReservedRegion`] is the `(physical base, order)` pair a boot-time
//! reservation hands to the service. It is validated once on construction and
//! immutable afterwards.

use hugemem_addresses::{
    AlignmentError, PageFrameNumber, PageOrder, PageSize, PhysicalAddress, Size4K,
};
use hugemem_info::memory::{HUGE_PAGE_ORDER, RESERVED_MEM_PHYS};

/// A validated, page-aligned, power-of-two sized physical extent.
///
/// ### Invariants
/// - `physical_base` is 4 KiB aligned.
/// - `size == 4096 << order`, so it is a power-of-two multiple of the page size.
/// - `physical_base + size` does not wrap.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ReservedRegion {
    base: PhysicalAddress,
    order: PageOrder,
    size: u64,
}

impl ReservedRegion {
    /// Describe the extent of `4 KiB << order` bytes starting at `base`.
    ///
    /// # Errors
    /// - [`RegionError::Alignment`] if `base` is not page aligned or `order`
    ///   does not fit the address space.
    /// - [`RegionError::EndOverflow`] if the extent wraps past the top of
    ///   the physical address space.
    pub fn new(base: PhysicalAddress, order: PageOrder) -> Result<Self, RegionError> {
        PageFrameNumber::<Size4K>::from_aligned(base)?;
        let size = order.bytes::<Size4K>()?;
        if base.checked_add(size).is_none() {
            return Err(RegionError::EndOverflow { base, size });
        }

        Ok(Self { base, order, size })
    }

    #[inline]
    #[must_use]
    pub const fn physical_base(&self) -> PhysicalAddress {
        self.base
    }

    #[inline]
    #[must_use]
    pub const fn order(&self) -> PageOrder {
        self.order
    }

    /// Length of the extent in bytes.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Number of 4 KiB frames in the extent.
    #[inline]
    #[must_use]
    pub const fn frames(&self) -> u64 {
        self.size >> Size4K::SHIFT
    }

    /// First physical address past the extent.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.base.as_u64() + self.size)
    }

    /// Frame number of the base. Alignment was checked in [`new`](Self::new).
    #[inline]
    #[must_use]
    pub const fn first_frame(&self) -> PageFrameNumber<Size4K> {
        PageFrameNumber::containing(self.base)
    }

    #[inline]
    #[must_use]
    pub const fn contains(&self, pa: PhysicalAddress) -> bool {
        pa.as_u64() >= self.base.as_u64() && pa.as_u64() < self.end().as_u64()
    }
}

/// Externally injected region configuration.
///
/// Defaults to the build-time constants in [`hugemem_info::memory`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RegionConfig {
    /// Physical base address of the reserved extent.
    pub physical_base: u64,
    /// Size exponent: the extent spans `4096 << size_order` bytes.
    pub size_order: u8,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            physical_base: RESERVED_MEM_PHYS.as_u64(),
            size_order: HUGE_PAGE_ORDER.get(),
        }
    }
}

impl RegionConfig {
    /// Validate the configuration into a [`ReservedRegion`].
    ///
    /// # Errors
    /// See [`ReservedRegion::new`].
    pub fn region(&self) -> Result<ReservedRegion, RegionError> {
        ReservedRegion::new(
            PhysicalAddress::new(self.physical_base),
            PageOrder::new(self.size_order),
        )
    }
}

impl TryFrom<RegionConfig> for ReservedRegion {
    type Error = RegionError;

    fn try_from(config: RegionConfig) -> Result<Self, Self::Error> {
        config.region()
    }
}

/// Invalid reserved region configuration.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegionError {
    #[error("invalid reserved region: {0}")]
    Alignment(#[from] AlignmentError),
    #[error("reserved region at {base} with {size:#x} bytes wraps the physical address space")]
    EndOverflow { base: PhysicalAddress, size: u64 },
}
