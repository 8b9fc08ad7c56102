use crate::user::Protection;
use hugemem_addresses::{PageFrameNumber, PhysicalAddress, Size4K, VirtualAddress};

/// A range of a client's address space backed by frames of the reserved region.
///
/// This only describes the range. The translation installed in the client's
/// page tables holds the lease, so the region's kernel mapping cannot be torn
/// down until the client unmaps the range or its address space goes away.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct UserMapping {
    start: VirtualAddress,
    len: u64,
    first_frame: PageFrameNumber<Size4K>,
    prot: Protection,
}

impl UserMapping {
    pub(crate) const fn new(
        start: VirtualAddress,
        len: u64,
        first_frame: PageFrameNumber<Size4K>,
        prot: Protection,
    ) -> Self {
        Self {
            start,
            len,
            first_frame,
            prot,
        }
    }

    #[inline]
    #[must_use]
    pub const fn start(&self) -> VirtualAddress {
        self.start
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// One past the last mapped byte.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> VirtualAddress {
        VirtualAddress::new(self.start.as_u64() + self.len)
    }

    /// Frame behind [`start`](Self::start).
    #[inline]
    #[must_use]
    pub const fn first_frame(&self) -> PageFrameNumber<Size4K> {
        self.first_frame
    }

    /// Physical address behind [`start`](Self::start).
    #[inline]
    #[must_use]
    pub const fn physical_start(&self) -> PhysicalAddress {
        self.first_frame.base()
    }

    #[inline]
    #[must_use]
    pub const fn protection(&self) -> Protection {
        self.prot
    }

    #[must_use]
    pub const fn contains(&self, va: VirtualAddress) -> bool {
        va.as_u64() >= self.start.as_u64() && va.as_u64() - self.start.as_u64() < self.len
    }
}
