//! Simulated physical memory.

use hugemem_addresses::{PageFrameNumber, PageSize, PhysicalAddress, Size4K};
use hugemem_region::IoRemap;
use log::trace;
use std::alloc::{self, Layout};
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A page-aligned block of host memory standing in for physical memory at
/// `[base, base + size)`.
///
/// Implements [`IoRemap`] by handing out pointers into the block, so the
/// kernel view and every client view alias the same bytes.
pub struct PhysicalMemory {
    base: PhysicalAddress,
    size: u64,
    layout: Layout,
    backing: NonNull<u8>,
    live_maps: AtomicUsize,
}

// SAFETY: the block is only reached through raw pointers and volatile
// accesses; concurrent access has the same semantics as real memory.
unsafe impl Send for PhysicalMemory {}
unsafe impl Sync for PhysicalMemory {}

impl PhysicalMemory {
    /// Zeroed memory covering `size` bytes at `base`.
    ///
    /// # Errors
    /// [`MemoryError`] if the window is unaligned, empty, or cannot be
    /// allocated on this host.
    pub fn new(base: PhysicalAddress, size: u64) -> Result<Self, MemoryError> {
        if !base.is_aligned::<Size4K>() || !Size4K::is_aligned(size) || size == 0 {
            return Err(MemoryError::Unaligned { base, size });
        }
        let bytes = usize::try_from(size).map_err(|_| MemoryError::TooLarge { size })?;
        let align = usize::try_from(Size4K::SIZE).map_err(|_| MemoryError::TooLarge { size })?;
        let layout =
            Layout::from_size_align(bytes, align).map_err(|_| MemoryError::TooLarge { size })?;

        // SAFETY: layout has non-zero size.
        let backing = NonNull::new(unsafe { alloc::alloc_zeroed(layout) })
            .ok_or(MemoryError::OutOfMemory { size })?;

        Ok(Self {
            base,
            size,
            layout,
            backing,
            live_maps: AtomicUsize::new(0),
        })
    }

    #[inline]
    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        self.base
    }

    #[inline]
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Number of kernel mappings currently handed out.
    #[must_use]
    pub fn live_maps(&self) -> usize {
        self.live_maps.load(Ordering::Acquire)
    }

    /// Whether `[pa, pa + len)` lies inside the block.
    #[must_use]
    pub fn covers(&self, pa: PhysicalAddress, len: u64) -> bool {
        pa.offset_from(self.base)
            .and_then(|offset| offset.checked_add(len))
            .is_some_and(|end| end <= self.size)
    }

    /// Whether `count` frames starting at `pfn` are all backed.
    #[must_use]
    pub fn backs(&self, pfn: PageFrameNumber<Size4K>, count: u64) -> bool {
        count
            .checked_mul(Size4K::SIZE)
            .is_some_and(|len| self.covers(pfn.base(), len))
    }

    /// Host pointer to the byte at `pa`.
    #[must_use]
    pub fn pointer_to(&self, pa: PhysicalAddress) -> Option<NonNull<u8>> {
        if !self.covers(pa, 1) {
            return None;
        }
        let offset = usize::try_from(pa.offset_from(self.base)?).ok()?;
        // SAFETY: offset < size, so the result stays inside the allocation.
        Some(unsafe { self.backing.add(offset) })
    }
}

impl IoRemap for PhysicalMemory {
    fn ioremap(&self, pa: PhysicalAddress, size: u64) -> Option<NonNull<u8>> {
        if size == 0 || !self.covers(pa, size) {
            return None;
        }
        let handle = self.pointer_to(pa)?;
        self.live_maps.fetch_add(1, Ordering::AcqRel);
        trace!("ioremap({pa}, {size:#x}) -> {handle:p}");
        Some(handle)
    }

    unsafe fn iounmap(&self, handle: NonNull<u8>, size: u64) {
        self.live_maps.fetch_sub(1, Ordering::AcqRel);
        trace!("iounmap({handle:p}, {size:#x})");
    }
}

impl Drop for PhysicalMemory {
    fn drop(&mut self) {
        // SAFETY: allocated in `new` with exactly this layout.
        unsafe { alloc::dealloc(self.backing.as_ptr(), self.layout) };
    }
}

impl fmt::Debug for PhysicalMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhysicalMemory")
            .field("base", &self.base)
            .field("size", &self.size)
            .field("live_maps", &self.live_maps())
            .finish_non_exhaustive()
    }
}

/// Simulated memory could not be set up.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    #[error("window {base} (+{size:#x}) is not page aligned")]
    Unaligned { base: PhysicalAddress, size: u64 },
    #[error("window of {size:#x} bytes does not fit the host address space")]
    TooLarge { size: u64 },
    #[error("failed to allocate {size:#x} bytes of backing memory")]
    OutOfMemory { size: u64 },
}
