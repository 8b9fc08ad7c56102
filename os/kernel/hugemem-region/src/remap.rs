//! # Device-memory mapping primitive
//!
//! [`IoRemap`] abstracts the kernel facility that makes a physical range
//! addressable from kernel context (`ioremap`/`iounmap` on Linux, an HHDM
//! window or a fresh page-table chain elsewhere). The region mapper only
//! needs "give me a pointer for this range" and "take it back".
//!
//! Implementations decide where the pointer comes from; a hosted
//! implementation backed by ordinary memory lives in `hugemem-sim`.

use alloc::sync::Arc;
use core::ptr::NonNull;
use hugemem_addresses::PhysicalAddress;

/// Maps and unmaps a physical range into the kernel's address space.
pub trait IoRemap {
    /// Map `size` bytes of physical memory starting at `pa` as device memory.
    ///
    /// Returns `None` if the range cannot be mapped (address space
    /// exhausted, range not backed by anything, etc.).
    fn ioremap(&self, pa: PhysicalAddress, size: u64) -> Option<NonNull<u8>>;

    /// Release a mapping obtained from [`ioremap`](Self::ioremap).
    ///
    /// # Safety
    /// - `handle` and `size` must be exactly what a prior `ioremap` call
    ///   returned and was called with.
    /// - No pointer derived from `handle` may be used afterwards.
    unsafe fn iounmap(&self, handle: NonNull<u8>, size: u64);
}

impl<T: IoRemap + ?Sized> IoRemap for &T {
    #[inline]
    fn ioremap(&self, pa: PhysicalAddress, size: u64) -> Option<NonNull<u8>> {
        (**self).ioremap(pa, size)
    }

    #[inline]
    unsafe fn iounmap(&self, handle: NonNull<u8>, size: u64) {
        unsafe { (**self).iounmap(handle, size) }
    }
}

impl<T: IoRemap + ?Sized> IoRemap for Arc<T> {
    #[inline]
    fn ioremap(&self, pa: PhysicalAddress, size: u64) -> Option<NonNull<u8>> {
        (**self).ioremap(pa, size)
    }

    #[inline]
    unsafe fn iounmap(&self, handle: NonNull<u8>, size: u64) {
        unsafe { (**self).iounmap(handle, size) }
    }
}
