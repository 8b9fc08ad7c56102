//! # Active kernel mapping of the reserved region
//!
//! [`ActiveMapping::initialize`] is the one place the reserved range becomes
//! addressable; [`ActiveMapping::teardown`] is the one place it stops being
//! so. Holding an `ActiveMapping` *is* the proof that the kernel view is
//! valid, so there is no "is it mapped yet?" flag to check.
//!
//! ## Two views of one region
//!
//! ```text
//!   kernel_base() ──► [ kernel virtual view, mapped_size bytes ]
//!                               │ same frames
//!   physical_base() ─► [ reserved physical extent ] ◄── user PFN mappings
//! ```
//!
//! Only [`physical_base`](ActiveMapping::physical_base) and
//! [`first_frame`](ActiveMapping::first_frame) ever leave the kernel; the
//! kernel view is used for in-kernel access alone.
//!
//! Dropping the mapping unmaps it only when no lease is outstanding. With
//! leases still alive the kernel mapping is leaked instead, so frames a client
//! has mapped are never handed back while its page tables point at them.

use crate::lease::{LeaseCounter, MappingLease};
use crate::{IoRemap, ReservedRegion};
use alloc::sync::Arc;
use core::fmt;
use core::ptr::NonNull;
use hugemem_addresses::{PageFrameNumber, PageSize, PhysicalAddress, Size4K, VirtualAddress};
use log::{error, info, warn};

/// The reserved region, mapped into the kernel's address space.
pub struct ActiveMapping<R: IoRemap> {
    remap: R,
    region: ReservedRegion,
    handle: NonNull<u8>,
    mapped_size: u64,
    leases: Arc<LeaseCounter>,
}

// SAFETY: `handle` points at device memory owned by this mapping for its whole
// lifetime; every access goes through volatile reads/writes.
unsafe impl<R: IoRemap + Send> Send for ActiveMapping<R> {}
unsafe impl<R: IoRemap + Sync> Sync for ActiveMapping<R> {}

impl<R: IoRemap> ActiveMapping<R> {
    /// Map the whole reserved region as device memory.
    ///
    /// # Errors
    /// [`MapError::MapFailed`] if the primitive returns no usable handle. The
    /// service must refuse to start in that case.
    pub fn initialize(remap: R, region: ReservedRegion) -> Result<Self, MapError> {
        let base = region.physical_base();
        let size = region.size();

        let Some(handle) = remap.ioremap(base, size) else {
            error!("failed to ioremap reserved region {base} ({size:#x} bytes)");
            return Err(MapError::MapFailed { base, size });
        };

        info!(
            "mapped reserved region at vaddr={}, size={size} bytes",
            VirtualAddress::from_nonnull(handle)
        );
        info!("reserved phys_addr = {base}");

        Ok(Self {
            remap,
            region,
            handle,
            mapped_size: size,
            leases: Arc::new(LeaseCounter::default()),
        })
    }

    #[inline]
    #[must_use]
    pub const fn region(&self) -> &ReservedRegion {
        &self.region
    }

    /// Raw physical base of the region, the value handed to clients.
    #[inline]
    #[must_use]
    pub const fn physical_base(&self) -> PhysicalAddress {
        self.region.physical_base()
    }

    /// Number of bytes the kernel view covers.
    #[inline]
    #[must_use]
    pub const fn mapped_size(&self) -> u64 {
        self.mapped_size
    }

    /// Start of the kernel view. Only meaningful in kernel context.
    #[inline]
    #[must_use]
    pub fn kernel_base(&self) -> VirtualAddress {
        VirtualAddress::from_nonnull(self.handle)
    }

    /// Frame number of the region base.
    #[inline]
    #[must_use]
    pub const fn first_frame(&self) -> PageFrameNumber<Size4K> {
        self.region.first_frame()
    }

    /// Frame number `offset` bytes into the region.
    ///
    /// # Errors
    /// - [`AccessError::Misaligned`] if `offset` is not page aligned.
    /// - [`AccessError::OutOfRange`] if `offset` lies at or past the end.
    pub fn frame_at(&self, offset: u64) -> Result<PageFrameNumber<Size4K>, AccessError> {
        if !Size4K::is_aligned(offset) {
            return Err(AccessError::Misaligned {
                offset,
                align: Size4K::SIZE,
            });
        }
        if offset >= self.mapped_size {
            return Err(AccessError::OutOfRange {
                offset,
                len: 0,
                size: self.mapped_size,
            });
        }

        self.first_frame()
            .checked_add(offset >> Size4K::SHIFT)
            .ok_or(AccessError::OutOfRange {
                offset,
                len: 0,
                size: self.mapped_size,
            })
    }

    /// Physical address `offset` bytes into the region.
    ///
    /// # Errors
    /// [`AccessError::OutOfRange`] if `offset` lies at or past the end.
    pub fn translate(&self, offset: u64) -> Result<PhysicalAddress, AccessError> {
        let out_of_range = AccessError::OutOfRange {
            offset,
            len: 0,
            size: self.mapped_size,
        };
        if offset >= self.mapped_size {
            return Err(out_of_range);
        }
        self.physical_base().checked_add(offset).ok_or(out_of_range)
    }

    /// Reverse lookup: physical address behind a kernel-view address.
    #[must_use]
    pub fn physical_address_of(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        let offset = va.offset_from(self.kernel_base())?;
        if offset >= self.mapped_size {
            return None;
        }
        self.physical_base().checked_add(offset)
    }

    /// Forward lookup: kernel-view address of a physical address in the region.
    #[must_use]
    pub fn kernel_address_of(&self, pa: PhysicalAddress) -> Option<VirtualAddress> {
        if !self.region.contains(pa) {
            return None;
        }
        let offset = pa.offset_from(self.physical_base())?;
        self.kernel_base().checked_add(offset)
    }

    /// Volatile read of a `T` at `offset` through the kernel view.
    ///
    /// # Errors
    /// [`AccessError`] if the access is out of range or misaligned for `T`.
    pub fn read_volatile<T: Copy>(&self, offset: u64) -> Result<T, AccessError> {
        let ptr = self.checked_ptr::<T>(offset)?;
        // SAFETY: in range, aligned, and the mapping is live while `self` is.
        Ok(unsafe { ptr.as_ptr().read_volatile() })
    }

    /// Volatile write of a `T` at `offset` through the kernel view.
    ///
    /// # Errors
    /// [`AccessError`] if the access is out of range or misaligned for `T`.
    pub fn write_volatile<T: Copy>(&self, offset: u64, value: T) -> Result<(), AccessError> {
        let ptr = self.checked_ptr::<T>(offset)?;
        // SAFETY: see `read_volatile`.
        unsafe { ptr.as_ptr().write_volatile(value) };
        Ok(())
    }

    fn checked_ptr<T>(&self, offset: u64) -> Result<NonNull<T>, AccessError> {
        let len = size_of::<T>() as u64;
        let in_range = offset
            .checked_add(len)
            .is_some_and(|end| end <= self.mapped_size);
        if !in_range {
            return Err(AccessError::OutOfRange {
                offset,
                len,
                size: self.mapped_size,
            });
        }

        let align = align_of::<T>() as u64;
        let addr = self.kernel_base().as_u64() + offset;
        if !addr.is_multiple_of(align) {
            return Err(AccessError::Misaligned { offset, align });
        }

        let offset = usize::try_from(offset).map_err(|_| AccessError::OutOfRange {
            offset,
            len,
            size: self.mapped_size,
        })?;
        // SAFETY: offset + size_of::<T>() <= mapped_size, so the result stays inside the mapping.
        Ok(unsafe { self.handle.add(offset).cast::<T>() })
    }

    /// Take out a lease for a mapping derived from this one.
    #[must_use]
    pub fn lease(&self) -> MappingLease {
        MappingLease::acquire(&self.leases)
    }

    /// Number of live leases.
    #[must_use]
    pub fn outstanding_leases(&self) -> usize {
        self.leases.live()
    }

    /// Release the kernel mapping.
    ///
    /// # Errors
    /// [`TeardownError`] if any lease is still alive; the mapping is handed
    /// back untouched via [`TeardownError::into_mapping`].
    pub fn teardown(self) -> Result<(), TeardownError<R>> {
        let outstanding = self.leases.live();
        if outstanding > 0 {
            warn!("refusing to unmap reserved region: {outstanding} user mapping(s) outstanding");
            return Err(TeardownError {
                outstanding,
                mapping: self,
            });
        }

        drop(self);
        Ok(())
    }
}

impl<R: IoRemap> Drop for ActiveMapping<R> {
    fn drop(&mut self) {
        let outstanding = self.leases.live();
        if outstanding > 0 {
            // user page tables still point at the frames; keep the mapping
            error!(
                "leaking mapping of reserved region {}: {outstanding} lease(s) outstanding",
                self.region.physical_base()
            );
            return;
        }

        // SAFETY: handle/size are exactly what ioremap returned/was given, and
        // `&mut self` means no kernel-view pointer is borrowed any more.
        unsafe { self.remap.iounmap(self.handle, self.mapped_size) };
        info!("unmapped reserved region {}", self.region.physical_base());
    }
}

impl<R: IoRemap> fmt::Debug for ActiveMapping<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveMapping")
            .field("physical_base", &self.physical_base())
            .field("kernel_base", &self.kernel_base())
            .field("mapped_size", &self.mapped_size)
            .field("leases", &self.leases.live())
            .finish_non_exhaustive()
    }
}

/// Failure to bring the kernel mapping up.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    #[error("failed to map reserved region {base} ({size:#x} bytes)")]
    MapFailed { base: PhysicalAddress, size: u64 },
    #[error("reserved region is already mapped")]
    AlreadyInitialized,
}

/// Out-of-bounds or misaligned access through the kernel view.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("access of {len} bytes at offset {offset:#x} exceeds the {size:#x}-byte mapping")]
    OutOfRange { offset: u64, len: u64, size: u64 },
    #[error("offset {offset:#x} is not aligned to {align} bytes")]
    Misaligned { offset: u64, align: u64 },
}

/// [`ActiveMapping::teardown`] was refused because leases are outstanding.
#[derive(thiserror::Error)]
#[error("reserved region still has {outstanding} outstanding user mapping(s)")]
pub struct TeardownError<R: IoRemap> {
    pub outstanding: usize,
    mapping: ActiveMapping<R>,
}

impl<R: IoRemap> TeardownError<R> {
    /// Recover the still-live mapping.
    #[must_use]
    pub fn into_mapping(self) -> ActiveMapping<R> {
        self.mapping
    }
}

impl<R: IoRemap> fmt::Debug for TeardownError<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TeardownError")
            .field("outstanding", &self.outstanding)
            .field("mapping", &self.mapping)
            .finish()
    }
}
