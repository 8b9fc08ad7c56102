//! A client process's view of memory.

use crate::PhysicalMemory;
use hugemem_addresses::{PageFrameNumber, PageSize, PhysicalAddress, Size4K, VirtualAddress};
use hugemem_device::{
    DeviceError, Protection, RemapError, Session, UserAddressSpace, UserMapping, Vma,
};
use hugemem_region::{IoRemap, MappingLease};
use log::debug;
use std::collections::BTreeMap;
use std::ptr::NonNull;
use std::sync::Arc;

/// Where a fresh address space starts handing out mapping ranges.
pub const MMAP_BASE: VirtualAddress = VirtualAddress::new(0x7f00_0000_0000);

/// One installed range. Holding the lease keeps the region mapped for as long
/// as the page tables point into it.
#[derive(Debug)]
struct Translation {
    len: u64,
    pfn: PageFrameNumber<Size4K>,
    prot: Protection,
    _lease: MappingLease,
}

/// Page tables of one simulated client, translating into [`PhysicalMemory`].
#[derive(Debug)]
pub struct ClientAddressSpace {
    memory: Arc<PhysicalMemory>,
    next_free: u64,
    translations: BTreeMap<u64, Translation>,
}

impl ClientAddressSpace {
    #[must_use]
    pub const fn new(memory: Arc<PhysicalMemory>) -> Self {
        Self {
            memory,
            next_free: MMAP_BASE.as_u64(),
            translations: BTreeMap::new(),
        }
    }

    /// Set aside a page-aligned virtual range of at least `len` bytes.
    ///
    /// `None` if the rest of the address space cannot hold it.
    pub fn reserve(&mut self, len: u64) -> Option<VirtualAddress> {
        let start = self.next_free;
        self.next_free = guarded_end(start, len)?;
        Some(VirtualAddress::new(start))
    }

    /// Map `len` bytes of the device, `pgoff` pages in, as the client's
    /// `mmap(NULL, len, prot, MAP_SHARED, fd, pgoff * 4096)` would.
    ///
    /// The device validates the request before any virtual range is used up.
    ///
    /// # Errors
    /// Whatever [`Session::establish_mapping`] reports.
    pub fn mmap<R: IoRemap>(
        &mut self,
        session: &Session<'_, R>,
        len: u64,
        prot: Protection,
        pgoff: u64,
    ) -> Result<UserMapping, DeviceError> {
        let start = VirtualAddress::new(self.next_free);
        let vma = Vma::new(start, len, prot).with_page_offset(pgoff);
        let mapping = session.establish_mapping(self, &vma)?;
        // exhausted: later installs fail as not reserved
        self.next_free = guarded_end(start.as_u64(), mapping.len()).unwrap_or(u64::MAX);
        Ok(mapping)
    }

    /// Remove `mapping` from the page tables, releasing its hold on the region.
    ///
    /// # Errors
    /// [`AccessFault::Unmapped`] if `mapping` was not installed here.
    pub fn munmap(&mut self, mapping: UserMapping) -> Result<(), AccessFault> {
        let start = mapping.start();
        let translation = self
            .translations
            .remove(&start.as_u64())
            .ok_or(AccessFault::Unmapped { va: start })?;
        debug!("munmap({start}, {:#x})", translation.len);
        Ok(())
    }

    /// Physical address and protection behind `va`.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<(PhysicalAddress, Protection)> {
        let (&start, translation) = self.translations.range(..=va.as_u64()).next_back()?;
        let offset = va.as_u64() - start;
        if offset >= translation.len {
            return None;
        }
        let pa = translation.pfn.base().checked_add(offset)?;
        Some((pa, translation.prot))
    }

    /// Number of installed translations.
    #[must_use]
    pub fn mapping_count(&self) -> usize {
        self.translations.len()
    }

    /// Load a `u64` through the client's page tables.
    ///
    /// # Errors
    /// [`AccessFault`] as a hardware access would fault.
    pub fn read_u64(&self, va: VirtualAddress) -> Result<u64, AccessFault> {
        let ptr = self.resolve(va, Protection::READ)?;
        // SAFETY: `resolve` checked the address is backed and 8-byte aligned.
        Ok(unsafe { ptr.cast::<u64>().as_ptr().read_volatile() })
    }

    /// Store a `u64` through the client's page tables.
    ///
    /// # Errors
    /// [`AccessFault`] as a hardware access would fault.
    pub fn write_u64(&self, va: VirtualAddress, value: u64) -> Result<(), AccessFault> {
        let ptr = self.resolve(va, Protection::WRITE)?;
        // SAFETY: see `read_u64`.
        unsafe { ptr.cast::<u64>().as_ptr().write_volatile(value) };
        Ok(())
    }

    fn resolve(&self, va: VirtualAddress, need: Protection) -> Result<NonNull<u8>, AccessFault> {
        if !va.as_u64().is_multiple_of(8) {
            return Err(AccessFault::Misaligned { va });
        }
        let (pa, prot) = self.translate(va).ok_or(AccessFault::Unmapped { va })?;
        if !prot.contains(need) {
            return Err(AccessFault::Protection { va, prot });
        }
        self.memory
            .pointer_to(pa)
            .ok_or(AccessFault::Unmapped { va })
    }

    fn overlaps(&self, start: u64, len: u64) -> bool {
        self.translations
            .range(..start + len)
            .next_back()
            .is_some_and(|(&other, t)| other + t.len > start)
    }
}

impl UserAddressSpace for ClientAddressSpace {
    fn remap_pfn_range(
        &mut self,
        start: VirtualAddress,
        pfn: PageFrameNumber<Size4K>,
        len: u64,
        prot: Protection,
        lease: MappingLease,
    ) -> Result<(), RemapError> {
        if !start.is_aligned::<Size4K>() || !Size4K::is_aligned(len) {
            return Err(RemapError::Misaligned { start });
        }
        if start.as_u64() < MMAP_BASE.as_u64() || start.checked_add(len).is_none() {
            return Err(RemapError::NotReserved { start });
        }
        if self.overlaps(start.as_u64(), len) {
            return Err(RemapError::Overlaps { start, len });
        }
        if !self.memory.backs(pfn, len >> Size4K::SHIFT) {
            return Err(RemapError::NotBacked { pfn });
        }

        let translation = Translation {
            len,
            pfn,
            prot,
            _lease: lease,
        };
        self.translations.insert(start.as_u64(), translation);
        debug!("remap_pfn_range({start}, pfn={pfn}, {len:#x}, {prot:?})");
        Ok(())
    }
}

/// End of a `len`-byte range at `start` plus one unmapped guard page.
fn guarded_end(start: u64, len: u64) -> Option<u64> {
    let pages = len.div_ceil(Size4K::SIZE).max(1).checked_add(1)?;
    start.checked_add(pages.checked_mul(Size4K::SIZE)?)
}

/// A simulated access that real hardware would fault on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessFault {
    #[error("no mapping at {va}")]
    Unmapped { va: VirtualAddress },
    #[error("access at {va} not permitted by {prot:?}")]
    Protection { va: VirtualAddress, prot: Protection },
    #[error("misaligned access at {va}")]
    Misaligned { va: VirtualAddress },
}

#[cfg(test)]
mod tests {
    use super::*;
    use hugemem_addresses::PageOrder;
    use hugemem_region::{ActiveMapping, ReservedRegion};

    const BASE: u64 = 0x10_0000;

    struct Fixture {
        mapping: ActiveMapping<Arc<PhysicalMemory>>,
        space: ClientAddressSpace,
    }

    impl Fixture {
        fn new() -> Self {
            let memory = Arc::new(PhysicalMemory::new(PhysicalAddress::new(BASE), 0x4000).unwrap());
            let region = ReservedRegion::new(PhysicalAddress::new(BASE), PageOrder::new(2)).unwrap();
            let mapping = ActiveMapping::initialize(Arc::clone(&memory), region).unwrap();
            Self {
                mapping,
                space: ClientAddressSpace::new(memory),
            }
        }

        fn install(
            &mut self,
            start: VirtualAddress,
            pa: u64,
            len: u64,
            prot: Protection,
        ) -> Result<(), RemapError> {
            let lease = self.mapping.lease();
            self.space.remap_pfn_range(start, pfn(pa), len, prot, lease)
        }
    }

    fn pfn(pa: u64) -> PageFrameNumber<Size4K> {
        PageFrameNumber::from_aligned(PhysicalAddress::new(pa)).unwrap()
    }

    #[test]
    fn installs_are_all_or_nothing() {
        let mut f = Fixture::new();
        let start = f.space.reserve(0x2000).unwrap();

        assert_eq!(
            f.install(start, BASE + 0x3000, 0x2000, Protection::READ),
            Err(RemapError::NotBacked {
                pfn: pfn(BASE + 0x3000)
            })
        );
        assert_eq!(f.space.mapping_count(), 0);
        assert_eq!(f.space.translate(start), None);
        assert_eq!(f.mapping.outstanding_leases(), 0);

        f.install(start, BASE + 0x2000, 0x2000, Protection::READ)
            .unwrap();
        assert_eq!(
            f.space.translate(start + 0x1008),
            Some((PhysicalAddress::new(BASE + 0x3008), Protection::READ))
        );
        assert_eq!(f.space.translate(start + 0x2000), None);
        assert_eq!(f.mapping.outstanding_leases(), 1);
    }

    #[test]
    fn overlapping_and_misaligned_ranges_are_refused() {
        let mut f = Fixture::new();
        let start = f.space.reserve(0x2000).unwrap();
        f.install(start, BASE, 0x2000, Protection::READ).unwrap();

        assert!(matches!(
            f.install(start + 0x1000, BASE, 0x1000, Protection::READ),
            Err(RemapError::Overlaps { .. })
        ));
        assert!(matches!(
            f.install(start + 0x10, BASE, 0x1000, Protection::READ),
            Err(RemapError::Misaligned { .. })
        ));
        assert!(matches!(
            f.install(VirtualAddress::new(0x1000), BASE, 0x1000, Protection::READ),
            Err(RemapError::NotReserved { .. })
        ));
        assert_eq!(f.mapping.outstanding_leases(), 1);
    }

    #[test]
    fn accesses_honour_protection() {
        let mut f = Fixture::new();
        let start = f.space.reserve(0x1000).unwrap();
        f.install(start, BASE, 0x1000, Protection::READ).unwrap();

        assert_eq!(f.space.read_u64(start), Ok(0));
        assert_eq!(
            f.space.write_u64(start, 1),
            Err(AccessFault::Protection {
                va: start,
                prot: Protection::READ
            })
        );
        assert_eq!(
            f.space.read_u64(start + 4),
            Err(AccessFault::Misaligned { va: start + 4 })
        );
        assert_eq!(
            f.space.read_u64(start + 0x1000),
            Err(AccessFault::Unmapped { va: start + 0x1000 })
        );
    }

    #[test]
    fn exiting_clients_release_the_region() {
        let mut f = Fixture::new();
        let start = f.space.reserve(0x1000).unwrap();
        f.install(start, BASE, 0x1000, Protection::READ_WRITE).unwrap();
        assert_eq!(f.mapping.outstanding_leases(), 1);

        drop(f.space);
        assert_eq!(f.mapping.outstanding_leases(), 0);
    }

    #[test]
    fn reservations_that_cannot_fit_are_refused() {
        let mut f = Fixture::new();
        assert_eq!(f.space.reserve(u64::MAX), None);
        assert_eq!(f.space.reserve(0x1000), Some(MMAP_BASE));
        assert_eq!(f.space.reserve(0x1000), Some(MMAP_BASE + 0x2000));
    }
}
