//! # Reserved Memory Layout

use hugemem_addresses::{PageOrder, PageSize, PhysicalAddress, Size4K};

/// Physical base of the externally reserved extent.
pub const RESERVED_MEM_PHYS: PhysicalAddress = PhysicalAddress::new(0x8_5700_0000);

/// Region size exponent: the region spans `PAGE_SIZE << HUGE_PAGE_ORDER` bytes.
///
/// An order of 10 on 4 KiB pages is 4 MiB (`2^(12 + 10)`).
pub const HUGE_PAGE_ORDER: PageOrder = PageOrder::new(10);

/// Base page granularity used for frame numbers and user mappings.
pub const PAGE_SIZE: u64 = Size4K::SIZE;

/// log2 of [`PAGE_SIZE`].
pub const PAGE_SHIFT: u32 = Size4K::SHIFT;

/// Default reserved size in bytes.
pub const RESERVED_MEM_SIZE: u64 = PAGE_SIZE << HUGE_PAGE_ORDER.get();

const _: () = {
    assert!(RESERVED_MEM_PHYS.is_aligned::<Size4K>());
    assert!(HUGE_PAGE_ORDER.get() <= PageOrder::max_for::<Size4K>().get());
    assert!(RESERVED_MEM_SIZE == 4 * 1024 * 1024);
    assert!(RESERVED_MEM_PHYS.checked_add(RESERVED_MEM_SIZE).is_some());
};
