//! # Physical and Virtual Address Types for the Reserved Region
//!
//! Strongly typed wrappers for the handful of address kinds the reserved
//! memory service passes around.
//!
//! ## Overview
//!
//! The service juggles two views of the same memory: the **physical** base a
//! boot-time reservation set aside, and the **virtual** addresses through
//! which the kernel (or a client) touches it. Handing a kernel virtual
//! pointer to a client where a physical address was expected is the classic
//! bug of this kind of driver, so the two are distinct types here.
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`PhysicalAddress`] | A raw physical address (RAM or MMIO). Never dereferenced. |
//! | [`VirtualAddress`] | An address in some virtual address space. |
//! | [`PageFrameNumber<S>`] | `physical >> S::SHIFT`, obtained only from aligned addresses. |
//! | [`PageOrder`] | Region size exponent: `S::SIZE << order` bytes. |
//!
//! ## Page Sizes
//!
//! - [`Size4K`]: 4 KiB pages (base granularity, what user mappings use)
//! - [`Size2M`]: 2 MiB huge pages
//! - [`Size1G`]: 1 GiB giant pages
//!
//! ## Typical Usage
//!
//! ```rust
//! # use hugemem_addresses::*;
//! let base = PhysicalAddress::new(0x8_5700_0000);
//! let pfn = PageFrameNumber::<Size4K>::from_aligned(base).unwrap();
//! assert_eq!(pfn.as_u64(), 0x85_7000);
//! assert_eq!(pfn.base(), base);
//!
//! // order 10 of 4 KiB pages is 4 MiB
//! assert_eq!(PageOrder::new(10).bytes::<Size4K>().unwrap(), 4 * 1024 * 1024);
//!
//! // unaligned addresses never become frame numbers
//! assert!(PageFrameNumber::<Size4K>::from_aligned(base + 8).is_err());
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod page_frame;
mod page_order;
mod page_size;
mod physical_address;
mod virtual_address;

pub use page_frame::PageFrameNumber;
pub use page_order::PageOrder;
pub use page_size::{PageSize, Size1G, Size2M, Size4K};
pub use physical_address::PhysicalAddress;
pub use virtual_address::VirtualAddress;

/// Rejected address or size arithmetic.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AlignmentError {
    #[error("address {address:#x} is not aligned to {page_size:#x} bytes")]
    Unaligned { address: u64, page_size: u64 },
    #[error("order {order} of {page_size:#x}-byte pages overflows the address space")]
    OrderTooLarge { order: u8, page_size: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_number_of_reserved_base() {
        let pa = PhysicalAddress::new(0x8_5700_0000);
        let pfn = pa.frame::<Size4K>().unwrap();
        assert_eq!(pfn.as_u64(), 0x8_5700_0000 >> 12);
        assert_eq!(PhysicalAddress::from(pfn), pa);
    }

    #[test]
    fn unaligned_address_is_rejected() {
        let pa = PhysicalAddress::new(0x8_5700_0042);
        assert_eq!(
            PageFrameNumber::<Size4K>::from_aligned(pa),
            Err(AlignmentError::Unaligned {
                address: 0x8_5700_0042,
                page_size: 4096
            })
        );

        // rounding down is only available explicitly
        let pfn = PageFrameNumber::<Size4K>::containing(pa);
        assert_eq!(pfn.base(), pa.align_down::<Size4K>());
        assert_eq!(pa.page_offset::<Size4K>(), 0x42);
    }

    #[test]
    fn huge_page_alignment() {
        let pa = PhysicalAddress::new(0x8_5700_0000);
        assert!(pa.is_aligned::<Size4K>());
        assert!(!pa.is_aligned::<Size2M>());
        assert!(PhysicalAddress::new(0x8_5720_0000).is_aligned::<Size2M>());
        assert!(Size2M::is_aligned(0x20_0000));
        assert!(!Size1G::is_aligned(0x20_0000));
    }

    #[test]
    fn order_sizes() {
        assert_eq!(PageOrder::new(0).bytes::<Size4K>().unwrap(), 4096);
        assert_eq!(PageOrder::new(10).bytes::<Size4K>().unwrap(), 4 << 20);
        assert_eq!(PageOrder::new(10).pages::<Size4K>().unwrap(), 1024);
        assert_eq!(PageOrder::max_for::<Size4K>().get(), 51);
        assert!(PageOrder::new(51).bytes::<Size4K>().is_ok());
        assert_eq!(
            PageOrder::new(52).bytes::<Size4K>(),
            Err(AlignmentError::OrderTooLarge {
                order: 52,
                page_size: 4096
            })
        );
    }

    #[test]
    fn frame_arithmetic_is_checked() {
        let pfn = PageFrameNumber::<Size4K>::containing(PhysicalAddress::new(0x1000));
        assert_eq!(pfn.checked_add(2).unwrap().base().as_u64(), 0x3000);
        let top = PageFrameNumber::<Size4K>::containing(PhysicalAddress::new(u64::MAX));
        assert!(top.checked_add(1).is_none());
    }

    #[test]
    fn address_offsets() {
        let base = VirtualAddress::new(0x7f00_0000_0000);
        let va = base + 0x1234;
        assert_eq!(va.offset_from(base), Some(0x1234));
        assert_eq!(base.offset_from(va), None);
        assert!(VirtualAddress::new(u64::MAX).checked_add(1).is_none());

        let pa = PhysicalAddress::new(0x2000);
        assert_eq!((pa + 0x10).offset_from(pa), Some(0x10));
    }

    #[test]
    fn formatting_distinguishes_kinds() {
        assert_eq!(format!("{:?}", PhysicalAddress::new(0x10)), "PA(0x0000000000000010)");
        assert_eq!(format!("{:?}", VirtualAddress::new(0x10)), "VA(0x0000000000000010)");
        assert_eq!(format!("{}", PhysicalAddress::new(0x8_5700_0000)), "0x857000000");
    }
}
