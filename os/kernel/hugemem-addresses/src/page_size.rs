use core::fmt;
use core::hash::Hash;

mod sealed {
    pub trait Sealed {}
}

/// Marker trait for the page granularities the region code understands.
pub trait PageSize:
    sealed::Sealed + Clone + Copy + Eq + Ord + Hash + fmt::Display + fmt::Debug
{
    /// Page size in bytes (power of two).
    const SIZE: u64;
    /// log2(SIZE); the shift between a physical address and its frame number.
    const SHIFT: u32;
    /// Low bits that must be clear in an aligned address.
    const MASK: u64 = Self::SIZE - 1;

    fn as_str() -> &'static str;

    /// Whether `value` sits on a page boundary.
    #[inline]
    #[must_use]
    fn is_aligned(value: u64) -> bool {
        value & Self::MASK == 0
    }
}

macro_rules! page_size {
    ($(#[$doc:meta])* $name:ident, $shift:expr, $label:literal) => {
        $(#[$doc])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        pub struct $name;

        impl sealed::Sealed for $name {}

        impl PageSize for $name {
            const SIZE: u64 = 1 << $shift;
            const SHIFT: u32 = $shift;

            fn as_str() -> &'static str {
                $label
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(Self::as_str())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(self, f)
            }
        }
    };
}

page_size!(
    /// 4 KiB base page, the granularity of `remap_pfn_range`.
    Size4K, 12, "4K"
);
page_size!(
    /// 2 MiB huge page.
    Size2M, 21, "2M"
);
page_size!(
    /// 1 GiB giant page.
    Size1G, 30, "1G"
);

const _: () = {
    assert!(Size4K::SIZE == 4096);
    assert!(Size2M::SIZE == 2 * 1024 * 1024);
    assert!(Size1G::SIZE == 1024 * 1024 * 1024);
};
