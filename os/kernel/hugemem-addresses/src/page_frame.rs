use crate::{AlignmentError, PageSize, PhysicalAddress};
use core::fmt;
use core::marker::PhantomData;

/// Physical page-frame number for pages of size `S` (`address >> S::SHIFT`).
///
/// The only way in is [`from_aligned`](Self::from_aligned), which refuses
/// addresses with any in-page bits set. That keeps a misaligned base from
/// silently truncating to the frame below it.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PageFrameNumber<S: PageSize> {
    value: u64,
    _phantom: PhantomData<S>,
}

impl<S: PageSize> PageFrameNumber<S> {
    /// Frame number of a page-aligned physical address.
    ///
    /// # Errors
    /// [`AlignmentError::Unaligned`] if `pa` is not a multiple of `S::SIZE`.
    pub fn from_aligned(pa: PhysicalAddress) -> Result<Self, AlignmentError> {
        if !pa.is_aligned::<S>() {
            return Err(AlignmentError::Unaligned {
                address: pa.as_u64(),
                page_size: S::SIZE,
            });
        }

        Ok(Self {
            value: pa.as_u64() >> S::SHIFT,
            _phantom: PhantomData,
        })
    }

    /// Frame containing `pa` (rounds down).
    #[inline]
    #[must_use]
    pub const fn containing(pa: PhysicalAddress) -> Self {
        Self {
            value: pa.as_u64() >> S::SHIFT,
            _phantom: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.value
    }

    /// First byte of the frame.
    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new(self.value << S::SHIFT)
    }

    /// The frame `count` frames above this one.
    #[inline]
    #[must_use]
    pub const fn checked_add(self, count: u64) -> Option<Self> {
        match self.value.checked_add(count) {
            // keep the base representable as a byte address
            Some(v) if v <= (u64::MAX >> S::SHIFT) => Some(Self {
                value: v,
                _phantom: PhantomData,
            }),
            _ => None,
        }
    }
}

impl<S: PageSize> fmt::Debug for PageFrameNumber<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pfn<{}>({:#x})", S::as_str(), self.value)
    }
}

impl<S: PageSize> fmt::Display for PageFrameNumber<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}/{}", self.value, S::as_str())
    }
}

impl<S: PageSize> TryFrom<PhysicalAddress> for PageFrameNumber<S> {
    type Error = AlignmentError;

    #[inline]
    fn try_from(pa: PhysicalAddress) -> Result<Self, Self::Error> {
        Self::from_aligned(pa)
    }
}

impl<S: PageSize> From<PageFrameNumber<S>> for PhysicalAddress {
    #[inline]
    fn from(pfn: PageFrameNumber<S>) -> Self {
        pfn.base()
    }
}
