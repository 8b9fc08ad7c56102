use crate::{AlignmentError, PageSize};
use core::fmt;

/// Allocation order: a region of order `n` spans `2^n` base pages.
///
/// Orders are validated against the page size they are applied to, so that
/// `S::SIZE << order` always fits in a 64-bit byte count.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct PageOrder(u8);

impl PageOrder {
    #[inline]
    #[must_use]
    pub const fn new(order: u8) -> Self {
        Self(order)
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Largest order whose byte size still fits in a `u64` for pages of size `S`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn max_for<S: PageSize>() -> Self {
        Self((63 - S::SHIFT) as u8)
    }

    /// Number of `S` pages covered.
    ///
    /// # Errors
    /// [`AlignmentError::OrderTooLarge`] if the byte size would overflow.
    pub fn pages<S: PageSize>(self) -> Result<u64, AlignmentError> {
        self.bytes::<S>().map(|bytes| bytes >> S::SHIFT)
    }

    /// Size in bytes: `S::SIZE << order`.
    ///
    /// # Errors
    /// [`AlignmentError::OrderTooLarge`] if the result does not fit in a `u64`.
    pub fn bytes<S: PageSize>(self) -> Result<u64, AlignmentError> {
        if self > Self::max_for::<S>() {
            return Err(AlignmentError::OrderTooLarge {
                order: self.0,
                page_size: S::SIZE,
            });
        }
        Ok(S::SIZE << self.0)
    }
}

impl fmt::Debug for PageOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageOrder({})", self.0)
    }
}

impl fmt::Display for PageOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "order {}", self.0)
    }
}

impl From<u8> for PageOrder {
    #[inline]
    fn from(order: u8) -> Self {
        Self::new(order)
    }
}
