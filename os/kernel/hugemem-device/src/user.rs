//! # The client side of the device boundary
//!
//! Two things cross from the device into a client: the bytes of a control
//! request's reply ([`UserBuffer`]) and page-table entries pointing at the
//! reserved frames ([`UserAddressSpace`]). Both are traits so that the
//! kernel glue and the host simulator can provide them.

use bitflags::bitflags;
use hugemem_addresses::{PageFrameNumber, Size4K, VirtualAddress};
use hugemem_region::MappingLease;

/// The destination of a reply is not writable by the device.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[error("bad user address")]
pub struct Fault;

/// Somewhere a control request can write its reply.
pub trait UserBuffer {
    /// Copy `bytes` to the start of the buffer.
    ///
    /// # Errors
    /// [`Fault`] if the buffer is absent or shorter than `bytes`.
    fn copy_to_user(&mut self, bytes: &[u8]) -> Result<(), Fault>;
}

impl UserBuffer for [u8] {
    fn copy_to_user(&mut self, bytes: &[u8]) -> Result<(), Fault> {
        let dst = self.get_mut(..bytes.len()).ok_or(Fault)?;
        dst.copy_from_slice(bytes);
        Ok(())
    }
}

impl<const N: usize> UserBuffer for [u8; N] {
    fn copy_to_user(&mut self, bytes: &[u8]) -> Result<(), Fault> {
        self.as_mut_slice().copy_to_user(bytes)
    }
}

/// A null user pointer.
impl<B: UserBuffer + ?Sized> UserBuffer for Option<&mut B> {
    fn copy_to_user(&mut self, bytes: &[u8]) -> Result<(), Fault> {
        self.as_deref_mut().ok_or(Fault)?.copy_to_user(bytes)
    }
}

bitflags! {
    /// Access rights for a user mapping.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Protection: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXEC = 1 << 2;
    }
}

impl Protection {
    pub const READ_WRITE: Self = Self::READ.union(Self::WRITE);
}

/// A client's mapping request: a reserved virtual range, the page offset
/// into the device, and the protection to map it with.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Vma {
    start: VirtualAddress,
    len: u64,
    pgoff: u64,
    prot: Protection,
}

impl Vma {
    #[must_use]
    pub const fn new(start: VirtualAddress, len: u64, prot: Protection) -> Self {
        Self {
            start,
            len,
            pgoff: 0,
            prot,
        }
    }

    /// Map starting `pgoff` pages into the region instead of at its base.
    #[must_use]
    pub const fn with_page_offset(mut self, pgoff: u64) -> Self {
        self.pgoff = pgoff;
        self
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

    #[inline]
    #[must_use]
    pub const fn page_offset(&self) -> u64 {
        self.pgoff
    }

    #[inline]
    #[must_use]
    pub const fn protection(&self) -> Protection {
        self.prot
    }
}

/// Why an address space refused to install a translation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemapError {
    #[error("virtual range {start} is not page aligned")]
    Misaligned { start: VirtualAddress },
    #[error("virtual range {start} (+{len:#x}) overlaps an existing mapping")]
    Overlaps { start: VirtualAddress, len: u64 },
    #[error("virtual range {start} was not reserved by the client")]
    NotReserved { start: VirtualAddress },
    #[error("frame {pfn} is not backed by physical memory")]
    NotBacked { pfn: PageFrameNumber<Size4K> },
    #[error("protection {prot:?} is not permitted for this range")]
    PermissionDenied { prot: Protection },
}

/// A client's page tables, as far as the device needs them.
pub trait UserAddressSpace {
    /// Point `len` bytes at `start` to consecutive frames beginning at `pfn`.
    ///
    /// Either the whole range is installed or nothing is. An installed
    /// translation keeps `lease` until it is removed from the page tables;
    /// a refused one drops it on the way out.
    ///
    /// # Errors
    /// [`RemapError`] if the address space refuses the translation.
    fn remap_pfn_range(
        &mut self,
        start: VirtualAddress,
        pfn: PageFrameNumber<Size4K>,
        len: u64,
        prot: Protection,
        lease: MappingLease,
    ) -> Result<(), RemapError>;
}

impl<A: UserAddressSpace + ?Sized> UserAddressSpace for &mut A {
    fn remap_pfn_range(
        &mut self,
        start: VirtualAddress,
        pfn: PageFrameNumber<Size4K>,
        len: u64,
        prot: Protection,
        lease: MappingLease,
    ) -> Result<(), RemapError> {
        (**self).remap_pfn_range(start, pfn, len, prot, lease)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_or_missing_buffers_fault() {
        let mut short = [0u8; 4];
        assert_eq!(short.copy_to_user(&[1; 8]), Err(Fault));

        let mut none: Option<&mut [u8]> = None;
        assert_eq!(none.copy_to_user(&[1; 8]), Err(Fault));

        let mut exact = [0u8; 8];
        let mut some = Some(&mut exact[..]);
        assert_eq!(some.copy_to_user(&[7; 8]), Ok(()));
        assert_eq!(exact, [7; 8]);
    }

    #[test]
    fn longer_buffers_keep_their_tail() {
        let mut buf = [0xAAu8; 10];
        buf.copy_to_user(&[1, 2]).unwrap();
        assert_eq!(buf[..3], [1, 2, 0xAA]);
    }

    #[test]
    fn vma_defaults_to_the_region_base() {
        let vma = Vma::new(VirtualAddress::new(0x7f00_0000_0000), 4096, Protection::READ_WRITE);
        assert_eq!(vma.page_offset(), 0);
        assert_eq!(vma.with_page_offset(3).page_offset(), 3);
        assert!(!vma.is_empty());
        assert!(vma.protection().contains(Protection::WRITE));
    }
}
