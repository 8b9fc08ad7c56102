//! # Client sessions
//!
//! A [`Session`] is one open handle on the device. It borrows the device, so
//! the device outlives every session by construction. Releasing a session
//! leaves any [`UserMapping`] it produced intact.

use crate::ioctl::Request;
use crate::user::{UserAddressSpace, UserBuffer, Vma};
use crate::{DeviceError, HugePageDevice, UserMapping};
use core::fmt;
use hugemem_addresses::{PageSize, PhysicalAddress, Size4K};
use hugemem_region::IoRemap;
use log::{debug, info};

/// Lifecycle of a [`Session`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SessionState {
    Open,
    Released,
}

/// One client's open handle on a [`HugePageDevice`].
pub struct Session<'d, R: IoRemap> {
    device: &'d HugePageDevice<R>,
    id: u64,
    state: SessionState,
}

impl<'d, R: IoRemap> Session<'d, R> {
    pub(crate) const fn new(device: &'d HugePageDevice<R>, id: u64) -> Self {
        Self {
            device,
            id,
            state: SessionState::Open,
        }
    }

    #[inline]
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    #[inline]
    #[must_use]
    pub const fn device(&self) -> &'d HugePageDevice<R> {
        self.device
    }

    const fn ensure_open(&self) -> Result<(), DeviceError> {
        match self.state {
            SessionState::Open => Ok(()),
            SessionState::Released => Err(DeviceError::SessionClosed),
        }
    }

    /// Physical base of the reserved region.
    ///
    /// # Errors
    /// - [`DeviceError::SessionClosed`] on a released session.
    /// - [`DeviceError::NotReady`] if the region is not mapped.
    pub fn query_physical_address(&self) -> Result<PhysicalAddress, DeviceError> {
        self.ensure_open()?;
        let base = self.device.with_mapping(|mapping| Ok(mapping.physical_base()))?;
        info!("session {}: phys_addr = {base}", self.id);
        Ok(base)
    }

    /// Handle a control request, writing any reply into `arg`.
    ///
    /// # Errors
    /// - [`DeviceError::UnknownRequest`] for anything but a known request.
    /// - [`DeviceError::BadTransfer`] if the reply does not fit `arg`.
    /// - Anything [`query_physical_address`](Self::query_physical_address) reports.
    pub fn ioctl<B: UserBuffer + ?Sized>(&self, cmd: u32, arg: &mut B) -> Result<(), DeviceError> {
        self.ensure_open()?;
        match Request::decode(cmd)? {
            Request::GetPhysAddr => {
                let base = self.query_physical_address()?;
                arg.copy_to_user(&base.as_u64().to_le_bytes())?;
                Ok(())
            }
        }
    }

    /// Map `vma.len()` bytes of the region, starting `vma.page_offset()` pages
    /// in, into `space` at `vma.start()`.
    ///
    /// The first mapped frame is the region's first frame plus
    /// `vma.page_offset()`. The length is rounded up to whole pages, as `mmap`
    /// does, and the returned [`UserMapping`] covers the rounded range.
    /// Either the whole range is mapped or nothing is.
    ///
    /// # Errors
    /// - [`DeviceError::EmptyRange`] for a zero-length request.
    /// - [`DeviceError::TooLong`] if offset plus rounded length exceeds the
    ///   region.
    /// - [`DeviceError::MappingRejected`] if `space` refuses the translation.
    /// - [`DeviceError::SessionClosed`] / [`DeviceError::NotReady`] as for queries.
    pub fn establish_mapping<A: UserAddressSpace + ?Sized>(
        &self,
        space: &mut A,
        vma: &Vma,
    ) -> Result<UserMapping, DeviceError> {
        self.ensure_open()?;
        if vma.is_empty() {
            return Err(DeviceError::EmptyRange);
        }

        self.device.with_mapping(|mapping| {
            let available = mapping.mapped_size();
            let too_long = DeviceError::TooLong {
                requested: vma.len(),
                offset: vma.page_offset(),
                available,
            };

            let len = vma
                .len()
                .checked_next_multiple_of(Size4K::SIZE)
                .ok_or(too_long)?;
            let offset = vma
                .page_offset()
                .checked_mul(Size4K::SIZE)
                .ok_or(too_long)?;
            let fits = offset
                .checked_add(len)
                .is_some_and(|end| end <= available);
            if !fits {
                return Err(too_long);
            }

            let pfn = mapping.frame_at(offset)?;
            space
                .remap_pfn_range(vma.start(), pfn, len, vma.protection(), mapping.lease())
                .map_err(DeviceError::MappingRejected)?;

            debug!(
                "session {}: mapped {len:#x} bytes of {} at {}",
                self.id,
                pfn.base(),
                vma.start()
            );
            Ok(UserMapping::new(vma.start(), len, pfn, vma.protection()))
        })
    }

    /// Close the session. Existing user mappings stay valid.
    ///
    /// # Errors
    /// [`DeviceError::SessionClosed`] if already released.
    pub fn release(&mut self) -> Result<(), DeviceError> {
        self.ensure_open()?;
        self.state = SessionState::Released;
        self.device.session_released(self.id);
        Ok(())
    }
}

impl<R: IoRemap> Drop for Session<'_, R> {
    fn drop(&mut self) {
        if self.state == SessionState::Open {
            self.state = SessionState::Released;
            self.device.session_released(self.id);
        }
    }
}

impl<R: IoRemap> fmt::Debug for Session<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
