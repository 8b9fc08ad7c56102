//! # The device object
//!
//! [`HugePageDevice`] owns the [`ActiveMapping`] once it is installed and
//! hands out [`Session`]s. The slot is behind a reader/writer lock: queries
//! and mmaps from any number of sessions share the read side, while
//! [`install`](HugePageDevice::install) and
//! [`teardown`](HugePageDevice::teardown) take the write side.
//!
//! ```text
//!   Unmapped ──install──► Live ──teardown──► TornDown
//!                          ▲                     │
//!                          └──────install────────┘
//! ```

use crate::{DeviceError, Session};
use core::fmt;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use hugemem_region::{ActiveMapping, IoRemap};
use log::{info, warn};
use spin::RwLock;

enum Slot<R: IoRemap> {
    Unmapped,
    Live(ActiveMapping<R>),
    TornDown,
}

impl<R: IoRemap> Slot<R> {
    const fn live(&self) -> Option<&ActiveMapping<R>> {
        match self {
            Self::Live(mapping) => Some(mapping),
            Self::Unmapped | Self::TornDown => None,
        }
    }

    const fn name(&self) -> &'static str {
        match self {
            Self::Unmapped => "unmapped",
            Self::Live(_) => "live",
            Self::TornDown => "torn down",
        }
    }
}

/// A character device exposing one reserved region.
pub struct HugePageDevice<R: IoRemap> {
    slot: RwLock<Slot<R>>,
    open_sessions: AtomicUsize,
    next_session_id: AtomicU64,
}

impl<R: IoRemap> HugePageDevice<R> {
    /// A device with no region installed yet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slot: RwLock::new(Slot::Unmapped),
            open_sessions: AtomicUsize::new(0),
            next_session_id: AtomicU64::new(1),
        }
    }

    /// A device serving `mapping` from the start.
    #[must_use]
    pub const fn from_mapping(mapping: ActiveMapping<R>) -> Self {
        Self {
            slot: RwLock::new(Slot::Live(mapping)),
            open_sessions: AtomicUsize::new(0),
            next_session_id: AtomicU64::new(1),
        }
    }

    /// Start serving `mapping`.
    ///
    /// # Errors
    /// [`DeviceError::AlreadyInitialized`] if a mapping is already live. The
    /// rejected mapping is dropped, which unmaps it.
    pub fn install(&self, mapping: ActiveMapping<R>) -> Result<(), DeviceError> {
        let mut slot = self.slot.write();
        if slot.live().is_some() {
            warn!(
                "rejecting second mapping of {}: device already live",
                mapping.physical_base()
            );
            return Err(DeviceError::AlreadyInitialized);
        }

        info!("device serving reserved region {}", mapping.physical_base());
        *slot = Slot::Live(mapping);
        Ok(())
    }

    /// Stop serving the region and unmap it.
    ///
    /// # Errors
    /// - [`DeviceError::Busy`] while sessions are open or user mappings of
    ///   the region are alive. Nothing changes in that case.
    /// - [`DeviceError::NotReady`] if no mapping is live.
    pub fn teardown(&self) -> Result<(), DeviceError> {
        let mut slot = self.slot.write();
        let Some(mapping) = slot.live() else {
            return Err(DeviceError::NotReady);
        };

        let sessions = self.open_sessions.load(Ordering::Acquire);
        let mappings = mapping.outstanding_leases();
        if sessions > 0 || mappings > 0 {
            warn!("teardown refused: {sessions} open session(s), {mappings} user mapping(s)");
            return Err(DeviceError::Busy { sessions, mappings });
        }

        if let Slot::Live(mapping) = core::mem::replace(&mut *slot, Slot::TornDown) {
            if let Err(err) = mapping.teardown() {
                // not expected: leases are only taken under the read lock
                let mappings = err.outstanding;
                *slot = Slot::Live(err.into_mapping());
                return Err(DeviceError::Busy {
                    sessions: 0,
                    mappings,
                });
            }
        }

        info!("device torn down");
        Ok(())
    }

    /// Open a new session. Always succeeds.
    #[must_use]
    pub fn open(&self) -> Session<'_, R> {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let open = self.open_sessions.fetch_add(1, Ordering::AcqRel) + 1;
        log::debug!("session {id} opened ({open} open)");
        Session::new(self, id)
    }

    pub(crate) fn session_released(&self, id: u64) {
        let open = self.open_sessions.fetch_sub(1, Ordering::AcqRel) - 1;
        log::debug!("session {id} released ({open} open)");
    }

    /// Run `f` against the live mapping under the shared lock.
    ///
    /// # Errors
    /// [`DeviceError::NotReady`] if no mapping is live, otherwise whatever `f`
    /// returns.
    pub fn with_mapping<T>(
        &self,
        f: impl FnOnce(&ActiveMapping<R>) -> Result<T, DeviceError>,
    ) -> Result<T, DeviceError> {
        let slot = self.slot.read();
        let mapping = slot.live().ok_or(DeviceError::NotReady)?;
        f(mapping)
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.slot.read().live().is_some()
    }

    #[must_use]
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::Acquire)
    }

    /// Live user mappings of the region, or zero if nothing is mapped.
    #[must_use]
    pub fn outstanding_mappings(&self) -> usize {
        self.slot
            .read()
            .live()
            .map_or(0, ActiveMapping::outstanding_leases)
    }
}

impl<R: IoRemap> Default for HugePageDevice<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: IoRemap> fmt::Debug for HugePageDevice<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.read();
        f.debug_struct("HugePageDevice")
            .field("state", &slot.name())
            .field("mapping", &slot.live())
            .field("open_sessions", &self.open_sessions())
            .finish_non_exhaustive()
    }
}
