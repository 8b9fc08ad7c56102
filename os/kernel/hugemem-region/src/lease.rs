//! # Mapping leases
//!
//! Every user mapping derived from an [`ActiveMapping`](crate::ActiveMapping)
//! carries a [`MappingLease`]. The mapping refuses to tear down while any
//! lease is alive, which turns "unmapped the region while a client still had
//! it mapped" into a checked error instead of silent reuse of the frames.

use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Shared count of live leases for one mapping.
#[derive(Debug, Default)]
pub(crate) struct LeaseCounter {
    live: AtomicUsize,
}

impl LeaseCounter {
    #[inline]
    pub(crate) fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}

/// Proof that something still depends on the active mapping.
///
/// Dropping the lease releases it. Cloning takes out an additional lease.
pub struct MappingLease {
    counter: Arc<LeaseCounter>,
}

impl MappingLease {
    pub(crate) fn acquire(counter: &Arc<LeaseCounter>) -> Self {
        counter.live.fetch_add(1, Ordering::AcqRel);
        Self {
            counter: Arc::clone(counter),
        }
    }

    /// Number of leases (including this one) on the same mapping.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.counter.live()
    }
}

impl Clone for MappingLease {
    fn clone(&self) -> Self {
        Self::acquire(&self.counter)
    }
}

impl Drop for MappingLease {
    fn drop(&mut self) {
        // Release pairs with the Acquire load in teardown.
        self.counter.live.fetch_sub(1, Ordering::Release);
    }
}

impl fmt::Debug for MappingLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingLease")
            .field("outstanding", &self.outstanding())
            .finish()
    }
}
