//! Tracts and pool identities
//!
//! A [`Tract`] is one span of arena memory handed to a pool. The pool is
//! referenced by [`PoolId`] only; the memory itself stays owned by the arena
//! until the tract is freed.

use core::num::NonZeroUsize;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::land::AddrRange;
use crate::zone::{Addr, ZoneSet};

/// Unique identifier for a pool registered with an arena
///
/// Uses `NonZeroUsize` so `Option<PoolId>` stays one word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolId(NonZeroUsize);

impl PoolId {
    /// Generate a new process-unique pool ID
    #[must_use]
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicUsize = AtomicUsize::new(1);
        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(NonZeroUsize::new(id).unwrap_or(NonZeroUsize::MIN))
    }

    /// Raw ID value
    #[inline]
    #[must_use]
    pub fn get(self) -> usize {
        self.0.get()
    }
}

/// Span of arena memory owned by a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tract {
    base: Addr,
    size: usize,
    pool: PoolId,
}

impl Tract {
    pub(crate) fn new(range: AddrRange, pool: PoolId) -> Self {
        Self {
            base: range.base,
            size: range.size(),
            pool,
        }
    }

    #[inline]
    #[must_use]
    pub fn base(&self) -> Addr {
        self.base
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    #[must_use]
    pub fn limit(&self) -> Addr {
        self.base + self.size
    }

    /// Owning pool
    #[inline]
    #[must_use]
    pub fn pool(&self) -> PoolId {
        self.pool
    }

    #[must_use]
    pub fn range(&self) -> AddrRange {
        AddrRange::new(self.base, self.limit())
    }

    /// Zones touched by this tract
    #[must_use]
    pub fn zones(&self, zone_shift: u32) -> ZoneSet {
        self.range().zones(zone_shift)
    }

    #[must_use]
    pub fn contains(&self, addr: Addr) -> bool {
        self.range().contains(addr)
    }
}
