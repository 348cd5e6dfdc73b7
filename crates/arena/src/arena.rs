//! Arenas
//!
//! An [`Arena`] owns a region of address space split into zone stripes and
//! hands out [`Tract`]s to pools through the allocation policy. All mutable
//! state lives in an [`ArenaCore`] behind the arena's non-recursive
//! [`Lock`]; the policy and growth strategies receive the core by mutable
//! reference so they never need to claim the lock themselves.
//!
//! # Commitment
//!
//! `committed` counts bytes held by tracts plus `spare_committed`, bytes
//! that were freed but kept for reuse. Spare is consumed before new
//! commitment is taken and is trimmed to
//! [`ArenaConfig::spare_commit_limit`] whenever a tract is freed.
//! `committed` never exceeds the commit limit.

use core::fmt;
use core::num::NonZeroUsize;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

#[cfg(feature = "logging")]
use tracing::{debug, info, trace, warn};

use crate::config::ArenaConfig;
use crate::error::{ArenaError, ArenaResult};
use crate::growth::{ChunkGrowth, FixedGrowth, Grow};
use crate::land::{AddrRange, FreeLand, Land};
use crate::locus::LocusPref;
use crate::lock::{Lock, LockGuard, RecursiveLock};
use crate::policy::{Placement, policy_alloc};
use crate::stats::PolicyStats;
use crate::thread::ThreadRing;
use crate::tract::{PoolId, Tract};
use crate::zone::{Addr, ZoneSet};

/// Name of the pool holding the arena's own bookkeeping
const CONTROL_POOL: &str = "arena-control";

/// Unique identifier for an arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArenaId(NonZeroUsize);

impl ArenaId {
    fn next() -> Self {
        static COUNTER: AtomicUsize = AtomicUsize::new(1);
        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(NonZeroUsize::new(id).unwrap_or(NonZeroUsize::MIN))
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0.get()
    }
}

// ============================================================================
// Global arena ring
// ============================================================================

/// Every live arena, in creation order
static ARENA_RING: LazyLock<RecursiveLock<Vec<ArenaId>>> =
    LazyLock::new(|| RecursiveLock::new(Vec::new()));

/// IDs of all arenas not yet dropped
pub fn live_arenas() -> Vec<ArenaId> {
    ARENA_RING.claim().borrow().clone()
}

fn ring_insert(id: ArenaId) {
    ARENA_RING.claim().borrow_mut().push(id);
}

fn ring_remove(id: ArenaId) {
    let ring = ARENA_RING.claim();
    ring.borrow_mut().retain(|&live| live != id);
}

// ============================================================================
// Core state
// ============================================================================

#[derive(Debug)]
struct PoolRecord {
    name: String,
    tracts: usize,
    bytes: usize,
}

/// Arena state mutated under the arena lock
///
/// Growth strategies receive this directly; everything else goes through
/// [`Arena`].
pub struct ArenaCore {
    id: ArenaId,
    config: ArenaConfig,

    committed: usize,
    spare_committed: usize,
    commit_limit: usize,
    reserved: usize,
    free_zones: ZoneSet,
    growths: u64,

    land: Box<dyn Land>,
    tracts: BTreeMap<Addr, Tract>,
    pools: HashMap<PoolId, PoolRecord>,
    control_pool: PoolId,
    pub(crate) threads: ThreadRing,
}

impl ArenaCore {
    fn new(id: ArenaId, config: ArenaConfig, land: Box<dyn Land>) -> Self {
        let control_pool = PoolId::next();
        let mut pools = HashMap::new();
        pools.insert(
            control_pool,
            PoolRecord {
                name: CONTROL_POOL.to_string(),
                tracts: 0,
                bytes: 0,
            },
        );
        let free_zones = land.free_zones(config.zone_shift);
        let reserved = land.total_free();

        Self {
            id,
            commit_limit: config.commit_limit,
            config,
            committed: 0,
            spare_committed: 0,
            reserved,
            free_zones,
            growths: 0,
            land,
            tracts: BTreeMap::new(),
            pools,
            control_pool,
            threads: ThreadRing::default(),
        }
    }

    pub fn id(&self) -> ArenaId {
        self.id
    }

    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    #[inline]
    pub fn zone_shift(&self) -> u32 {
        self.config.zone_shift
    }

    #[inline]
    pub fn grain_size(&self) -> usize {
        self.config.grain_size
    }

    /// Committed bytes, spare included
    pub fn committed(&self) -> usize {
        self.committed
    }

    /// Committed bytes held for reuse
    pub fn spare_committed(&self) -> usize {
        self.spare_committed
    }

    pub fn commit_limit(&self) -> usize {
        self.commit_limit
    }

    /// Address space ever added to the arena
    pub fn reserved(&self) -> usize {
        self.reserved
    }

    /// Zones touched by free address space
    pub fn free_zones(&self) -> ZoneSet {
        self.free_zones
    }

    /// Free bytes left in the land
    pub fn free_bytes(&self) -> usize {
        self.land.total_free()
    }

    pub fn land(&self) -> &dyn Land {
        self.land.as_ref()
    }

    /// Successful growths so far
    pub fn growths(&self) -> u64 {
        self.growths
    }

    pub fn tract_count(&self) -> usize {
        self.tracts.len()
    }

    pub fn has_pool(&self, pool: PoolId) -> bool {
        self.pools.contains_key(&pool)
    }

    pub(crate) fn control_pool(&self) -> PoolId {
        self.control_pool
    }

    pub(crate) fn note_growth(&mut self) {
        self.growths += 1;
    }

    /// New commitment `size` more bytes would take, after spare is used.
    ///
    /// # Errors
    ///
    /// [`ArenaError::CommitLimitExceeded`] when that commitment would pass
    /// the limit or overflow.
    pub fn check_commit(&self, size: usize) -> ArenaResult<usize> {
        if self.spare_committed >= size {
            return Ok(0);
        }
        let need = size - self.spare_committed;
        match self.committed.checked_add(need) {
            Some(total) if total <= self.commit_limit => Ok(need),
            _ => Err(ArenaError::commit_limit(
                self.committed,
                need,
                self.commit_limit,
            )),
        }
    }

    /// Adds free address space.
    ///
    /// # Errors
    ///
    /// [`ArenaError::InvalidOperation`] when the range is empty, not grain
    /// aligned, or overlaps space the arena already holds.
    pub fn add_range(&mut self, range: AddrRange) -> ArenaResult<()> {
        let grain = self.grain_size();
        if range.is_empty() || range.base % grain != 0 || range.limit % grain != 0 {
            return Err(ArenaError::invalid_operation(format!(
                "range {range:?} is empty or not aligned to {grain} bytes"
            )));
        }
        if self.overlaps_tract(range) {
            return Err(ArenaError::invalid_operation(format!(
                "range {range:?} overlaps an allocated tract"
            )));
        }
        let reserved = self
            .reserved
            .checked_add(range.size())
            .ok_or_else(|| ArenaError::size_overflow("reserved address space"))?;

        self.land.insert(range)?;
        self.reserved = reserved;
        self.refresh_free_zones();

        #[cfg(feature = "logging")]
        debug!(
            arena = self.id.get(),
            ?range,
            free_zones = %self.free_zones,
            "address space added"
        );
        Ok(())
    }

    /// Allocates `size` bytes lying wholly in `zones`.
    ///
    /// Nothing changes unless the whole allocation succeeds.
    ///
    /// # Errors
    ///
    /// - [`ArenaError::ResourceExhausted`] when no free span fits.
    /// - [`ArenaError::CommitLimitExceeded`] when the span cannot be
    ///   committed.
    pub fn alloc_range(
        &mut self,
        zones: ZoneSet,
        high: bool,
        size: usize,
        pool: PoolId,
    ) -> ArenaResult<Tract> {
        let range = self
            .land
            .find_in_zones(size, zones, high, self.zone_shift())
            .ok_or_else(|| ArenaError::exhausted(size, zones))?;
        let new_commit = self.check_commit(size)?;

        self.land.delete(range)?;
        self.spare_committed -= size - new_commit;
        self.committed += new_commit;
        self.refresh_free_zones();

        let tract = Tract::new(range, pool);
        self.tracts.insert(range.base, tract);
        if let Some(record) = self.pools.get_mut(&pool) {
            record.tracts += 1;
            record.bytes += size;
        }

        #[cfg(feature = "logging")]
        trace!(
            arena = self.id.get(),
            ?range,
            pool = pool.get(),
            committed = self.committed,
            "tract allocated"
        );
        Ok(tract)
    }

    /// Returns a tract's memory to the land, keeping it committed as spare.
    ///
    /// # Errors
    ///
    /// [`ArenaError::InvalidOperation`] for a tract this arena did not
    /// hand out or that was already freed.
    pub fn free_tract(&mut self, tract: &Tract) -> ArenaResult<()> {
        let stored = self
            .tracts
            .get(&tract.base())
            .copied()
            .filter(|stored| stored == tract)
            .ok_or_else(|| {
                ArenaError::invalid_operation(format!(
                    "tract at {:#x} is not allocated in this arena",
                    tract.base()
                ))
            })?;

        self.land.insert(stored.range())?;
        self.tracts.remove(&stored.base());
        if let Some(record) = self.pools.get_mut(&stored.pool()) {
            record.tracts = record.tracts.saturating_sub(1);
            record.bytes = record.bytes.saturating_sub(stored.size());
        }

        self.spare_committed += stored.size();
        self.purge_spare(self.config.spare_commit_limit);
        self.refresh_free_zones();
        Ok(())
    }

    /// Tract containing `addr`
    pub fn tract_of(&self, addr: Addr) -> Option<Tract> {
        self.tracts
            .range(..=addr)
            .next_back()
            .map(|(_, tract)| *tract)
            .filter(|tract| tract.contains(addr))
    }

    pub(crate) fn set_commit_limit(&mut self, limit: usize) -> ArenaResult<()> {
        let in_use = self.committed - self.spare_committed;
        if in_use > limit {
            return Err(ArenaError::commit_limit(in_use, 0, limit));
        }
        if self.committed > limit {
            let keep = self.spare_committed - (self.committed - limit);
            self.purge_spare(keep);
        }
        self.commit_limit = limit;

        #[cfg(feature = "logging")]
        info!(arena = self.id.get(), limit, "commit limit changed");
        Ok(())
    }

    pub(crate) fn create_pool(&mut self, name: String) -> PoolId {
        let id = PoolId::next();

        #[cfg(feature = "logging")]
        debug!(arena = self.id.get(), pool = id.get(), %name, "pool created");

        self.pools.insert(
            id,
            PoolRecord {
                name,
                tracts: 0,
                bytes: 0,
            },
        );
        id
    }

    pub(crate) fn destroy_pool(&mut self, pool: PoolId) -> ArenaResult<()> {
        if pool == self.control_pool {
            return Err(ArenaError::invalid_operation(
                "the control pool cannot be destroyed",
            ));
        }
        let record = self.pools.get(&pool).ok_or_else(|| {
            ArenaError::invalid_operation(format!("pool {} is not registered", pool.get()))
        })?;
        if record.tracts > 0 {
            return Err(ArenaError::invalid_operation(format!(
                "pool '{}' still holds {} tracts",
                record.name, record.tracts
            )));
        }
        self.pools.remove(&pool);
        Ok(())
    }

    pub(crate) fn pool_bytes(&self, pool: PoolId) -> Option<usize> {
        self.pools.get(&pool).map(|record| record.bytes)
    }

    pub(crate) fn pool_name(&self, pool: PoolId) -> Option<&str> {
        self.pools.get(&pool).map(|record| record.name.as_str())
    }

    /// Decommits spare beyond `keep` bytes
    fn purge_spare(&mut self, keep: usize) {
        if self.spare_committed <= keep {
            return;
        }
        let excess = self.spare_committed - keep;
        self.spare_committed = keep;
        self.committed -= excess;

        #[cfg(feature = "logging")]
        trace!(arena = self.id.get(), excess, "spare decommitted");
    }

    fn refresh_free_zones(&mut self) {
        self.free_zones = self.land.free_zones(self.zone_shift());
    }

    fn overlaps_tract(&self, range: AddrRange) -> bool {
        self.tracts
            .range(..range.limit)
            .next_back()
            .is_some_and(|(_, tract)| tract.range().overlaps(&range))
    }
}

impl fmt::Debug for ArenaCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArenaCore")
            .field("id", &self.id)
            .field("committed", &self.committed)
            .field("spare_committed", &self.spare_committed)
            .field("commit_limit", &self.commit_limit)
            .field("reserved", &self.reserved)
            .field("free_zones", &self.free_zones)
            .field("tracts", &self.tracts.len())
            .field("pools", &self.pools.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Arena handle
// ============================================================================

pub(crate) struct ArenaState {
    pub(crate) core: ArenaCore,
    pub(crate) grower: Box<dyn Grow>,
}

/// Zone-segregated arena
///
/// `Arena` is `Send + Sync`; share it with `Arc` and every operation claims
/// the arena lock for its whole duration.
pub struct Arena {
    id: ArenaId,
    config: ArenaConfig,
    state: Lock<ArenaState>,
    stats: PolicyStats,
}

impl Arena {
    /// Creates an empty arena that grows with `grower`.
    ///
    /// # Errors
    ///
    /// [`ArenaError::InvalidConfig`] when `config` does not validate.
    pub fn new(config: ArenaConfig, grower: impl Grow + 'static) -> ArenaResult<Self> {
        Self::with_land(config, FreeLand::new(), grower)
    }

    /// Creates an arena over a caller-supplied land.
    ///
    /// Space already free in `land` counts as reserved.
    pub fn with_land(
        config: ArenaConfig,
        land: impl Land + 'static,
        grower: impl Grow + 'static,
    ) -> ArenaResult<Self> {
        config.validate()?;

        let id = ArenaId::next();
        let core = ArenaCore::new(id, config.clone(), Box::new(land));

        #[cfg(feature = "logging")]
        info!(
            arena = id.get(),
            grower = grower.name(),
            zone_shift = config.zone_shift,
            commit_limit = config.commit_limit,
            "arena created"
        );

        ring_insert(id);
        Ok(Self {
            id,
            config,
            state: Lock::new(ArenaState {
                core,
                grower: Box::new(grower),
            }),
            stats: PolicyStats::new(),
        })
    }

    /// Arena that grows by reserving heap chunks
    pub fn with_chunks(config: ArenaConfig) -> ArenaResult<Self> {
        let growth = ChunkGrowth::new(&config);
        Self::new(config, growth)
    }

    /// Arena limited to the space given to [`Arena::extend`]
    pub fn fixed(config: ArenaConfig) -> ArenaResult<Self> {
        Self::new(config, FixedGrowth)
    }

    pub fn id(&self) -> ArenaId {
        self.id
    }

    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    /// Placement statistics
    pub fn stats(&self) -> &PolicyStats {
        &self.stats
    }

    /// Adds `size` bytes of address space starting at `base`.
    pub fn extend(&self, base: Addr, size: usize) -> ArenaResult<()> {
        let range = AddrRange::with_size(base, size)
            .ok_or_else(|| ArenaError::size_overflow("arena extension"))?;
        self.claim_state().core.add_range(range)
    }

    /// Registers a pool with this arena
    pub fn create_pool(&self, name: impl Into<String>) -> PoolId {
        self.claim_state().core.create_pool(name.into())
    }

    /// Unregisters a pool that holds no tracts.
    pub fn destroy_pool(&self, pool: PoolId) -> ArenaResult<()> {
        self.claim_state().core.destroy_pool(pool)
    }

    /// Bytes currently held by `pool`
    pub fn pool_bytes(&self, pool: PoolId) -> Option<usize> {
        self.claim_state().core.pool_bytes(pool)
    }

    pub fn pool_name(&self, pool: PoolId) -> Option<String> {
        self.claim_state().core.pool_name(pool).map(str::to_owned)
    }

    /// Allocates a tract of `size` bytes for `pool`.
    ///
    /// `size` must be a non-zero multiple of the grain.
    pub fn alloc(&self, pool: PoolId, pref: &LocusPref, size: usize) -> ArenaResult<Tract> {
        self.place(pool, pref, size).map(|placement| placement.tract)
    }

    /// Like [`Arena::alloc`], reporting which plan placed the tract
    pub fn place(&self, pool: PoolId, pref: &LocusPref, size: usize) -> ArenaResult<Placement> {
        let mut state = self.claim_state();
        let ArenaState { core, grower } = &mut *state;
        let result = policy_alloc(core, grower.as_mut(), pref, size, pool);
        drop(state);

        self.record_result(&result);
        result
    }

    /// Frees a tract allocated from this arena.
    pub fn free(&self, tract: Tract) -> ArenaResult<()> {
        self.claim_state().core.free_tract(&tract)?;
        self.record_free(tract.size());
        Ok(())
    }

    /// Tract containing `addr`, if allocated
    pub fn tract_of(&self, addr: Addr) -> Option<Tract> {
        self.claim_state().core.tract_of(addr)
    }

    /// Changes the commit limit, decommitting spare if needed.
    ///
    /// # Errors
    ///
    /// [`ArenaError::CommitLimitExceeded`] when tracts alone hold more than
    /// `limit`; the old limit stays in force.
    pub fn set_commit_limit(&self, limit: usize) -> ArenaResult<()> {
        self.claim_state().core.set_commit_limit(limit)
    }

    pub fn commit_limit(&self) -> usize {
        self.claim_state().core.commit_limit()
    }

    pub fn committed(&self) -> usize {
        self.claim_state().core.committed()
    }

    pub fn spare_committed(&self) -> usize {
        self.claim_state().core.spare_committed()
    }

    pub fn reserved(&self) -> usize {
        self.claim_state().core.reserved()
    }

    pub fn free_zones(&self) -> ZoneSet {
        self.claim_state().core.free_zones()
    }

    pub fn free_bytes(&self) -> usize {
        self.claim_state().core.free_bytes()
    }

    pub fn growths(&self) -> u64 {
        self.claim_state().core.growths()
    }

    /// Runs `f` with the arena claimed
    ///
    /// `f` must not call back into this arena.
    pub fn with_core<R>(&self, f: impl FnOnce(&mut ArenaCore) -> R) -> R {
        f(&mut self.claim_state().core)
    }

    pub(crate) fn claim_state(&self) -> LockGuard<'_, ArenaState> {
        self.state.claim()
    }

    pub(crate) fn record_result(&self, result: &ArenaResult<Placement>) {
        if !self.config.track_stats {
            return;
        }
        match result {
            Ok(placement) => self
                .stats
                .record_placement(placement.plan, placement.tract.size()),
            Err(error) => self.stats.record_failure(error),
        }
    }

    pub(crate) fn record_free(&self, size: usize) {
        if self.config.track_stats {
            self.stats.record_free(size);
        }
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("id", &self.id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        ring_remove(self.id);

        #[cfg(feature = "logging")]
        {
            let state = self.state.claim();
            if state.core.threads.len() > 0 {
                warn!(
                    arena = self.id.get(),
                    threads = state.core.threads.len(),
                    "arena dropped with registered threads"
                );
            }
            debug!(
                arena = self.id.get(),
                tracts = state.core.tract_count(),
                "arena destroyed"
            );
        }
    }
}
