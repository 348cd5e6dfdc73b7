//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use stratum_arena::prelude::*;

pub const SHIFT: u32 = 16;
pub const STRIPE: usize = 1 << SHIFT;
pub const GRAIN: usize = 4096;

/// Compact test-writer subscriber; repeated calls are no-ops.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .without_time()
        .compact()
        .try_init();
}

/// Unlimited commitment, no spare kept, 64 KiB stripes.
pub fn config() -> ArenaConfig {
    ArenaConfig::small()
        .with_zone_shift(SHIFT)
        .with_commit_limit(usize::MAX)
        .with_spare_commit_limit(0)
}

/// First stripe belonging to `zone`
pub fn stripe(zone: Zone) -> AddrRange {
    let base = zone as usize * STRIPE;
    AddrRange::new(base, base + STRIPE)
}

/// First stripe of each zone, as one land
pub fn land_of_zones(zones: &[Zone]) -> FreeLand {
    let mut land = FreeLand::new();
    for &zone in zones {
        land.insert(stripe(zone)).unwrap();
    }
    land
}

/// Zone sets handed to the land's search, in call order
#[derive(Clone, Default)]
pub struct Attempts(Arc<Mutex<Vec<ZoneSet>>>);

impl Attempts {
    pub fn snapshot(&self) -> Vec<ZoneSet> {
        self.0.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

/// Land that records every search and can hide its free zones
pub struct RecordingLand {
    inner: FreeLand,
    attempts: Attempts,
    hide_free_zones: bool,
}

impl RecordingLand {
    pub fn new(inner: FreeLand) -> (Self, Attempts) {
        let attempts = Attempts::default();
        let land = Self {
            inner,
            attempts: attempts.clone(),
            hide_free_zones: false,
        };
        (land, attempts)
    }

    /// Reports no free zones, like a summary that lags behind the land
    pub fn hiding_free_zones(mut self) -> Self {
        self.hide_free_zones = true;
        self
    }
}

impl Land for RecordingLand {
    fn insert(&mut self, range: AddrRange) -> ArenaResult<()> {
        self.inner.insert(range)
    }

    fn delete(&mut self, range: AddrRange) -> ArenaResult<()> {
        self.inner.delete(range)
    }

    fn find_in_zones(
        &self,
        size: usize,
        zones: ZoneSet,
        high: bool,
        zone_shift: u32,
    ) -> Option<AddrRange> {
        self.attempts.0.lock().push(zones);
        self.inner.find_in_zones(size, zones, high, zone_shift)
    }

    fn free_zones(&self, zone_shift: u32) -> ZoneSet {
        if self.hide_free_zones {
            ZoneSet::EMPTY
        } else {
            self.inner.free_zones(zone_shift)
        }
    }

    fn total_free(&self) -> usize {
        self.inner.total_free()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

/// Grower that always fails with `reason`
pub fn failing_grower(reason: &'static str) -> (impl Grow, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let grower = move |_core: &mut ArenaCore, _pref: &LocusPref, _size: usize| -> ArenaResult<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        Err(ArenaError::growth_failed(reason))
    };
    (grower, calls)
}

/// Grower that adds the given ranges, one per call, then succeeds without
/// adding anything
pub fn adding_grower(ranges: Vec<AddrRange>) -> (impl Grow, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut pending = ranges.into_iter();
    let grower = move |core: &mut ArenaCore, _pref: &LocusPref, _size: usize| -> ArenaResult<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        match pending.next() {
            Some(range) => core.add_range(range),
            None => Ok(()),
        }
    };
    (grower, calls)
}

/// Arena over `land` with a recording wrapper
pub fn recording_arena(
    config: ArenaConfig,
    land: FreeLand,
    grower: impl Grow + 'static,
) -> (Arena, Attempts) {
    let (land, attempts) = RecordingLand::new(land);
    let arena = Arena::with_land(config, land, grower).unwrap();
    (arena, attempts)
}

pub fn calls(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}
