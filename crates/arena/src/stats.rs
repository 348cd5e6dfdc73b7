//! Statistics for the allocation policy
//!
//! Counters are atomics so they can be read without claiming the arena lock.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::error::ArenaError;
use crate::policy::Plan;

/// Per-plan placement counters
#[derive(Debug)]
pub struct PolicyStats {
    // Placements by plan, indexed by `Plan::index`
    placements: [AtomicU64; Plan::COUNT],
    bytes_placed: AtomicUsize,

    // Failures by class
    commit_limit_failures: AtomicU64,
    growth_failures: AtomicU64,
    exhaustion_failures: AtomicU64,
    // Invalid operations and overflows surfaced by the land or a grower
    other_failures: AtomicU64,

    // Tracts returned
    frees: AtomicU64,
    bytes_freed: AtomicUsize,

    created_at: Instant,
}

impl Default for PolicyStats {
    fn default() -> Self {
        Self {
            placements: Default::default(),
            bytes_placed: AtomicUsize::new(0),
            commit_limit_failures: AtomicU64::new(0),
            growth_failures: AtomicU64::new(0),
            exhaustion_failures: AtomicU64::new(0),
            other_failures: AtomicU64::new(0),
            frees: AtomicU64::new(0),
            bytes_freed: AtomicUsize::new(0),
            created_at: Instant::now(),
        }
    }
}

impl PolicyStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Placements made by `plan`
    pub fn placements(&self, plan: Plan) -> u64 {
        self.placements[plan.index()].load(Ordering::Relaxed)
    }

    /// Placements over all plans
    pub fn total_placements(&self) -> u64 {
        self.placements
            .iter()
            .map(|counter| counter.load(Ordering::Relaxed))
            .sum()
    }

    /// Placements that gave up zone purity (Plan D and the last resort)
    pub fn degraded_placements(&self) -> u64 {
        self.placements(Plan::Unavoided) + self.placements(Plan::Anywhere)
    }

    pub fn bytes_placed(&self) -> usize {
        self.bytes_placed.load(Ordering::Relaxed)
    }

    pub fn commit_limit_failures(&self) -> u64 {
        self.commit_limit_failures.load(Ordering::Relaxed)
    }

    pub fn growth_failures(&self) -> u64 {
        self.growth_failures.load(Ordering::Relaxed)
    }

    pub fn exhaustion_failures(&self) -> u64 {
        self.exhaustion_failures.load(Ordering::Relaxed)
    }

    pub fn other_failures(&self) -> u64 {
        self.other_failures.load(Ordering::Relaxed)
    }

    pub fn total_failures(&self) -> u64 {
        self.commit_limit_failures()
            + self.growth_failures()
            + self.exhaustion_failures()
            + self.other_failures()
    }

    pub fn frees(&self) -> u64 {
        self.frees.load(Ordering::Relaxed)
    }

    pub fn bytes_freed(&self) -> usize {
        self.bytes_freed.load(Ordering::Relaxed)
    }

    /// Fraction of placements that stayed inside the preferred or free zones
    pub fn zone_precision(&self) -> f64 {
        let total = self.total_placements();
        if total == 0 {
            1.0
        } else {
            1.0 - self.degraded_placements() as f64 / total as f64
        }
    }

    pub fn uptime(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub(crate) fn record_placement(&self, plan: Plan, size: usize) {
        self.placements[plan.index()].fetch_add(1, Ordering::Relaxed);
        self.bytes_placed.fetch_add(size, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self, error: &ArenaError) {
        let counter = match error {
            ArenaError::CommitLimitExceeded { .. } => &self.commit_limit_failures,
            ArenaError::ResourceExhausted { .. } => &self.exhaustion_failures,
            ArenaError::GrowthFailed { .. } => &self.growth_failures,
            _ => &self.other_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_free(&self, size: usize) {
        self.frees.fetch_add(1, Ordering::Relaxed);
        self.bytes_freed.fetch_add(size, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> PolicyStatsSnapshot {
        PolicyStatsSnapshot {
            placements: Plan::ALL.map(|plan| self.placements(plan)),
            bytes_placed: self.bytes_placed(),
            commit_limit_failures: self.commit_limit_failures(),
            growth_failures: self.growth_failures(),
            exhaustion_failures: self.exhaustion_failures(),
            other_failures: self.other_failures(),
            frees: self.frees(),
            bytes_freed: self.bytes_freed(),
        }
    }
}

/// Plain copy of [`PolicyStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PolicyStatsSnapshot {
    pub placements: [u64; Plan::COUNT],
    pub bytes_placed: usize,
    pub commit_limit_failures: u64,
    pub growth_failures: u64,
    pub exhaustion_failures: u64,
    pub other_failures: u64,
    pub frees: u64,
    pub bytes_freed: usize,
}

impl PolicyStatsSnapshot {
    pub fn placements(&self, plan: Plan) -> u64 {
        self.placements[plan.index()]
    }
}
