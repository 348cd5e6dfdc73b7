//! Zone-segregated allocation policy
//!
//! [`policy_alloc`] places one request in the arena's address space. It
//! tries successively wider zone sets and only gives up zone purity after
//! growing the arena has failed to help:
//!
//! | Plan | Zones tried |
//! |------|-------------|
//! | [`Plan::Preferred`] | `zones \ avoid` |
//! | [`Plan::FreeZones`] | the above plus every free zone not avoided |
//! | [`Plan::GrownPreferred`] | `zones \ avoid`, after growing |
//! | [`Plan::GrownFreeZones`] | widened again with the grown free zones |
//! | [`Plan::Unavoided`] | every zone not avoided |
//! | [`Plan::Anywhere`] | every zone |
//!
//! Zones handed to a purpose are never given back, so address space is
//! spent before zone segregation is.

use core::fmt;

#[cfg(feature = "logging")]
use tracing::{debug, trace, warn};

use crate::arena::ArenaCore;
use crate::error::{ArenaError, ArenaResult};
use crate::growth::Grow;
use crate::locus::LocusPref;
use crate::tract::{PoolId, Tract};
use crate::zone::ZoneSet;

/// Step of the policy that produced a placement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Plan {
    /// Plan A: the preferred zones minus avoided ones
    Preferred,
    /// Plan B: preference widened by the zones that already have free space
    FreeZones,
    /// Plan C, first retry after growth
    GrownPreferred,
    /// Plan C, widened retry after growth
    GrownFreeZones,
    /// Plan D: any zone that is not avoided
    Unavoided,
    /// Last resort: any zone at all
    Anywhere,
}

impl Plan {
    pub const COUNT: usize = 6;

    pub const ALL: [Plan; Self::COUNT] = [
        Plan::Preferred,
        Plan::FreeZones,
        Plan::GrownPreferred,
        Plan::GrownFreeZones,
        Plan::Unavoided,
        Plan::Anywhere,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Plan::Preferred => "preferred",
            Plan::FreeZones => "free-zones",
            Plan::GrownPreferred => "grown-preferred",
            Plan::GrownFreeZones => "grown-free-zones",
            Plan::Unavoided => "unavoided",
            Plan::Anywhere => "anywhere",
        }
    }

    /// Whether the placement may have broken zone segregation
    pub const fn is_degraded(self) -> bool {
        matches!(self, Plan::Unavoided | Plan::Anywhere)
    }

    /// Whether the arena grew before this placement
    pub const fn after_growth(self) -> bool {
        !matches!(self, Plan::Preferred | Plan::FreeZones)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Successful policy result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub tract: Tract,
    pub plan: Plan,
    /// Zone set the winning range allocation was restricted to
    pub zones: ZoneSet,
}

/// One range allocation attempt; exhaustion means "try the next plan".
fn attempt(
    core: &mut ArenaCore,
    plan: Plan,
    zones: ZoneSet,
    pref: &LocusPref,
    size: usize,
    pool: PoolId,
) -> ArenaResult<Option<Placement>> {
    #[cfg(feature = "logging")]
    trace!(%plan, %zones, size, "trying range allocation");

    match core.alloc_range(zones, pref.high(), size, pool) {
        Ok(tract) => Ok(Some(Placement { tract, plan, zones })),
        Err(ArenaError::ResourceExhausted { .. }) => Ok(None),
        Err(error) => Err(error),
    }
}

/// Places `size` bytes for `pool` according to `pref`.
///
/// Runs entirely under the caller's claim on the arena. `size` must be a
/// non-zero multiple of the arena grain and `pool` registered with the
/// arena.
///
/// # Errors
///
/// - [`ArenaError::CommitLimitExceeded`] before any search when the request
///   cannot be committed.
/// - Whatever `grower` returns, unchanged, when growth fails.
/// - [`ArenaError::ResourceExhausted`] when no zone at all has room.
pub fn policy_alloc(
    core: &mut ArenaCore,
    grower: &mut dyn Grow,
    pref: &LocusPref,
    size: usize,
    pool: PoolId,
) -> ArenaResult<Placement> {
    debug_assert!(pref.check(), "malformed locus preference");
    debug_assert!(size > 0, "zero-sized allocation");
    debug_assert!(
        size % core.grain_size() == 0,
        "allocation size {size} is not a multiple of the grain"
    );
    debug_assert!(core.has_pool(pool), "pool is not registered with this arena");

    // Step 0: nothing is searched when the request cannot be committed
    core.check_commit(size)?;

    let avoid = pref.avoid();

    // Plan A
    let zones_a = pref.usable_zones();
    if !zones_a.is_empty()
        && let Some(placed) = attempt(core, Plan::Preferred, zones_a, pref, size, pool)?
    {
        return Ok(placed);
    }

    // Plan B
    let zones_b = zones_a | (core.free_zones() - avoid);
    if zones_b != zones_a
        && let Some(placed) = attempt(core, Plan::FreeZones, zones_b, pref, size, pool)?
    {
        return Ok(placed);
    }

    // Plan C: grow only when the preference or the unavoided free zones
    // leave somewhere worth growing for
    let growth_zones = pref.zones() | (core.free_zones() - avoid);
    if !growth_zones.is_empty() {
        #[cfg(feature = "logging")]
        debug!(
            size,
            grower = grower.name(),
            %zones_b,
            "preferred zones full, growing arena"
        );
        grower.grow(core, pref, size)?;
        core.note_growth();

        if !zones_a.is_empty()
            && let Some(placed) = attempt(core, Plan::GrownPreferred, zones_a, pref, size, pool)?
        {
            return Ok(placed);
        }
        let zones_c = zones_b | (core.free_zones() - avoid);
        if zones_c != zones_a
            && let Some(placed) = attempt(core, Plan::GrownFreeZones, zones_c, pref, size, pool)?
        {
            return Ok(placed);
        }
    }

    // Plan D
    let zones_d = ZoneSet::UNIVERSAL - avoid;
    if zones_d != zones_b
        && let Some(placed) = attempt(core, Plan::Unavoided, zones_d, pref, size, pool)?
    {
        #[cfg(feature = "logging")]
        warn!(
            size,
            base = placed.tract.base(),
            preferred = %pref.zones(),
            "placement fell back to unpreferred zones"
        );
        return Ok(placed);
    }

    // Last resort, avoided zones included
    let tract = core.alloc_range(ZoneSet::UNIVERSAL, pref.high(), size, pool)?;

    #[cfg(feature = "logging")]
    warn!(
        size,
        base = tract.base(),
        avoided = %avoid,
        "placement fell back to avoided zones"
    );

    Ok(Placement {
        tract,
        plan: Plan::Anywhere,
        zones: ZoneSet::UNIVERSAL,
    })
}
