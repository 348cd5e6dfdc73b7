//! # stratum-arena
//!
//! Zone-segregated arena allocation for garbage-collected runtimes.
//!
//! The arena divides its address space into zone stripes and tracks which
//! zones hold free memory. Pools ask for tracts with a [`LocusPref`]
//! naming the zones they would like and the zones they must stay out of.
//! The allocation policy keeps each kind of object in its own zones for as
//! long as it can, grows the arena before mixing zones, and only places
//! memory in avoided zones as a last resort.
//!
//! ## Quick Start
//!
//! ```rust
//! use stratum_arena::prelude::*;
//!
//! # fn main() -> stratum_arena::ArenaResult<()> {
//! let arena = Arena::with_chunks(ArenaConfig::small())?;
//! let nursery = arena.create_pool("nursery");
//!
//! let pref = LocusPref::new()
//!     .with_zones(ZoneSet::from_zones([1, 2]))
//!     .with_avoid(ZoneSet::single(0));
//! let tract = arena.alloc(nursery, &pref, 4096)?;
//! assert_eq!(tract.size(), 4096);
//!
//! arena.free(tract)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - `logging` (default): structured `tracing` events from the policy,
//!   growth and error paths
//! - `subscriber`: [`logging`] helpers that install a `tracing-subscriber`
//!   formatter
//!
//! ## Architecture
//!
//! - [`zone`]: zone sets and the address-to-zone mapping
//! - [`land`]: free address-space search restricted to zone sets
//! - [`policy`]: the placement policy
//! - [`growth`]: pluggable growth strategies
//! - [`arena`]: arena state, commit accounting, pools and the arena ring
//! - [`lock`]: claim-counted locks
//! - [`thread`]: per-arena thread registration

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(clippy::all)]
#![warn(clippy::perf)]
#![warn(clippy::pedantic)]
#![warn(rust_2018_idioms)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
// Precision loss in u64 -> f64 casts is acceptable for stats
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::double_must_use)]
#![allow(clippy::return_self_not_must_use)]

pub mod arena;
pub mod config;
pub mod error;
pub mod growth;
pub mod land;
pub mod lock;
pub mod locus;
#[cfg(feature = "subscriber")]
#[cfg_attr(docsrs, doc(cfg(feature = "subscriber")))]
pub mod logging;
pub mod policy;
pub mod stats;
pub mod thread;
pub mod tract;
pub mod zone;

pub use crate::config::ArenaConfig;
pub use crate::error::{ArenaError, ArenaResult, Result};

pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::arena::{Arena, ArenaCore, ArenaId, live_arenas};
    pub use crate::config::{ArenaConfig, size};
    pub use crate::error::{ArenaError, ArenaResult};
    pub use crate::growth::{ChunkGrowth, FixedGrowth, Grow};
    pub use crate::land::{AddrRange, FreeLand, Land};
    pub use crate::locus::{LocusPref, LocusPrefKind};
    pub use crate::policy::{Placement, Plan, policy_alloc};
    pub use crate::stats::{PolicyStats, PolicyStatsSnapshot};
    pub use crate::thread::ThreadHandle;
    pub use crate::tract::{PoolId, Tract};
    pub use crate::zone::{Addr, ZONESET_WIDTH, Zone, ZoneSet, zone_of};
}
