//! Arena configuration

use crate::error::{ArenaError, ArenaResult};

/// Memory size constants
pub mod size {
    /// 1 Kilobyte
    pub const KB: usize = 1024;

    /// 1 Megabyte
    pub const MB: usize = 1024 * KB;

    /// 1 Gigabyte
    pub const GB: usize = 1024 * MB;
}

/// Default allocation grain (one page on most platforms)
pub const DEFAULT_GRAIN: usize = 4096;

/// Default zone stripe shift: 1 MiB stripes, zones repeat every 64 MiB
pub const DEFAULT_ZONE_SHIFT: u32 = 20;

/// Configuration for an [`Arena`](crate::arena::Arena)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArenaConfig {
    /// Ceiling on committed bytes, spare included
    pub commit_limit: usize,

    /// Committed bytes kept for reuse after tracts are freed
    pub spare_commit_limit: usize,

    /// log2 of the zone stripe size
    pub zone_shift: u32,

    /// Allocation unit; tract bases and sizes are multiples of it
    pub grain_size: usize,

    /// Minimum size of a chunk reserved by chunk growth
    pub chunk_size: usize,

    /// Maximum number of chunks chunk growth may reserve
    pub max_chunks: usize,

    /// Record per-plan statistics
    pub track_stats: bool,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            commit_limit: usize::MAX,
            spare_commit_limit: 10 * size::MB,
            zone_shift: DEFAULT_ZONE_SHIFT,
            grain_size: DEFAULT_GRAIN,
            chunk_size: 16 * size::MB,
            max_chunks: 1024,
            track_stats: true,
        }
    }
}

impl ArenaConfig {
    /// Creates new config with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Production configuration - larger chunks, bounded spare cache
    #[must_use]
    pub fn production() -> Self {
        Self {
            spare_commit_limit: 64 * size::MB,
            chunk_size: 64 * size::MB,
            track_stats: false,
            ..Self::default()
        }
    }

    /// Debug configuration - small stripes and chunks so zone effects show up quickly
    #[must_use]
    pub fn debug() -> Self {
        Self {
            spare_commit_limit: 0,
            zone_shift: 16,
            chunk_size: size::MB,
            max_chunks: 64,
            track_stats: true,
            ..Self::default()
        }
    }

    /// Small-footprint configuration for tests and embedded heaps
    #[must_use]
    pub fn small() -> Self {
        Self {
            commit_limit: 64 * size::MB,
            spare_commit_limit: size::MB,
            zone_shift: 16,
            chunk_size: 256 * size::KB,
            max_chunks: 16,
            ..Self::default()
        }
    }

    #[must_use = "builder methods must be chained or built"]
    pub fn with_commit_limit(mut self, limit: usize) -> Self {
        self.commit_limit = limit;
        self
    }

    #[must_use = "builder methods must be chained or built"]
    pub fn with_spare_commit_limit(mut self, limit: usize) -> Self {
        self.spare_commit_limit = limit;
        self
    }

    #[must_use = "builder methods must be chained or built"]
    pub fn with_zone_shift(mut self, shift: u32) -> Self {
        self.zone_shift = shift;
        self
    }

    #[must_use = "builder methods must be chained or built"]
    pub fn with_grain_size(mut self, grain: usize) -> Self {
        self.grain_size = grain;
        self
    }

    #[must_use = "builder methods must be chained or built"]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    #[must_use = "builder methods must be chained or built"]
    pub fn with_max_chunks(mut self, max_chunks: usize) -> Self {
        self.max_chunks = max_chunks;
        self
    }

    #[must_use = "builder methods must be chained or built"]
    pub fn with_stats(mut self, track: bool) -> Self {
        self.track_stats = track;
        self
    }

    /// Size of one zone stripe in bytes
    #[must_use]
    pub fn stripe_size(&self) -> usize {
        1 << self.zone_shift
    }

    /// Rounds `size` up to the grain, `None` on overflow
    #[must_use]
    pub fn round_to_grain(&self, size: usize) -> Option<usize> {
        size.checked_next_multiple_of(self.grain_size)
    }

    /// Validates configuration
    pub fn validate(&self) -> ArenaResult<()> {
        if !self.grain_size.is_power_of_two() || self.grain_size < 8 {
            return Err(ArenaError::invalid_config(
                "grain_size must be a power of two of at least 8",
            ));
        }
        if self.zone_shift < self.grain_size.trailing_zeros() {
            return Err(ArenaError::invalid_config(
                "zone stripes must not be smaller than the grain",
            ));
        }
        if self.zone_shift >= usize::BITS {
            return Err(ArenaError::invalid_config(
                "zone_shift must be less than the address width",
            ));
        }
        if self.chunk_size == 0 || self.chunk_size % self.grain_size != 0 {
            return Err(ArenaError::invalid_config(
                "chunk_size must be a non-zero multiple of grain_size",
            ));
        }
        if self.spare_commit_limit > self.commit_limit {
            return Err(ArenaError::invalid_config(
                "spare_commit_limit must not exceed commit_limit",
            ));
        }
        if self.max_chunks == 0 {
            return Err(ArenaError::invalid_config("max_chunks must be at least 1"));
        }
        Ok(())
    }
}
