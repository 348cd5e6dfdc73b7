//! Arena growth strategies
//!
//! When a request cannot be placed in the address space the arena already
//! holds, the allocation policy asks a [`Grow`] implementation for more.
//! Growth adds ranges through [`ArenaCore::add_range`]; it never places the
//! request itself.

#![allow(unsafe_code)]

use std::alloc::{Layout, alloc, dealloc};
use std::ptr::NonNull;

#[cfg(feature = "logging")]
use tracing::{debug, info};

use crate::arena::ArenaCore;
use crate::config::ArenaConfig;
use crate::error::{ArenaError, ArenaResult};
use crate::land::AddrRange;
use crate::locus::LocusPref;

/// Source of new address space for an arena
///
/// Called with the arena lock held. Implementations must not touch the
/// owning [`Arena`](crate::arena::Arena) handle, only the core passed in.
pub trait Grow: Send {
    /// Adds at least `size` bytes of address space to `core`.
    ///
    /// Any error is handed back to the allocating caller unchanged.
    fn grow(&mut self, core: &mut ArenaCore, pref: &LocusPref, size: usize) -> ArenaResult<()>;

    /// Short name for logs
    fn name(&self) -> &'static str {
        "custom"
    }
}

impl<F> Grow for F
where
    F: FnMut(&mut ArenaCore, &LocusPref, usize) -> ArenaResult<()> + Send,
{
    fn grow(&mut self, core: &mut ArenaCore, pref: &LocusPref, size: usize) -> ArenaResult<()> {
        self(core, pref, size)
    }
}

// ============================================================================
// Fixed arenas
// ============================================================================

/// Growth for arenas whose address space is supplied up front
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedGrowth;

impl Grow for FixedGrowth {
    fn grow(&mut self, _core: &mut ArenaCore, _pref: &LocusPref, _size: usize) -> ArenaResult<()> {
        Err(ArenaError::growth_failed("fixed arena cannot grow"))
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

// ============================================================================
// Heap chunks
// ============================================================================

/// Chunk of heap memory backing part of an arena
struct Chunk {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl Chunk {
    fn new(size: usize, align: usize) -> ArenaResult<Self> {
        let layout = Layout::from_size_align(size, align)
            .map_err(|_| ArenaError::growth_failed(format!("bad chunk layout: {size} bytes")))?;

        // SAFETY: layout has non-zero size (callers round up to at least one
        // grain) and a power-of-two alignment checked by `from_size_align`.
        let ptr = unsafe { alloc(layout) };
        let ptr = NonNull::new(ptr).ok_or_else(|| {
            ArenaError::growth_failed(format!("system allocator refused {size} bytes"))
        })?;

        Ok(Self { ptr, layout })
    }

    fn range(&self) -> AddrRange {
        let base = self.ptr.as_ptr() as usize;
        AddrRange::new(base, base + self.layout.size())
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        // SAFETY: ptr was returned by `alloc` with this exact layout and is
        // deallocated only here.
        unsafe {
            dealloc(self.ptr.as_ptr(), self.layout);
        }
    }
}

// SAFETY: the chunk owns its allocation; nothing else holds the pointer.
unsafe impl Send for Chunk {}

/// Growth that reserves grain-aligned chunks from the global allocator
///
/// Chunks live as long as the growth strategy, which lives as long as the
/// arena.
pub struct ChunkGrowth {
    chunk_size: usize,
    max_chunks: usize,
    chunks: Vec<Chunk>,
}

impl ChunkGrowth {
    pub fn new(config: &ArenaConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            max_chunks: config.max_chunks,
            chunks: Vec::new(),
        }
    }

    /// Number of chunks reserved so far
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Bytes reserved so far
    pub fn reserved_bytes(&self) -> usize {
        self.chunks.iter().map(|chunk| chunk.layout.size()).sum()
    }
}

impl core::fmt::Debug for ChunkGrowth {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChunkGrowth")
            .field("chunk_size", &self.chunk_size)
            .field("max_chunks", &self.max_chunks)
            .field("chunks", &self.chunks.len())
            .finish()
    }
}

impl Grow for ChunkGrowth {
    fn grow(&mut self, core: &mut ArenaCore, pref: &LocusPref, size: usize) -> ArenaResult<()> {
        if self.chunks.len() >= self.max_chunks {
            return Err(ArenaError::growth_failed(format!(
                "chunk limit of {} reached",
                self.max_chunks
            )));
        }

        let wanted = core
            .config()
            .round_to_grain(size)
            .ok_or_else(|| ArenaError::size_overflow("chunk rounding"))?
            .max(self.chunk_size);

        #[cfg(feature = "logging")]
        debug!(
            wanted,
            zones = %pref.zones(),
            high = pref.high(),
            "reserving arena chunk"
        );
        #[cfg(not(feature = "logging"))]
        let _ = pref;

        let chunk = Chunk::new(wanted, core.grain_size())?;
        core.add_range(chunk.range())?;

        #[cfg(feature = "logging")]
        info!(
            base = chunk.range().base,
            size = wanted,
            chunks = self.chunks.len() + 1,
            "arena grew"
        );

        self.chunks.push(chunk);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "chunk"
    }
}
