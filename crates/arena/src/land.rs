//! Free address-space bookkeeping
//!
//! A [`Land`] records which address spans are free and finds spans whose
//! covering zone stripes all belong to a requested [`ZoneSet`]. The arena
//! owns one land; the allocation policy only reads it through
//! [`Land::find_in_zones`] and commits a result with [`Land::delete`].

use core::fmt;
use std::collections::BTreeMap;

use crate::error::{ArenaError, ArenaResult};
use crate::zone::{Addr, ZoneSet};

/// Half-open address span `[base, limit)`
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddrRange {
    pub base: Addr,
    pub limit: Addr,
}

impl AddrRange {
    #[must_use]
    pub const fn new(base: Addr, limit: Addr) -> Self {
        assert!(base <= limit, "range base above limit");
        Self { base, limit }
    }

    /// Span of `size` bytes starting at `base`, `None` if it would wrap
    #[must_use]
    pub fn with_size(base: Addr, size: usize) -> Option<Self> {
        base.checked_add(size).map(|limit| Self { base, limit })
    }

    #[must_use]
    pub const fn size(&self) -> usize {
        self.limit - self.base
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.base == self.limit
    }

    #[must_use]
    pub const fn contains(&self, addr: Addr) -> bool {
        self.base <= addr && addr < self.limit
    }

    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.base < other.limit && other.base < self.limit
    }

    /// Zones touched by this span
    #[must_use]
    pub fn zones(&self, zone_shift: u32) -> ZoneSet {
        ZoneSet::of_range(self.base, self.limit, zone_shift)
    }
}

impl fmt::Debug for AddrRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x})", self.base, self.limit)
    }
}

/// Range-search allocator over free address spans
pub trait Land: Send {
    /// Adds a free span, coalescing with its neighbours.
    fn insert(&mut self, range: AddrRange) -> ArenaResult<()>;

    /// Removes a span lying entirely inside one free span.
    fn delete(&mut self, range: AddrRange) -> ArenaResult<()>;

    /// Finds `size` contiguous free bytes whose stripes all belong to
    /// `zones`: the lowest such span, or the highest when `high` is set.
    fn find_in_zones(
        &self,
        size: usize,
        zones: ZoneSet,
        high: bool,
        zone_shift: u32,
    ) -> Option<AddrRange>;

    /// Zones touched by any free span
    fn free_zones(&self, zone_shift: u32) -> ZoneSet;

    /// Total free bytes
    fn total_free(&self) -> usize;

    /// Number of disjoint free spans
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// [`Land`] backed by an ordered map of coalesced free spans
#[derive(Debug, Default, Clone)]
pub struct FreeLand {
    spans: BTreeMap<Addr, Addr>,
    total: usize,
}

impl FreeLand {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Free spans in address order
    pub fn spans(&self) -> impl DoubleEndedIterator<Item = AddrRange> + '_ {
        self.spans
            .iter()
            .map(|(&base, &limit)| AddrRange { base, limit })
    }

    /// Free span containing `addr`
    fn span_containing(&self, addr: Addr) -> Option<AddrRange> {
        self.spans
            .range(..=addr)
            .next_back()
            .map(|(&base, &limit)| AddrRange { base, limit })
            .filter(|span| span.contains(addr))
    }
}

/// Start of the stripe holding `addr`
#[inline]
fn stripe_base(addr: Addr, zone_shift: u32) -> Addr {
    (addr >> zone_shift) << zone_shift
}

/// Start of the stripe after the one holding `addr`, `None` at the top of
/// the address space
#[inline]
fn next_stripe(addr: Addr, zone_shift: u32) -> Option<Addr> {
    (addr >> zone_shift)
        .checked_add(1)
        .and_then(|stripe| stripe.checked_mul(1 << zone_shift))
}

/// Lowest `size`-byte span of `[base, limit)` lying in `zones`
fn find_low(
    span: AddrRange,
    size: usize,
    zones: ZoneSet,
    zone_shift: u32,
) -> Option<AddrRange> {
    let AddrRange { base, limit } = span;
    if zones.is_universal() {
        return (span.size() >= size).then(|| AddrRange::new(base, base + size));
    }

    let step = |addr: Addr| next_stripe(addr, zone_shift).map_or(limit, |next| next.min(limit));
    let mut cursor = base;
    while cursor < limit && limit - cursor >= size {
        if !zones.contains(cursor, zone_shift) {
            cursor = step(cursor);
            continue;
        }
        let run_base = cursor;
        let mut run_limit = step(cursor);
        while run_limit < limit
            && run_limit - run_base < size
            && zones.contains(run_limit, zone_shift)
        {
            run_limit = step(run_limit);
        }
        if run_limit - run_base >= size {
            return Some(AddrRange::new(run_base, run_base + size));
        }
        cursor = run_limit;
    }
    None
}

/// Highest `size`-byte span of `[base, limit)` lying in `zones`
fn find_high(
    span: AddrRange,
    size: usize,
    zones: ZoneSet,
    zone_shift: u32,
) -> Option<AddrRange> {
    let AddrRange { base, limit } = span;
    if zones.is_universal() {
        return (span.size() >= size).then(|| AddrRange::new(limit - size, limit));
    }

    let step_down = |addr: Addr| stripe_base(addr - 1, zone_shift).max(base);
    let mut cursor = limit;
    while cursor > base && cursor - base >= size {
        if !zones.contains(cursor - 1, zone_shift) {
            cursor = step_down(cursor);
            continue;
        }
        let run_limit = cursor;
        let mut run_base = step_down(cursor);
        while run_base > base
            && run_limit - run_base < size
            && zones.contains(run_base - 1, zone_shift)
        {
            run_base = step_down(run_base);
        }
        if run_limit - run_base >= size {
            return Some(AddrRange::new(run_limit - size, run_limit));
        }
        cursor = run_base;
    }
    None
}

impl Land for FreeLand {
    fn insert(&mut self, range: AddrRange) -> ArenaResult<()> {
        if range.is_empty() {
            return Ok(());
        }

        let before = self
            .spans
            .range(..=range.base)
            .next_back()
            .map(|(&base, &limit)| AddrRange { base, limit });
        let after = self
            .spans
            .range(range.base..)
            .next()
            .map(|(&base, &limit)| AddrRange { base, limit });

        if before.is_some_and(|span| span.overlaps(&range))
            || after.is_some_and(|span| span.overlaps(&range))
        {
            return Err(ArenaError::invalid_operation(format!(
                "free span {range:?} overlaps existing free space"
            )));
        }

        let mut merged = range;
        if let Some(span) = before.filter(|span| span.limit == range.base) {
            self.spans.remove(&span.base);
            merged.base = span.base;
        }
        if let Some(span) = after.filter(|span| span.base == range.limit) {
            self.spans.remove(&span.base);
            merged.limit = span.limit;
        }
        self.spans.insert(merged.base, merged.limit);
        self.total += range.size();
        Ok(())
    }

    fn delete(&mut self, range: AddrRange) -> ArenaResult<()> {
        if range.is_empty() {
            return Ok(());
        }

        let span = self
            .span_containing(range.base)
            .filter(|span| range.limit <= span.limit)
            .ok_or_else(|| {
                ArenaError::invalid_operation(format!("span {range:?} is not free"))
            })?;

        self.spans.remove(&span.base);
        if span.base < range.base {
            self.spans.insert(span.base, range.base);
        }
        if range.limit < span.limit {
            self.spans.insert(range.limit, span.limit);
        }
        self.total -= range.size();
        Ok(())
    }

    fn find_in_zones(
        &self,
        size: usize,
        zones: ZoneSet,
        high: bool,
        zone_shift: u32,
    ) -> Option<AddrRange> {
        if size == 0 || zones.is_empty() {
            return None;
        }
        if high {
            self.spans()
                .rev()
                .find_map(|span| find_high(span, size, zones, zone_shift))
        } else {
            self.spans()
                .find_map(|span| find_low(span, size, zones, zone_shift))
        }
    }

    fn free_zones(&self, zone_shift: u32) -> ZoneSet {
        let mut zones = ZoneSet::EMPTY;
        for span in self.spans() {
            zones = zones | span.zones(zone_shift);
            if zones.is_universal() {
                break;
            }
        }
        zones
    }

    fn total_free(&self) -> usize {
        self.total
    }

    fn len(&self) -> usize {
        self.spans.len()
    }
}
