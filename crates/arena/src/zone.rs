//! Zone sets over the managed address space
//!
//! The address space is divided into stripes of `1 << zone_shift` bytes.
//! Stripe `n` belongs to zone `n mod ZONESET_WIDTH`, so zone numbers repeat
//! every `ZONESET_WIDTH` stripes. A [`ZoneSet`] is one machine word with a
//! bit per zone; the collector uses it as a cheap pre-check to rule out
//! ambiguous references before consulting anything more expensive.

use core::fmt;
use core::ops::{BitAnd, BitOr, Sub};

/// Address in the managed address space.
///
/// Addresses are plain integers here; this crate never dereferences them.
pub type Addr = usize;

/// Index of a zone stripe, always `< ZONESET_WIDTH`.
pub type Zone = u32;

/// Number of zones tracked by a [`ZoneSet`].
pub const ZONESET_WIDTH: u32 = u64::BITS;

/// Zone of an address for a given stripe shift.
#[inline]
#[must_use]
pub const fn zone_of(addr: Addr, zone_shift: u32) -> Zone {
    ((addr >> zone_shift) as u64 % ZONESET_WIDTH as u64) as Zone
}

/// Set of zones, one bit per zone stripe.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ZoneSet(u64);

impl ZoneSet {
    /// No zones.
    pub const EMPTY: Self = Self(0);

    /// Every zone.
    pub const UNIVERSAL: Self = Self(u64::MAX);

    /// Creates a set from its raw bit pattern. Every pattern is valid.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Raw bit pattern of the set.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Set containing exactly `zone`.
    #[inline]
    #[must_use]
    pub const fn single(zone: Zone) -> Self {
        assert!(zone < ZONESET_WIDTH, "zone index out of range");
        Self(1 << zone)
    }

    /// Set containing the given zones.
    #[must_use]
    pub fn from_zones<I: IntoIterator<Item = Zone>>(zones: I) -> Self {
        zones
            .into_iter()
            .fold(Self::EMPTY, |set, zone| set.add(zone))
    }

    /// Set with `zone` added.
    #[inline]
    #[must_use]
    pub const fn add(self, zone: Zone) -> Self {
        self.union(Self::single(zone))
    }

    #[inline]
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Zones in `self` that are not in `other`.
    #[inline]
    #[must_use]
    pub const fn diff(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    #[inline]
    #[must_use]
    pub const fn inter(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    #[must_use]
    pub const fn is_universal(self) -> bool {
        self.0 == u64::MAX
    }

    #[inline]
    #[must_use]
    pub const fn is_subset_of(self, other: Self) -> bool {
        (self.0 & !other.0) == 0
    }

    #[inline]
    #[must_use]
    pub const fn has_zone(self, zone: Zone) -> bool {
        zone < ZONESET_WIDTH && (self.0 & (1 << zone)) != 0
    }

    /// Whether the stripe holding `addr` is in the set.
    #[inline]
    #[must_use]
    pub const fn contains(self, addr: Addr, zone_shift: u32) -> bool {
        self.has_zone(zone_of(addr, zone_shift))
    }

    /// Number of zones in the set.
    #[inline]
    #[must_use]
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Zones touched by the address span `[base, limit)`.
    ///
    /// A span covering `ZONESET_WIDTH` stripes or more touches every zone.
    #[must_use]
    pub fn of_range(base: Addr, limit: Addr, zone_shift: u32) -> Self {
        if limit <= base {
            return Self::EMPTY;
        }
        let first = base >> zone_shift;
        let last = (limit - 1) >> zone_shift;
        if last - first >= ZONESET_WIDTH as usize - 1 {
            return Self::UNIVERSAL;
        }
        (first..=last).fold(Self::EMPTY, |set, stripe| {
            set.add((stripe as u64 % u64::from(ZONESET_WIDTH)) as Zone)
        })
    }

    /// Iterates over member zones in ascending order.
    pub fn iter(self) -> impl Iterator<Item = Zone> {
        (0..ZONESET_WIDTH).filter(move |&zone| self.has_zone(zone))
    }
}

impl BitOr for ZoneSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl Sub for ZoneSet {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self.diff(rhs)
    }
}

impl BitAnd for ZoneSet {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        self.inter(rhs)
    }
}

impl FromIterator<Zone> for ZoneSet {
    fn from_iter<I: IntoIterator<Item = Zone>>(iter: I) -> Self {
        Self::from_zones(iter)
    }
}

impl fmt::Debug for ZoneSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ZoneSet({:#018x})", self.0)
    }
}

impl fmt::Display for ZoneSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_universal() {
            return f.write_str("{*}");
        }
        f.write_str("{")?;
        for (i, zone) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{zone}")?;
        }
        f.write_str("}")
    }
}
