//! Placement preferences
//!
//! A [`LocusPref`] tells the allocation policy where a request would like to
//! land: which zones to prefer, which to stay out of, and whether to favour
//! high or low addresses inside a candidate span. Pools and generations
//! build one per request; it is never mutated once handed to the arena.

use crate::zone::ZoneSet;

/// One aspect of a placement preference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocusPrefKind {
    /// Favour high addresses
    High,
    /// Favour low addresses
    Low,
    /// Prefer these zones
    Zones(ZoneSet),
    /// Stay out of these zones unless nothing else fits
    Avoid(ZoneSet),
}

/// Placement preference for one allocation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocusPref {
    zones: ZoneSet,
    avoid: ZoneSet,
    high: bool,
}

impl Default for LocusPref {
    /// Any zone, nothing avoided, low addresses first.
    fn default() -> Self {
        Self {
            zones: ZoneSet::UNIVERSAL,
            avoid: ZoneSet::EMPTY,
            high: false,
        }
    }
}

impl LocusPref {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use = "builder methods must be chained or built"]
    pub fn with_zones(mut self, zones: ZoneSet) -> Self {
        self.zones = zones;
        self
    }

    #[must_use = "builder methods must be chained or built"]
    pub fn with_avoid(mut self, avoid: ZoneSet) -> Self {
        self.avoid = avoid;
        self
    }

    #[must_use = "builder methods must be chained or built"]
    pub fn with_high(mut self, high: bool) -> Self {
        self.high = high;
        self
    }

    /// Applies one preference aspect
    #[must_use = "builder methods must be chained or built"]
    pub fn express(self, kind: LocusPrefKind) -> Self {
        match kind {
            LocusPrefKind::High => self.with_high(true),
            LocusPrefKind::Low => self.with_high(false),
            LocusPrefKind::Zones(zones) => self.with_zones(zones),
            LocusPrefKind::Avoid(avoid) => self.with_avoid(avoid),
        }
    }

    /// Preferred zones
    #[inline]
    pub fn zones(&self) -> ZoneSet {
        self.zones
    }

    /// Zones to stay out of
    #[inline]
    pub fn avoid(&self) -> ZoneSet {
        self.avoid
    }

    #[inline]
    pub fn high(&self) -> bool {
        self.high
    }

    /// Preferred zones that are not avoided
    #[inline]
    pub fn usable_zones(&self) -> ZoneSet {
        self.zones - self.avoid
    }

    /// Well-formedness check for assertion sites.
    ///
    /// Every bit pattern is a valid zone set, so a constructed value is
    /// always well formed.
    pub fn check(&self) -> bool {
        true
    }
}

impl From<LocusPrefKind> for LocusPref {
    fn from(kind: LocusPrefKind) -> Self {
        Self::default().express(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_unconstrained() {
        let pref = LocusPref::default();
        assert!(pref.zones().is_universal());
        assert!(pref.avoid().is_empty());
        assert!(!pref.high());
        assert!(pref.check());
    }

    #[test]
    fn express_builds_preference() {
        let pref = LocusPref::new()
            .express(LocusPrefKind::Zones(ZoneSet::from_zones([1, 2])))
            .express(LocusPrefKind::Avoid(ZoneSet::single(2)))
            .express(LocusPrefKind::High);
        assert_eq!(pref.usable_zones(), ZoneSet::single(1));
        assert!(pref.high());
        assert!(!pref.express(LocusPrefKind::Low).high());
    }

    #[test]
    fn from_kind() {
        let pref = LocusPref::from(LocusPrefKind::Avoid(ZoneSet::single(0)));
        assert!(pref.zones().is_universal());
        assert_eq!(pref.avoid(), ZoneSet::single(0));
    }
}
