//! End-to-end placement scenarios for the allocation policy.

mod common;

use common::*;
use stratum_arena::prelude::*;

/// Zones tried must never shrink once avoided zones are taken out
fn assert_widening(attempts: &[ZoneSet], avoid: ZoneSet) {
    for pair in attempts.windows(2) {
        assert!(
            (pair[0] - avoid).is_subset_of(pair[1] - avoid),
            "attempts narrowed: {attempts:?}"
        );
    }
}

#[test]
fn preferred_zone_with_room_is_used_first() {
    init_logging();
    let (grower, grown) = failing_grower("should not grow");
    let (arena, attempts) = recording_arena(config(), land_of_zones(&[1, 2, 5]), grower);
    let pool = arena.create_pool("gen0");
    assert_eq!(arena.free_zones(), ZoneSet::from_zones([1, 2, 5]));

    let pref = LocusPref::new().with_zones(ZoneSet::from_zones([1, 2]));
    let placed = arena.place(pool, &pref, GRAIN).unwrap();

    assert_eq!(placed.plan, Plan::Preferred);
    assert_eq!(zone_of(placed.tract.base(), SHIFT), 1);
    assert_eq!(attempts.snapshot(), vec![ZoneSet::from_zones([1, 2])]);
    assert_eq!(calls(&grown), 0);
}

#[test]
fn preference_widens_to_free_zones() {
    init_logging();
    // zone 1 is free but too small for the request, zone 2 has a whole stripe
    let mut land = FreeLand::new();
    land.insert(AddrRange::new(STRIPE, STRIPE + GRAIN)).unwrap();
    land.insert(stripe(2)).unwrap();
    let (grower, grown) = failing_grower("should not grow");
    let (arena, attempts) = recording_arena(config(), land, grower);
    let pool = arena.create_pool("gen1");

    let pref = LocusPref::new().with_zones(ZoneSet::single(9));
    let placed = arena.place(pool, &pref, 2 * GRAIN).unwrap();

    assert_eq!(placed.plan, Plan::FreeZones);
    assert_eq!(placed.zones, ZoneSet::from_zones([1, 2, 9]));
    assert_eq!(zone_of(placed.tract.base(), SHIFT), 2);
    assert_eq!(
        attempts.snapshot(),
        vec![ZoneSet::single(9), ZoneSet::from_zones([1, 2, 9])]
    );
    assert_eq!(calls(&grown), 0);
}

#[test]
fn empty_candidate_sets_still_grow_and_return_growth_failure() {
    init_logging();
    let (grower, grown) = failing_grower("address space exhausted");
    let (arena, attempts) = recording_arena(config(), land_of_zones(&[1]), grower);
    let pool = arena.create_pool("avoiding");

    let pref = LocusPref::new()
        .with_zones(ZoneSet::single(1))
        .with_avoid(ZoneSet::single(1));
    let error = arena.alloc(pool, &pref, GRAIN).unwrap_err();

    assert_eq!(
        error,
        ArenaError::GrowthFailed {
            reason: "address space exhausted".to_string()
        }
    );
    assert_eq!(calls(&grown), 1);
    // neither plan A nor plan B had anything to search
    assert!(attempts.snapshot().is_empty());
    assert_eq!(arena.committed(), 0);
    assert_eq!(arena.stats().growth_failures(), 1);
}

#[test]
fn nothing_to_grow_for_skips_growth() {
    // no preferred zones and the only free zone is avoided
    let (grower, grown) = failing_grower("should not grow");
    let (arena, attempts) = recording_arena(config(), land_of_zones(&[5]), grower);
    let pool = arena.create_pool("unpreferring");

    let avoid = ZoneSet::single(5);
    let pref = LocusPref::new()
        .with_zones(ZoneSet::EMPTY)
        .with_avoid(avoid);
    let placed = arena.place(pool, &pref, GRAIN).unwrap();

    assert_eq!(placed.plan, Plan::Anywhere);
    assert_eq!(zone_of(placed.tract.base(), SHIFT), 5);
    assert_eq!(calls(&grown), 0);
    assert_eq!(arena.growths(), 0);
    assert_eq!(
        attempts.snapshot(),
        vec![ZoneSet::UNIVERSAL - avoid, ZoneSet::UNIVERSAL]
    );
    assert_eq!(arena.stats().growth_failures(), 0);
}

#[test]
fn commit_limit_is_checked_before_any_search() {
    init_logging();
    // three grains in use, limit one byte short of a fourth
    let limit = 4 * GRAIN - 1;
    let config = config().with_commit_limit(limit);
    let (grower, grown) = failing_grower("should not grow");
    let (arena, attempts) = recording_arena(config, land_of_zones(&[1, 2]), grower);
    let pool = arena.create_pool("full");

    arena.alloc(pool, &LocusPref::default(), 3 * GRAIN).unwrap();
    assert_eq!(arena.committed(), limit - (GRAIN - 1));
    assert_eq!(arena.spare_committed(), 0);
    let searched = attempts.len();

    let error = arena.alloc(pool, &LocusPref::default(), GRAIN).unwrap_err();
    assert!(error.is_commit_limit());
    assert_eq!(
        error,
        ArenaError::CommitLimitExceeded {
            committed: 3 * GRAIN,
            requested: GRAIN,
            limit,
        }
    );
    assert_eq!(attempts.len(), searched);
    assert_eq!(calls(&grown), 0);
    assert_eq!(arena.committed(), 3 * GRAIN);
    assert_eq!(arena.stats().commit_limit_failures(), 1);
}

#[test]
fn spare_commitment_satisfies_requests_at_the_limit() {
    let limit = 4 * GRAIN;
    let config = config()
        .with_commit_limit(limit)
        .with_spare_commit_limit(GRAIN);
    let (arena, _attempts) = recording_arena(config, land_of_zones(&[1]), FixedGrowth);
    let pool = arena.create_pool("spare");

    let held = arena.alloc(pool, &LocusPref::default(), 3 * GRAIN).unwrap();
    let freed = arena.alloc(pool, &LocusPref::default(), GRAIN).unwrap();
    arena.free(freed).unwrap();
    assert_eq!(arena.committed(), limit);
    assert_eq!(arena.spare_committed(), GRAIN);

    // at the limit, but the spare grain covers the request
    arena.alloc(pool, &LocusPref::default(), GRAIN).unwrap();
    assert_eq!(arena.committed(), limit);
    assert!(arena.alloc(pool, &LocusPref::default(), GRAIN).unwrap_err().is_commit_limit());
    arena.free(held).unwrap();
}

#[test]
fn growth_is_followed_by_a_preferred_retry() {
    let (grower, grown) = adding_grower(vec![stripe(3)]);
    let (arena, attempts) = recording_arena(config(), FreeLand::new(), grower);
    let pool = arena.create_pool("grown");

    let pref = LocusPref::new().with_zones(ZoneSet::single(3));
    let placed = arena.place(pool, &pref, GRAIN).unwrap();

    assert_eq!(placed.plan, Plan::GrownPreferred);
    assert_eq!(zone_of(placed.tract.base(), SHIFT), 3);
    assert_eq!(calls(&grown), 1);
    assert_eq!(arena.growths(), 1);
    // plan B is skipped: no free zones widen the preference
    assert_eq!(
        attempts.snapshot(),
        vec![ZoneSet::single(3), ZoneSet::single(3)]
    );
}

#[test]
fn growth_widens_with_new_free_zones() {
    let (grower, _) = adding_grower(vec![stripe(7)]);
    let (arena, attempts) = recording_arena(config(), FreeLand::new(), grower);
    let pool = arena.create_pool("grown");

    let pref = LocusPref::new().with_zones(ZoneSet::single(3));
    let placed = arena.place(pool, &pref, GRAIN).unwrap();

    assert_eq!(placed.plan, Plan::GrownFreeZones);
    assert_eq!(zone_of(placed.tract.base(), SHIFT), 7);
    assert_eq!(
        attempts.snapshot(),
        vec![
            ZoneSet::single(3),
            ZoneSet::single(3),
            ZoneSet::from_zones([3, 7])
        ]
    );
    assert_widening(&attempts.snapshot(), ZoneSet::EMPTY);
}

#[test]
fn unavoided_zones_are_used_before_avoided_ones() {
    // the land under-reports its free zones, so only plan D finds zone 8
    let (land, attempts) = RecordingLand::new(land_of_zones(&[5, 8]));
    let (grower, grown) = adding_grower(Vec::new());
    let arena = Arena::with_land(config(), land.hiding_free_zones(), grower).unwrap();
    let pool = arena.create_pool("mixed");

    let avoid = ZoneSet::single(5);
    let pref = LocusPref::new()
        .with_zones(ZoneSet::single(3))
        .with_avoid(avoid);
    let placed = arena.place(pool, &pref, GRAIN).unwrap();

    assert_eq!(placed.plan, Plan::Unavoided);
    assert_eq!(zone_of(placed.tract.base(), SHIFT), 8);
    assert_eq!(calls(&grown), 1);
    let tried = attempts.snapshot();
    assert_eq!(
        tried,
        vec![
            ZoneSet::single(3),
            ZoneSet::single(3),
            ZoneSet::UNIVERSAL - avoid
        ]
    );
    assert_widening(&tried, avoid);
    assert_eq!(arena.stats().degraded_placements(), 1);
}

#[test]
fn avoided_zones_are_the_last_resort() {
    let (grower, grown) = adding_grower(Vec::new());
    let (arena, attempts) = recording_arena(config(), land_of_zones(&[5]), grower);
    let pool = arena.create_pool("pinned");

    let avoid = ZoneSet::single(5);
    let pref = LocusPref::new()
        .with_zones(ZoneSet::single(3))
        .with_avoid(avoid);
    let placed = arena.place(pool, &pref, GRAIN).unwrap();

    assert_eq!(placed.plan, Plan::Anywhere);
    assert_eq!(zone_of(placed.tract.base(), SHIFT), 5);
    assert_eq!(calls(&grown), 1);
    let tried = attempts.snapshot();
    assert_eq!(
        tried,
        vec![
            ZoneSet::single(3),
            ZoneSet::single(3),
            ZoneSet::UNIVERSAL - avoid,
            ZoneSet::UNIVERSAL
        ]
    );
    assert_widening(&tried, avoid);
}

#[test]
fn exhaustion_is_reported_after_the_last_resort() {
    let (grower, _) = adding_grower(Vec::new());
    let (arena, attempts) = recording_arena(config(), land_of_zones(&[2]), grower);
    let pool = arena.create_pool("big");

    let error = arena
        .alloc(pool, &LocusPref::default(), 2 * STRIPE)
        .unwrap_err();

    assert!(matches!(
        error,
        ArenaError::ResourceExhausted { size, zones } if size == 2 * STRIPE && zones.is_universal()
    ));
    // universal preference: A, then the grown retry, then the last resort
    assert_eq!(attempts.len(), 3);
    assert_eq!(arena.committed(), 0);
    assert_eq!(arena.free_bytes(), STRIPE);
    assert_eq!(arena.stats().exhaustion_failures(), 1);
}

#[test]
fn high_preference_takes_the_top_of_the_zone() {
    let (arena, _) = recording_arena(config(), land_of_zones(&[4]), FixedGrowth);
    let pool = arena.create_pool("high");

    let pref = LocusPref::new()
        .with_zones(ZoneSet::single(4))
        .express(LocusPrefKind::High);
    let tract = arena.alloc(pool, &pref, GRAIN).unwrap();
    assert_eq!(tract.limit(), stripe(4).limit);

    let low = arena.alloc(pool, &LocusPref::default(), GRAIN).unwrap();
    assert_eq!(low.base(), stripe(4).base);
}

#[test]
fn fixed_arena_growth_failure_is_returned_unchanged() {
    let arena = Arena::fixed(config()).unwrap();
    arena.extend(stripe(1).base, STRIPE).unwrap();
    let pool = arena.create_pool("fixed");

    let error = arena
        .alloc(pool, &LocusPref::default(), 2 * STRIPE)
        .unwrap_err();
    assert_eq!(
        error,
        ArenaError::GrowthFailed {
            reason: "fixed arena cannot grow".to_string()
        }
    );
    assert!(!error.is_retryable());
}

#[test]
fn chunk_arena_grows_on_demand() {
    init_logging();
    let arena = Arena::with_chunks(ArenaConfig::small()).unwrap();
    let pool = arena.create_pool("chunks");
    assert_eq!(arena.reserved(), 0);

    let tract = arena.alloc(pool, &LocusPref::default(), GRAIN).unwrap();
    assert_eq!(arena.growths(), 1);
    assert_eq!(arena.reserved(), ArenaConfig::small().chunk_size);
    assert_eq!(tract.base() % GRAIN, 0);
    assert_eq!(arena.tract_of(tract.base()), Some(tract));

    // a request larger than a chunk gets a chunk of its own size
    let big = 2 * ArenaConfig::small().chunk_size;
    let tract = arena.alloc(pool, &LocusPref::default(), big).unwrap();
    assert_eq!(tract.size(), big);
    assert_eq!(arena.growths(), 2);
}

#[test]
fn chunk_arena_stops_at_its_chunk_limit() {
    let config = ArenaConfig::small().with_max_chunks(1);
    let arena = Arena::with_chunks(config.clone()).unwrap();
    let pool = arena.create_pool("limited");

    arena
        .alloc(pool, &LocusPref::default(), config.chunk_size)
        .unwrap();
    let error = arena.alloc(pool, &LocusPref::default(), GRAIN).unwrap_err();
    assert!(matches!(error, ArenaError::GrowthFailed { .. }));
}
