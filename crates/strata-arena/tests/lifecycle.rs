//! Arena lifecycle against an instrumented virtual-memory provider.
//!
//! Each test drives an arena on a `TrackingMemory` and checks both the
//! arena's cursor and the reservations the provider saw.

use std::rc::Rc;

use strata_arena::{Arena, ArenaError, ArenaFlags};
use strata_test_utils::{small_params, tracked_arena, TrackingMemory};

const KIB: usize = 1024;

// ── Push / pop scenarios ────────────────────────────────────────

#[test]
fn push_commit_chain_and_clear() {
    let (arena, memory) = tracked_arena(small_params());
    assert_eq!(memory.counts().reserves, 1);
    assert_eq!(memory.committed_bytes(), 4 * KIB);

    arena.push(4000, 8).unwrap();
    assert_eq!(arena.pos(), 4000);
    assert_eq!(memory.counts().commits, 1);

    arena.push(4000, 8).unwrap();
    assert_eq!(arena.pos(), 8000);
    assert_eq!(memory.counts().commits, 2);
    assert_eq!(memory.committed_bytes(), 8 * KIB);

    arena.pop_to(0);
    assert_eq!(arena.pos(), 0);
    assert_eq!(memory.counts().releases, 0);

    arena.push(70_000, 8).unwrap();
    assert_eq!(arena.pos(), 70_000);
    assert_eq!(memory.counts().reserves, 2);
    let newest = memory.live_regions()[1];
    assert!(newest.size >= 70_000);

    arena.clear();
    assert_eq!(arena.block_count(), 1);
    assert_eq!(memory.counts().releases, 1);
    assert_eq!(memory.live_count(), 1);
}

#[test]
fn no_chain_push_past_reservation_fails() {
    let (arena, memory) = tracked_arena(small_params().with_flags(ArenaFlags::NO_CHAIN));
    let err = arena.push(70_000, 8).unwrap_err();
    assert!(matches!(err, ArenaError::ChainingDisabled { requested: 70_000, .. }));
    assert_eq!(arena.pos(), 0);
    assert_eq!(memory.counts().reserves, 1);
}

#[test]
fn pop_to_current_position_releases_nothing() {
    let (arena, memory) = tracked_arena(small_params());
    arena.push(100 * KIB, 8).unwrap();
    let before = memory.counts();
    arena.pop_to(arena.pos());
    assert_eq!(memory.counts(), before);
    assert_eq!(arena.pos(), 100 * KIB);
}

#[test]
fn popping_never_decommits() {
    let (arena, memory) = tracked_arena(small_params());
    for _ in 0..10 {
        arena.push(30 * KIB, 8).unwrap();
        arena.clear();
    }
    // Initial commit plus one growth commit on the first pass.
    assert_eq!(memory.counts().decommits, 0);
    assert_eq!(memory.counts().commits, 2);
}

#[test]
fn pop_releases_only_blocks_past_target() {
    let (arena, memory) = tracked_arena(small_params());
    arena.push(60 * KIB, 8).unwrap();
    arena.push(60 * KIB, 8).unwrap();
    let mid = arena.pos();
    arena.push(60 * KIB, 8).unwrap();
    arena.push(60 * KIB, 8).unwrap();
    assert_eq!(memory.live_count(), 4);

    arena.pop_to(mid);
    assert_eq!(arena.pos(), mid);
    assert_eq!(memory.live_count(), 2);
    assert_eq!(arena.block_count(), 2);
}

#[test]
fn drop_releases_every_block() {
    let (arena, memory) = tracked_arena(small_params());
    for _ in 0..8 {
        arena.push(50 * KIB, 16).unwrap();
    }
    assert!(memory.live_count() > 1);
    drop(arena);
    let counts = memory.counts();
    assert_eq!(memory.live_count(), 0);
    assert_eq!(counts.releases, counts.reserves);
}

#[test]
fn release_fresh_arena() {
    let (arena, memory) = tracked_arena(small_params());
    arena.release();
    assert_eq!(memory.counts().releases, 1);
    assert_eq!(memory.live_count(), 0);
}

#[test]
fn large_pages_round_reservation() {
    let (arena, memory) = tracked_arena(small_params().with_flags(ArenaFlags::LARGE_PAGES));
    assert_eq!(arena.reserved_size(), 2 * 1024 * KIB);
    assert_eq!(memory.live_regions()[0].size, 2 * 1024 * KIB);
}

// ── Failure injection ───────────────────────────────────────────

#[test]
fn reserve_failure_at_create() {
    let memory = Rc::new(TrackingMemory::default());
    memory.fail_reserves_after(0);
    let err = Arena::with_memory(small_params(), memory.clone()).unwrap_err();
    assert_eq!(err, ArenaError::ReserveFailed { size: 64 * KIB });
}

#[test]
fn commit_failure_at_create_returns_reservation() {
    let memory = Rc::new(TrackingMemory::default());
    memory.fail_commits_after(0);
    let err = Arena::with_memory(small_params(), memory.clone()).unwrap_err();
    assert_eq!(err, ArenaError::CommitFailed { size: 4 * KIB });
    assert_eq!(memory.live_count(), 0);
}

#[test]
fn reserve_failure_on_chain_leaves_arena_unchanged() {
    let (arena, memory) = tracked_arena(small_params());
    arena.push(10, 1).unwrap();
    memory.fail_reserves_after(0);
    let err = arena.push(70_000, 8).unwrap_err();
    assert!(matches!(err, ArenaError::ReserveFailed { .. }));
    assert_eq!(arena.pos(), 10);
    assert_eq!(arena.block_count(), 1);

    memory.heal();
    arena.push(70_000, 8).unwrap();
    assert_eq!(arena.block_count(), 2);
}

#[test]
fn commit_failure_on_growth_leaves_arena_unchanged() {
    let (arena, memory) = tracked_arena(small_params());
    memory.fail_commits_after(0);
    let err = arena.push(5000, 8).unwrap_err();
    assert_eq!(err, ArenaError::CommitFailed { size: 4 * KIB });
    assert_eq!(arena.pos(), 0);
    assert_eq!(arena.committed_size(), 4 * KIB);

    memory.heal();
    arena.push(5000, 8).unwrap();
    assert_eq!(arena.pos(), 5000);
}

#[test]
fn commit_failure_on_chain_returns_new_reservation() {
    let (arena, memory) = tracked_arena(small_params());
    memory.fail_commits_after(0);
    let err = arena.push(70_000, 8).unwrap_err();
    assert!(matches!(err, ArenaError::CommitFailed { .. }));
    assert_eq!(memory.live_count(), 1);
    assert_eq!(arena.block_count(), 1);
}

// ── Temporary scopes ────────────────────────────────────────────

#[test]
fn scope_restores_exact_position() {
    let (arena, _memory) = tracked_arena(small_params());
    arena.push(100, 1).unwrap();
    let temp = arena.begin_temp();
    arena.push(50, 1).unwrap();
    assert_eq!(arena.pos(), 150);
    arena.end_temp(temp);
    assert_eq!(arena.pos(), 100);
}

#[test]
fn scope_releases_blocks_it_chained() {
    let (arena, memory) = tracked_arena(small_params());
    arena.push(1000, 8).unwrap();
    {
        let scope = arena.temp();
        scope.push(200 * KIB, 8).unwrap();
        scope.push(200 * KIB, 8).unwrap();
        assert_eq!(memory.live_count(), 3);
    }
    assert_eq!(arena.pos(), 1000);
    assert_eq!(memory.live_count(), 1);
}
