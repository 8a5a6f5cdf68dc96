//! Test doubles and fixtures for Strata development.
//!
//! Provides instrumented implementations of the core seams
//! ([`VirtualMemory`], [`AllocProc`]) so integration tests can observe
//! exactly which reservations an arena makes and releases, and inject
//! failures at chosen points.
//!
//! [`AllocProc`]: strata_core::AllocProc

#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod fixtures;

pub use fixtures::{small_params, tracked_arena, FailingAllocator, RecordingAllocator};

use std::cell::RefCell;
use std::ptr::NonNull;

use indexmap::IndexMap;
use strata_arena::{HeapMemory, VirtualMemory};

/// Call counts recorded by [`TrackingMemory`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryCounters {
    pub reserves: usize,
    pub commits: usize,
    pub decommits: usize,
    pub releases: usize,
}

/// A live reservation as seen by [`TrackingMemory`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub size: usize,
    pub committed: usize,
}

#[derive(Default)]
struct TrackingState {
    live: IndexMap<usize, Region>,
    counters: MemoryCounters,
    fail_reserves_after: Option<usize>,
    fail_commits_after: Option<usize>,
}

/// Heap-backed [`VirtualMemory`] that records every call.
///
/// Live reservations are kept in insertion order, keyed by base address,
/// so tests can assert on which blocks survive a pop. Reserve and commit
/// failures can be injected with
/// [`fail_reserves_after`](TrackingMemory::fail_reserves_after) and
/// [`fail_commits_after`](TrackingMemory::fail_commits_after).
pub struct TrackingMemory {
    inner: HeapMemory,
    state: RefCell<TrackingState>,
}

impl TrackingMemory {
    pub fn new(page_size: usize) -> Self {
        Self {
            inner: HeapMemory::new(page_size),
            state: RefCell::new(TrackingState::default()),
        }
    }

    /// Let the next `n` reservations succeed, then fail every one after.
    pub fn fail_reserves_after(&self, n: usize) {
        self.state.borrow_mut().fail_reserves_after = Some(n);
    }

    /// Let the next `n` commits succeed, then fail every one after.
    pub fn fail_commits_after(&self, n: usize) {
        self.state.borrow_mut().fail_commits_after = Some(n);
    }

    /// Stop injecting failures.
    pub fn heal(&self) {
        let mut state = self.state.borrow_mut();
        state.fail_reserves_after = None;
        state.fail_commits_after = None;
    }

    pub fn counts(&self) -> MemoryCounters {
        self.state.borrow().counters
    }

    /// Live reservations, oldest first.
    pub fn live_regions(&self) -> Vec<Region> {
        self.state.borrow().live.values().copied().collect()
    }

    pub fn live_count(&self) -> usize {
        self.state.borrow().live.len()
    }

    /// Total committed bytes across live reservations.
    pub fn committed_bytes(&self) -> usize {
        self.state.borrow().live.values().map(|r| r.committed).sum()
    }
}

impl Default for TrackingMemory {
    fn default() -> Self {
        Self::new(strata_arena::vm::DEFAULT_PAGE_SIZE)
    }
}

/// Consume one unit of an injected failure budget. Returns `true` when the
/// call should fail.
fn exhausted(budget: &mut Option<usize>) -> bool {
    match budget {
        Some(0) => true,
        Some(n) => {
            *n -= 1;
            false
        }
        None => false,
    }
}

impl VirtualMemory for TrackingMemory {
    fn page_size(&self) -> usize {
        self.inner.page_size()
    }

    fn reserve(&self, size: usize, large_pages: bool) -> Option<NonNull<u8>> {
        let mut state = self.state.borrow_mut();
        if exhausted(&mut state.fail_reserves_after) {
            return None;
        }
        let ptr = self.inner.reserve(size, large_pages)?;
        state.counters.reserves += 1;
        state
            .live
            .insert(ptr.as_ptr() as usize, Region { size, committed: 0 });
        Some(ptr)
    }

    unsafe fn commit(&self, ptr: NonNull<u8>, size: usize) -> bool {
        let mut state = self.state.borrow_mut();
        if exhausted(&mut state.fail_commits_after) {
            return false;
        }
        state.counters.commits += 1;
        let addr = ptr.as_ptr() as usize;
        let region = state
            .live
            .iter_mut()
            .find(|(base, region)| **base <= addr && addr + size <= **base + region.size);
        assert!(
            region.is_some(),
            "commit of {size} bytes at {addr:#x} outside any live reservation"
        );
        if let Some((_, region)) = region {
            region.committed += size;
        }
        true
    }

    unsafe fn decommit(&self, ptr: NonNull<u8>, size: usize) {
        let mut state = self.state.borrow_mut();
        state.counters.decommits += 1;
        let addr = ptr.as_ptr() as usize;
        if let Some((_, region)) = state
            .live
            .iter_mut()
            .find(|(base, region)| **base <= addr && addr + size <= **base + region.size)
        {
            region.committed = region.committed.saturating_sub(size);
        }
    }

    unsafe fn release(&self, ptr: NonNull<u8>, size: usize) {
        let mut state = self.state.borrow_mut();
        let region = state.live.shift_remove(&(ptr.as_ptr() as usize));
        assert_eq!(
            region.map(|r| r.size),
            Some(size),
            "release does not match a live reservation"
        );
        state.counters.releases += 1;
        drop(state);
        // SAFETY: the region was reserved from `inner` with this size.
        unsafe { self.inner.release(ptr, size) };
    }
}
