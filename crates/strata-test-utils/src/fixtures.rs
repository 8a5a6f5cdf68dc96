//! Reusable allocator and arena fixtures.
//!
//! - [`FailingAllocator`]: serves allocations from the heap, then fails
//!   deterministically after N calls.
//! - [`RecordingAllocator`]: forwards to another strategy and records every
//!   request it sees.
//! - [`small_params`] / [`tracked_arena`]: a 64 KiB / 4 KiB arena on a
//!   [`TrackingMemory`] provider.

use std::cell::{Cell, RefCell};
use std::ptr::NonNull;
use std::rc::Rc;

use strata_arena::{Arena, ArenaParams};
use strata_core::{AllocOp, AllocProc, AllocRequest, HeapAllocator};

use crate::TrackingMemory;

/// 64 KiB reservations committed in 4 KiB steps.
pub fn small_params() -> ArenaParams {
    ArenaParams::new()
        .with_reserve_size(64 * 1024)
        .with_commit_size(4 * 1024)
}

/// An arena on a fresh [`TrackingMemory`], returned alongside the provider.
pub fn tracked_arena(params: ArenaParams) -> (Arena, Rc<TrackingMemory>) {
    let memory = Rc::new(TrackingMemory::default());
    let arena = Arena::with_memory(params, memory.clone()).expect("tracked arena");
    (arena, memory)
}

/// Heap strategy whose `Alloc` and `Resize` fail once `remaining` reaches
/// zero.
pub struct FailingAllocator {
    remaining: Cell<usize>,
    calls: Cell<usize>,
}

impl FailingAllocator {
    pub fn new(succeed_count: usize) -> Self {
        Self {
            remaining: Cell::new(succeed_count),
            calls: Cell::new(0),
        }
    }

    /// Requests seen so far, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl AllocProc for FailingAllocator {
    unsafe fn dispatch(&self, req: &AllocRequest) -> Option<NonNull<u8>> {
        self.calls.set(self.calls.get() + 1);
        if matches!(req.op, AllocOp::Alloc | AllocOp::Resize) {
            if self.remaining.get() == 0 {
                return None;
            }
            self.remaining.set(self.remaining.get() - 1);
        }
        // SAFETY: forwarded caller contract.
        unsafe { HeapAllocator.dispatch(req) }
    }
}

/// Forwards to `inner`, recording each request and whether it returned a
/// pointer.
pub struct RecordingAllocator<P> {
    inner: P,
    log: RefCell<Vec<(AllocRequest, bool)>>,
}

impl<P: AllocProc> RecordingAllocator<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            log: RefCell::new(Vec::new()),
        }
    }

    /// The ops seen so far, in order.
    pub fn ops(&self) -> Vec<AllocOp> {
        self.log.borrow().iter().map(|(req, _)| req.op).collect()
    }

    /// Every request seen so far, with whether it returned non-null.
    pub fn requests(&self) -> Vec<(AllocRequest, bool)> {
        self.log.borrow().clone()
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: AllocProc> AllocProc for RecordingAllocator<P> {
    unsafe fn dispatch(&self, req: &AllocRequest) -> Option<NonNull<u8>> {
        // SAFETY: forwarded caller contract.
        let result = unsafe { self.inner.dispatch(req) };
        self.log.borrow_mut().push((*req, result.is_some()));
        result
    }
}
