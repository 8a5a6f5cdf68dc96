//! Pools of scratch arenas for short-lived working memory.
//!
//! A function that builds a result in a caller-provided arena often needs
//! temporary space of its own. Taking that space from the caller's arena
//! would interleave scratch data with the result; taking it from a fresh
//! arena would cost a reservation per call. A [`ScratchPool`] keeps a few
//! long-lived arenas and hands out a [`TempArena`] over one that is not
//! already in use by the caller:
//!
//! ```ignore
//! fn build(pool: &ScratchPool, out: &Arena) -> Result<NonNull<u8>, ArenaError> {
//!     let scratch = pool.scratch(&[out]).ok_or(/* ... */)?;
//!     let tmp = scratch.push(4096, 8)?; // rewound when `scratch` drops
//!     out.push(64, 8)                   // survives
//! }
//! ```
//!
//! The pool is per-thread. [`with_scratch`] reaches a lazily created
//! thread-local pool; [`init_thread_pool`] and [`teardown_thread_pool`]
//! control its lifetime explicitly.

use std::cell::RefCell;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::arena::Arena;
use crate::config::ScratchConfig;
use crate::error::ArenaError;
use crate::temp::TempArena;
use crate::vm::{SystemMemory, VirtualMemory};

/// A fixed set of arenas handed out as temporary scopes.
#[derive(Debug)]
pub struct ScratchPool {
    arenas: SmallVec<[Arena; 2]>,
}

impl ScratchPool {
    /// Create a pool on the operating system's virtual memory.
    pub fn new(config: ScratchConfig) -> Result<Self, ArenaError> {
        Self::with_memory(config, Rc::new(SystemMemory::default()))
    }

    /// Create a pool whose arenas share one virtual-memory provider.
    pub fn with_memory(
        config: ScratchConfig,
        memory: Rc<dyn VirtualMemory>,
    ) -> Result<Self, ArenaError> {
        config.validate()?;
        let arenas = (0..config.arena_count)
            .map(|_| Arena::with_memory(config.params.clone(), Rc::clone(&memory)))
            .collect::<Result<SmallVec<_>, _>>()?;
        Ok(Self { arenas })
    }

    /// A temporary scope over the first pool arena not in `conflicts`.
    ///
    /// Conflicts are compared by arena identity. Returns `None` only when
    /// every pool arena conflicts.
    pub fn scratch(&self, conflicts: &[&Arena]) -> Option<TempArena<'_>> {
        self.arenas
            .iter()
            .find(|arena| conflicts.iter().all(|c| c.id() != arena.id()))
            .map(Arena::temp)
    }

    /// Number of arenas in the pool.
    pub fn len(&self) -> usize {
        self.arenas.len()
    }

    /// Whether the pool has no arenas. Never true for a validated pool.
    pub fn is_empty(&self) -> bool {
        self.arenas.is_empty()
    }

    /// The pool's arenas, in selection order.
    pub fn arenas(&self) -> &[Arena] {
        &self.arenas
    }
}

// ── Thread-local pool ──────────────────────────────────────────────

thread_local! {
    static THREAD_POOL: RefCell<Option<ScratchPool>> = const { RefCell::new(None) };
}

/// Create this thread's scratch pool, replacing any existing one.
///
/// Must not be called from inside [`with_scratch`].
pub fn init_thread_pool(config: ScratchConfig) -> Result<(), ArenaError> {
    let pool = ScratchPool::new(config)?;
    tracing::debug!(arenas = pool.len(), "thread scratch pool initialised");
    THREAD_POOL.with(|slot| *slot.borrow_mut() = Some(pool));
    Ok(())
}

/// Release this thread's scratch pool, if any.
///
/// Must not be called from inside [`with_scratch`].
pub fn teardown_thread_pool() {
    let pool = THREAD_POOL.with(|slot| slot.borrow_mut().take());
    if let Some(pool) = pool {
        tracing::debug!(arenas = pool.len(), "thread scratch pool torn down");
    }
}

/// Run `f` with a scratch scope from this thread's pool.
///
/// The pool is created with default parameters on first use. `f` receives
/// `None` when every pool arena is in `conflicts`, or when the pool could
/// not be created. Calls nest: `f` may call `with_scratch` again, passing
/// the outer scope's arena as a conflict.
pub fn with_scratch<R>(conflicts: &[&Arena], f: impl FnOnce(Option<TempArena<'_>>) -> R) -> R {
    THREAD_POOL.with(|slot| {
        let uninit = slot.borrow().is_none();
        if uninit {
            if let Ok(mut slot) = slot.try_borrow_mut() {
                if let Ok(pool) = ScratchPool::new(ScratchConfig::default()) {
                    tracing::debug!(arenas = pool.len(), "thread scratch pool initialised");
                    *slot = Some(pool);
                }
            }
        }
        let pool = slot.borrow();
        f(pool.as_ref().and_then(|pool| pool.scratch(conflicts)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ArenaParams;
    use crate::vm::HeapMemory;

    fn small_config(arena_count: usize) -> ScratchConfig {
        ScratchConfig {
            arena_count,
            params: ArenaParams::new()
                .with_reserve_size(64 * 1024)
                .with_commit_size(4096),
        }
    }

    fn pool(arena_count: usize) -> ScratchPool {
        ScratchPool::with_memory(small_config(arena_count), Rc::new(HeapMemory::default()))
            .unwrap()
    }

    #[test]
    fn default_pool_has_two_arenas() {
        let pool = pool(ScratchConfig::DEFAULT_ARENA_COUNT);
        assert_eq!(pool.len(), 2);
        assert!(!pool.is_empty());
    }

    #[test]
    fn empty_pool_rejected() {
        let err = ScratchPool::with_memory(small_config(0), Rc::new(HeapMemory::default()));
        assert!(matches!(err, Err(ArenaError::InvalidConfig { .. })));
    }

    #[test]
    fn scratch_without_conflicts_uses_first_arena() {
        let pool = pool(2);
        let scratch = pool.scratch(&[]).unwrap();
        assert_eq!(scratch.id(), pool.arenas()[0].id());
    }

    #[test]
    fn scratch_skips_conflicting_arena() {
        let pool = pool(2);
        let first = &pool.arenas()[0];
        let scratch = pool.scratch(&[first]).unwrap();
        assert_eq!(scratch.id(), pool.arenas()[1].id());
    }

    #[test]
    fn scratch_none_when_all_conflict() {
        let pool = pool(2);
        let [a, b] = [&pool.arenas()[0], &pool.arenas()[1]];
        assert!(pool.scratch(&[a, b]).is_none());
    }

    #[test]
    fn nested_scratch_uses_the_other_arena() {
        let pool = pool(2);
        let outer = pool.scratch(&[]).unwrap();
        outer.push(100, 8).unwrap();
        {
            let inner = pool.scratch(&[outer.arena()]).unwrap();
            assert_ne!(inner.id(), outer.id());
            inner.push(200, 8).unwrap();
            outer.push(10, 1).unwrap();
        }
        assert_eq!(pool.arenas()[1].pos(), 0);
        assert_eq!(outer.pos(), 110);
        drop(outer);
        assert_eq!(pool.arenas()[0].pos(), 0);
    }

    #[test]
    fn foreign_conflict_is_ignored() {
        let pool = pool(1);
        let caller = Arena::with_memory(small_config(1).params, Rc::new(HeapMemory::default()))
            .unwrap();
        let scratch = pool.scratch(&[&caller]).unwrap();
        assert_eq!(scratch.id(), pool.arenas()[0].id());
    }

    #[test]
    fn thread_pool_lifecycle() {
        init_thread_pool(small_config(3)).unwrap();
        with_scratch(&[], |scratch| {
            let scratch = scratch.unwrap();
            scratch.push(64, 8).unwrap();
            with_scratch(&[scratch.arena()], |inner| {
                let inner = inner.unwrap();
                assert_ne!(inner.id(), scratch.id());
            });
        });
        teardown_thread_pool();
        teardown_thread_pool();
    }

    #[test]
    fn with_scratch_initialises_lazily() {
        std::thread::spawn(|| {
            let pos = with_scratch(&[], |scratch| {
                let scratch = scratch.unwrap();
                scratch.push(16, 8).unwrap();
                scratch.pos()
            });
            assert_eq!(pos, 16);
            with_scratch(&[], |scratch| assert_eq!(scratch.unwrap().pos(), 0));
            teardown_thread_pool();
        })
        .join()
        .unwrap();
    }
}
