//! Temporary allocation scopes.
//!
//! A scope records an arena's position and later rewinds to it, discarding
//! everything pushed in between. Two forms are provided:
//!
//! - [`Temp`]: a bare saved position, ended explicitly with
//!   [`Arena::end_temp`].
//! - [`TempArena`]: a guard that borrows the arena, derefs to it, and rewinds
//!   on drop.
//!
//! Scopes nest. Ending them out of order is not an error: ending an outer
//! scope first rewinds past the inner one, and ending the inner one
//! afterwards is a no-op because its position is now ahead of the cursor.

use std::fmt;
use std::ops::Deref;

use strata_core::ArenaId;

use crate::arena::Arena;

/// A saved arena position.
#[must_use = "a temporary scope does nothing unless it is ended"]
#[derive(Debug, PartialEq, Eq)]
pub struct Temp {
    arena: ArenaId,
    pos: usize,
}

impl Temp {
    /// The arena this scope belongs to.
    pub fn arena(&self) -> ArenaId {
        self.arena
    }

    /// The position the arena will be rewound to.
    pub fn pos(&self) -> usize {
        self.pos
    }
}

impl Arena {
    /// Begin a temporary scope at the current position.
    pub fn begin_temp(&self) -> Temp {
        Temp {
            arena: self.id(),
            pos: self.pos(),
        }
    }

    /// End a scope, rewinding to the position it saved.
    ///
    /// `temp` must have been begun on this arena.
    pub fn end_temp(&self, temp: Temp) {
        debug_assert_eq!(
            temp.arena,
            self.id(),
            "temporary scope ended on a different arena"
        );
        self.pop_to(temp.pos);
    }

    /// Begin a scope that ends when the returned guard is dropped.
    pub fn temp(&self) -> TempArena<'_> {
        TempArena {
            arena: self,
            temp: Some(self.begin_temp()),
        }
    }
}

/// Scope guard over an [`Arena`].
///
/// Derefs to the arena, so allocations go straight through the guard.
/// Dropping the guard (or calling [`end`](TempArena::end)) rewinds the
/// arena to where it was when the guard was created.
pub struct TempArena<'a> {
    arena: &'a Arena,
    temp: Option<Temp>,
}

impl<'a> TempArena<'a> {
    /// The underlying arena.
    pub fn arena(&self) -> &'a Arena {
        self.arena
    }

    /// The position this guard will rewind to.
    pub fn saved_pos(&self) -> usize {
        self.temp.as_ref().map_or(0, Temp::pos)
    }

    /// End the scope now.
    pub fn end(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if let Some(temp) = self.temp.take() {
            self.arena.end_temp(temp);
        }
    }
}

impl Deref for TempArena<'_> {
    type Target = Arena;

    fn deref(&self) -> &Arena {
        self.arena
    }
}

impl Drop for TempArena<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}

impl fmt::Debug for TempArena<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TempArena")
            .field("arena", &self.arena.id())
            .field("saved_pos", &self.saved_pos())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::config::ArenaParams;
    use crate::vm::HeapMemory;

    fn arena() -> Arena {
        let params = ArenaParams::new()
            .with_reserve_size(64 * 1024)
            .with_commit_size(4096);
        Arena::with_memory(params, Rc::new(HeapMemory::default())).unwrap()
    }

    #[test]
    fn scope_restores_position() {
        let arena = arena();
        arena.push(100, 1).unwrap();
        let temp = arena.begin_temp();
        assert_eq!(temp.pos(), 100);
        arena.push(50, 1).unwrap();
        assert_eq!(arena.pos(), 150);
        arena.end_temp(temp);
        assert_eq!(arena.pos(), 100);
    }

    #[test]
    fn scopes_nest() {
        let arena = arena();
        let outer = arena.begin_temp();
        arena.push(10, 1).unwrap();
        let inner = arena.begin_temp();
        arena.push(20, 1).unwrap();
        arena.end_temp(inner);
        assert_eq!(arena.pos(), 10);
        arena.end_temp(outer);
        assert_eq!(arena.pos(), 0);
    }

    #[test]
    fn push_between_nested_ends_is_discarded() {
        let arena = arena();
        arena.push(7, 1).unwrap();
        let outer = arena.begin_temp();
        let inner = arena.begin_temp();
        arena.push(70_000, 8).unwrap();
        assert_eq!(arena.block_count(), 2);
        arena.end_temp(inner);
        assert_eq!(arena.pos(), 7);
        assert_eq!(arena.block_count(), 1);

        arena.push(70_000, 8).unwrap();
        assert_eq!(arena.block_count(), 2);
        arena.end_temp(outer);
        assert_eq!(arena.pos(), 7);
        assert_eq!(arena.block_count(), 1);
    }

    #[test]
    fn out_of_order_end_keeps_earlier_position() {
        let arena = arena();
        arena.push(8, 1).unwrap();
        let outer = arena.begin_temp();
        arena.push(16, 1).unwrap();
        let inner = arena.begin_temp();
        arena.push(32, 1).unwrap();

        arena.end_temp(outer);
        assert_eq!(arena.pos(), 8);
        arena.end_temp(inner);
        assert_eq!(arena.pos(), 8);
    }

    #[test]
    fn guard_rewinds_on_drop() {
        let arena = arena();
        arena.push(100, 1).unwrap();
        {
            let scratch = arena.temp();
            scratch.push(4000, 8).unwrap();
            assert_eq!(scratch.saved_pos(), 100);
            assert_eq!(arena.pos(), 4104);
        }
        assert_eq!(arena.pos(), 100);
    }

    #[test]
    fn guard_end_is_explicit_drop() {
        let arena = arena();
        let scratch = arena.temp();
        scratch.push(64, 8).unwrap();
        scratch.end();
        assert_eq!(arena.pos(), 0);
    }

    #[test]
    fn guard_releases_blocks_chained_inside_scope() {
        let arena = arena();
        {
            let scratch = arena.temp();
            scratch.push(200 * 1024, 8).unwrap();
            assert_eq!(arena.block_count(), 2);
        }
        assert_eq!(arena.block_count(), 1);
        assert_eq!(arena.pos(), 0);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "different arena")]
    fn ending_on_wrong_arena_panics_in_debug() {
        let a = arena();
        let b = arena();
        let temp = a.begin_temp();
        b.end_temp(temp);
    }
}
