//! Strata: virtual-memory-backed arena allocation for parse-then-discard
//! workloads.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all Strata sub-crates. For most users, adding `strata` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use strata::prelude::*;
//!
//! let arena = Arena::new(ArenaParams::default()).unwrap();
//!
//! // Bump-allocate a few values.
//! let header = arena.push_value(7u32).unwrap();
//! let name = arena.push_str("strata").unwrap();
//! assert_eq!(unsafe { *header.as_ptr() }, 7);
//! assert_eq!(unsafe { name.as_ref() }, "strata");
//!
//! // Everything pushed inside a scope is discarded when it ends.
//! let before = arena.pos();
//! {
//!     let scratch = arena.temp();
//!     scratch.push(4096, 8).unwrap();
//! }
//! assert_eq!(arena.pos(), before);
//!
//! // Code written against `Allocator` runs on the heap or on an arena.
//! fn copy_in(alloc: Allocator<'_>, bytes: &[u8]) -> usize {
//!     alloc.alloc_copy(bytes, 1).map(|p| p.len()).unwrap_or(0)
//! }
//! assert_eq!(copy_in(Allocator::heap(), b"abc"), 3);
//! assert_eq!(copy_in(arena.allocator(), b"abc"), 3);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `strata-core` | Allocator capability, heap strategy, IDs |
//! | [`arena`] | `strata-arena` | Arenas, scopes, scratch pools, VM providers |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Arenas, temporary scopes, scratch pools, and virtual-memory providers
/// (`strata-arena`).
///
/// Most users only need [`arena::Arena`] and [`arena::ArenaParams`], which
/// are also available in the [`prelude`].
pub use strata_arena as arena;

/// The allocator capability and the global-heap strategy (`strata-core`).
///
/// [`types::Allocator`] is the handle library code should accept;
/// [`types::AllocProc`] is the trait a new strategy implements.
pub use strata_core as types;

/// Common imports for typical Strata usage.
///
/// ```rust
/// use strata::prelude::*;
/// ```
pub mod prelude {
    // Arenas
    pub use strata_arena::{
        Arena, ArenaFlags, ArenaParams, ScratchConfig, ScratchPool, Temp, TempArena,
    };

    // Allocator capability
    pub use strata_core::{AllocError, AllocProc, Allocator, HeapAllocator};

    // Errors
    pub use strata_arena::ArenaError;
}
