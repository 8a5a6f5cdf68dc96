//! Chained, virtual-memory-backed bump arenas for Strata.
//!
//! An [`Arena`] reserves a large range of address space up front, commits
//! it page by page as allocations advance a cursor, and chains further
//! reservations when one fills. Memory is reclaimed in bulk by rewinding
//! the cursor, never per object.
//!
//! # Architecture
//!
//! ```text
//! Arena
//! ├── Rc<dyn VirtualMemory>       (reserve / commit / release)
//! └── Block (current) ─prev─▶ Block ─prev─▶ … ─▶ Block (first)
//!
//! TempArena<'a>  ── saved position, rewinds on drop
//! ScratchPool    ── SmallVec<[Arena; 2]>, handed out as TempArena
//! impl AllocProc for Arena  ── arena behind a strata_core::Allocator
//! ```
//!
//! # Positions and scopes
//!
//! [`Arena::pos`] is a chain-global byte counter. Saving it and later
//! calling [`Arena::pop_to`] discards everything allocated in between and
//! releases any block that lies wholly past the saved position. Committed
//! pages in the surviving block are kept for reuse. [`Temp`] and
//! [`TempArena`] package that save/restore pair as a scope.
//!
//! # Threading
//!
//! Arenas are single-threaded: every operation takes `&self` through
//! `Cell`/`RefCell`, and neither `Send` nor `Sync` is implemented. The
//! scratch pool is per-thread.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_op_in_unsafe_fn)]

mod alloc;
pub mod arena;
mod block;
pub mod config;
pub mod error;
mod raw;
pub mod scratch;
pub mod temp;
pub mod vm;

// Public re-exports for the primary API surface.
pub use arena::{Arena, ArenaStats};
pub use block::ARENA_HEADER_SIZE;
pub use config::{ArenaFlags, ArenaParams, ScratchConfig};
pub use error::ArenaError;
pub use scratch::{init_thread_pool, teardown_thread_pool, with_scratch, ScratchPool};
pub use temp::{Temp, TempArena};
pub use vm::{HeapMemory, SystemMemory, VirtualMemory};
