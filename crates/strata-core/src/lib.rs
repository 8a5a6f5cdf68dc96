//! Core types and traits for the Strata memory layer.
//!
//! This is the leaf crate with zero internal dependencies. It defines the
//! allocator capability every other Strata component allocates through:
//!
//! - [`AllocProc`]: one dispatch procedure over the closed set of
//!   [`AllocOp`]s (allocate, free, free-all, resize).
//! - [`Allocator`]: a two-word, `Copy` handle to an `AllocProc`, passed by
//!   value so call sites never depend on a concrete allocation strategy.
//! - [`HeapAllocator`]: the global-heap strategy, usable as a zero-context
//!   handle via [`Allocator::heap`].
//!
//! Arena-backed strategies live in `strata-arena`.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod alloc;
pub mod error;
pub mod heap;
pub mod id;

pub use alloc::{default_resize, AllocFlags, AllocOp, AllocProc, AllocRequest, Allocator};
pub use error::AllocError;
pub use heap::HeapAllocator;
pub use id::ArenaId;
