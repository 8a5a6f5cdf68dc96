//! The allocator capability.
//!
//! An allocation strategy is one procedure, [`AllocProc::dispatch`], that
//! handles every [`AllocOp`]. Keeping the capability to a single method
//! means a handle to it ([`Allocator`]) is a plain `&dyn AllocProc`: two
//! words, `Copy`, passed by value through any call chain.
//!
//! # Request semantics
//!
//! | Op | Behaviour |
//! |----|-----------|
//! | `Alloc` | `size` bytes aligned to `align`; zero-filled with [`AllocFlags::CLEAR_TO_ZERO`] |
//! | `Free` | releases `old_ptr`; no-op when `old_ptr` is `None` |
//! | `FreeAll` | releases everything allocated through this context |
//! | `Resize` | region of `size` bytes keeping `min(old_size, size)` bytes of content |
//!
//! A `Resize` to `size == 0` behaves as `Free` and returns `None`; a
//! `Resize` with no `old_ptr` behaves as `Alloc`. Strategies without a
//! specialised resize delegate to [`default_resize`].
//!
//! Every operation may return `None` to signal out-of-memory. Callers that
//! go through [`Allocator`] get a typed [`AllocError`] instead.

use std::alloc::Layout;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::ptr::{self, NonNull};

use crate::error::AllocError;
use crate::heap::HeapAllocator;

/// The operation an [`AllocRequest`] asks a procedure to perform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AllocOp {
    /// Allocate a new region.
    Alloc,
    /// Release a single prior allocation.
    Free,
    /// Release every allocation made through the context at once.
    FreeAll,
    /// Grow or shrink a prior allocation, possibly moving it.
    Resize,
}

impl fmt::Display for AllocOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Alloc => "alloc",
            Self::Free => "free",
            Self::FreeAll => "free_all",
            Self::Resize => "resize",
        };
        f.write_str(name)
    }
}

/// Bit flags modifying an [`AllocRequest`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AllocFlags(u32);

impl AllocFlags {
    /// No flags: returned memory has unspecified contents.
    pub const NONE: Self = Self(0);

    /// Zero-fill newly allocated bytes (including the grown tail of a resize).
    pub const CLEAR_TO_ZERO: Self = Self(1 << 0);

    /// Whether every bit of `other` is set in `self`.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// The raw bit pattern.
    pub fn bits(self) -> u32 {
        self.0
    }
}

impl Default for AllocFlags {
    /// [`AllocFlags::CLEAR_TO_ZERO`].
    fn default() -> Self {
        Self::CLEAR_TO_ZERO
    }
}

impl BitOr for AllocFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for AllocFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// A single request to an [`AllocProc`].
///
/// Fields not meaningful for an op are ignored (e.g. `old_ptr` for `Alloc`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocRequest {
    /// What to do.
    pub op: AllocOp,
    /// Requested size in bytes (new size for `Resize`).
    pub size: usize,
    /// Required alignment in bytes. Must be a power of two.
    pub align: usize,
    /// The prior allocation for `Free` and `Resize`.
    pub old_ptr: Option<NonNull<u8>>,
    /// Size the prior allocation was made with.
    pub old_size: usize,
    /// Request modifiers.
    pub flags: AllocFlags,
}

impl AllocRequest {
    /// An `Alloc` request with default (zero-filling) flags.
    pub fn alloc(size: usize, align: usize) -> Self {
        Self {
            op: AllocOp::Alloc,
            size,
            align,
            old_ptr: None,
            old_size: 0,
            flags: AllocFlags::default(),
        }
    }

    /// A `Free` request for a prior allocation of `size` bytes.
    pub fn free(ptr: Option<NonNull<u8>>, size: usize, align: usize) -> Self {
        Self {
            op: AllocOp::Free,
            size: 0,
            align,
            old_ptr: ptr,
            old_size: size,
            flags: AllocFlags::NONE,
        }
    }

    /// A `FreeAll` request.
    pub fn free_all() -> Self {
        Self {
            op: AllocOp::FreeAll,
            size: 0,
            align: 1,
            old_ptr: None,
            old_size: 0,
            flags: AllocFlags::NONE,
        }
    }

    /// A `Resize` request with default (zero-filling) flags.
    pub fn resize(
        old_ptr: Option<NonNull<u8>>,
        old_size: usize,
        new_size: usize,
        align: usize,
    ) -> Self {
        Self {
            op: AllocOp::Resize,
            size: new_size,
            align,
            old_ptr,
            old_size,
            flags: AllocFlags::default(),
        }
    }

    /// Replace the request's flags.
    pub fn with_flags(mut self, flags: AllocFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Whether new bytes must be zero-filled.
    pub fn clear_to_zero(&self) -> bool {
        self.flags.contains(AllocFlags::CLEAR_TO_ZERO)
    }
}

/// An allocation strategy: one procedure handling every [`AllocOp`].
///
/// Implementors take `&self`; strategies with mutable state use interior
/// mutability. Returning `None` signals failure for `Alloc` and `Resize`,
/// and is the normal result for `Free`, `FreeAll`, and a zero-size `Resize`.
pub trait AllocProc {
    /// Perform `req`.
    ///
    /// # Safety
    ///
    /// For `Free` and `Resize`, a non-null `old_ptr` must have been returned
    /// by this same procedure, not freed since, and `old_size`/`align` must
    /// match the request that produced it. `Alloc` and `FreeAll` have no
    /// preconditions.
    unsafe fn dispatch(&self, req: &AllocRequest) -> Option<NonNull<u8>>;
}

impl<P: AllocProc + ?Sized> AllocProc for &P {
    unsafe fn dispatch(&self, req: &AllocRequest) -> Option<NonNull<u8>> {
        // SAFETY: forwarded verbatim; the caller upholds the contract.
        unsafe { (**self).dispatch(req) }
    }
}

/// Resize by allocating a new region, copying, and freeing the old one.
///
/// A null `old_ptr` becomes an `Alloc`; `size == 0` becomes a `Free` and
/// returns `None`. On allocation failure the old region is left untouched
/// and `None` is returned.
///
/// # Safety
///
/// Same contract as [`AllocProc::dispatch`] for a `Resize` request on
/// `proc_`.
pub unsafe fn default_resize<P: AllocProc + ?Sized>(
    proc_: &P,
    req: &AllocRequest,
) -> Option<NonNull<u8>> {
    let Some(old) = req.old_ptr else {
        // SAFETY: an Alloc request has no preconditions.
        return unsafe { proc_.dispatch(&AllocRequest::alloc(req.size, req.align).with_flags(req.flags)) };
    };

    let free_old = AllocRequest::free(Some(old), req.old_size, req.align);
    if req.size == 0 {
        // SAFETY: `old` came from `proc_` with this size and alignment.
        unsafe { proc_.dispatch(&free_old) };
        return None;
    }

    // SAFETY: an Alloc request has no preconditions.
    let new = unsafe { proc_.dispatch(&AllocRequest::alloc(req.size, req.align).with_flags(req.flags))? };
    // SAFETY: `old` is valid for `old_size` bytes, `new` is a fresh region of
    // `size` bytes, and a live allocation never overlaps a fresh one.
    unsafe {
        ptr::copy_nonoverlapping(old.as_ptr(), new.as_ptr(), req.old_size.min(req.size));
        proc_.dispatch(&free_old);
    }
    Some(new)
}

/// Handle to an allocation strategy.
///
/// A fat pointer to an [`AllocProc`]: the vtable is the procedure and the
/// data pointer is its context. Handles are `Copy` and may alias the same
/// context; a zero-sized strategy such as [`HeapAllocator`] is a valid
/// zero-context handle.
#[derive(Clone, Copy)]
pub struct Allocator<'a> {
    proc_: &'a dyn AllocProc,
}

impl<'a> Allocator<'a> {
    /// Wrap a strategy.
    pub fn new(proc_: &'a dyn AllocProc) -> Self {
        Self { proc_ }
    }

    /// Handle to the global heap.
    pub fn heap() -> Allocator<'static> {
        static HEAP: HeapAllocator = HeapAllocator;
        Allocator::new(&HEAP)
    }

    /// Whether both handles refer to the same backing context.
    pub fn same_context(self, other: Allocator<'_>) -> bool {
        ptr::addr_eq(
            self.proc_ as *const dyn AllocProc,
            other.proc_ as *const dyn AllocProc,
        )
    }

    /// Forward a raw request to the strategy.
    ///
    /// # Safety
    ///
    /// See [`AllocProc::dispatch`].
    pub unsafe fn dispatch(self, req: &AllocRequest) -> Option<NonNull<u8>> {
        // SAFETY: the caller upholds the dispatch contract.
        unsafe { self.proc_.dispatch(req) }
    }

    /// Allocate `size` zero-filled bytes aligned to `align`.
    pub fn alloc(self, size: usize, align: usize) -> Result<NonNull<u8>, AllocError> {
        self.alloc_with(size, align, AllocFlags::CLEAR_TO_ZERO)
    }

    /// Allocate `size` bytes aligned to `align` without zero-filling.
    pub fn alloc_no_zero(self, size: usize, align: usize) -> Result<NonNull<u8>, AllocError> {
        self.alloc_with(size, align, AllocFlags::NONE)
    }

    /// Allocate zero-filled memory for `layout`.
    pub fn alloc_layout(self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        self.alloc(layout.size(), layout.align())
    }

    /// Copy `bytes` into a fresh allocation aligned to `align`.
    pub fn alloc_copy(self, bytes: &[u8], align: usize) -> Result<NonNull<[u8]>, AllocError> {
        let ptr = self.alloc_no_zero(bytes.len(), align)?;
        // SAFETY: `ptr` is a fresh region of `bytes.len()` bytes.
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr(), bytes.len()) };
        Ok(NonNull::slice_from_raw_parts(ptr, bytes.len()))
    }

    /// Release one allocation. `None` is a no-op.
    ///
    /// # Safety
    ///
    /// `ptr` must come from this handle's strategy with `size` and `align`,
    /// and must not be used afterwards.
    pub unsafe fn free(self, ptr: Option<NonNull<u8>>, size: usize, align: usize) {
        // SAFETY: forwarded caller contract.
        unsafe { self.proc_.dispatch(&AllocRequest::free(ptr, size, align)) };
    }

    /// Release everything allocated through this context.
    ///
    /// Strategies that cannot bulk-free (the heap) ignore the request.
    pub fn free_all(self) {
        // SAFETY: a FreeAll request has no preconditions.
        unsafe { self.proc_.dispatch(&AllocRequest::free_all()) };
    }

    /// Resize an allocation to `new_size` bytes, zero-filling any growth.
    ///
    /// Returns `Ok(None)` when `new_size` is zero (the old region is freed).
    /// On failure the old region is still valid.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must come from this handle's strategy with
    /// `old_size` and `align`. On success it must not be used afterwards.
    pub unsafe fn resize(
        self,
        ptr: Option<NonNull<u8>>,
        old_size: usize,
        new_size: usize,
        align: usize,
    ) -> Result<Option<NonNull<u8>>, AllocError> {
        check_layout(new_size, align)?;
        let req = AllocRequest::resize(ptr, old_size, new_size, align);
        // SAFETY: forwarded caller contract.
        let result = unsafe { self.proc_.dispatch(&req) };
        match result {
            Some(p) => Ok(Some(p)),
            None if new_size == 0 => Ok(None),
            None => Err(AllocError::OutOfMemory {
                size: new_size,
                align,
            }),
        }
    }

    fn alloc_with(
        self,
        size: usize,
        align: usize,
        flags: AllocFlags,
    ) -> Result<NonNull<u8>, AllocError> {
        check_layout(size, align)?;
        let req = AllocRequest::alloc(size, align).with_flags(flags);
        // SAFETY: an Alloc request has no preconditions.
        unsafe { self.proc_.dispatch(&req) }.ok_or(AllocError::OutOfMemory { size, align })
    }
}

impl fmt::Debug for Allocator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocator")
            .field("context", &(self.proc_ as *const dyn AllocProc).cast::<()>())
            .finish()
    }
}

fn check_layout(size: usize, align: usize) -> Result<(), AllocError> {
    Layout::from_size_align(size, align)
        .map(|_| ())
        .map_err(|_| AllocError::InvalidLayout { size, align })
}
