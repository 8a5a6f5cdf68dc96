//! The chained bump arena.
//!
//! An [`Arena`] hands out memory by advancing a cursor through a block of
//! reserved address space, committing pages as the cursor moves. When a
//! push does not fit, a new block large enough for it is reserved and
//! linked in front of the old one. Memory is never freed per object:
//! [`Arena::pop_to`] rewinds the cursor (releasing any blocks that lie
//! entirely past the target) and dropping the arena releases everything.
//!
//! # Positions
//!
//! [`Arena::pos`] is a byte counter that runs across the whole chain. A
//! push of `s` bytes aligned to `a` moves it from `p` to
//! `round_up(p, a) + s`, in every block, so a saved position can always be
//! restored exactly with `pop_to`.
//!
//! # Sharing
//!
//! Every operation takes `&self`. The arena is single-threaded (`!Sync`)
//! and hands out raw pointers; code that holds pointers into the arena is
//! responsible for not using them after the cursor has been rewound past
//! them.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::ptr::{self, NonNull};
use std::rc::Rc;

use strata_core::{Allocator, ArenaId};

use crate::block::Block;
use crate::config::{ArenaFlags, ArenaParams};
use crate::error::ArenaError;
use crate::raw::round_up;
use crate::vm::{HeapMemory, SystemMemory, VirtualMemory};

/// Point-in-time sizes of an [`Arena`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArenaStats {
    /// Current cursor position.
    pub pos: usize,
    /// Number of blocks in the chain.
    pub block_count: usize,
    /// Address space reserved across all blocks, in bytes.
    pub reserved: usize,
    /// Memory committed across all blocks, in bytes.
    pub committed: usize,
}

/// A chained, virtual-memory-backed bump allocator.
pub struct Arena {
    id: ArenaId,
    current: RefCell<Box<Block>>,
    pos: Cell<usize>,
    memory: Rc<dyn VirtualMemory>,
    flags: ArenaFlags,
    /// Per-block reservation, a multiple of `reserve_granule`.
    reserve_size: usize,
    /// Commit step, a multiple of `page_size`, at most `reserve_size`.
    commit_size: usize,
    /// Largest supported alignment. The first block's data address is a
    /// multiple of it, so address and position agree modulo it.
    page_size: usize,
    reserve_granule: usize,
}

impl Arena {
    /// Create an arena on the operating system's virtual memory.
    pub fn new(params: ArenaParams) -> Result<Self, ArenaError> {
        Self::with_memory(params, Rc::new(SystemMemory::default()))
    }

    /// Create an arena on a specific virtual-memory provider.
    ///
    /// The first block is reserved and its initial commit made before this
    /// returns.
    pub fn with_memory(
        params: ArenaParams,
        memory: Rc<dyn VirtualMemory>,
    ) -> Result<Self, ArenaError> {
        params.validate()?;
        let page_size = memory.page_size();
        if !page_size.is_power_of_two() {
            return Err(ArenaError::InvalidConfig {
                reason: format!("provider page size {page_size} is not a power of two"),
            });
        }
        let large_pages = params.flags.contains(ArenaFlags::LARGE_PAGES);
        let reserve_granule = if large_pages {
            memory.large_page_size().max(page_size)
        } else {
            page_size
        };

        let overflow = || ArenaError::SizeOverflow {
            size: params.reserve_size,
            align: reserve_granule,
        };
        let reserve_size = round_up(params.reserve_size, reserve_granule).ok_or_else(overflow)?;
        let commit_size = round_up(params.commit_size, page_size)
            .ok_or_else(overflow)?
            .min(reserve_size);

        let block = Block::reserve(&*memory, reserve_size, commit_size, large_pages, 0, 0)?;
        let id = ArenaId::next();
        tracing::debug!(
            arena = %id,
            reserve_size,
            commit_size,
            flags = ?params.flags,
            "arena created"
        );

        Ok(Self {
            id,
            current: RefCell::new(Box::new(block)),
            pos: Cell::new(0),
            memory,
            flags: params.flags,
            reserve_size,
            commit_size,
            page_size,
            reserve_granule,
        })
    }

    /// Create an arena over a caller-owned buffer.
    ///
    /// The arena never chains, commits, or releases: pushes that do not fit
    /// in `buffer` fail with [`ArenaError::ChainingDisabled`]. Alignments
    /// above the buffer's own address alignment (capped at the page size)
    /// fail with [`ArenaError::UnsupportedAlignment`].
    pub fn from_buffer(buffer: &'static mut [u8]) -> Self {
        let len = buffer.len();
        let ptr = NonNull::new(buffer.as_mut_ptr()).unwrap_or(NonNull::dangling());
        // SAFETY: a `'static` exclusive borrow is valid and unaliased for
        // the arena's whole lifetime.
        unsafe { Self::from_raw_buffer(ptr, len) }
    }

    /// Create an arena over `len` bytes at `ptr`.
    ///
    /// # Safety
    ///
    /// `[ptr, ptr + len)` must be valid for reads and writes, and not
    /// accessed through any other path, for as long as the arena or any
    /// pointer it returned is in use.
    pub unsafe fn from_raw_buffer(ptr: NonNull<u8>, len: usize) -> Self {
        let memory = HeapMemory::default();
        let page_size = memory.page_size();
        let shift = ptr.as_ptr().addr().trailing_zeros().min(usize::BITS - 1);
        let max_align = (1usize << shift).min(page_size);
        let id = ArenaId::next();
        tracing::debug!(arena = %id, len, max_align, "arena created over external buffer");
        Self {
            id,
            current: RefCell::new(Box::new(Block::external(ptr, len))),
            pos: Cell::new(0),
            memory: Rc::new(memory),
            flags: ArenaFlags::NO_CHAIN,
            reserve_size: len,
            commit_size: len,
            page_size: max_align,
            reserve_granule: page_size,
        }
    }

    // ── Introspection ──────────────────────────────────────────────

    /// Process-unique identity of this arena.
    pub fn id(&self) -> ArenaId {
        self.id
    }

    /// The flags the arena was created with.
    pub fn flags(&self) -> ArenaFlags {
        self.flags
    }

    /// Current cursor position.
    pub fn pos(&self) -> usize {
        self.pos.get()
    }

    /// Address space reserved across the chain.
    pub fn reserved_size(&self) -> usize {
        self.stats().reserved
    }

    /// Memory committed across the chain.
    pub fn committed_size(&self) -> usize {
        self.stats().committed
    }

    /// Number of blocks in the chain.
    pub fn block_count(&self) -> usize {
        self.stats().block_count
    }

    /// Snapshot of the arena's sizes.
    pub fn stats(&self) -> ArenaStats {
        let current = self.current.borrow();
        let mut stats = ArenaStats {
            pos: self.pos.get(),
            ..ArenaStats::default()
        };
        let mut block: Option<&Block> = Some(&**current);
        while let Some(b) = block {
            stats.block_count += 1;
            stats.reserved += b.reserved();
            stats.committed += b.committed();
            block = b.prev.as_deref();
        }
        stats
    }

    /// An [`Allocator`] handle whose requests are served by this arena.
    pub fn allocator(&self) -> Allocator<'_> {
        Allocator::new(self)
    }

    // ── Push ───────────────────────────────────────────────────────

    /// Allocate `size` zero-filled bytes aligned to `align`.
    ///
    /// `align` must be a power of two no larger than the page size. On
    /// failure the arena is unchanged.
    pub fn push(&self, size: usize, align: usize) -> Result<NonNull<u8>, ArenaError> {
        self.push_with(size, align, true)
    }

    /// Allocate `size` bytes aligned to `align` without zero-filling.
    ///
    /// The contents are whatever the memory last held.
    pub fn push_no_zero(&self, size: usize, align: usize) -> Result<NonNull<u8>, ArenaError> {
        self.push_with(size, align, false)
    }

    /// Allocate a zero-filled array of `len` values of `T`.
    pub fn push_array<T>(&self, len: usize) -> Result<NonNull<T>, ArenaError> {
        let align = mem::align_of::<T>();
        let size = mem::size_of::<T>()
            .checked_mul(len)
            .ok_or(ArenaError::SizeOverflow { size: len, align })?;
        Ok(self.push(size, align)?.cast())
    }

    /// Move `value` into the arena.
    ///
    /// The value is never dropped by the arena.
    pub fn push_value<T>(&self, value: T) -> Result<NonNull<T>, ArenaError> {
        let ptr = self
            .push_no_zero(mem::size_of::<T>(), mem::align_of::<T>())?
            .cast::<T>();
        // SAFETY: `ptr` is a fresh, aligned region sized for one `T`.
        unsafe { ptr.as_ptr().write(value) };
        Ok(ptr)
    }

    /// Copy `values` into the arena.
    pub fn push_copy<T: Copy>(&self, values: &[T]) -> Result<NonNull<[T]>, ArenaError> {
        let ptr = self
            .push_no_zero(mem::size_of_val(values), mem::align_of::<T>())?
            .cast::<T>();
        // SAFETY: `ptr` is a fresh, aligned region sized for `values`.
        unsafe { ptr::copy_nonoverlapping(values.as_ptr(), ptr.as_ptr(), values.len()) };
        Ok(NonNull::slice_from_raw_parts(ptr, values.len()))
    }

    /// Copy `s` into the arena.
    pub fn push_str(&self, s: &str) -> Result<NonNull<str>, ArenaError> {
        let bytes = self.push_copy(s.as_bytes())?;
        // SAFETY: the bytes were copied from a `str`, so they are UTF-8.
        Ok(unsafe { NonNull::new_unchecked(bytes.as_ptr() as *mut str) })
    }

    fn push_with(&self, size: usize, align: usize, zero: bool) -> Result<NonNull<u8>, ArenaError> {
        debug_assert!(
            align.is_power_of_two(),
            "alignment must be a power of two (got {align})"
        );
        if !align.is_power_of_two() || align > self.page_size {
            return Err(ArenaError::UnsupportedAlignment {
                align,
                max: self.page_size,
            });
        }

        let mut current = self.current.borrow_mut();
        let pos = self.pos.get();
        let (start, end) = match current.place(pos, size, align) {
            Some(span) => span,
            None => {
                self.chain(&mut current, pos, size, align)?;
                current
                    .place(pos, size, align)
                    .ok_or(ArenaError::SizeOverflow { size, align })?
            }
        };
        current.commit_to(&*self.memory, end, self.commit_size)?;

        let ptr = current.ptr_at(start);
        if zero {
            // SAFETY: `[start, end)` is committed and inside the block.
            unsafe { ptr::write_bytes(ptr.as_ptr(), 0, size) };
        }
        self.pos.set(end);
        Ok(ptr)
    }

    /// Link a new block able to hold `size` bytes aligned to `align` at
    /// position `pos`.
    fn chain(
        &self,
        current: &mut Box<Block>,
        pos: usize,
        size: usize,
        align: usize,
    ) -> Result<(), ArenaError> {
        if self.flags.contains(ArenaFlags::NO_CHAIN) || current.is_external() {
            return Err(ArenaError::ChainingDisabled {
                requested: size,
                available: current.end_pos().saturating_sub(pos),
            });
        }

        let overflow = || ArenaError::SizeOverflow { size, align };
        let skew = pos % self.page_size;
        let needed = skew
            .checked_add(align - 1)
            .and_then(|n| n.checked_add(size))
            .ok_or_else(overflow)?;
        let reserve = round_up(needed, self.reserve_granule)
            .ok_or_else(overflow)?
            .max(self.reserve_size);
        let commit = round_up(needed, self.page_size)
            .ok_or_else(overflow)?
            .max(self.commit_size)
            .min(reserve);

        let large_pages = self.flags.contains(ArenaFlags::LARGE_PAGES);
        let block = Block::reserve(&*self.memory, reserve, commit, large_pages, pos, skew)?;
        let prev = mem::replace(current, Box::new(block));
        current.prev = Some(prev);
        tracing::trace!(arena = %self.id, base_pos = pos, reserve, "chained new block");
        Ok(())
    }

    // ── Pop ────────────────────────────────────────────────────────

    /// Rewind the cursor to `pos`.
    ///
    /// Blocks whose base position is at or past `pos` are released, except
    /// the first. A target at or beyond the current position is a no-op.
    /// Committed memory in the surviving block is kept for reuse.
    pub fn pop_to(&self, pos: usize) {
        if pos >= self.pos.get() {
            return;
        }
        let mut current = self.current.borrow_mut();
        while current.base_pos() >= pos {
            let Some(prev) = current.prev.take() else {
                break;
            };
            let mut released = mem::replace(&mut *current, prev);
            tracing::trace!(arena = %self.id, base_pos = released.base_pos(), "released block");
            released.release(&*self.memory);
        }
        self.pos.set(pos.max(current.base_pos()));
    }

    /// Rewind the cursor by `amount` bytes, stopping at zero.
    pub fn pop(&self, amount: usize) {
        self.pop_to(self.pos.get().saturating_sub(amount));
    }

    /// Rewind the cursor to zero, keeping only the first block.
    pub fn clear(&self) {
        self.pop_to(0);
    }

    /// Release every block back to the virtual-memory provider.
    ///
    /// Equivalent to dropping the arena.
    pub fn release(self) {
        drop(self);
    }

    // ── Allocator support ──────────────────────────────────────────

    /// Whether `[ptr, ptr + size)` is the most recent allocation, ending
    /// exactly at the cursor in the current block.
    pub(crate) fn is_last(&self, ptr: NonNull<u8>, size: usize) -> bool {
        let current = self.current.borrow();
        match self.pos.get().checked_sub(size) {
            Some(start) if start >= current.base_pos() => current.ptr_at(start) == ptr,
            _ => false,
        }
    }

    /// Grow or shrink the most recent allocation in place. Returns `false`
    /// (leaving the arena unchanged) when `ptr` is not the last allocation
    /// or the new size does not fit in the current block.
    pub(crate) fn resize_last(
        &self,
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
        zero: bool,
    ) -> bool {
        if !self.is_last(ptr, old_size) {
            return false;
        }
        let mut current = self.current.borrow_mut();
        let start = self.pos.get() - old_size;
        let end = match start.checked_add(new_size) {
            Some(end) if end <= current.end_pos() => end,
            _ => return false,
        };
        if current.commit_to(&*self.memory, end, self.commit_size).is_err() {
            return false;
        }
        if zero && new_size > old_size {
            // SAFETY: `[start + old_size, end)` is committed and inside the
            // current block.
            unsafe { ptr::write_bytes(ptr.as_ptr().add(old_size), 0, new_size - old_size) };
        }
        self.pos.set(end);
        true
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        let memory = &*self.memory;
        let current = self.current.get_mut();
        let mut next = current.prev.take();
        current.release(memory);
        while let Some(mut block) = next {
            next = block.prev.take();
            block.release(memory);
        }
        tracing::debug!(arena = %self.id, "arena released");
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats();
        f.debug_struct("Arena")
            .field("id", &self.id)
            .field("pos", &stats.pos)
            .field("blocks", &stats.block_count)
            .field("flags", &self.flags)
            .finish()
    }
}
