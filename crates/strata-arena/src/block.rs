//! A single reservation in an arena's block chain.
//!
//! A [`Block`] is one contiguous range of reserved address space with a
//! committed prefix. Blocks form a singly linked list from the newest block
//! back to the first; each node owns the next-older node, so dropping the
//! arena's current block frees the whole list.
//!
//! Positions are chain-global. A block covers `[base_pos, end_pos]`, and
//! its first usable byte sits `skew` bytes into the reservation, where
//! `skew = base_pos % page_size`. Because reservations are page-aligned,
//! every address in the chain is congruent to its position modulo the page
//! size, so rounding a position up to an alignment rounds the address too.

use std::ptr::NonNull;

use crate::error::ArenaError;
use crate::raw::{align_up, round_up};
use crate::vm::VirtualMemory;

/// Upper bound on the size of a block's control structure.
pub const ARENA_HEADER_SIZE: usize = 64;

const _: () = assert!(std::mem::size_of::<Block>() <= ARENA_HEADER_SIZE);

pub(crate) struct Block {
    /// Start of the reservation (or of the caller's buffer).
    region: NonNull<u8>,
    /// Bytes of address space in the reservation.
    reserved: usize,
    /// Committed prefix of the reservation, in bytes from `region`.
    committed: usize,
    /// Offset of the first usable byte from `region`.
    skew: usize,
    /// Chain position of the first usable byte.
    base_pos: usize,
    /// Caller-owned memory: never committed, released, or chained from.
    external: bool,
    /// Next-older block.
    pub(crate) prev: Option<Box<Block>>,
}

impl Block {
    /// Reserve a new block and commit its first `commit` bytes.
    ///
    /// On commit failure the reservation is handed back before returning.
    pub(crate) fn reserve(
        memory: &dyn VirtualMemory,
        reserve: usize,
        commit: usize,
        large_pages: bool,
        base_pos: usize,
        skew: usize,
    ) -> Result<Self, ArenaError> {
        debug_assert!(commit <= reserve && skew < reserve);
        let region = memory
            .reserve(reserve, large_pages)
            .ok_or(ArenaError::ReserveFailed { size: reserve })?;

        // SAFETY: `[region, region + commit)` lies inside the reservation
        // just returned.
        if commit > 0 && !unsafe { memory.commit(region, commit) } {
            // SAFETY: `region`/`reserve` is exactly the live reservation.
            unsafe { memory.release(region, reserve) };
            return Err(ArenaError::CommitFailed { size: commit });
        }

        Ok(Self {
            region,
            reserved: reserve,
            committed: commit,
            skew,
            base_pos,
            external: false,
            prev: None,
        })
    }

    /// Wrap caller-owned memory as a fully committed block at position 0.
    pub(crate) fn external(ptr: NonNull<u8>, len: usize) -> Self {
        Self {
            region: ptr,
            reserved: len,
            committed: len,
            skew: 0,
            base_pos: 0,
            external: true,
            prev: None,
        }
    }

    pub(crate) fn base_pos(&self) -> usize {
        self.base_pos
    }

    /// Usable bytes in this block.
    pub(crate) fn capacity(&self) -> usize {
        self.reserved - self.skew
    }

    /// Chain position one past the last usable byte.
    pub(crate) fn end_pos(&self) -> usize {
        self.base_pos.saturating_add(self.capacity())
    }

    pub(crate) fn reserved(&self) -> usize {
        self.reserved
    }

    pub(crate) fn committed(&self) -> usize {
        self.committed
    }

    pub(crate) fn is_external(&self) -> bool {
        self.external
    }

    fn data_addr(&self) -> usize {
        self.region.as_ptr() as usize + self.skew
    }

    /// Place `size` bytes aligned to `align` at or after chain position
    /// `pos`. Returns the `(start, end)` chain positions, or `None` if the
    /// allocation does not fit in this block.
    pub(crate) fn place(&self, pos: usize, size: usize, align: usize) -> Option<(usize, usize)> {
        let local = pos.checked_sub(self.base_pos)?;
        let data = self.data_addr();
        let start = align_up(data.checked_add(local)?, align)? - data;
        let end = start.checked_add(size)?;
        (end <= self.capacity()).then(|| (self.base_pos + start, self.base_pos + end))
    }

    /// Make sure everything up to chain position `end` is committed,
    /// committing in multiples of `step` and never past the reservation.
    pub(crate) fn commit_to(
        &mut self,
        memory: &dyn VirtualMemory,
        end: usize,
        step: usize,
    ) -> Result<(), ArenaError> {
        if self.external {
            return Ok(());
        }
        let needed = self.skew + (end - self.base_pos);
        if needed <= self.committed {
            return Ok(());
        }
        let target = round_up(needed, step)
            .unwrap_or(self.reserved)
            .min(self.reserved);
        let size = target - self.committed;
        // SAFETY: `[committed, target)` lies inside the reservation and
        // `committed` is a multiple of the page size.
        let ok = unsafe { memory.commit(self.region.add(self.committed), size) };
        if !ok {
            return Err(ArenaError::CommitFailed { size });
        }
        self.committed = target;
        Ok(())
    }

    /// Address of chain position `pos`, which must lie within the block.
    pub(crate) fn ptr_at(&self, pos: usize) -> NonNull<u8> {
        debug_assert!(pos >= self.base_pos && pos <= self.end_pos());
        // SAFETY: `skew + (pos - base_pos) <= reserved`, so the result is
        // inside the reservation or one past its end.
        unsafe { self.region.add(self.skew + (pos - self.base_pos)) }
    }

    /// Hand the reservation back to `memory`. Idempotent; a no-op for
    /// caller-owned memory.
    pub(crate) fn release(&mut self, memory: &dyn VirtualMemory) {
        if self.external || self.reserved == 0 {
            return;
        }
        // SAFETY: `region`/`reserved` is exactly the reservation obtained in
        // `Block::reserve`, and it is zeroed below so it cannot be released
        // twice.
        unsafe { memory.release(self.region, self.reserved) };
        self.reserved = 0;
        self.committed = 0;
        self.skew = 0;
    }
}
