//! Benchmark workloads for the Strata memory layer.
//!
//! Provides deterministic allocation patterns shared by the criterion
//! benches:
//!
//! - [`SIZE_MIX`]: a fixed cycle of `(size, align)` pairs resembling
//!   parser output (small nodes, occasional strings and tables)
//! - [`bench_params`]: arena parameters for the benches
//! - [`parse_pass`]: tokenize a source string into an arena, the way a
//!   single parse pass fills one arena before it is cleared
//! - [`grow_list`]: append bytes through any [`Allocator`] by repeated
//!   resize, the way a dynamic array grows

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_op_in_unsafe_fn)]

use strata_arena::{Arena, ArenaError, ArenaParams};
use strata_core::{AllocError, Allocator};

/// Allocation sizes and alignments cycled through by the push benches.
pub const SIZE_MIX: [(usize, usize); 8] = [
    (24, 8),
    (16, 8),
    (48, 8),
    (7, 1),
    (24, 8),
    (256, 16),
    (32, 8),
    (4096, 64),
];

/// 64 MiB reservations committed in 64 KiB steps.
pub fn bench_params() -> ArenaParams {
    ArenaParams::default()
}

/// A token as a parser would record it: kind plus a slice into a copy of
/// the source held in the same arena.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct Token {
    /// 0 for words, 1 for punctuation.
    pub kind: u32,
    /// Byte offset into the arena copy of the source.
    pub start: usize,
    /// Length in bytes.
    pub len: usize,
}

/// Copy `source` into `arena` and push one [`Token`] per whitespace-separated
/// word or punctuation byte. Returns the number of tokens.
pub fn parse_pass(arena: &Arena, source: &str) -> Result<usize, ArenaError> {
    arena.push_str(source)?;
    let bytes = source.as_bytes();
    let mut count = 0;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        let start = i;
        let kind = if b.is_ascii_alphanumeric() {
            while i < bytes.len() && bytes[i].is_ascii_alphanumeric() {
                i += 1;
            }
            0
        } else {
            i += 1;
            1
        };
        arena.push_value(Token {
            kind,
            start,
            len: i - start,
        })?;
        count += 1;
    }
    Ok(count)
}

/// Grow a byte list to `len` bytes one byte at a time through `alloc`,
/// then free it.
pub fn grow_list(alloc: Allocator<'_>, len: usize) -> Result<(), AllocError> {
    let mut ptr = None;
    for n in 0..len {
        // SAFETY: `ptr` is the region returned by the previous resize (or
        // null), of `n` bytes.
        let grown = unsafe { alloc.resize(ptr, n, n + 1, 1) }?;
        let Some(p) = grown else {
            return Err(AllocError::OutOfMemory { size: n + 1, align: 1 });
        };
        // SAFETY: `p` holds `n + 1` bytes.
        unsafe { p.as_ptr().add(n).write(n as u8) };
        ptr = Some(p);
    }
    // SAFETY: `ptr` is the live region of `len` bytes.
    unsafe { alloc.free(ptr, len, 1) };
    Ok(())
}
