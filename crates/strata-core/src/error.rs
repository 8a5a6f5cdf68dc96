//! Error types for the allocator capability.

use std::error::Error;
use std::fmt;

/// Errors surfaced by the [`Allocator`](crate::Allocator) convenience API.
///
/// The underlying [`AllocProc`](crate::AllocProc) contract signals failure
/// with a null (`None`) return; the handle converts that into a typed error
/// carrying the request that failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AllocError {
    /// The backing strategy could not satisfy the request.
    OutOfMemory {
        /// Number of bytes requested.
        size: usize,
        /// Requested alignment in bytes.
        align: usize,
    },
    /// The alignment is not a power of two, or size rounded up to the
    /// alignment overflows `isize`.
    InvalidLayout {
        /// Number of bytes requested.
        size: usize,
        /// Requested alignment in bytes.
        align: usize,
    },
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory { size, align } => {
                write!(f, "out of memory: {size} bytes aligned to {align}")
            }
            Self::InvalidLayout { size, align } => {
                write!(f, "invalid layout: {size} bytes aligned to {align}")
            }
        }
    }
}

impl Error for AllocError {}
