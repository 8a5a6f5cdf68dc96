//! Arena-specific error types.

use std::error::Error;
use std::fmt;

/// Errors that can occur during arena operations.
///
/// Every failure leaves the arena exactly as it was before the call. The
/// arena never logs or aborts on failure; whether a failed push is fatal is
/// the caller's decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArenaError {
    /// The virtual-memory provider refused to reserve address space.
    ReserveFailed {
        /// Bytes of address space requested.
        size: usize,
    },
    /// The virtual-memory provider refused to commit reserved memory.
    CommitFailed {
        /// Bytes requested for commitment.
        size: usize,
    },
    /// The current block is exhausted and the arena may not chain a new one
    /// (`NO_CHAIN`, or a caller-supplied backing buffer).
    ChainingDisabled {
        /// Bytes requested by the failing push.
        requested: usize,
        /// Bytes left between the cursor and the end of the block.
        available: usize,
    },
    /// The alignment is not a power of two or exceeds the page size.
    UnsupportedAlignment {
        /// The requested alignment.
        align: usize,
        /// The largest alignment this arena supports.
        max: usize,
    },
    /// Size arithmetic (array length, rounding, block sizing) overflowed.
    SizeOverflow {
        /// The size that could not be represented.
        size: usize,
        /// The alignment involved in the computation.
        align: usize,
    },
    /// Arena or pool parameters violate a structural invariant.
    InvalidConfig {
        /// What was wrong.
        reason: String,
    },
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReserveFailed { size } => {
                write!(f, "failed to reserve {size} bytes of address space")
            }
            Self::CommitFailed { size } => {
                write!(f, "failed to commit {size} bytes")
            }
            Self::ChainingDisabled {
                requested,
                available,
            } => {
                write!(
                    f,
                    "arena block exhausted and chaining disabled: requested {requested} bytes, {available} available"
                )
            }
            Self::UnsupportedAlignment { align, max } => {
                write!(f, "unsupported alignment {align} (power of two up to {max} required)")
            }
            Self::SizeOverflow { size, align } => {
                write!(f, "size overflow: {size} bytes aligned to {align}")
            }
            Self::InvalidConfig { reason } => {
                write!(f, "invalid arena configuration: {reason}")
            }
        }
    }
}

impl Error for ArenaError {}
