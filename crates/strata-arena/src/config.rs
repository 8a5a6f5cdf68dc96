//! Arena configuration parameters.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use crate::error::ArenaError;

/// Behaviour flags for an [`Arena`](crate::Arena).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ArenaFlags(u32);

impl ArenaFlags {
    /// No flags: chaining enabled, regular pages.
    pub const NONE: Self = Self(0);

    /// Never link a second block; a push that does not fit in the current
    /// block fails instead.
    pub const NO_CHAIN: Self = Self(1 << 0);

    /// Round reservations to the provider's large page size and ask it for
    /// large-page backing.
    pub const LARGE_PAGES: Self = Self(1 << 1);

    /// Whether every bit of `other` is set in `self`.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// The raw bit pattern.
    pub fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for ArenaFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ArenaFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for ArenaFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        if self.contains(Self::NO_CHAIN) {
            set.entry(&"NO_CHAIN");
        }
        if self.contains(Self::LARGE_PAGES) {
            set.entry(&"LARGE_PAGES");
        }
        set.finish()
    }
}

/// Parameters for creating an [`Arena`](crate::Arena).
///
/// Sizes are rounded up to the virtual-memory provider's page size at
/// creation; `commit_size` is clamped to `reserve_size`. A caller-supplied
/// backing buffer is selected through
/// [`Arena::from_buffer`](crate::Arena::from_buffer) instead, which ignores
/// both sizes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArenaParams {
    /// Behaviour flags.
    pub flags: ArenaFlags,

    /// Address space reserved per block, in bytes.
    ///
    /// Default: 64 MiB. A single push larger than this gets a block sized
    /// to fit it.
    pub reserve_size: usize,

    /// Memory committed up front in a new block, and the step by which
    /// further memory is committed as the cursor advances.
    ///
    /// Default: 64 KiB.
    pub commit_size: usize,
}

impl ArenaParams {
    /// Default reservation: 64 MiB.
    pub const DEFAULT_RESERVE_SIZE: usize = 64 * 1024 * 1024;

    /// Default initial commit: 64 KiB.
    pub const DEFAULT_COMMIT_SIZE: usize = 64 * 1024;

    /// Parameters with the default sizes and no flags.
    pub fn new() -> Self {
        Self {
            flags: ArenaFlags::NONE,
            reserve_size: Self::DEFAULT_RESERVE_SIZE,
            commit_size: Self::DEFAULT_COMMIT_SIZE,
        }
    }

    /// Replace the flags.
    pub fn with_flags(mut self, flags: ArenaFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Replace the per-block reservation size.
    pub fn with_reserve_size(mut self, reserve_size: usize) -> Self {
        self.reserve_size = reserve_size;
        self
    }

    /// Replace the commit size.
    pub fn with_commit_size(mut self, commit_size: usize) -> Self {
        self.commit_size = commit_size;
        self
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ArenaError> {
        if self.reserve_size == 0 {
            return Err(ArenaError::InvalidConfig {
                reason: "reserve_size must be non-zero".into(),
            });
        }
        if self.commit_size == 0 {
            return Err(ArenaError::InvalidConfig {
                reason: "commit_size must be non-zero".into(),
            });
        }
        Ok(())
    }
}

impl Default for ArenaParams {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for a [`ScratchPool`](crate::ScratchPool).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScratchConfig {
    /// Number of backing arenas. Default: 2, enough for one level of
    /// "allocate the result in the caller's arena, scratch in the other".
    pub arena_count: usize,
    /// Parameters for each backing arena.
    pub params: ArenaParams,
}

impl ScratchConfig {
    /// Default number of pool arenas.
    pub const DEFAULT_ARENA_COUNT: usize = 2;

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ArenaError> {
        if self.arena_count == 0 {
            return Err(ArenaError::InvalidConfig {
                reason: "scratch pool needs at least one arena".into(),
            });
        }
        self.params.validate()
    }
}

impl Default for ScratchConfig {
    fn default() -> Self {
        Self {
            arena_count: Self::DEFAULT_ARENA_COUNT,
            params: ArenaParams::default(),
        }
    }
}
