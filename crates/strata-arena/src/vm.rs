//! Virtual-memory providers.
//!
//! An arena asks its [`VirtualMemory`] provider for address space
//! (`reserve`), backs it with usable memory as the cursor advances
//! (`commit`), and hands whole blocks back (`release`). `decommit` is part
//! of the contract but arenas never call it: popping only rewinds the
//! cursor and keeps committed pages for reuse.
//!
//! Two providers ship with the crate:
//!
//! - [`SystemMemory`]: anonymous `mmap` reservations with `PROT_NONE`,
//!   committed with `mprotect` (Unix). Elsewhere it falls back to the heap.
//! - [`HeapMemory`]: page-aligned global-heap blocks where commit is
//!   bookkeeping only. Portable and deterministic; used by tests.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

/// Page size assumed by [`HeapMemory::default`].
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Large page size assumed when a provider does not report one (2 MiB).
pub const DEFAULT_LARGE_PAGE_SIZE: usize = 2 * 1024 * 1024;

/// Reserve/commit/decommit/release over raw address ranges.
///
/// Sizes passed to `commit`, `decommit`, and `release` are multiples of
/// [`page_size`](VirtualMemory::page_size), and pointers are page-aligned
/// offsets into a region previously returned by `reserve`.
pub trait VirtualMemory {
    /// Granularity of commit operations. A power of two.
    fn page_size(&self) -> usize;

    /// Granularity of large-page reservations.
    fn large_page_size(&self) -> usize {
        DEFAULT_LARGE_PAGE_SIZE
    }

    /// Claim `size` bytes of address space. The result is page-aligned.
    /// Returns `None` when the address space cannot be reserved.
    fn reserve(&self, size: usize, large_pages: bool) -> Option<NonNull<u8>>;

    /// Back `[ptr, ptr + size)` with readable, writable memory.
    ///
    /// # Safety
    ///
    /// The range must lie inside a live reservation from this provider.
    unsafe fn commit(&self, ptr: NonNull<u8>, size: usize) -> bool;

    /// Return the backing of `[ptr, ptr + size)` while keeping the address
    /// space reserved.
    ///
    /// # Safety
    ///
    /// The range must lie inside a live reservation from this provider and
    /// must not be accessed until committed again.
    unsafe fn decommit(&self, ptr: NonNull<u8>, size: usize);

    /// Give back a whole reservation.
    ///
    /// # Safety
    ///
    /// `ptr` and `size` must be exactly a live reservation from this
    /// provider. The range must not be accessed afterwards.
    unsafe fn release(&self, ptr: NonNull<u8>, size: usize);
}

// ── HeapMemory ─────────────────────────────────────────────────────

/// Provider backed by page-aligned global-heap allocations.
///
/// `reserve` allocates the whole block up front; `commit` and `decommit`
/// are no-ops. Blocks are not zeroed, which the arena's zero-filling push
/// accounts for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeapMemory {
    page_size: usize,
}

impl HeapMemory {
    /// Provider reporting the given page size (a power of two).
    pub fn new(page_size: usize) -> Self {
        assert!(
            page_size.is_power_of_two(),
            "page size must be a power of two (got {page_size})"
        );
        Self { page_size }
    }
}

impl Default for HeapMemory {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl VirtualMemory for HeapMemory {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn reserve(&self, size: usize, _large_pages: bool) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        let layout = Layout::from_size_align(size, self.page_size).ok()?;
        // SAFETY: layout has non-zero size.
        NonNull::new(unsafe { alloc::alloc(layout) })
    }

    unsafe fn commit(&self, _ptr: NonNull<u8>, _size: usize) -> bool {
        true
    }

    unsafe fn decommit(&self, _ptr: NonNull<u8>, _size: usize) {}

    unsafe fn release(&self, ptr: NonNull<u8>, size: usize) {
        // SAFETY: the caller passes back exactly a reservation, which was
        // allocated with this size and the page alignment.
        unsafe {
            alloc::dealloc(
                ptr.as_ptr(),
                Layout::from_size_align_unchecked(size, self.page_size),
            )
        };
    }
}

// ── SystemMemory ───────────────────────────────────────────────────

/// Provider backed by the operating system's virtual memory.
#[cfg(unix)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SystemMemory;

/// Provider backed by the operating system's virtual memory.
///
/// On this platform it falls back to [`HeapMemory`].
#[cfg(not(unix))]
pub type SystemMemory = HeapMemory;

#[cfg(unix)]
fn system_page_size() -> usize {
    use std::sync::OnceLock;

    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(|| {
        // SAFETY: sysconf has no preconditions.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 && (size as usize).is_power_of_two() {
            size as usize
        } else {
            DEFAULT_PAGE_SIZE
        }
    })
}

/// Advisory only: transparent huge pages may be disabled system-wide.
#[cfg(any(target_os = "linux", target_os = "android"))]
fn advise_huge_pages(raw: *mut libc::c_void, size: usize) {
    // SAFETY: `raw` is a live mapping of `size` bytes; madvise does not
    // change its contents.
    unsafe { libc::madvise(raw, size, libc::MADV_HUGEPAGE) };
}

#[cfg(all(unix, not(any(target_os = "linux", target_os = "android"))))]
fn advise_huge_pages(_raw: *mut libc::c_void, _size: usize) {}

#[cfg(unix)]
impl VirtualMemory for SystemMemory {
    fn page_size(&self) -> usize {
        system_page_size()
    }

    fn reserve(&self, size: usize, large_pages: bool) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        // SAFETY: anonymous private mapping with no address hint; the kernel
        // picks a fresh range that aliases nothing.
        let raw = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if raw == libc::MAP_FAILED {
            return None;
        }
        if large_pages {
            advise_huge_pages(raw, size);
        }
        NonNull::new(raw.cast())
    }

    unsafe fn commit(&self, ptr: NonNull<u8>, size: usize) -> bool {
        // SAFETY: the caller guarantees the range lies inside a reservation.
        unsafe {
            libc::mprotect(
                ptr.as_ptr().cast(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
            ) == 0
        }
    }

    unsafe fn decommit(&self, ptr: NonNull<u8>, size: usize) {
        // SAFETY: the caller guarantees the range lies inside a reservation
        // and will not be touched until recommitted.
        unsafe {
            libc::madvise(ptr.as_ptr().cast(), size, libc::MADV_DONTNEED);
            libc::mprotect(ptr.as_ptr().cast(), size, libc::PROT_NONE);
        }
    }

    unsafe fn release(&self, ptr: NonNull<u8>, size: usize) {
        // SAFETY: the caller passes back exactly a live mapping.
        unsafe { libc::munmap(ptr.as_ptr().cast(), size) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(memory: &dyn VirtualMemory) {
        let page = memory.page_size();
        let size = page * 4;
        let region = memory.reserve(size, false).expect("reserve");
        assert_eq!(region.as_ptr() as usize % page, 0);
        unsafe {
            assert!(memory.commit(region, page * 2));
            let bytes = std::slice::from_raw_parts_mut(region.as_ptr(), page * 2);
            bytes.fill(0x5A);
            assert!(bytes.iter().all(|&b| b == 0x5A));
            memory.decommit(region.add(page), page);
            memory.release(region, size);
        }
    }

    #[test]
    fn heap_memory_roundtrip() {
        exercise(&HeapMemory::default());
    }

    #[test]
    fn system_memory_roundtrip() {
        exercise(&SystemMemory::default());
    }

    #[test]
    fn zero_reservation_fails() {
        assert!(HeapMemory::default().reserve(0, false).is_none());
        assert!(SystemMemory::default().reserve(0, false).is_none());
    }

    #[test]
    fn system_page_size_is_power_of_two() {
        assert!(SystemMemory::default().page_size().is_power_of_two());
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn heap_memory_rejects_odd_page_size() {
        let _ = HeapMemory::new(3000);
    }

    #[cfg(unix)]
    #[test]
    fn large_page_reservation_is_usable() {
        let memory = SystemMemory;
        let size = memory.large_page_size();
        let region = memory.reserve(size, true).expect("reserve");
        unsafe {
            assert!(memory.commit(region, memory.page_size()));
            region.as_ptr().write(1);
            memory.release(region, size);
        }
    }
}
