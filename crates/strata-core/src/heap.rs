//! Global-heap allocation strategy.

use std::alloc::{self, Layout};
use std::ptr::{self, NonNull};

use crate::alloc::{default_resize, AllocOp, AllocProc, AllocRequest};

/// Allocation strategy backed by the process-global heap.
///
/// Zero-sized, so `Allocator::heap()` is a zero-context handle. `FreeAll`
/// is not supported by the heap and is ignored. Zero-size requests return a
/// dangling, suitably aligned pointer and never touch the heap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapAllocator;

impl AllocProc for HeapAllocator {
    unsafe fn dispatch(&self, req: &AllocRequest) -> Option<NonNull<u8>> {
        match req.op {
            AllocOp::Alloc => {
                let layout = Layout::from_size_align(req.size, req.align).ok()?;
                if layout.size() == 0 {
                    return Some(dangling(layout.align()));
                }
                // SAFETY: layout has non-zero size.
                let raw = unsafe {
                    if req.clear_to_zero() {
                        alloc::alloc_zeroed(layout)
                    } else {
                        alloc::alloc(layout)
                    }
                };
                NonNull::new(raw)
            }
            AllocOp::Free => {
                if let Some(ptr) = req.old_ptr {
                    if req.old_size > 0 {
                        // SAFETY: caller guarantees `ptr` came from this
                        // strategy with `old_size` and `align`.
                        unsafe {
                            alloc::dealloc(
                                ptr.as_ptr(),
                                Layout::from_size_align_unchecked(req.old_size, req.align),
                            )
                        };
                    }
                }
                None
            }
            AllocOp::FreeAll => None,
            AllocOp::Resize => {
                let (Some(ptr), true, true) = (req.old_ptr, req.old_size > 0, req.size > 0) else {
                    // SAFETY: forwarded caller contract.
                    return unsafe { default_resize(self, req) };
                };
                Layout::from_size_align(req.size, req.align).ok()?;
                // SAFETY: caller guarantees `ptr` came from this strategy
                // with `old_size` and `align`; `size` is non-zero and forms a
                // valid layout with `align` (checked above).
                let raw = unsafe {
                    alloc::realloc(
                        ptr.as_ptr(),
                        Layout::from_size_align_unchecked(req.old_size, req.align),
                        req.size,
                    )
                };
                let new = NonNull::new(raw)?;
                if req.clear_to_zero() && req.size > req.old_size {
                    // SAFETY: the grown tail lies within the new region.
                    unsafe {
                        ptr::write_bytes(new.as_ptr().add(req.old_size), 0, req.size - req.old_size)
                    };
                }
                Some(new)
            }
        }
    }
}

fn dangling(align: usize) -> NonNull<u8> {
    // Layout guarantees `align` is a non-zero power of two.
    NonNull::new(align as *mut u8).unwrap_or(NonNull::dangling())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::{AllocFlags, Allocator};

    #[test]
    fn zero_size_alloc_is_dangling_and_aligned() {
        let heap = Allocator::heap();
        let ptr = heap.alloc(0, 64).unwrap();
        assert_eq!(ptr.as_ptr() as usize % 64, 0);
        unsafe { heap.free(Some(ptr), 0, 64) };
    }

    #[test]
    fn free_all_is_ignored() {
        let heap = Allocator::heap();
        let ptr = heap.alloc_copy(b"kept", 1).unwrap();
        heap.free_all();
        assert_eq!(unsafe { ptr.as_ref() }, b"kept");
        unsafe { heap.free(Some(ptr.cast()), 4, 1) };
    }

    #[test]
    fn realloc_grow_zeroes_tail() {
        let heap = Allocator::heap();
        let ptr = heap.alloc_copy(&[0xAA; 16], 8).unwrap().cast::<u8>();
        let grown = unsafe { heap.resize(Some(ptr), 16, 48, 8) }.unwrap().unwrap();
        let bytes = unsafe { std::slice::from_raw_parts(grown.as_ptr(), 48) };
        assert!(bytes[..16].iter().all(|&b| b == 0xAA));
        assert!(bytes[16..].iter().all(|&b| b == 0));
        unsafe { heap.free(Some(grown), 48, 8) };
    }

    #[test]
    fn realloc_without_clear_keeps_prefix() {
        let ptr = Allocator::heap().alloc_copy(&[7; 8], 8).unwrap().cast::<u8>();
        let req = AllocRequest::resize(Some(ptr), 8, 32, 8).with_flags(AllocFlags::NONE);
        let grown = unsafe { HeapAllocator.dispatch(&req) }.unwrap();
        let bytes = unsafe { std::slice::from_raw_parts(grown.as_ptr(), 8) };
        assert_eq!(bytes, &[7; 8]);
        unsafe { Allocator::heap().free(Some(grown), 32, 8) };
    }

    #[test]
    fn oversized_alloc_returns_none() {
        let req = AllocRequest::alloc(usize::MAX - 64, 8);
        assert!(unsafe { HeapAllocator.dispatch(&req) }.is_none());
    }
}
