//! Arena-backed allocation strategy.
//!
//! | Op | Arena behaviour |
//! |----|-----------------|
//! | `Alloc` | push |
//! | `Free` | pops the block if it is the most recent allocation, else nothing |
//! | `FreeAll` | clear |
//! | `Resize` | in place when the block is the most recent allocation and still fits the current block, else [`default_resize`] |

use std::ptr::NonNull;

use strata_core::{default_resize, AllocOp, AllocProc, AllocRequest};

use crate::arena::Arena;

impl AllocProc for Arena {
    unsafe fn dispatch(&self, req: &AllocRequest) -> Option<NonNull<u8>> {
        match req.op {
            AllocOp::Alloc => {
                let result = if req.clear_to_zero() {
                    self.push(req.size, req.align)
                } else {
                    self.push_no_zero(req.size, req.align)
                };
                result.ok()
            }
            AllocOp::Free => {
                if let Some(ptr) = req.old_ptr {
                    if self.is_last(ptr, req.old_size) {
                        self.pop(req.old_size);
                    }
                }
                None
            }
            AllocOp::FreeAll => {
                self.clear();
                None
            }
            AllocOp::Resize => {
                if let Some(ptr) = req.old_ptr {
                    if req.size > 0
                        && self.resize_last(ptr, req.old_size, req.size, req.clear_to_zero())
                    {
                        return Some(ptr);
                    }
                }
                // SAFETY: forwarded caller contract.
                unsafe { default_resize(self, req) }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use strata_core::{AllocFlags, Allocator};

    use crate::config::ArenaParams;
    use crate::vm::HeapMemory;

    use super::*;

    fn arena() -> Arena {
        let params = ArenaParams::new()
            .with_reserve_size(64 * 1024)
            .with_commit_size(4096);
        Arena::with_memory(params, Rc::new(HeapMemory::default())).unwrap()
    }

    fn bytes<'a>(ptr: NonNull<u8>, len: usize) -> &'a mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), len) }
    }

    #[test]
    fn alloc_pushes() {
        let arena = arena();
        let a = arena.allocator();
        let p = a.alloc(100, 16).unwrap();
        assert_eq!(p.as_ptr() as usize % 16, 0);
        assert_eq!(arena.pos(), 100);
        assert!(bytes(p, 100).iter().all(|&b| b == 0));
    }

    #[test]
    fn alloc_without_clear_flag_skips_zeroing() {
        let arena = arena();
        let p = arena.push(32, 8).unwrap();
        bytes(p, 32).fill(0xEE);
        arena.clear();
        let req = AllocRequest::alloc(32, 8).with_flags(AllocFlags::NONE);
        let q = unsafe { arena.dispatch(&req) }.unwrap();
        assert!(bytes(q, 32).iter().all(|&b| b == 0xEE));
    }

    #[test]
    fn alloc_failure_is_null() {
        let arena = arena();
        let a = arena.allocator();
        assert!(a.alloc(16, 8192).is_err());
        assert_eq!(arena.pos(), 0);
    }

    #[test]
    fn free_of_last_allocation_rewinds() {
        let arena = arena();
        let a = arena.allocator();
        a.alloc(10, 1).unwrap();
        let p = a.alloc(20, 4).unwrap();
        assert_eq!(arena.pos(), 32);
        unsafe { a.free(Some(p), 20, 4) };
        assert_eq!(arena.pos(), 12);
    }

    #[test]
    fn free_of_older_allocation_is_noop() {
        let arena = arena();
        let a = arena.allocator();
        let p = a.alloc(10, 1).unwrap();
        a.alloc(20, 1).unwrap();
        unsafe {
            a.free(Some(p), 10, 1);
            a.free(None, 10, 1);
        }
        assert_eq!(arena.pos(), 30);
    }

    #[test]
    fn free_all_clears() {
        let arena = arena();
        let a = arena.allocator();
        a.alloc(100 * 1024, 8).unwrap();
        a.free_all();
        assert_eq!(arena.pos(), 0);
        assert_eq!(arena.block_count(), 1);
    }

    #[test]
    fn resize_last_grows_in_place() {
        let arena = arena();
        let a = arena.allocator();
        let p = a.alloc(8, 8).unwrap();
        bytes(p, 8).copy_from_slice(b"strataxx");
        let q = unsafe { a.resize(Some(p), 8, 6000, 8) }.unwrap().unwrap();
        assert_eq!(p, q);
        assert_eq!(arena.pos(), 6000);
        assert_eq!(&bytes(q, 8)[..], b"strataxx");
        assert!(bytes(q, 6000)[8..].iter().all(|&b| b == 0));
    }

    #[test]
    fn resize_last_shrinks_in_place() {
        let arena = arena();
        let a = arena.allocator();
        let p = a.alloc(64, 8).unwrap();
        let q = unsafe { a.resize(Some(p), 64, 16, 8) }.unwrap().unwrap();
        assert_eq!(p, q);
        assert_eq!(arena.pos(), 16);
    }

    #[test]
    fn resize_older_allocation_moves() {
        let arena = arena();
        let a = arena.allocator();
        let p = a.alloc(4, 4).unwrap();
        bytes(p, 4).copy_from_slice(&[1, 2, 3, 4]);
        a.alloc(4, 4).unwrap();
        let q = unsafe { a.resize(Some(p), 4, 12, 4) }.unwrap().unwrap();
        assert_ne!(p, q);
        assert_eq!(&bytes(q, 12)[..4], &[1, 2, 3, 4]);
        assert_eq!(arena.pos(), 20);
    }

    #[test]
    fn resize_past_block_moves_to_new_block() {
        let arena = arena();
        let a = arena.allocator();
        let p = a.alloc(16, 8).unwrap();
        bytes(p, 16).fill(9);
        let q = unsafe { a.resize(Some(p), 16, 80 * 1024, 8) }.unwrap().unwrap();
        assert_ne!(p, q);
        assert_eq!(arena.block_count(), 2);
        assert!(bytes(q, 16).iter().all(|&b| b == 9));
    }

    #[test]
    fn resize_to_zero_frees() {
        let arena = arena();
        let a = arena.allocator();
        let p = a.alloc(32, 8).unwrap();
        let r = unsafe { a.resize(Some(p), 32, 0, 8) }.unwrap();
        assert!(r.is_none());
        assert_eq!(arena.pos(), 0);
    }

    #[test]
    fn resize_from_null_allocates() {
        let arena = arena();
        let a = arena.allocator();
        let p = unsafe { a.resize(None, 0, 24, 8) }.unwrap();
        assert!(p.is_some());
        assert_eq!(arena.pos(), 24);
    }

    #[test]
    fn handles_to_one_arena_share_context() {
        let arena = arena();
        let other = self::arena();
        assert!(arena.allocator().same_context(arena.allocator()));
        assert!(!arena.allocator().same_context(other.allocator()));
        assert!(!arena.allocator().same_context(Allocator::heap()));
    }

    #[test]
    fn alloc_copy_through_arena() {
        let arena = arena();
        let copied = arena.allocator().alloc_copy(b"bytes", 1).unwrap();
        assert_eq!(unsafe { copied.as_ref() }, b"bytes");
    }
}
