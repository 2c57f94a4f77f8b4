//! Free-list recycling on top of any parent allocator, and the pool
//! allocator built from it.

use crate::allocator::Allocator;
use crate::block::{Block, ConstBlock};
use crate::error::AllocError;
use crate::stack_allocator::StackAllocator;
use core::mem;
use core::ptr;
use tracing::trace;

/// Recycles blocks whose size lies in `[min_size, max_size]`.
///
/// Every in-window request is backed by exactly `max_size` parent bytes, so
/// any freed block can serve any later in-window request. A freed block's
/// leading bytes hold the link to the next free block.
#[derive(Debug)]
pub struct FreeListAllocator<P> {
    parent: P,
    min_size: usize,
    max_size: usize,
    head: *mut u8,
}

impl<P: Allocator> FreeListAllocator<P> {
    pub fn new(parent: P, min_size: usize, max_size: usize) -> Self {
        assert!(min_size <= max_size, "empty size window");
        assert!(
            max_size >= mem::size_of::<*mut u8>(),
            "free-list blocks must be able to hold a link"
        );
        Self {
            parent,
            min_size,
            max_size,
            head: ptr::null_mut(),
        }
    }

    pub fn parent(&self) -> &P {
        &self.parent
    }

    pub fn min_size(&self) -> usize {
        self.min_size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    #[inline]
    fn in_window(&self, size: usize) -> bool {
        size >= self.min_size && size <= self.max_size
    }

    /// Drop every cached block without returning it to the parent.
    pub(crate) fn forget_free_list(&mut self) {
        self.head = ptr::null_mut();
    }

    pub(crate) fn parent_mut(&mut self) -> &mut P {
        &mut self.parent
    }
}

impl<P: Allocator> Allocator for FreeListAllocator<P> {
    fn alloc(&mut self, size: usize) -> Result<Block, AllocError> {
        if !self.in_window(size) || size == 0 {
            return self.parent.alloc(size);
        }
        if !self.head.is_null() {
            let result = Block::new(self.head, size);
            // SAFETY: every node on the list was written by `free` and is at
            // least pointer-sized.
            self.head = unsafe { ptr::read_unaligned(self.head.cast::<*mut u8>()) };
            trace!(size, "free list hit");
            return Ok(result);
        }
        trace!(size, "free list miss");
        let backing = self.parent.alloc(self.max_size)?;
        Ok(Block::new(backing.begin, size))
    }

    unsafe fn free(&mut self, block: Block) {
        if block.is_empty() {
            return;
        }
        if self.in_window(block.size()) {
            ptr::write_unaligned(block.begin.cast::<*mut u8>(), self.head);
            self.head = block.begin;
        } else {
            self.parent.free(block);
        }
    }
}

/// Fixed-size block pool over a private bump region.
///
/// This is the node allocator behind every `Set`: a region of exactly
/// `max_size * max_objects` bytes handed out `max_size` bytes at a time,
/// with freed blocks recycled first.
#[derive(Debug)]
pub struct PoolAllocator {
    inner: FreeListAllocator<StackAllocator>,
}

impl PoolAllocator {
    /// # Panics
    /// If `max_size * max_objects` overflows.
    pub const fn memory_requirement(max_size: usize, max_objects: usize) -> usize {
        match Self::checked_memory_requirement(max_size, max_objects) {
            Some(bytes) => bytes,
            None => panic!("pool size overflows usize"),
        }
    }

    pub const fn checked_memory_requirement(max_size: usize, max_objects: usize) -> Option<usize> {
        max_size.checked_mul(max_objects)
    }

    /// A pool with no memory; every request fails with a capacity error.
    pub fn empty(max_size: usize) -> Self {
        Self {
            inner: FreeListAllocator::new(StackAllocator::empty(), max_size, max_size),
        }
    }

    /// # Safety
    /// `block` must stay valid while any block from this pool is in use.
    pub unsafe fn new(block: Block, min_size: usize, max_size: usize) -> Self {
        Self {
            inner: FreeListAllocator::new(
                StackAllocator::with_alignment(block, 1),
                min_size,
                max_size,
            ),
        }
    }

    pub fn block(&self) -> ConstBlock {
        self.inner.parent().block()
    }

    pub fn block_size(&self) -> usize {
        self.inner.max_size()
    }

    pub fn max_blocks(&self) -> usize {
        self.block().size() / self.inner.max_size()
    }

    /// Forget every allocation; the whole region becomes available again.
    pub fn reset(&mut self) {
        self.inner.forget_free_list();
        self.inner.parent_mut().reset();
    }
}

impl Allocator for PoolAllocator {
    #[inline]
    fn alloc(&mut self, size: usize) -> Result<Block, AllocError> {
        self.inner.alloc(size)
    }

    #[inline]
    unsafe fn free(&mut self, block: Block) {
        self.inner.free(block)
    }
}

/// Allocate a pool region from `allocator` and build the pool over it.
pub fn make_pool_allocator<A: Allocator>(
    allocator: &mut A,
    min_size: usize,
    max_size: usize,
    max_objects: usize,
) -> Result<(Block, PoolAllocator), AllocError> {
    let bytes = PoolAllocator::checked_memory_requirement(max_size, max_objects).ok_or(AllocError::size_overflow())?;
    let block = allocator.alloc(bytes)?;
    // SAFETY: the block comes straight from the allocator; the caller frees
    // it through the same allocator once the pool is gone.
    let pool = unsafe { PoolAllocator::new(block, min_size, max_size) };
    Ok((block, pool))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::{SystemAllocator, UniqueBlock};
    use std::collections::BTreeSet;

    #[test]
    fn out_of_window_requests_go_to_parent() {
        let owner = UniqueBlock::<SystemAllocator>::new(256).unwrap();
        let stack = unsafe { StackAllocator::with_alignment(owner.get(), 8) };
        let mut a = FreeListAllocator::new(stack, 8, 16);
        let big = a.alloc(64).unwrap();
        assert_eq!(big.size(), 64);
        assert_eq!(a.parent().used(), 64);
        unsafe { a.free(big) };
        assert_eq!(a.parent().used(), 0);
    }

    #[test]
    fn in_window_requests_take_max_size_and_recycle() {
        let owner = UniqueBlock::<SystemAllocator>::new(256).unwrap();
        let stack = unsafe { StackAllocator::with_alignment(owner.get(), 8) };
        let mut a = FreeListAllocator::new(stack, 1, 16);
        let b1 = a.alloc(3).unwrap();
        assert_eq!(b1.size(), 3);
        assert_eq!(a.parent().used(), 16);
        unsafe { a.free(b1) };
        let b2 = a.alloc(12).unwrap();
        assert_eq!(b2.begin, b1.begin);
        assert_eq!(b2.size(), 12);
        assert_eq!(a.parent().used(), 16);
    }

    #[test]
    fn random_churn_never_exhausts_exact_region() {
        let owner = UniqueBlock::<SystemAllocator>::new(4096).unwrap();
        let stack = unsafe { StackAllocator::with_alignment(owner.get(), 8) };
        let mut a = FreeListAllocator::new(stack, 1, 8);
        let mut seed = 7u64;
        let mut next = || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            (seed >> 33) as usize
        };
        for _ in 0..3 {
            let mut blocks: Vec<Block> = (0..4096 / 8)
                .map(|_| a.alloc(1 + next() % 8).unwrap())
                .collect();
            let distinct: BTreeSet<usize> = blocks.iter().map(|b| b.begin as usize).collect();
            assert_eq!(distinct.len(), blocks.len());
            while !blocks.is_empty() {
                let i = next() % blocks.len();
                unsafe { a.free(blocks.swap_remove(i)) };
            }
        }
    }

    #[test]
    fn pool_memory_requirement_is_exact() {
        assert_eq!(PoolAllocator::memory_requirement(24, 10), 240);
        let mut sys = SystemAllocator::new();
        let (block, mut pool) = make_pool_allocator(&mut sys, 24, 24, 10).unwrap();
        assert_eq!(pool.max_blocks(), 10);
        let blocks: Vec<_> = (0..10).map(|_| pool.alloc(24).unwrap()).collect();
        assert!(pool.alloc(24).unwrap_err().is_capacity());
        unsafe { pool.free(blocks[4]) };
        assert_eq!(pool.alloc(24).unwrap().begin, blocks[4].begin);
        drop(pool);
        unsafe { sys.free(block) };
    }

    #[test]
    fn pool_reset_reclaims_region() {
        let mut sys = SystemAllocator::new();
        let (block, mut pool) = make_pool_allocator(&mut sys, 16, 16, 2).unwrap();
        let first = pool.alloc(16).unwrap();
        pool.alloc(16).unwrap();
        unsafe { pool.free(first) };
        pool.reset();
        assert_eq!(pool.alloc(16).unwrap().begin, block.begin);
        assert_eq!(pool.alloc(16).unwrap().begin, block.begin.wrapping_add(16));
        assert!(pool.alloc(16).is_err());
        unsafe { sys.free(block) };
    }

    #[test]
    fn huge_out_of_window_request_reports_capacity() {
        let owner = UniqueBlock::<SystemAllocator>::new(64).unwrap();
        let stack = unsafe { StackAllocator::new(owner.get()) };
        let mut a = FreeListAllocator::new(stack, 8, 16);
        assert!(a.alloc(usize::MAX).unwrap_err().is_capacity());
        assert_eq!(a.parent().used(), 0);
        assert_eq!(a.alloc(16).unwrap().size(), 16);
    }

    #[test]
    fn overflowing_pool_size_is_out_of_memory() {
        assert_eq!(PoolAllocator::checked_memory_requirement(usize::MAX / 2, 3), None);
        let mut sys = SystemAllocator::new();
        let err = make_pool_allocator(&mut sys, 64, 64, usize::MAX / 8).unwrap_err();
        assert!(err.is_out_of_memory());
    }

    #[test]
    fn empty_pool_is_full() {
        let mut pool = PoolAllocator::empty(32);
        assert_eq!(pool.max_blocks(), 0);
        assert!(pool.alloc(32).unwrap_err().is_capacity());
    }

    #[test]
    #[should_panic(expected = "hold a link")]
    fn window_must_fit_a_link() {
        let _ = FreeListAllocator::new(StackAllocator::empty(), 1, 2);
    }
}
