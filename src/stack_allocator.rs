//! Bump allocator over a single block.

use crate::allocator::Allocator;
use crate::block::{align_up, checked_align_up, Block, ConstBlock, MAX_ALIGN};
use crate::error::AllocError;
use tracing::trace;

/// Monotonic allocator carving aligned pieces off the front of one block.
///
/// Only the most recent allocation can be given back; freeing anything else
/// is ignored and the bytes stay used until `reset` or until the allocator
/// is discarded.
#[derive(Debug)]
pub struct StackAllocator {
    block: Block,
    top: *mut u8,
    alignment: usize,
}

impl StackAllocator {
    /// Bytes needed to satisfy every size in `sizes`, in order, at
    /// `alignment`.
    ///
    /// # Panics
    /// If the total does not fit in `usize`.
    pub fn memory_requirement(sizes: &[usize], alignment: usize) -> usize {
        Self::checked_memory_requirement(sizes, alignment).expect("memory requirement overflows usize")
    }

    /// [`StackAllocator::memory_requirement`], or `None` on overflow.
    pub fn checked_memory_requirement(sizes: &[usize], alignment: usize) -> Option<usize> {
        sizes
            .iter()
            .try_fold(0usize, |total, &s| total.checked_add(checked_align_up(s, alignment)?))
    }

    /// An allocator with no memory; every non-empty request fails.
    pub const fn empty() -> Self {
        Self {
            block: Block::EMPTY,
            top: core::ptr::null_mut(),
            alignment: 1,
        }
    }

    /// # Safety
    /// `block` must be valid for reads and writes for as long as any block
    /// carved from it is in use.
    pub unsafe fn new(block: Block) -> Self {
        Self::with_alignment(block, MAX_ALIGN)
    }

    /// # Safety
    /// Same as [`StackAllocator::new`]; `alignment` must be a power of two.
    pub unsafe fn with_alignment(block: Block, alignment: usize) -> Self {
        assert!(alignment.is_power_of_two(), "alignment must be a power of two");
        Self {
            block,
            top: block.begin,
            alignment,
        }
    }

    pub fn block(&self) -> ConstBlock {
        self.block.as_const()
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    pub fn used(&self) -> usize {
        (self.top as usize) - (self.block.begin as usize)
    }

    pub fn remaining(&self) -> usize {
        self.block.size() - self.used()
    }

    /// Whether `block` starts inside this allocator's region.
    pub fn owns(&self, block: ConstBlock) -> bool {
        self.block.as_const().contains(block)
    }

    /// Forget every allocation at once.
    pub fn reset(&mut self) {
        self.top = self.block.begin;
    }
}

impl Default for StackAllocator {
    fn default() -> Self {
        Self::empty()
    }
}

impl Allocator for StackAllocator {
    fn alloc(&mut self, size: usize) -> Result<Block, AllocError> {
        if size == 0 {
            return Ok(Block::new(self.top, 0));
        }
        let aligned = match checked_align_up(size, self.alignment) {
            Some(aligned) if aligned <= self.remaining() => aligned,
            _ => {
                trace!(requested = size, remaining = self.remaining(), "stack allocator exhausted");
                return Err(AllocError::Capacity {
                    requested: size,
                    available: self.remaining(),
                });
            }
        };
        let result = Block::new(self.top, size);
        self.top = self.top.wrapping_add(aligned);
        Ok(result)
    }

    unsafe fn free(&mut self, block: Block) {
        if block.is_empty() {
            return;
        }
        let aligned_end = block.begin.wrapping_add(align_up(block.size(), self.alignment));
        if aligned_end == self.top {
            self.top = block.begin;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::{SystemAllocator, UniqueBlock};
    use crate::block::ptrdiff;

    #[test]
    fn memory_requirement_sums_aligned_sizes() {
        assert_eq!(StackAllocator::memory_requirement(&[2, 4, 8, 16], 8), 40);
        assert_eq!(StackAllocator::memory_requirement(&[2, 4, 8, 16], 16), 64);
        assert_eq!(StackAllocator::memory_requirement(&[], 16), 0);
    }

    #[test]
    fn allocations_are_spaced_by_alignment() {
        let owner = UniqueBlock::<SystemAllocator>::new(40).unwrap();
        let mut a = unsafe { StackAllocator::with_alignment(owner.get(), 8) };
        let a1 = a.alloc(2).unwrap();
        let a2 = a.alloc(4).unwrap();
        let a3 = a.alloc(8).unwrap();
        let a4 = a.alloc(16).unwrap();
        assert_eq!(a1.size(), 2);
        assert_eq!(ptrdiff(a2.begin, a1.begin), 8);
        assert_eq!(ptrdiff(a3.begin, a2.begin), 8);
        assert_eq!(ptrdiff(a4.begin, a3.begin), 8);
        assert_eq!(a.remaining(), 0);
        assert!(a.alloc(1).unwrap_err().is_capacity());
    }

    #[test]
    fn only_lifo_free_rewinds() {
        let owner = UniqueBlock::<SystemAllocator>::new(40).unwrap();
        let mut a = unsafe { StackAllocator::with_alignment(owner.get(), 8) };
        let a1 = a.alloc(2).unwrap();
        let a2 = a.alloc(4).unwrap();
        let _a3 = a.alloc(8).unwrap();
        let _a4 = a.alloc(16).unwrap();

        // Not the most recent allocation: ignored.
        unsafe {
            a.free(a1);
            a.free(a2);
        }
        assert_eq!(a.used(), 40);
        assert!(a.alloc(1).is_err());
    }

    #[test]
    fn lifo_free_reuses_memory() {
        let owner = UniqueBlock::<SystemAllocator>::new(32).unwrap();
        let mut a = unsafe { StackAllocator::new(owner.get()) };
        let a1 = a.alloc(10).unwrap();
        let a2 = a.alloc(10).unwrap();
        unsafe { a.free(a2) };
        let a3 = a.alloc(3).unwrap();
        assert_eq!(a3.begin, a2.begin);
        unsafe {
            a.free(a3);
            a.free(a1);
        }
        assert_eq!(a.used(), 0);
    }

    #[test]
    fn owns_tests_address_range() {
        let owner = UniqueBlock::<SystemAllocator>::new(32).unwrap();
        let other = UniqueBlock::<SystemAllocator>::new(32).unwrap();
        let mut a = unsafe { StackAllocator::new(owner.get()) };
        let b = a.alloc(4).unwrap();
        assert!(a.owns(b.as_const()));
        assert!(!a.owns(other.get().as_const()));
    }

    #[test]
    fn reset_forgets_everything() {
        let owner = UniqueBlock::<SystemAllocator>::new(32).unwrap();
        let mut a = unsafe { StackAllocator::new(owner.get()) };
        a.alloc(16).unwrap();
        a.alloc(16).unwrap();
        assert!(a.alloc(1).is_err());
        a.reset();
        assert_eq!(a.remaining(), 32);
    }

    #[test]
    fn empty_allocator_rejects_requests() {
        let mut a = StackAllocator::empty();
        assert!(a.alloc(1).unwrap_err().is_capacity());
        assert!(a.alloc(0).unwrap().is_empty());
    }

    #[test]
    fn oversized_request_is_capacity_not_overflow() {
        let owner = UniqueBlock::<SystemAllocator>::new(64).unwrap();
        let mut a = unsafe { StackAllocator::new(owner.get()) };
        a.alloc(8).unwrap();
        for size in [usize::MAX, usize::MAX - MAX_ALIGN + 2, 65] {
            let err = a.alloc(size).unwrap_err();
            assert_eq!(
                err,
                AllocError::Capacity {
                    requested: size,
                    available: 48
                }
            );
        }
        assert_eq!(a.used(), 16);
        assert_eq!(a.alloc(48).unwrap().size(), 48);
    }

    #[test]
    fn requirement_overflow_is_reported() {
        assert_eq!(StackAllocator::checked_memory_requirement(&[usize::MAX], 16), None);
        assert_eq!(StackAllocator::checked_memory_requirement(&[usize::MAX / 2, usize::MAX / 2, 2], 1), None);
        assert_eq!(StackAllocator::checked_memory_requirement(&[3, 5], 4), Some(12));
    }
}
