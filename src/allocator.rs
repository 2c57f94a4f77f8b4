//! The allocator contract and the allocators that do not need a region of
//! their own: the system heap, the type-erased handle, and the owning
//! `UniqueBlock`.

use crate::block::{Block, MAX_ALIGN};
use crate::error::AllocError;
use core::fmt;
use core::mem::ManuallyDrop;
use std::alloc::{self, Layout};
use tracing::warn;

/// Source of raw memory blocks.
///
/// `alloc` never panics on exhaustion; it reports `AllocError::Capacity`
/// when a bounded allocator is full and `AllocError::OutOfMemory` when the
/// heap behind it gives up. A zero-sized request yields an empty block.
pub trait Allocator {
    fn alloc(&mut self, size: usize) -> Result<Block, AllocError>;

    /// Return a block to the allocator.
    ///
    /// # Safety
    /// `block` must have been returned by `alloc` on this same allocator and
    /// not freed since. Empty blocks are always accepted and ignored.
    unsafe fn free(&mut self, block: Block);
}

impl<A: Allocator + ?Sized> Allocator for &mut A {
    #[inline]
    fn alloc(&mut self, size: usize) -> Result<Block, AllocError> {
        (**self).alloc(size)
    }

    #[inline]
    unsafe fn free(&mut self, block: Block) {
        (**self).free(block)
    }
}

/// Allocate `size` bytes starting at a multiple of `alignment`.
///
/// Returns the block to give back to `free` and the aligned `size`-byte
/// region inside it. The exact size is tried first; only when the
/// allocator hands out a less aligned block is it returned and replaced by
/// one padded with `alignment - 1` bytes.
pub fn alloc_aligned<A: Allocator + ?Sized>(
    allocator: &mut A,
    size: usize,
    alignment: usize,
) -> Result<(Block, Block), AllocError> {
    assert!(alignment.is_power_of_two(), "alignment must be a power of two");
    if size == 0 {
        return Ok((allocator.alloc(0)?, Block::EMPTY));
    }
    let block = allocator.alloc(size)?;
    if block.begin as usize % alignment == 0 {
        return Ok((block, block));
    }
    // SAFETY: allocated just above and never used.
    unsafe { allocator.free(block) };
    let padded = size.checked_add(alignment - 1).ok_or(AllocError::size_overflow())?;
    let block = allocator.alloc(padded)?;
    let offset = (block.begin as usize).wrapping_neg() & (alignment - 1);
    // SAFETY: `offset < alignment`, so the region ends inside `block`.
    let region = Block::new(unsafe { block.begin.add(offset) }, size);
    Ok((block, region))
}

/// Allocator backed by the process heap, aligned to `MAX_ALIGN`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SystemAllocator;

impl SystemAllocator {
    pub const fn new() -> Self {
        SystemAllocator
    }
}

impl Allocator for SystemAllocator {
    fn alloc(&mut self, size: usize) -> Result<Block, AllocError> {
        if size == 0 {
            return Ok(Block::EMPTY);
        }
        let layout = Layout::from_size_align(size, MAX_ALIGN)
            .map_err(|_| AllocError::OutOfMemory { requested: size })?;
        // SAFETY: layout has a non-zero size.
        let begin = unsafe { alloc::alloc(layout) };
        if begin.is_null() {
            warn!(requested = size, "system heap exhausted");
            return Err(AllocError::OutOfMemory { requested: size });
        }
        Ok(Block::new(begin, size))
    }

    unsafe fn free(&mut self, block: Block) {
        if block.is_empty() {
            return;
        }
        // SAFETY: the caller guarantees `block` came from `alloc`, which used
        // exactly this size and alignment.
        let layout = Layout::from_size_align_unchecked(block.size(), MAX_ALIGN);
        alloc::dealloc(block.begin, layout);
    }
}

/// Runtime handle to any allocator.
///
/// Call sites that take `PolymorphicAllocator` accept every allocator type
/// without a type parameter; each call costs one indirect dispatch.
pub struct PolymorphicAllocator<'a> {
    inner: &'a mut dyn Allocator,
}

impl<'a> PolymorphicAllocator<'a> {
    pub fn new<A: Allocator + 'a>(allocator: &'a mut A) -> Self {
        Self { inner: allocator }
    }

    pub fn from_dyn(allocator: &'a mut dyn Allocator) -> Self {
        Self { inner: allocator }
    }
}

impl Allocator for PolymorphicAllocator<'_> {
    #[inline]
    fn alloc(&mut self, size: usize) -> Result<Block, AllocError> {
        self.inner.alloc(size)
    }

    #[inline]
    unsafe fn free(&mut self, block: Block) {
        self.inner.free(block)
    }
}

impl fmt::Debug for PolymorphicAllocator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolymorphicAllocator")
            .field("inner", &core::ptr::from_ref(&*self.inner).cast::<()>())
            .finish()
    }
}

/// A block together with the allocator that owns it; freed on drop.
pub struct UniqueBlock<A: Allocator = SystemAllocator> {
    allocator: A,
    block: Block,
}

impl<A: Allocator + Default> UniqueBlock<A> {
    pub fn new(size: usize) -> Result<Self, AllocError> {
        Self::new_in(A::default(), size)
    }
}

impl<A: Allocator> UniqueBlock<A> {
    pub fn new_in(mut allocator: A, size: usize) -> Result<Self, AllocError> {
        let block = allocator.alloc(size)?;
        Ok(Self { allocator, block })
    }

    #[inline]
    pub fn get(&self) -> Block {
        self.block
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Give up ownership; the caller becomes responsible for freeing.
    pub fn into_raw(self) -> (A, Block) {
        let this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the allocator is moved out once.
        let allocator = unsafe { core::ptr::read(&this.allocator) };
        (allocator, this.block)
    }
}

impl<A: Allocator> Drop for UniqueBlock<A> {
    fn drop(&mut self) {
        if !self.block.is_empty() {
            // SAFETY: the block was allocated by `self.allocator` in `new_in`.
            unsafe { self.allocator.free(self.block) };
        }
    }
}

impl<A: Allocator> fmt::Debug for UniqueBlock<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniqueBlock")
            .field("block", &self.block)
            .finish()
    }
}
