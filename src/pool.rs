//! Typed object pool: fixed-size slots for `T` carved from one block.

use crate::allocator::{alloc_aligned, Allocator, SystemAllocator};
use crate::block::{align_up, Block, ConstBlock};
use crate::error::AllocError;
use crate::free_list::PoolAllocator;
use core::fmt;
use core::marker::PhantomData;
use core::mem;
use core::ptr::NonNull;

/// Pool of at most `max_objects()` values of `T`.
///
/// The pool does not know which slots are live, so values still inserted
/// when it is dropped are leaked, not dropped. Take them out with
/// [`Pool::remove`] first.
pub struct Pool<T> {
    slots: PoolAllocator,
    len: usize,
    _owns: PhantomData<T>,
}

impl<T> Pool<T> {
    /// Bytes per slot; large enough for a `T` or a free-list link.
    pub const SLOT_SIZE: usize = {
        let t = mem::size_of::<T>();
        let link = mem::size_of::<usize>();
        align_up(if t > link { t } else { link }, mem::align_of::<T>())
    };

    pub const ALIGN: usize = mem::align_of::<T>();

    pub const fn memory_requirement(max_objects: usize) -> usize {
        PoolAllocator::memory_requirement(Self::SLOT_SIZE, max_objects)
    }

    pub const fn checked_memory_requirement(max_objects: usize) -> Option<usize> {
        PoolAllocator::checked_memory_requirement(Self::SLOT_SIZE, max_objects)
    }

    /// A pool with no slots.
    pub fn empty() -> Self {
        Self {
            slots: PoolAllocator::empty(Self::SLOT_SIZE),
            len: 0,
            _owns: PhantomData,
        }
    }

    /// # Safety
    /// `block` must hold `memory_requirement(max_objects)` bytes aligned to
    /// `Self::ALIGN` and outlive the pool and every value taken from it.
    pub unsafe fn from_block(block: Block, max_objects: usize) -> Self {
        let required = Self::memory_requirement(max_objects);
        debug_assert!(block.size() >= required, "block too small for pool");
        debug_assert_eq!(block.begin as usize % Self::ALIGN, 0, "misaligned pool block");
        Self {
            slots: PoolAllocator::new(Block::new(block.begin, required), Self::SLOT_SIZE, Self::SLOT_SIZE),
            len: 0,
            _owns: PhantomData,
        }
    }

    pub fn block(&self) -> ConstBlock {
        self.slots.block()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn max_objects(&self) -> usize {
        self.slots.max_blocks()
    }

    /// Move `value` into a free slot. When the pool is full `value` is
    /// dropped and `Capacity` is returned.
    pub fn insert(&mut self, value: T) -> Result<NonNull<T>, AllocError> {
        let slot = self.slots.alloc(Self::SLOT_SIZE)?;
        let ptr = slot.begin.cast::<T>();
        // SAFETY: the slot is `SLOT_SIZE` bytes, aligned for `T`, and unused.
        unsafe {
            ptr.write(value);
            self.len += 1;
            Ok(NonNull::new_unchecked(ptr))
        }
    }

    /// Move the value out of its slot and recycle the slot.
    ///
    /// # Safety
    /// `ptr` must come from `insert` on this pool and not be removed yet.
    pub unsafe fn remove(&mut self, ptr: NonNull<T>) -> T {
        let value = ptr.as_ptr().read();
        self.slots.free(Block::new(ptr.as_ptr().cast(), Self::SLOT_SIZE));
        self.len -= 1;
        value
    }
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("len", &self.len)
            .field("max_objects", &self.max_objects())
            .finish()
    }
}

/// `Pool<T>` that allocates its fixed block from an owned allocator and
/// frees it on drop.
pub struct AllocatingPool<T, A: Allocator = SystemAllocator> {
    pool: Pool<T>,
    allocator: A,
    block: Block,
}

impl<T, A: Allocator + Default> AllocatingPool<T, A> {
    pub fn with_capacity(max_objects: usize) -> Result<Self, AllocError> {
        Self::with_capacity_in(max_objects, A::default())
    }
}

impl<T, A: Allocator> AllocatingPool<T, A> {
    /// A pool with zero capacity; nothing is allocated.
    pub fn new_in(allocator: A) -> Self {
        Self {
            pool: Pool::empty(),
            allocator,
            block: Block::EMPTY,
        }
    }

    pub fn with_capacity_in(max_objects: usize, mut allocator: A) -> Result<Self, AllocError> {
        let bytes = Pool::<T>::checked_memory_requirement(max_objects).ok_or(AllocError::size_overflow())?;
        let (block, region) = alloc_aligned(&mut allocator, bytes, Pool::<T>::ALIGN)?;
        // SAFETY: `region` is fresh, `bytes` long and aligned for `T`; its
        // block is owned by the returned pool.
        let pool = unsafe { Pool::from_block(region, max_objects) };
        Ok(Self {
            pool,
            allocator,
            block,
        })
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.pool.max_objects()
    }

    pub fn insert(&mut self, value: T) -> Result<NonNull<T>, AllocError> {
        self.pool.insert(value)
    }

    /// # Safety
    /// See [`Pool::remove`].
    pub unsafe fn remove(&mut self, ptr: NonNull<T>) -> T {
        self.pool.remove(ptr)
    }
}

impl<T, A: Allocator> Drop for AllocatingPool<T, A> {
    fn drop(&mut self) {
        let block = mem::replace(&mut self.block, Block::EMPTY);
        // SAFETY: allocated from `self.allocator` in `with_capacity_in`.
        unsafe { self.allocator.free(block) };
    }
}

impl<T, A: Allocator> fmt::Debug for AllocatingPool<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.pool, f)
    }
}
