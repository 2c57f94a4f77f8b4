//! Several block-backed objects sharing a single allocation.
//!
//! ```
//! use arena_hashset::{make_merged, Map, Set, SystemAllocator};
//!
//! let mut sys = SystemAllocator::new();
//! let (block, (mut ids, mut names)) =
//!     make_merged::<(Set<u32>, Map<u32, String>), _>(&mut sys, ((8, 8), (4, 4))).unwrap();
//! ids.insert(1).unwrap();
//! names.insert(1, "one".to_string()).unwrap();
//! drop((ids, names));
//! unsafe { arena_hashset::Allocator::free(&mut sys, block) };
//! ```

use crate::allocator::{alloc_aligned, Allocator};
use crate::block::{Block, MAX_ALIGN};
use crate::error::AllocError;
use crate::free_list::PoolAllocator;
use crate::map::Map;
use crate::pool::Pool;
use crate::set::Set;
use crate::stack_allocator::StackAllocator;

/// A type that can be built inside a block it does not own.
pub trait Carve: Sized {
    /// Sizing parameters.
    type Args;

    /// Alignment the carved block must start at.
    const ALIGN: usize;

    /// Bytes needed for `args`, or `None` if that overflows `usize`.
    fn memory_requirement(args: &Self::Args) -> Option<usize>;

    /// # Safety
    /// `block` must hold `memory_requirement(&args)` bytes aligned to
    /// `Self::ALIGN` and outlive the returned value.
    unsafe fn carve(block: Block, args: Self::Args) -> Self;
}

/// `(max_node_count, max_bucket_count)`.
impl<T, S: Default> Carve for Set<T, S> {
    type Args = (usize, usize);

    const ALIGN: usize = Set::<T, S>::ALIGN;

    fn memory_requirement(&(nodes, buckets): &Self::Args) -> Option<usize> {
        Set::<T, S>::checked_memory_requirement_with_buckets(nodes, buckets)
    }

    unsafe fn carve(block: Block, (nodes, buckets): Self::Args) -> Self {
        Set::from_block_with_buckets(block, nodes, buckets)
    }
}

/// `(max_node_count, max_bucket_count)`.
impl<K, V, S: Default> Carve for Map<K, V, S> {
    type Args = (usize, usize);

    const ALIGN: usize = Map::<K, V, S>::ALIGN;

    fn memory_requirement(&(nodes, buckets): &Self::Args) -> Option<usize> {
        Set::<(K, V), S>::checked_memory_requirement_with_buckets(nodes, buckets)
    }

    unsafe fn carve(block: Block, (nodes, buckets): Self::Args) -> Self {
        Map::from_block_with_buckets(block, nodes, buckets)
    }
}

/// `(min_size, max_size, max_objects)`.
impl Carve for PoolAllocator {
    type Args = (usize, usize, usize);

    const ALIGN: usize = 1;

    fn memory_requirement(&(_, max_size, max_objects): &Self::Args) -> Option<usize> {
        PoolAllocator::checked_memory_requirement(max_size, max_objects)
    }

    unsafe fn carve(block: Block, (min_size, max_size, max_objects): Self::Args) -> Self {
        let size = PoolAllocator::memory_requirement(max_size, max_objects);
        PoolAllocator::new(Block::new(block.begin, size), min_size, max_size)
    }
}

/// `max_objects`.
impl<T> Carve for Pool<T> {
    type Args = usize;

    const ALIGN: usize = Pool::<T>::ALIGN;

    fn memory_requirement(max_objects: &usize) -> Option<usize> {
        Pool::<T>::checked_memory_requirement(*max_objects)
    }

    unsafe fn carve(block: Block, max_objects: usize) -> Self {
        Pool::from_block(block, max_objects)
    }
}

/// A tuple of [`Carve`] parts laid out back to back, each starting at a
/// multiple of `Parts::ALIGN`.
pub trait Parts: Sized {
    type Args;

    /// The largest part alignment, at least `MAX_ALIGN`.
    const ALIGN: usize;

    fn memory_requirement(args: &Self::Args) -> Option<usize>;

    /// # Safety
    /// `stack` must use `Self::ALIGN` and be backed by memory aligned to it
    /// that outlives every part.
    unsafe fn carve(stack: &mut StackAllocator, args: Self::Args) -> Result<Self, AllocError>;
}

macro_rules! impl_parts {
    ($($part:ident $idx:tt),+) => {
        impl<$($part: Carve),+> Parts for ($($part,)+) {
            type Args = ($($part::Args,)+);

            const ALIGN: usize = {
                let mut align = MAX_ALIGN;
                $(
                    if $part::ALIGN > align {
                        align = $part::ALIGN;
                    }
                )+
                align
            };

            fn memory_requirement(args: &Self::Args) -> Option<usize> {
                StackAllocator::checked_memory_requirement(
                    &[$($part::memory_requirement(&args.$idx)?),+],
                    Self::ALIGN,
                )
            }

            unsafe fn carve(stack: &mut StackAllocator, args: Self::Args) -> Result<Self, AllocError> {
                Ok(($({
                    let size = $part::memory_requirement(&args.$idx).ok_or(AllocError::size_overflow())?;
                    $part::carve(stack.alloc(size)?, args.$idx)
                },)+))
            }
        }
    };
}

impl_parts!(A 0);
impl_parts!(A 0, B 1);
impl_parts!(A 0, B 1, C 2);
impl_parts!(A 0, B 1, C 2, D 3);
impl_parts!(A 0, B 1, C 2, D 3, E 4);
impl_parts!(A 0, B 1, C 2, D 3, E 4, F 5);

/// Bytes one allocation needs to hold every part of `P`.
///
/// # Panics
/// If the total does not fit in `usize`.
pub fn merged_memory_requirement<P: Parts>(args: &P::Args) -> usize {
    P::memory_requirement(args).expect("merged size overflows usize")
}

/// Allocate one block for all parts of `P` and build each part in it, in
/// order. The caller frees the returned block after dropping the parts.
pub fn make_merged<P: Parts, A: Allocator>(allocator: &mut A, args: P::Args) -> Result<(Block, P), AllocError> {
    let bytes = P::memory_requirement(&args).ok_or(AllocError::size_overflow())?;
    let (block, region) = alloc_aligned(allocator, bytes, P::ALIGN)?;
    // SAFETY: the region is fresh, aligned to `P::ALIGN`, and its block is
    // handed to the caller together with the parts carved from it.
    let mut stack = unsafe { StackAllocator::with_alignment(region, P::ALIGN) };
    match unsafe { P::carve(&mut stack, args) } {
        Ok(parts) => Ok((block, parts)),
        Err(e) => {
            // SAFETY: nothing carved survives the error path.
            unsafe { allocator.free(block) };
            Err(e)
        }
    }
}
