//! Byte-range descriptors and alignment helpers.
//!
//! A `Block` never owns memory. It only names `[begin, end)` inside some
//! region that an allocator handed out, and every consumer treats a
//! zero-sized block as "no block".

use core::mem::MaybeUninit;
use core::ptr;

/// Alignment guaranteed by `SystemAllocator` and used by default for
/// sub-allocations (the analogue of `max_align_t`).
pub const MAX_ALIGN: usize = 16;

/// Round `size` up to a multiple of `alignment` (a power of two).
#[inline]
pub const fn align_up(size: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (size + alignment - 1) & !(alignment - 1)
}

/// [`align_up`] that reports overflow instead of wrapping.
#[inline]
pub const fn checked_align_up(size: usize, alignment: usize) -> Option<usize> {
    debug_assert!(alignment.is_power_of_two());
    match size.checked_add(alignment - 1) {
        Some(n) => Some(n & !(alignment - 1)),
        None => None,
    }
}

/// Byte distance `a - b` between two addresses.
#[inline]
pub fn ptrdiff<A, B>(a: *const A, b: *const B) -> isize {
    (a as usize).wrapping_sub(b as usize) as isize
}

/// Mutable half-open byte range `[begin, end)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Block {
    pub begin: *mut u8,
    pub end: *mut u8,
}

impl Block {
    pub const EMPTY: Block = Block {
        begin: ptr::null_mut(),
        end: ptr::null_mut(),
    };

    #[inline]
    pub fn new(begin: *mut u8, size: usize) -> Self {
        Self {
            begin,
            end: begin.wrapping_add(size),
        }
    }

    #[inline]
    pub fn from_range(begin: *mut u8, end: *mut u8) -> Self {
        debug_assert!(begin <= end);
        Self { begin, end }
    }

    #[inline]
    pub fn size(&self) -> usize {
        (self.end as usize) - (self.begin as usize)
    }

    /// Zero-sized blocks stand for "no block".
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    #[inline]
    pub fn as_const(&self) -> ConstBlock {
        ConstBlock {
            begin: self.begin,
            end: self.end,
        }
    }
}

impl Default for Block {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Read-only view of a byte range.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConstBlock {
    pub begin: *const u8,
    pub end: *const u8,
}

impl ConstBlock {
    pub const EMPTY: ConstBlock = ConstBlock {
        begin: ptr::null(),
        end: ptr::null(),
    };

    #[inline]
    pub fn new(begin: *const u8, size: usize) -> Self {
        Self {
            begin,
            end: begin.wrapping_add(size),
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        (self.end as usize) - (self.begin as usize)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Whether `other` starts inside this range.
    #[inline]
    pub fn contains(&self, other: ConstBlock) -> bool {
        other.begin >= self.begin && other.begin < self.end
    }
}

impl Default for ConstBlock {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl From<Block> for ConstBlock {
    fn from(b: Block) -> Self {
        b.as_const()
    }
}

/// Inline, `MAX_ALIGN`-aligned backing memory of `N` bytes.
///
/// Lets a fixed table live on the stack or in a static without touching an
/// allocator:
///
/// ```
/// use arena_hashset::{Set, Storage};
///
/// let mut storage = Storage::<1024>::new();
/// assert!(Set::<u32>::memory_requirement(16) <= 1024);
/// let mut set: Set<u32> = unsafe { Set::from_block(storage.block(), 16) };
/// set.insert(7).unwrap();
/// assert!(set.contains(&7));
/// ```
#[repr(C, align(16))]
pub struct Storage<const N: usize> {
    bytes: [MaybeUninit<u8>; N],
}

impl<const N: usize> Storage<N> {
    pub const fn new() -> Self {
        Self {
            bytes: [MaybeUninit::uninit(); N],
        }
    }

    pub const fn len(&self) -> usize {
        N
    }

    pub const fn is_empty(&self) -> bool {
        N == 0
    }

    pub fn block(&mut self) -> Block {
        Block::new(self.bytes.as_mut_ptr().cast(), N)
    }

    pub fn const_block(&self) -> ConstBlock {
        ConstBlock::new(self.bytes.as_ptr().cast(), N)
    }
}

impl<const N: usize> Default for Storage<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_power_of_two() {
        assert_eq!(align_up(10, 16), 16);
        assert_eq!(align_up(4, 8), 8);
        assert_eq!(align_up(4, 4), 4);
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(17, 1), 17);
    }

    #[test]
    fn checked_align_up_reports_overflow() {
        assert_eq!(checked_align_up(10, 16), Some(16));
        assert_eq!(checked_align_up(usize::MAX, 1), Some(usize::MAX));
        assert_eq!(checked_align_up(usize::MAX, 16), None);
        assert_eq!(checked_align_up(usize::MAX - 14, 16), None);
    }

    #[test]
    fn empty_block_is_falsy() {
        let b = Block::default();
        assert!(b.is_empty());
        assert_eq!(b.size(), 0);
        assert!(ConstBlock::from(b).is_empty());
    }

    #[test]
    fn storage_is_max_aligned() {
        let mut s = Storage::<40>::new();
        let b = s.block();
        assert_eq!(b.size(), 40);
        assert_eq!(b.begin as usize % MAX_ALIGN, 0);
        assert!(s.const_block().contains(b.as_const()));
    }

    #[test]
    fn ptrdiff_measures_bytes() {
        let mut s = Storage::<32>::new();
        let b = s.block();
        assert_eq!(ptrdiff(b.end, b.begin), 32);
        assert_eq!(ptrdiff(b.begin, b.end), -32);
    }
}
