//! Set: fixed-capacity, open-chained hash set living inside one block.
//!
//! Layout of the block:
//! - bucket array (`max_bucket_count` slots, a power of two >= 2), each
//!   slot pointing at the first node of its run or null;
//! - node pool (`max_node_count` fixed-size slots) managed by a
//!   `PoolAllocator`.
//!
//! All live nodes form one doubly linked list starting at `head`. Nodes
//! sharing a bucket index sit next to each other in that list (a "run"), so
//! a lookup walks forward from the bucket's first node and stops at the
//! first node of a different bucket. Every mutation keeps the runs
//! contiguous; `find` depends on it.
//!
//! Each node caches the element's `u64` hash. Rehashing and migration use
//! the cached hash only and never call back into `Hash`.

use crate::allocator::{alloc_aligned, Allocator};
use crate::block::{align_up, Block, ConstBlock};
use crate::error::AllocError;
use crate::free_list::PoolAllocator;
use crate::probe_guard::ProbeGuard;
use crate::stack_allocator::StackAllocator;
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::iter::FusedIterator;
use core::marker::PhantomData;
use core::mem::{self, MaybeUninit};
use core::ptr::{self, NonNull};
use hashbrown::hash_map::DefaultHashBuilder;

/// Odd multiplier for Fibonacci hashing (2^64 / golden ratio).
pub const FIBONACCI_MULTIPLIER: u64 = 11_400_714_819_323_198_485;

/// Load factor tables start with.
pub const DEFAULT_MAX_LOAD_FACTOR: f32 = 1.0;

pub(crate) struct Node<T> {
    prev: *mut Node<T>,
    next: *mut Node<T>,
    hash: u64,
    value: MaybeUninit<T>,
}

impl<T> Node<T> {
    /// # Safety
    /// The node must be live (linked into a table).
    #[inline]
    pub(crate) unsafe fn value<'a>(node: NonNull<Node<T>>) -> &'a T {
        (*node.as_ptr()).value.assume_init_ref()
    }

    /// # Safety
    /// The node must be live and not aliased.
    #[inline]
    pub(crate) unsafe fn value_mut<'a>(node: NonNull<Node<T>>) -> &'a mut T {
        (*node.as_ptr()).value.assume_init_mut()
    }
}

struct Bucket<T> {
    node: *mut Node<T>,
}

/// Where a new node goes when a probe misses.
enum Link<T> {
    /// The bucket is empty: the node starts a new run at the list head.
    Head,
    /// The run ends at the list tail: append after this node.
    After(*mut Node<T>),
    /// The run ends before this node of another bucket: splice in front.
    Before(*mut Node<T>),
}

enum Probe<T> {
    Found(NonNull<Node<T>>),
    Vacant(Link<T>),
}

#[inline]
fn normalize_bucket_count(count: usize) -> usize {
    count.max(2).checked_next_power_of_two().expect("bucket count overflows usize")
}

#[inline]
fn bucket_index(hash: u64, bucket_count: usize) -> usize {
    debug_assert!(bucket_count.is_power_of_two() && bucket_count >= 2);
    (hash.wrapping_mul(FIBONACCI_MULTIPLIER) >> (64 - bucket_count.trailing_zeros())) as usize
}

/// Hash set of at most `max_size()` elements stored in a caller-supplied
/// block.
///
/// Inserting into a full table fails with `AllocError::Capacity`. A
/// default-constructed table is unbound: it has no block and no capacity.
/// Dropping the table drops its elements but never frees the block.
pub struct Set<T, S = DefaultHashBuilder> {
    block: Block,
    buckets: *mut Bucket<T>,
    bucket_count: usize,
    max_bucket_count: usize,
    nodes: PoolAllocator,
    head: *mut Node<T>,
    len: usize,
    max_len: usize,
    max_load_factor: f32,
    hasher: S,
    probe: ProbeGuard,
    _owns: PhantomData<T>,
}

impl<T, S> Set<T, S> {
    const NODE_SIZE: usize = mem::size_of::<Node<T>>();

    /// Alignment the backing block must have.
    pub const ALIGN: usize = {
        let b = mem::align_of::<Bucket<T>>();
        let n = mem::align_of::<Node<T>>();
        if b > n {
            b
        } else {
            n
        }
    };

    /// Bytes needed for `max_node_count` elements and as many buckets.
    pub fn memory_requirement(max_node_count: usize) -> usize {
        Self::memory_requirement_with_buckets(max_node_count, max_node_count)
    }

    /// Bytes needed for `max_node_count` elements and `max_bucket_count`
    /// buckets (rounded up to a power of two, at least 2).
    ///
    /// # Panics
    /// If the byte count does not fit in `usize`.
    pub fn memory_requirement_with_buckets(max_node_count: usize, max_bucket_count: usize) -> usize {
        Self::checked_memory_requirement_with_buckets(max_node_count, max_bucket_count)
            .expect("table size overflows usize")
    }

    /// [`Set::memory_requirement_with_buckets`], or `None` on overflow.
    pub fn checked_memory_requirement_with_buckets(max_node_count: usize, max_bucket_count: usize) -> Option<usize> {
        let buckets = max_bucket_count.max(2).checked_next_power_of_two()?;
        StackAllocator::checked_memory_requirement(
            &[
                buckets.checked_mul(mem::size_of::<Bucket<T>>())?,
                PoolAllocator::checked_memory_requirement(Self::NODE_SIZE, max_node_count)?,
            ],
            Self::ALIGN,
        )
    }

    /// Unbound table with zero capacity; no memory is touched.
    pub fn with_hasher(hasher: S) -> Self {
        Self {
            block: Block::EMPTY,
            buckets: ptr::null_mut(),
            bucket_count: 0,
            max_bucket_count: 0,
            nodes: PoolAllocator::empty(Self::NODE_SIZE),
            head: ptr::null_mut(),
            len: 0,
            max_len: 0,
            max_load_factor: DEFAULT_MAX_LOAD_FACTOR,
            hasher,
            probe: ProbeGuard::new(),
            _owns: PhantomData,
        }
    }

    /// Build a table inside `block`.
    ///
    /// # Safety
    /// `block` must be at least
    /// `memory_requirement_with_buckets(max_node_count, max_bucket_count)`
    /// bytes, aligned to `Self::ALIGN`, valid for reads and writes, and must
    /// outlive the table. The table never frees it.
    pub unsafe fn from_block_with_hasher(
        block: Block,
        max_node_count: usize,
        max_bucket_count: usize,
        hasher: S,
    ) -> Self {
        let max_bucket_count = normalize_bucket_count(max_bucket_count);
        let required = Self::memory_requirement_with_buckets(max_node_count, max_bucket_count);
        debug_assert!(block.size() >= required, "block too small for table");
        debug_assert_eq!(block.begin as usize % Self::ALIGN, 0, "misaligned table block");

        let region = Block::new(block.begin, required);
        let buckets = region.begin.cast::<Bucket<T>>();
        for i in 0..max_bucket_count {
            buckets.add(i).write(Bucket {
                node: ptr::null_mut(),
            });
        }
        let pool_begin = region
            .begin
            .add(align_up(max_bucket_count * mem::size_of::<Bucket<T>>(), Self::ALIGN));
        let pool_block = Block::new(
            pool_begin,
            PoolAllocator::memory_requirement(Self::NODE_SIZE, max_node_count),
        );

        Self {
            block: region,
            buckets,
            bucket_count: 2,
            max_bucket_count,
            nodes: PoolAllocator::new(pool_block, Self::NODE_SIZE, Self::NODE_SIZE),
            head: ptr::null_mut(),
            len: 0,
            max_len: max_node_count,
            max_load_factor: DEFAULT_MAX_LOAD_FACTOR,
            hasher,
            probe: ProbeGuard::new(),
            _owns: PhantomData,
        }
    }

    /// Allocate a block from `allocator` and build the table in it.
    ///
    /// The caller owns the returned block and must free it through the same
    /// allocator after the table is dropped. When the allocator's blocks are
    /// less aligned than `Self::ALIGN` the returned block is padded and the
    /// table sits at an aligned offset inside it.
    pub fn make_with_hasher_in<A: Allocator>(
        allocator: &mut A,
        max_node_count: usize,
        max_bucket_count: usize,
        hasher: S,
    ) -> Result<(Block, Self), AllocError> {
        let bytes = Self::checked_memory_requirement_with_buckets(max_node_count, max_bucket_count)
            .ok_or(AllocError::size_overflow())?;
        let (block, region) = alloc_aligned(allocator, bytes, Self::ALIGN)?;
        // SAFETY: `region` is fresh, `bytes` long and aligned to `ALIGN`.
        let set = unsafe { Self::from_block_with_hasher(region, max_node_count, max_bucket_count, hasher) };
        Ok((block, set))
    }

    /// The region the table occupies, empty when unbound.
    pub fn block(&self) -> ConstBlock {
        self.block.as_const()
    }

    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Fixed element capacity; zero for an unbound table.
    #[inline]
    pub fn max_size(&self) -> usize {
        self.max_len
    }

    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    #[inline]
    pub fn max_bucket_count(&self) -> usize {
        self.max_bucket_count
    }

    pub fn load_factor(&self) -> f32 {
        if self.bucket_count == 0 {
            0.0
        } else {
            self.len as f32 / self.bucket_count as f32
        }
    }

    pub fn max_load_factor(&self) -> f32 {
        self.max_load_factor
    }

    /// # Panics
    /// If `max_load_factor` is not a positive number.
    pub fn set_max_load_factor(&mut self, max_load_factor: f32) {
        assert!(max_load_factor > 0.0, "max load factor must be positive");
        self.max_load_factor = max_load_factor;
    }

    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            node: self.head,
            remaining: self.len,
            _pd: PhantomData,
        }
    }

    pub(crate) fn iter_mut(&mut self) -> IterMut<'_, T> {
        IterMut {
            node: self.head,
            remaining: self.len,
            _pd: PhantomData,
        }
    }

    /// Drop every element; keeps the block and the bucket count.
    pub fn clear(&mut self) {
        self.reset_buckets();
        let mut node = mem::replace(&mut self.head, ptr::null_mut());
        self.len = 0;
        // Node memory stays intact until the next allocation.
        self.nodes.reset();
        while !node.is_null() {
            // SAFETY: `node` was live before the reset and nothing has been
            // allocated since.
            unsafe {
                let next = (*node).next;
                (*node).value.assume_init_drop();
                node = next;
            }
        }
    }

    /// Move every element out, leaving the table empty but bound.
    pub fn drain(&mut self) -> Drain<'_, T> {
        Drain {
            raw: self.raw_drain(),
        }
    }

    pub(crate) fn raw_drain(&mut self) -> RawDrain<'_, T> {
        self.reset_buckets();
        let node = mem::replace(&mut self.head, ptr::null_mut());
        let remaining = mem::replace(&mut self.len, 0);
        self.nodes.reset();
        RawDrain {
            node,
            remaining,
            _pd: PhantomData,
        }
    }

    /// Resize the bucket array to the smallest power of two that is at
    /// least `count`, at least 2 and large enough for the load factor,
    /// capped at `max_bucket_count`. Re-threads every node; iteration order
    /// changes, membership does not.
    pub fn rehash(&mut self, count: usize) {
        if self.max_bucket_count == 0 {
            return;
        }
        let needed = (self.len as f64 / self.max_load_factor as f64).ceil() as usize;
        let n = count
            .max(2)
            .max(needed)
            .checked_next_power_of_two()
            .map_or(self.max_bucket_count, |n| n.min(self.max_bucket_count));
        if n == self.bucket_count {
            return;
        }
        self.bucket_count = n;
        self.reset_buckets();

        let mut node = mem::replace(&mut self.head, ptr::null_mut());
        // SAFETY: every node reached from the old head is live; bucket
        // indices are below `bucket_count`.
        unsafe {
            while !node.is_null() {
                let next = (*node).next;
                let bucket = self.buckets.add(bucket_index((*node).hash, n));
                let first = (*bucket).node;
                if first.is_null() || first == self.head {
                    (*node).prev = ptr::null_mut();
                    (*node).next = self.head;
                    if !self.head.is_null() {
                        (*self.head).prev = node;
                    }
                    self.head = node;
                } else {
                    let prev = (*first).prev;
                    (*node).prev = prev;
                    (*node).next = first;
                    (*prev).next = node;
                    (*first).prev = node;
                }
                (*bucket).node = node;
                node = next;
            }
        }
    }

    /// Cursor positioned on the first element of the iteration order.
    pub fn cursor_mut(&mut self) -> CursorMut<'_, T, S> {
        let node = self.head;
        CursorMut { set: self, node }
    }

    /// Keep only the elements for which `keep` returns true.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&T) -> bool,
    {
        let mut cursor = self.cursor_mut();
        while let Some(value) = cursor.current() {
            if keep(value) {
                cursor.move_next();
            } else {
                drop(cursor.remove_current());
            }
        }
    }

    fn reset_buckets(&mut self) {
        for i in 0..self.bucket_count {
            // SAFETY: `i < bucket_count <= max_bucket_count` slots exist.
            unsafe { (*self.buckets.add(i)).node = ptr::null_mut() };
        }
    }

    #[inline]
    fn index_of(&self, hash: u64) -> usize {
        bucket_index(hash, self.bucket_count)
    }

    /// Walk the run for `hash`, testing `eq` on nodes with an equal hash.
    fn probe_run<F>(&self, hash: u64, mut eq: F) -> Probe<T>
    where
        F: FnMut(&T) -> bool,
    {
        let index = self.index_of(hash);
        // SAFETY: the table is bound (callers check `bucket_count`), so the
        // bucket exists and every node reachable from it is live.
        unsafe {
            let mut it = (*self.buckets.add(index)).node;
            if it.is_null() {
                return Probe::Vacant(Link::Head);
            }
            loop {
                let node = &*it;
                if node.hash == hash && eq(node.value.assume_init_ref()) {
                    return Probe::Found(NonNull::new_unchecked(it));
                }
                if self.index_of(node.hash) == index {
                    if node.next.is_null() {
                        return Probe::Vacant(Link::After(it));
                    }
                    it = node.next;
                } else {
                    return Probe::Vacant(Link::Before(it));
                }
            }
        }
    }

    pub(crate) fn find_hashed<F>(&self, hash: u64, eq: F) -> Option<NonNull<Node<T>>>
    where
        F: FnMut(&T) -> bool,
    {
        if self.len == 0 {
            return None;
        }
        let _g = self.probe.enter();
        match self.probe_run(hash, eq) {
            Probe::Found(node) => Some(node),
            Probe::Vacant(_) => None,
        }
    }

    /// Insert `make(ctx)` unless `eq(element, &ctx)` matches an element of
    /// the run for `hash`. `make` only runs when a node is about to be
    /// linked; on a match or an error `ctx` is dropped and nothing changes.
    pub(crate) fn insert_hashed_with<C, F, M>(
        &mut self,
        hash: u64,
        ctx: C,
        mut eq: F,
        make: M,
    ) -> Result<(NonNull<Node<T>>, bool), AllocError>
    where
        F: FnMut(&T, &C) -> bool,
        M: FnOnce(C) -> T,
    {
        if self.bucket_count == 0 {
            return Err(AllocError::Capacity {
                requested: 1,
                available: 0,
            });
        }
        let link = {
            let _g = self.probe.enter();
            match self.probe_run(hash, |t| eq(t, &ctx)) {
                Probe::Found(node) => return Ok((node, false)),
                Probe::Vacant(link) => link,
            }
        };
        if self.len == self.max_len {
            return Err(AllocError::Capacity {
                requested: self.len + 1,
                available: self.max_len,
            });
        }
        let value = make(ctx);
        let slot = self.nodes.alloc(Self::NODE_SIZE)?;
        let node = slot.begin.cast::<Node<T>>();
        // SAFETY: the pool hands out `NODE_SIZE` bytes aligned for `Node<T>`
        // (region aligned to `ALIGN`, stride a multiple of it). The link
        // target came from the probe above and nothing moved since.
        unsafe {
            node.write(Node {
                prev: ptr::null_mut(),
                next: ptr::null_mut(),
                hash,
                value: MaybeUninit::new(value),
            });
            self.link(node, hash, link);
        }
        self.len += 1;
        if self.len as f64 > self.bucket_count as f64 * self.max_load_factor as f64 {
            self.rehash(0);
        }
        // SAFETY: `node` came from a non-null pool block.
        Ok((unsafe { NonNull::new_unchecked(node) }, true))
    }

    /// Insert a value known to be distinct from every element.
    pub(crate) fn insert_unique_hashed(&mut self, hash: u64, value: T) -> Result<NonNull<Node<T>>, AllocError> {
        self.insert_hashed_with(hash, value, |_, _| false, |v| v)
            .map(|(node, _)| node)
    }

    unsafe fn link(&mut self, node: *mut Node<T>, hash: u64, link: Link<T>) {
        match link {
            Link::Head => {
                (*node).next = self.head;
                if !self.head.is_null() {
                    (*self.head).prev = node;
                }
                self.head = node;
                (*self.buckets.add(self.index_of(hash))).node = node;
            }
            Link::After(prev) => {
                (*node).prev = prev;
                (*prev).next = node;
            }
            Link::Before(next) => {
                let prev = (*next).prev;
                (*node).prev = prev;
                (*node).next = next;
                (*prev).next = node;
                (*next).prev = node;
            }
        }
    }

    /// Unlink `node` from its run and from the global list, free its slot
    /// and hand back the value.
    ///
    /// # Safety
    /// `node` must be live in this table.
    pub(crate) unsafe fn remove_node(&mut self, node: NonNull<Node<T>>) -> T {
        let node = node.as_ptr();
        let index = self.index_of((*node).hash);
        let bucket = self.buckets.add(index);
        let prev = (*node).prev;
        let next = (*node).next;
        if (*bucket).node == node {
            (*bucket).node = if !next.is_null() && self.index_of((*next).hash) == index {
                next
            } else {
                ptr::null_mut()
            };
        }
        if prev.is_null() {
            self.head = next;
        } else {
            (*prev).next = next;
        }
        if !next.is_null() {
            (*next).prev = prev;
        }
        let value = (*node).value.assume_init_read();
        self.nodes.free(Block::new(node.cast(), Self::NODE_SIZE));
        self.len -= 1;
        value
    }

    /// Walk the structure and report the first broken invariant.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) -> Result<(), String> {
        if self.bucket_count == 0 {
            return if self.len == 0 && self.head.is_null() {
                Ok(())
            } else {
                Err("unbound table holds elements".into())
            };
        }
        if !self.bucket_count.is_power_of_two() || self.bucket_count < 2 {
            return Err(format!("bad bucket count {}", self.bucket_count));
        }
        if self.len > self.max_len {
            return Err(format!("len {} above max {}", self.len, self.max_len));
        }
        let mut run_started = vec![false; self.bucket_count];
        let mut count = 0;
        let mut prev: *mut Node<T> = ptr::null_mut();
        let mut node = self.head;
        unsafe {
            while !node.is_null() {
                if (*node).prev != prev {
                    return Err(format!("broken prev link at element {count}"));
                }
                let index = self.index_of((*node).hash);
                let continues_run = !prev.is_null() && self.index_of((*prev).hash) == index;
                if !continues_run {
                    if run_started[index] {
                        return Err(format!("bucket {index} has a split run"));
                    }
                    run_started[index] = true;
                    if (*self.buckets.add(index)).node != node {
                        return Err(format!("bucket {index} does not point at its run"));
                    }
                }
                count += 1;
                prev = node;
                node = (*node).next;
            }
            for (i, started) in run_started.iter().enumerate() {
                if !started && !(*self.buckets.add(i)).node.is_null() {
                    return Err(format!("bucket {i} points at a node but has no run"));
                }
            }
        }
        if count != self.len {
            return Err(format!("list holds {count} nodes, len is {}", self.len));
        }
        Ok(())
    }
}

impl<T, S: Default> Set<T, S> {
    /// Unbound table with zero capacity.
    pub fn new() -> Self {
        Self::with_hasher(S::default())
    }

    /// # Safety
    /// See [`Set::from_block_with_hasher`].
    pub unsafe fn from_block(block: Block, max_node_count: usize) -> Self {
        Self::from_block_with_hasher(block, max_node_count, max_node_count, S::default())
    }

    /// # Safety
    /// See [`Set::from_block_with_hasher`].
    pub unsafe fn from_block_with_buckets(block: Block, max_node_count: usize, max_bucket_count: usize) -> Self {
        Self::from_block_with_hasher(block, max_node_count, max_bucket_count, S::default())
    }

    pub fn make<A: Allocator>(allocator: &mut A, max_node_count: usize) -> Result<(Block, Self), AllocError> {
        Self::make_with_hasher_in(allocator, max_node_count, max_node_count, S::default())
    }

    pub fn make_with_buckets<A: Allocator>(
        allocator: &mut A,
        max_node_count: usize,
        max_bucket_count: usize,
    ) -> Result<(Block, Self), AllocError> {
        Self::make_with_hasher_in(allocator, max_node_count, max_bucket_count, S::default())
    }
}

impl<T, S: BuildHasher> Set<T, S> {
    pub(crate) fn hash_of<Q: Hash + ?Sized>(&self, q: &Q) -> u64 {
        let _g = self.probe.enter();
        self.hasher.hash_one(q)
    }

    pub fn find<Q>(&self, q: &Q) -> Option<&T>
    where
        T: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        if self.len == 0 {
            return None;
        }
        let hash = self.hash_of(q);
        self.find_hashed(hash, |t| <T as Borrow<Q>>::borrow(t) == q)
            // SAFETY: found nodes are live for the borrow of `self`.
            .map(|node| unsafe { Node::value(node) })
    }

    pub fn contains<Q>(&self, q: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.find(q).is_some()
    }

    /// Cursor on the element equal to `q`, if any.
    pub fn find_cursor_mut<Q>(&mut self, q: &Q) -> Option<CursorMut<'_, T, S>>
    where
        T: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        if self.len == 0 {
            return None;
        }
        let hash = self.hash_of(q);
        let node = self.find_hashed(hash, |t| <T as Borrow<Q>>::borrow(t) == q)?;
        Some(CursorMut {
            set: self,
            node: node.as_ptr(),
        })
    }

    /// Remove the element equal to `q` and return it.
    pub fn take<Q>(&mut self, q: &Q) -> Option<T>
    where
        T: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.find_cursor_mut(q)?.remove_current()
    }

    /// Remove the element equal to `q`; returns whether one was present.
    pub fn remove<Q>(&mut self, q: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.take(q).is_some()
    }
}

impl<T: Hash + Eq, S: BuildHasher> Set<T, S> {
    /// Insert `value`.
    ///
    /// Returns the stored element and `true` when inserted, or the existing
    /// equal element and `false` (dropping `value`). Fails with
    /// `AllocError::Capacity` when the table is full; the table is unchanged
    /// on failure.
    pub fn insert(&mut self, value: T) -> Result<(&T, bool), AllocError> {
        let hash = self.hash_of(&value);
        let (node, inserted) = self.insert_hashed_with(hash, value, |t, v| t == v, |v| v)?;
        // SAFETY: the node is live for the borrow of `self`.
        Ok((unsafe { Node::value(node) }, inserted))
    }

    /// Construct an element with `make`, then insert it. A duplicate
    /// candidate is dropped.
    pub fn emplace_with<F>(&mut self, make: F) -> Result<(&T, bool), AllocError>
    where
        F: FnOnce() -> T,
    {
        self.insert(make())
    }

    /// The element equal to `q`, inserting `make(q)` first when absent.
    /// `make` must return a value equal to `q`.
    pub fn get_or_insert_with<Q, F>(&mut self, q: &Q, make: F) -> Result<&T, AllocError>
    where
        T: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        F: FnOnce(&Q) -> T,
    {
        let hash = self.hash_of(q);
        let (node, _) = self.insert_hashed_with(hash, q, |t, q| <T as Borrow<Q>>::borrow(t) == *q, make)?;
        // SAFETY: the node is live for the borrow of `self`.
        Ok(unsafe { Node::value(node) })
    }
}

impl<T, S: Default> Default for Set<T, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, S> Drop for Set<T, S> {
    fn drop(&mut self) {
        if !mem::needs_drop::<T>() {
            return;
        }
        let mut node = mem::replace(&mut self.head, ptr::null_mut());
        self.len = 0;
        while !node.is_null() {
            // SAFETY: every node on the list is live and dropped once.
            unsafe {
                let next = (*node).next;
                (*node).value.assume_init_drop();
                node = next;
            }
        }
    }
}

impl<T: fmt::Debug, S> fmt::Debug for Set<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<'a, T, S> IntoIterator for &'a Set<T, S> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a table's elements in list order.
pub struct Iter<'a, T> {
    node: *const Node<T>,
    remaining: usize,
    _pd: PhantomData<&'a T>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.node.is_null() {
            return None;
        }
        // SAFETY: the table is borrowed for 'a, so listed nodes stay live.
        unsafe {
            let node = &*self.node;
            self.node = node.next;
            self.remaining -= 1;
            Some(node.value.assume_init_ref())
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}
impl<T> FusedIterator for Iter<'_, T> {}

impl<T> Clone for Iter<'_, T> {
    fn clone(&self) -> Self {
        Iter {
            node: self.node,
            remaining: self.remaining,
            _pd: PhantomData,
        }
    }
}

/// Mutable element iterator; only handed out where mutation cannot change
/// an element's hash (map values).
pub(crate) struct IterMut<'a, T> {
    node: *mut Node<T>,
    remaining: usize,
    _pd: PhantomData<&'a mut T>,
}

impl<'a, T> Iterator for IterMut<'a, T> {
    type Item = &'a mut T;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.node.is_null() {
            return None;
        }
        // SAFETY: the table is mutably borrowed for 'a and each node is
        // yielded once.
        unsafe {
            let node = &mut *self.node;
            self.node = node.next;
            self.remaining -= 1;
            Some(node.value.assume_init_mut())
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

/// Detached element list yielding `(cached hash, value)`.
///
/// The owning table is already empty when this exists; values not consumed
/// are dropped with the iterator.
pub(crate) struct RawDrain<'a, T> {
    node: *mut Node<T>,
    remaining: usize,
    _pd: PhantomData<&'a mut T>,
}

impl<T> Iterator for RawDrain<'_, T> {
    type Item = (u64, T);

    fn next(&mut self) -> Option<Self::Item> {
        if self.node.is_null() {
            return None;
        }
        // SAFETY: detached nodes are still initialized and read once; the
        // pool cannot reuse them while the table is mutably borrowed.
        unsafe {
            let node = self.node;
            self.node = (*node).next;
            self.remaining -= 1;
            Some(((*node).hash, (*node).value.assume_init_read()))
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> Drop for RawDrain<'_, T> {
    fn drop(&mut self) {
        for _ in self.by_ref() {}
    }
}

/// Draining iterator returned by [`Set::drain`].
pub struct Drain<'a, T> {
    raw: RawDrain<'a, T>,
}

impl<T> Iterator for Drain<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.raw.next().map(|(_, value)| value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.raw.size_hint()
    }
}

impl<T> ExactSizeIterator for Drain<'_, T> {}

/// A position in a table's iteration order that can remove the element it
/// points at. Past the last element the cursor sits at the end and stays
/// there.
pub struct CursorMut<'a, T, S> {
    set: &'a mut Set<T, S>,
    node: *mut Node<T>,
}

impl<'a, T, S> CursorMut<'a, T, S> {
    pub fn current(&self) -> Option<&T> {
        // SAFETY: a non-null cursor node is live while the table is borrowed.
        NonNull::new(self.node).map(|n| unsafe { Node::value(n) })
    }

    /// Mutable access for adapters whose mutation keeps the hash stable.
    pub(crate) fn current_mut(&mut self) -> Option<&mut T> {
        // SAFETY: as in `current`; the cursor holds the only borrow.
        NonNull::new(self.node).map(|n| unsafe { Node::value_mut(n) })
    }

    pub fn is_end(&self) -> bool {
        self.node.is_null()
    }

    /// Jump to `node`, which must be live in the borrowed table.
    pub(crate) fn seek(&mut self, node: NonNull<Node<T>>) {
        self.node = node.as_ptr();
    }

    pub fn move_next(&mut self) {
        if !self.node.is_null() {
            // SAFETY: live node.
            self.node = unsafe { (*self.node).next };
        }
    }

    pub fn move_prev(&mut self) {
        if !self.node.is_null() {
            // SAFETY: live node.
            self.node = unsafe { (*self.node).prev };
        }
    }

    /// Remove the current element; the cursor moves to the element that
    /// followed it (or to the end).
    pub fn remove_current(&mut self) -> Option<T> {
        let node = NonNull::new(self.node)?;
        // SAFETY: live node of `self.set`.
        unsafe {
            self.node = (*node.as_ptr()).next;
            Some(self.set.remove_node(node))
        }
    }
}
