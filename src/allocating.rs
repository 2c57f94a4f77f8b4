//! Growable tables: `AllocatingSet` and `AllocatingMap` own an allocator
//! and replace their block with a larger one when full.
//!
//! Growth allocates the new block first, so a failed allocation leaves the
//! table untouched. Elements move to the new table by their cached hash;
//! no user `Hash`/`Eq` code runs while migrating.

use crate::allocator::{alloc_aligned, Allocator, SystemAllocator};
use crate::block::{Block, ConstBlock};
use crate::error::AllocError;
use crate::map::{self, Map};
use crate::set::{self, Set};
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::mem;
use core::ops::Index;
use hashbrown::hash_map::DefaultHashBuilder;
use tracing::debug;

/// Logical element limit of a growable table.
pub const MAX_SIZE: usize = isize::MAX as usize;

/// Largest bucket count a growable table may reach.
pub const MAX_BUCKET_COUNT: usize = 1 << (usize::BITS - 1);

/// The allocator and the block the current table lives in.
struct Backing<A: Allocator> {
    allocator: A,
    block: Block,
}

impl<A: Allocator> Backing<A> {
    fn new(allocator: A) -> Self {
        Self {
            allocator,
            block: Block::EMPTY,
        }
    }

    /// Make room for one more element.
    fn prepare<T, S: Clone>(&mut self, table: &mut Set<T, S>) -> Result<(), AllocError> {
        let len = table.len();
        if len < table.max_size() {
            return Ok(());
        }
        let wanted = if len == 0 {
            1
        } else {
            len.checked_mul(2).ok_or(AllocError::OutOfMemory { requested: MAX_SIZE })?
        };
        self.reserve(table, wanted)
    }

    fn reserve<T, S: Clone>(&mut self, table: &mut Set<T, S>, count: usize) -> Result<(), AllocError> {
        let buckets = (count as f64 / table.max_load_factor() as f64).ceil() as usize;
        self.rehash(table, buckets)
    }

    fn rehash<T, S: Clone>(&mut self, table: &mut Set<T, S>, count: usize) -> Result<(), AllocError> {
        if count > MAX_SIZE {
            return Err(AllocError::OutOfMemory { requested: count });
        }
        let len = table.len();
        let mlf = table.max_load_factor() as f64;
        let needed = (len as f64 / mlf).ceil() as usize;
        let buckets = count
            .max(needed)
            .checked_next_power_of_two()
            .filter(|&b| b <= MAX_BUCKET_COUNT)
            .ok_or(AllocError::OutOfMemory { requested: count })?;
        let nodes = ((buckets as f64 * mlf).floor() as usize).max(len);

        if nodes <= table.max_size() && buckets <= table.max_bucket_count() {
            table.rehash(buckets);
            return Ok(());
        }

        let bytes = Set::<T, S>::checked_memory_requirement_with_buckets(nodes, buckets)
            .ok_or(AllocError::size_overflow())?;
        let (block, region) = alloc_aligned(&mut self.allocator, bytes, Set::<T, S>::ALIGN)?;
        // SAFETY: `region` is fresh, `bytes` long and aligned to `ALIGN`; its
        // block is owned by `self` until replaced or the table is dropped.
        let mut grown = unsafe { Set::from_block_with_hasher(region, nodes, buckets, table.hasher().clone()) };
        grown.set_max_load_factor(table.max_load_factor());
        grown.rehash(buckets);
        for (hash, value) in table.raw_drain() {
            grown
                .insert_unique_hashed(hash, value)
                .expect("grown table must have room for every element");
        }
        debug!(
            old_nodes = table.max_size(),
            new_nodes = nodes,
            new_buckets = grown.bucket_count(),
            bytes,
            "table grown"
        );
        *table = grown;
        let old = mem::replace(&mut self.block, block);
        // SAFETY: `old` came from `self.allocator` (or is empty) and the
        // table that lived in it is gone.
        unsafe { self.allocator.free(old) };
        Ok(())
    }

    /// Drop the table's elements, then give the block back.
    fn release<T, S>(&mut self, table: &mut Set<T, S>) {
        table.clear();
        let block = mem::replace(&mut self.block, Block::EMPTY);
        // SAFETY: the block came from `self.allocator`; the table no longer
        // holds any element in it and is never touched again.
        unsafe { self.allocator.free(block) };
    }
}

/// Hash set that grows on demand through an owned allocator.
///
/// Starts unbound, without an allocation. When an insert finds the table
/// full, capacity doubles (to 1 from empty).
pub struct AllocatingSet<T, S = DefaultHashBuilder, A: Allocator = SystemAllocator> {
    table: Set<T, S>,
    backing: Backing<A>,
}

impl<T, S: Default, A: Allocator + Default> AllocatingSet<T, S, A> {
    pub fn new() -> Self {
        Self::with_hasher_in(S::default(), A::default())
    }
}

impl<T, S: Default + Clone, A: Allocator + Default> AllocatingSet<T, S, A> {
    pub fn with_capacity(capacity: usize) -> Result<Self, AllocError> {
        Self::with_capacity_in(capacity, A::default())
    }
}

impl<T, S: Default + Clone, A: Allocator> AllocatingSet<T, S, A> {
    pub fn with_capacity_in(capacity: usize, allocator: A) -> Result<Self, AllocError> {
        let mut set = Self::with_hasher_in(S::default(), allocator);
        set.reserve(capacity)?;
        Ok(set)
    }
}

impl<T, S: Default, A: Allocator> AllocatingSet<T, S, A> {
    pub fn new_in(allocator: A) -> Self {
        Self::with_hasher_in(S::default(), allocator)
    }
}

impl<T, S, A: Allocator> AllocatingSet<T, S, A> {
    pub fn with_hasher_in(hasher: S, allocator: A) -> Self {
        Self {
            table: Set::with_hasher(hasher),
            backing: Backing::new(allocator),
        }
    }

    pub fn allocator(&self) -> &A {
        &self.backing.allocator
    }

    /// The current table block; empty before the first growth.
    pub fn block(&self) -> ConstBlock {
        self.table.block()
    }

    pub fn hasher(&self) -> &S {
        self.table.hasher()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn max_size(&self) -> usize {
        MAX_SIZE
    }

    /// Elements that fit before the next growth.
    pub fn capacity(&self) -> usize {
        self.table.max_size()
    }

    pub fn bucket_count(&self) -> usize {
        self.table.bucket_count()
    }

    pub fn max_bucket_count(&self) -> usize {
        MAX_BUCKET_COUNT
    }

    pub fn load_factor(&self) -> f32 {
        self.table.load_factor()
    }

    pub fn max_load_factor(&self) -> f32 {
        self.table.max_load_factor()
    }

    pub fn set_max_load_factor(&mut self, max_load_factor: f32) {
        self.table.set_max_load_factor(max_load_factor);
    }

    pub fn iter(&self) -> set::Iter<'_, T> {
        self.table.iter()
    }

    pub fn drain(&mut self) -> set::Drain<'_, T> {
        self.table.drain()
    }

    /// Drop every element; the block is kept for reuse.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    pub fn retain<F: FnMut(&T) -> bool>(&mut self, keep: F) {
        self.table.retain(keep);
    }

    pub fn cursor_mut(&mut self) -> set::CursorMut<'_, T, S> {
        self.table.cursor_mut()
    }

    #[cfg(test)]
    pub(crate) fn table(&self) -> &Set<T, S> {
        &self.table
    }
}

impl<T, S: Clone, A: Allocator> AllocatingSet<T, S, A> {
    /// Make room for at least `count` elements without exceeding the load
    /// factor.
    pub fn reserve(&mut self, count: usize) -> Result<(), AllocError> {
        self.backing.reserve(&mut self.table, count)
    }

    /// Set the bucket count to at least `count`, moving to a larger block
    /// when the current one cannot hold it.
    pub fn rehash(&mut self, count: usize) -> Result<(), AllocError> {
        self.backing.rehash(&mut self.table, count)
    }
}

impl<T, S: BuildHasher, A: Allocator> AllocatingSet<T, S, A> {
    pub fn find<Q>(&self, q: &Q) -> Option<&T>
    where
        T: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.table.find(q)
    }

    pub fn contains<Q>(&self, q: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.table.contains(q)
    }

    pub fn find_cursor_mut<Q>(&mut self, q: &Q) -> Option<set::CursorMut<'_, T, S>>
    where
        T: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.table.find_cursor_mut(q)
    }

    pub fn remove<Q>(&mut self, q: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.table.remove(q)
    }

    pub fn take<Q>(&mut self, q: &Q) -> Option<T>
    where
        T: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.table.take(q)
    }
}

impl<T: Hash + Eq, S: BuildHasher + Clone, A: Allocator> AllocatingSet<T, S, A> {
    /// Insert `value`, growing first when the table is full.
    ///
    /// Fails only when the allocator cannot provide a larger block; the set
    /// is unchanged in that case.
    pub fn insert(&mut self, value: T) -> Result<(&T, bool), AllocError> {
        self.backing.prepare(&mut self.table)?;
        self.table.insert(value)
    }

    pub fn emplace_with<F: FnOnce() -> T>(&mut self, make: F) -> Result<(&T, bool), AllocError> {
        self.backing.prepare(&mut self.table)?;
        self.table.emplace_with(make)
    }

    pub fn get_or_insert_with<Q, F>(&mut self, q: &Q, make: F) -> Result<&T, AllocError>
    where
        T: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        F: FnOnce(&Q) -> T,
    {
        self.backing.prepare(&mut self.table)?;
        self.table.get_or_insert_with(q, make)
    }
}

impl<T, S: Default, A: Allocator + Default> Default for AllocatingSet<T, S, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, S, A: Allocator> Drop for AllocatingSet<T, S, A> {
    fn drop(&mut self) {
        self.backing.release(&mut self.table);
    }
}

impl<T: fmt::Debug, S, A: Allocator> fmt::Debug for AllocatingSet<T, S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.table, f)
    }
}

impl<'a, T, S, A: Allocator> IntoIterator for &'a AllocatingSet<T, S, A> {
    type Item = &'a T;
    type IntoIter = set::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Hash map that grows on demand through an owned allocator.
pub struct AllocatingMap<K, V, S = DefaultHashBuilder, A: Allocator = SystemAllocator> {
    map: Map<K, V, S>,
    backing: Backing<A>,
}

impl<K, V, S: Default, A: Allocator + Default> AllocatingMap<K, V, S, A> {
    pub fn new() -> Self {
        Self::with_hasher_in(S::default(), A::default())
    }
}

impl<K, V, S: Default + Clone, A: Allocator + Default> AllocatingMap<K, V, S, A> {
    pub fn with_capacity(capacity: usize) -> Result<Self, AllocError> {
        Self::with_capacity_in(capacity, A::default())
    }
}

impl<K, V, S: Default + Clone, A: Allocator> AllocatingMap<K, V, S, A> {
    pub fn with_capacity_in(capacity: usize, allocator: A) -> Result<Self, AllocError> {
        let mut map = Self::with_hasher_in(S::default(), allocator);
        map.reserve(capacity)?;
        Ok(map)
    }
}

impl<K, V, S: Default, A: Allocator> AllocatingMap<K, V, S, A> {
    pub fn new_in(allocator: A) -> Self {
        Self::with_hasher_in(S::default(), allocator)
    }
}

impl<K, V, S, A: Allocator> AllocatingMap<K, V, S, A> {
    pub fn with_hasher_in(hasher: S, allocator: A) -> Self {
        Self {
            map: Map::from_table(Set::with_hasher(hasher)),
            backing: Backing::new(allocator),
        }
    }

    pub fn allocator(&self) -> &A {
        &self.backing.allocator
    }

    pub fn block(&self) -> ConstBlock {
        self.map.block()
    }

    pub fn hasher(&self) -> &S {
        self.map.hasher()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn max_size(&self) -> usize {
        MAX_SIZE
    }

    pub fn capacity(&self) -> usize {
        self.map.max_size()
    }

    pub fn bucket_count(&self) -> usize {
        self.map.bucket_count()
    }

    pub fn max_bucket_count(&self) -> usize {
        MAX_BUCKET_COUNT
    }

    pub fn load_factor(&self) -> f32 {
        self.map.load_factor()
    }

    pub fn max_load_factor(&self) -> f32 {
        self.map.max_load_factor()
    }

    pub fn set_max_load_factor(&mut self, max_load_factor: f32) {
        self.map.set_max_load_factor(max_load_factor);
    }

    pub fn iter(&self) -> map::Iter<'_, K, V> {
        self.map.iter()
    }

    pub fn iter_mut(&mut self) -> map::IterMut<'_, K, V> {
        self.map.iter_mut()
    }

    pub fn keys(&self) -> impl ExactSizeIterator<Item = &K> + '_ {
        self.map.keys()
    }

    pub fn values(&self) -> impl ExactSizeIterator<Item = &V> + '_ {
        self.map.values()
    }

    pub fn values_mut(&mut self) -> impl ExactSizeIterator<Item = &mut V> + '_ {
        self.map.values_mut()
    }

    pub fn drain(&mut self) -> map::Drain<'_, K, V> {
        self.map.drain()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn retain<F: FnMut(&K, &mut V) -> bool>(&mut self, keep: F) {
        self.map.retain(keep);
    }

    pub fn cursor_mut(&mut self) -> map::CursorMut<'_, K, V, S> {
        self.map.cursor_mut()
    }

    #[cfg(test)]
    pub(crate) fn table(&self) -> &Set<(K, V), S> {
        self.map.table()
    }
}

impl<K, V, S: Clone, A: Allocator> AllocatingMap<K, V, S, A> {
    pub fn reserve(&mut self, count: usize) -> Result<(), AllocError> {
        self.backing.reserve(self.map.table_mut(), count)
    }

    pub fn rehash(&mut self, count: usize) -> Result<(), AllocError> {
        self.backing.rehash(self.map.table_mut(), count)
    }
}

impl<K, V, S: BuildHasher, A: Allocator> AllocatingMap<K, V, S, A> {
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.map.get(key)
    }

    pub fn find<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.map.find(key)
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.map.get_mut(key)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.map.contains_key(key)
    }

    /// # Panics
    /// If `key` is absent.
    pub fn at<Q>(&self, key: &Q) -> &V
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.map.at(key)
    }

    /// # Panics
    /// If `key` is absent.
    pub fn at_mut<Q>(&mut self, key: &Q) -> &mut V
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.map.at_mut(key)
    }

    pub fn find_cursor_mut<Q>(&mut self, key: &Q) -> Option<map::CursorMut<'_, K, V, S>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.map.find_cursor_mut(key)
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.map.remove(key)
    }

    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.map.remove_entry(key)
    }
}

impl<K: Hash + Eq, V, S: BuildHasher + Clone, A: Allocator> AllocatingMap<K, V, S, A> {
    /// Insert unless `key` is present, growing first when full.
    pub fn insert(&mut self, key: K, value: V) -> Result<(&mut V, bool), AllocError> {
        self.backing.prepare(self.map.table_mut())?;
        self.map.insert(key, value)
    }

    pub fn emplace(&mut self, key: K, value: V) -> Result<(&mut V, bool), AllocError> {
        self.insert(key, value)
    }

    pub fn insert_with<F: FnOnce() -> V>(&mut self, key: K, make: F) -> Result<(&mut V, bool), AllocError> {
        self.backing.prepare(self.map.table_mut())?;
        self.map.insert_with(key, make)
    }

    pub fn insert_or_assign(&mut self, key: K, value: V) -> Result<Option<V>, AllocError> {
        if let Some(slot) = self.map.get_mut(&key) {
            return Ok(Some(mem::replace(slot, value)));
        }
        self.insert(key, value).map(|_| None)
    }
}

impl<K, V, S: Default, A: Allocator + Default> Default for AllocatingMap<K, V, S, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S, A: Allocator> Drop for AllocatingMap<K, V, S, A> {
    fn drop(&mut self) {
        self.backing.release(self.map.table_mut());
    }
}

impl<K, Q, V, S, A> Index<&Q> for AllocatingMap<K, V, S, A>
where
    K: Borrow<Q>,
    Q: ?Sized + Hash + Eq,
    S: BuildHasher,
    A: Allocator,
{
    type Output = V;

    fn index(&self, key: &Q) -> &V {
        self.map.at(key)
    }
}

impl<K: fmt::Debug, V: fmt::Debug, S, A: Allocator> fmt::Debug for AllocatingMap<K, V, S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.map, f)
    }
}

impl<'a, K, V, S, A: Allocator> IntoIterator for &'a AllocatingMap<K, V, S, A> {
    type Item = (&'a K, &'a V);
    type IntoIter = map::Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
