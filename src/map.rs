//! Map: key/value table stored as a `Set<(K, V)>` that hashes and compares
//! the key only.

use crate::allocator::Allocator;
use crate::block::{Block, ConstBlock};
use crate::error::AllocError;
use crate::set::{self, Node, Set};
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::iter::FusedIterator;
use core::ops::Index;
use core::ptr::NonNull;
use hashbrown::hash_map::DefaultHashBuilder;

/// Fixed-capacity hash map in a caller-supplied block.
///
/// `insert` never overwrites: inserting an existing key keeps the stored
/// value and reports `false`. Use [`Map::insert_or_assign`] to replace.
pub struct Map<K, V, S = DefaultHashBuilder> {
    table: Set<(K, V), S>,
}

pub type Drain<'a, K, V> = set::Drain<'a, (K, V)>;

impl<K, V, S> Map<K, V, S> {
    pub const ALIGN: usize = Set::<(K, V), S>::ALIGN;

    pub fn memory_requirement(max_node_count: usize) -> usize {
        Set::<(K, V), S>::memory_requirement(max_node_count)
    }

    pub fn memory_requirement_with_buckets(max_node_count: usize, max_bucket_count: usize) -> usize {
        Set::<(K, V), S>::memory_requirement_with_buckets(max_node_count, max_bucket_count)
    }

    pub fn with_hasher(hasher: S) -> Self {
        Self {
            table: Set::with_hasher(hasher),
        }
    }

    /// # Safety
    /// See [`Set::from_block_with_hasher`].
    pub unsafe fn from_block_with_hasher(
        block: Block,
        max_node_count: usize,
        max_bucket_count: usize,
        hasher: S,
    ) -> Self {
        Self {
            table: Set::from_block_with_hasher(block, max_node_count, max_bucket_count, hasher),
        }
    }

    pub fn make_with_hasher_in<A: Allocator>(
        allocator: &mut A,
        max_node_count: usize,
        max_bucket_count: usize,
        hasher: S,
    ) -> Result<(Block, Self), AllocError> {
        let (block, table) =
            Set::make_with_hasher_in(allocator, max_node_count, max_bucket_count, hasher)?;
        Ok((block, Self { table }))
    }

    pub(crate) fn from_table(table: Set<(K, V), S>) -> Self {
        Self { table }
    }

    #[cfg(test)]
    pub(crate) fn table(&self) -> &Set<(K, V), S> {
        &self.table
    }

    pub(crate) fn table_mut(&mut self) -> &mut Set<(K, V), S> {
        &mut self.table
    }

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
        self.table.max_size()
    }

    pub fn bucket_count(&self) -> usize {
        self.table.bucket_count()
    }

    pub fn max_bucket_count(&self) -> usize {
        self.table.max_bucket_count()
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

    pub fn rehash(&mut self, count: usize) {
        self.table.rehash(count);
    }

    pub fn clear(&mut self) {
        self.table.clear();
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.table.iter(),
        }
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            inner: self.table.iter_mut(),
        }
    }

    pub fn keys(&self) -> impl ExactSizeIterator<Item = &K> + '_ {
        self.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl ExactSizeIterator<Item = &V> + '_ {
        self.iter().map(|(_, v)| v)
    }

    pub fn values_mut(&mut self) -> impl ExactSizeIterator<Item = &mut V> + '_ {
        self.iter_mut().map(|(_, v)| v)
    }

    pub fn drain(&mut self) -> Drain<'_, K, V> {
        self.table.drain()
    }

    pub fn cursor_mut(&mut self) -> CursorMut<'_, K, V, S> {
        CursorMut {
            inner: self.table.cursor_mut(),
        }
    }

    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        let mut cursor = self.cursor_mut();
        while let Some((k, v)) = cursor.current_mut() {
            if keep(k, v) {
                cursor.move_next();
            } else {
                drop(cursor.remove_current());
            }
        }
    }
}

impl<K, V, S: Default> Map<K, V, S> {
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

impl<K, V, S: BuildHasher> Map<K, V, S> {
    fn find_node<Q>(&self, key: &Q) -> Option<NonNull<Node<(K, V)>>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        if self.table.is_empty() {
            return None;
        }
        let hash = self.table.hash_of(key);
        self.table
            .find_hashed(hash, |(k, _)| <K as Borrow<Q>>::borrow(k) == key)
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.find(key).map(|(_, v)| v)
    }

    /// The stored entry for `key`.
    pub fn find<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        // SAFETY: the node is live for the borrow of `self`.
        self.find_node(key).map(|node| {
            let (k, v) = unsafe { Node::value(node) };
            (k, v)
        })
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        // SAFETY: the node is live and `self` is mutably borrowed.
        self.find_node(key)
            .map(|node| unsafe { &mut Node::value_mut(node).1 })
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.find_node(key).is_some()
    }

    /// The value for `key`.
    ///
    /// # Panics
    /// If `key` is absent.
    pub fn at<Q>(&self, key: &Q) -> &V
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        match self.get(key) {
            Some(v) => v,
            None => panic!("key not found in map"),
        }
    }

    /// # Panics
    /// If `key` is absent.
    pub fn at_mut<Q>(&mut self, key: &Q) -> &mut V
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        match self.get_mut(key) {
            Some(v) => v,
            None => panic!("key not found in map"),
        }
    }

    pub fn find_cursor_mut<Q>(&mut self, key: &Q) -> Option<CursorMut<'_, K, V, S>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let node = self.find_node(key)?;
        let mut inner = self.table.cursor_mut();
        inner.seek(node);
        Some(CursorMut { inner })
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.remove_entry(key).map(|(_, v)| v)
    }

    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let node = self.find_node(key)?;
        // SAFETY: `node` was just found in this table.
        Some(unsafe { self.table.remove_node(node) })
    }
}

impl<K: Hash + Eq, V, S: BuildHasher> Map<K, V, S> {
    /// Insert `value` under `key` unless the key is present.
    ///
    /// Returns the stored value and whether an insertion happened. On a
    /// duplicate key both arguments are dropped and the stored value is
    /// left as it was.
    pub fn insert(&mut self, key: K, value: V) -> Result<(&mut V, bool), AllocError> {
        let hash = self.table.hash_of(&key);
        let (node, inserted) =
            self.table
                .insert_hashed_with(hash, (key, value), |(k, _), (key, _)| k == key, |kv| kv)?;
        // SAFETY: the node is live and `self` is mutably borrowed.
        Ok((unsafe { &mut Node::value_mut(node).1 }, inserted))
    }

    /// Same as [`Map::insert`]: both parts are already constructed.
    pub fn emplace(&mut self, key: K, value: V) -> Result<(&mut V, bool), AllocError> {
        self.insert(key, value)
    }

    /// Like [`Map::insert`], but the value is only built by `make` when
    /// `key` is absent.
    pub fn insert_with<F>(&mut self, key: K, make: F) -> Result<(&mut V, bool), AllocError>
    where
        F: FnOnce() -> V,
    {
        let hash = self.table.hash_of(&key);
        let (node, inserted) = self.table.insert_hashed_with(
            hash,
            (key, make),
            |(k, _), (key, _)| k == key,
            |(key, make)| (key, make()),
        )?;
        // SAFETY: the node is live and `self` is mutably borrowed.
        Ok((unsafe { &mut Node::value_mut(node).1 }, inserted))
    }

    /// Insert or overwrite; returns the previous value.
    pub fn insert_or_assign(&mut self, key: K, value: V) -> Result<Option<V>, AllocError> {
        if let Some(slot) = self.get_mut(&key) {
            return Ok(Some(core::mem::replace(slot, value)));
        }
        self.insert(key, value).map(|_| None)
    }
}

impl<K, V, S: Default> Default for Map<K, V, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, Q, V, S> Index<&Q> for Map<K, V, S>
where
    K: Borrow<Q>,
    Q: ?Sized + Hash + Eq,
    S: BuildHasher,
{
    type Output = V;

    fn index(&self, key: &Q) -> &V {
        self.at(key)
    }
}

impl<K: fmt::Debug, V: fmt::Debug, S> fmt::Debug for Map<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<'a, K, V, S> IntoIterator for &'a Map<K, V, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, K, V, S> IntoIterator for &'a mut Map<K, V, S> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

pub struct Iter<'a, K, V> {
    inner: set::Iter<'a, (K, V)>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, v)| (k, v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}
impl<K, V> FusedIterator for Iter<'_, K, V> {}

pub struct IterMut<'a, K, V> {
    inner: set::IterMut<'a, (K, V)>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, v)| (&*k, v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}

/// Removal cursor over a map's entries; see [`set::CursorMut`].
pub struct CursorMut<'a, K, V, S> {
    inner: set::CursorMut<'a, (K, V), S>,
}

impl<K, V, S> CursorMut<'_, K, V, S> {
    pub fn current(&self) -> Option<(&K, &V)> {
        self.inner.current().map(|(k, v)| (k, v))
    }

    pub fn current_mut(&mut self) -> Option<(&K, &mut V)> {
        self.inner.current_mut().map(|(k, v)| (&*k, v))
    }

    pub fn is_end(&self) -> bool {
        self.inner.is_end()
    }

    pub fn move_next(&mut self) {
        self.inner.move_next();
    }

    pub fn move_prev(&mut self) {
        self.inner.move_prev();
    }

    pub fn remove_current(&mut self) -> Option<(K, V)> {
        self.inner.remove_current()
    }
}
