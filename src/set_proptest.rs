#![cfg(test)]

// Property tests for the table engine kept inside the crate so they can
// walk the internal node list after every operation.

use crate::allocating::{AllocatingMap, AllocatingSet};
use crate::allocator::{SystemAllocator, UniqueBlock};
use crate::map::Map;
use crate::set::Set;
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::hash::{BuildHasher, Hasher};

// Key newtype with Borrow<str> to exercise borrowed lookup.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
struct Key(String);
impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
impl std::borrow::Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Default)]
struct ConstBuildHasher;
struct ConstHasher;
impl BuildHasher for ConstBuildHasher {
    type Hasher = ConstHasher;
    fn build_hasher(&self) -> Self::Hasher {
        ConstHasher
    }
}
impl Hasher for ConstHasher {
    fn write(&mut self, _bytes: &[u8]) {}
    fn finish(&self) -> u64 {
        0
    }
}

// Pool-indexed operations: indices shrink to earlier keys, the pool shrinks,
// and op lists shrink in length.
#[derive(Clone, Debug)]
enum Op {
    Insert(usize, i32),
    InsertWith(usize, i32),
    Remove(usize),
    Find(usize),
    Contains(String),
    Mutate(usize, i32),
    Iterate,
    Rehash(usize),
    CursorRemove(usize),
    Clear,
}

fn key_from(pool: &[String], i: usize) -> Key {
    Key(pool[i].clone())
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<Op>)> {
    proptest::collection::vec("[a-z]{0,5}", 1..=12).prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let contains_pool = proptest::sample::select(pool.clone());
        let op = prop_oneof![
            (idx.clone(), any::<i32>()).prop_map(|(i, v)| Op::Insert(i, v)),
            (idx.clone(), any::<i32>()).prop_map(|(i, v)| Op::InsertWith(i, v)),
            idx.clone().prop_map(Op::Remove),
            idx.clone().prop_map(Op::Find),
            prop_oneof![contains_pool, "[a-z]{0,5}".prop_map(|s| s)].prop_map(Op::Contains),
            (idx.clone(), any::<i32>()).prop_map(|(i, d)| Op::Mutate(i, d)),
            Just(Op::Iterate),
            (0usize..40).prop_map(Op::Rehash),
            (0usize..16).prop_map(Op::CursorRemove),
            Just(Op::Clear),
        ];
        proptest::collection::vec(op, 1..80).prop_map(move |ops| (pool.clone(), ops))
    })
}

fn check_structure<S>(table: &Set<(Key, i32), S>, model: &HashMap<Key, i32>) -> Result<(), TestCaseError> {
    table.check_invariants().map_err(TestCaseError::fail)?;
    prop_assert_eq!(table.len(), model.len());
    prop_assert_eq!(table.is_empty(), model.is_empty());
    prop_assert!(
        table.load_factor() <= table.max_load_factor() || table.bucket_count() == table.max_bucket_count(),
        "load factor above maximum with room to grow"
    );
    Ok(())
}

// Invariants exercised across random operation sequences on a fixed block:
// - New keys are accepted until `max_size`, then rejected with `Capacity`
//   while existing keys still resolve.
// - Duplicate inserts keep the stored value; `insert_with` builds the value
//   only on a miss.
// - `find`/`contains_key`/`remove` parity with the model.
// - Every bucket's nodes stay contiguous in the list and the bucket points
//   at the first of them, after every operation including rehash.
fn run_fixed<S: BuildHasher + Default>(pool: &[String], ops: Vec<Op>, capacity: usize) -> Result<(), TestCaseError> {
    let owner = UniqueBlock::<SystemAllocator>::new(Map::<Key, i32, S>::memory_requirement(capacity))
        .map_err(|e| TestCaseError::fail(e.to_string()))?;
    let mut sut: Map<Key, i32, S> = unsafe { Map::from_block(owner.get(), capacity) };
    let mut model: HashMap<Key, i32> = HashMap::new();

    for op in ops {
        match op {
            Op::Insert(i, v) => {
                let k = key_from(pool, i);
                let already = model.get(&k).copied();
                match sut.insert(k.clone(), v) {
                    Ok((stored, inserted)) => {
                        prop_assert_eq!(inserted, already.is_none());
                        prop_assert_eq!(*stored, already.unwrap_or(v));
                        model.entry(k).or_insert(v);
                    }
                    Err(e) => {
                        prop_assert!(e.is_capacity());
                        prop_assert!(already.is_none(), "capacity error on an existing key");
                        prop_assert_eq!(model.len(), capacity);
                    }
                }
            }
            Op::InsertWith(i, v) => {
                let k = key_from(pool, i);
                let absent = !model.contains_key(&k);
                let calls = Cell::new(0);
                let res = sut.insert_with(k.clone(), || {
                    calls.set(calls.get() + 1);
                    v
                });
                match res {
                    Ok((_, inserted)) => {
                        prop_assert_eq!(inserted, absent);
                        prop_assert_eq!(calls.get(), usize::from(inserted), "factory runs only on a miss");
                        model.entry(k).or_insert(v);
                    }
                    Err(e) => {
                        prop_assert!(e.is_capacity() && absent);
                        prop_assert_eq!(calls.get(), 0);
                    }
                }
            }
            Op::Remove(i) => {
                let k = key_from(pool, i);
                prop_assert_eq!(sut.remove(&k), model.remove(&k));
            }
            Op::Find(i) => {
                let k = key_from(pool, i);
                let found = sut.find(&k).map(|(k, v)| (k.clone(), *v));
                let expected = model.get_key_value(&k).map(|(k, v)| (k.clone(), *v));
                prop_assert_eq!(found, expected);
            }
            Op::Contains(s) => {
                let has_model = model.keys().any(|k| k.0 == s);
                prop_assert_eq!(sut.contains_key(s.as_str()), has_model);
            }
            Op::Mutate(i, d) => {
                let k = key_from(pool, i);
                if let Some(v) = sut.get_mut(&k) {
                    *v = v.saturating_add(d);
                    let mv = model.get_mut(&k).expect("present in model");
                    *mv = mv.saturating_add(d);
                } else {
                    prop_assert!(!model.contains_key(&k));
                }
            }
            Op::Iterate => {
                let s: BTreeMap<Key, i32> = sut.iter().map(|(k, v)| (k.clone(), *v)).collect();
                let m: BTreeMap<Key, i32> = model.iter().map(|(k, v)| (k.clone(), *v)).collect();
                prop_assert_eq!(sut.iter().len(), model.len());
                prop_assert_eq!(s, m);
            }
            Op::Rehash(n) => {
                sut.rehash(n);
                prop_assert!(sut.bucket_count().is_power_of_two());
                prop_assert!(sut.bucket_count() <= sut.max_bucket_count());
            }
            Op::CursorRemove(n) => {
                if !model.is_empty() {
                    let steps = n % model.len();
                    let mut cursor = sut.cursor_mut();
                    for _ in 0..steps {
                        cursor.move_next();
                    }
                    let removed = cursor.remove_current();
                    prop_assert!(removed.is_some(), "cursor walked off the list");
                    if let Some((k, v)) = removed {
                        prop_assert_eq!(model.remove(&k), Some(v));
                    }
                }
            }
            Op::Clear => {
                sut.clear();
                model.clear();
            }
        }
        check_structure(sut.table(), &model)?;
    }
    Ok(())
}

// Same operations on a growable map: nothing is ever rejected, and every
// growth step must carry all entries over with the runs intact.
fn run_growing<S: BuildHasher + Default + Clone>(pool: &[String], ops: Vec<Op>) -> Result<(), TestCaseError> {
    let mut sut: AllocatingMap<Key, i32, S> = AllocatingMap::new();
    let mut model: HashMap<Key, i32> = HashMap::new();

    for op in ops {
        match op {
            Op::Insert(i, v) | Op::InsertWith(i, v) => {
                let k = key_from(pool, i);
                let absent = !model.contains_key(&k);
                let (_, inserted) = sut
                    .insert(k.clone(), v)
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert_eq!(inserted, absent);
                model.entry(k).or_insert(v);
            }
            Op::Remove(i) | Op::CursorRemove(i) => {
                let k = key_from(pool, i % pool.len());
                prop_assert_eq!(sut.remove(&k), model.remove(&k));
            }
            Op::Find(i) | Op::Mutate(i, _) => {
                let k = key_from(pool, i);
                prop_assert_eq!(sut.get(&k), model.get(&k));
            }
            Op::Contains(s) => {
                prop_assert_eq!(sut.contains_key(s.as_str()), model.keys().any(|k| k.0 == s));
            }
            Op::Iterate => {
                let s: BTreeSet<&Key> = sut.keys().collect();
                let m: BTreeSet<&Key> = model.keys().collect();
                prop_assert_eq!(s, m);
            }
            Op::Rehash(n) => {
                sut.rehash(n).map_err(|e| TestCaseError::fail(e.to_string()))?;
            }
            Op::Clear => {
                sut.clear();
                model.clear();
            }
        }
        check_structure(sut.table(), &model)?;
        prop_assert!(sut.capacity() >= sut.len());
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_fixed_map_matches_model((pool, ops) in arb_scenario(), capacity in 1usize..=10) {
        run_fixed::<hashbrown::hash_map::DefaultHashBuilder>(&pool, ops, capacity)?;
    }

    // Worst-case collisions: every key shares one run.
    #[test]
    fn prop_fixed_map_with_collisions((pool, ops) in arb_scenario(), capacity in 1usize..=10) {
        run_fixed::<ConstBuildHasher>(&pool, ops, capacity)?;
    }

    #[test]
    fn prop_growing_map_matches_model((pool, ops) in arb_scenario()) {
        run_growing::<hashbrown::hash_map::DefaultHashBuilder>(&pool, ops)?;
    }

    #[test]
    fn prop_growing_map_with_collisions((pool, ops) in arb_scenario()) {
        run_growing::<ConstBuildHasher>(&pool, ops)?;
    }

    // Rehashing to any count keeps membership and the run layout.
    #[test]
    fn prop_rehash_preserves_membership(
        values in proptest::collection::hash_set(any::<u32>(), 0..64),
        counts in proptest::collection::vec(0usize..200, 1..6),
    ) {
        let owner = UniqueBlock::<SystemAllocator>::new(Set::<u32>::memory_requirement_with_buckets(64, 128)).unwrap();
        let mut set: Set<u32> = unsafe { Set::from_block_with_buckets(owner.get(), 64, 128) };
        for v in &values {
            prop_assert!(set.insert(*v).unwrap().1);
        }
        for n in counts {
            set.rehash(n);
            set.check_invariants().map_err(TestCaseError::fail)?;
            let members: HashSet<u32> = set.iter().copied().collect();
            prop_assert_eq!(&members, &values);
            for v in &values {
                prop_assert!(set.contains(v));
            }
        }
    }

    // Growth from empty through many doublings keeps every element.
    #[test]
    fn prop_allocating_set_grows_without_loss(values in proptest::collection::vec(any::<u16>(), 0..400)) {
        let mut set: AllocatingSet<u16> = AllocatingSet::new();
        let mut model: HashSet<u16> = HashSet::new();
        for v in values {
            let (_, inserted) = set.insert(v).unwrap();
            prop_assert_eq!(inserted, model.insert(v));
        }
        set.table().check_invariants().map_err(TestCaseError::fail)?;
        prop_assert_eq!(set.len(), model.len());
        for v in &model {
            prop_assert!(set.contains(v));
        }
    }
}
