use arena_hashset::{
    AllocError, AllocatingMap, AllocatingSet, Allocator, Block, DefaultHashBuilder, PolymorphicAllocator,
    SystemAllocator,
};

/// Heap allocator with a byte budget; requests beyond it fail like an
/// exhausted heap.
struct Budgeted {
    inner: SystemAllocator,
    remaining: usize,
    live: usize,
}

impl Budgeted {
    fn new(budget: usize) -> Self {
        Self {
            inner: SystemAllocator::new(),
            remaining: budget,
            live: 0,
        }
    }
}

impl Allocator for Budgeted {
    fn alloc(&mut self, size: usize) -> Result<Block, AllocError> {
        if size > self.remaining {
            return Err(AllocError::OutOfMemory { requested: size });
        }
        let block = self.inner.alloc(size)?;
        self.remaining -= size;
        self.live += 1;
        Ok(block)
    }

    unsafe fn free(&mut self, block: Block) {
        if block.is_empty() {
            return;
        }
        self.remaining += block.size();
        self.live -= 1;
        self.inner.free(block);
    }
}

/// Invariant: growth never loses an element and never reports a capacity
/// error.
#[test]
fn ten_thousand_integers() {
    let mut set: AllocatingSet<i32> = AllocatingSet::new();
    for k in 0..10_000 {
        assert!(set.insert(k).unwrap().1);
    }
    assert_eq!(set.len(), 10_000);
    for k in 0..10_000 {
        assert!(set.contains(&k), "lost {k}");
    }
    assert!(set.capacity() >= 10_000);
    assert!(set.load_factor() <= set.max_load_factor());
}

/// Invariant: when the allocator refuses to grow, insert fails with the
/// allocator's error and the set keeps every earlier element.
#[test]
fn allocation_failure_propagates_without_damage() {
    let mut set: AllocatingSet<u64, DefaultHashBuilder, Budgeted> = AllocatingSet::new_in(Budgeted::new(4096));
    let mut inserted = 0u64;
    let err = loop {
        match set.insert(inserted) {
            Ok(_) => inserted += 1,
            Err(e) => break e,
        }
    };
    assert!(err.is_out_of_memory());
    assert!(inserted > 0);
    assert_eq!(set.len() as u64, inserted);
    for k in 0..inserted {
        assert!(set.contains(&k));
    }
    // Room frees up again once elements are removed.
    assert!(set.remove(&0));
    set.insert(inserted).unwrap();
    assert_eq!(set.allocator().live, 1, "old blocks must be released after growth");
}

/// Invariant: dropping the set returns its block to the allocator.
#[test]
fn drop_returns_block() {
    let mut budget = Budgeted::new(1 << 20);
    {
        let mut set: AllocatingSet<u32, DefaultHashBuilder, &mut Budgeted> = AllocatingSet::new_in(&mut budget);
        for k in 0..100 {
            set.insert(k).unwrap();
        }
    }
    assert_eq!(budget.live, 0);
    assert_eq!(budget.remaining, 1 << 20);
}

/// Invariant: a type-erased allocator handle drives growth like a concrete
/// one.
#[test]
fn polymorphic_allocator_backs_growth() {
    let mut sys = SystemAllocator::new();
    let poly = PolymorphicAllocator::new(&mut sys);
    let mut map: AllocatingMap<u32, String, DefaultHashBuilder, PolymorphicAllocator<'_>> =
        AllocatingMap::new_in(poly);
    for k in 0..64 {
        map.insert(k, k.to_string()).unwrap();
    }
    assert_eq!(map.get(&63).map(String::as_str), Some("63"));
}

/// Invariant: `reserve` allocates once up front; later inserts within the
/// reservation reuse the same block.
#[test]
fn reserve_avoids_regrowth() {
    let mut map: AllocatingMap<String, usize> = AllocatingMap::with_capacity(1000).unwrap();
    let block = map.block();
    for i in 0..1000 {
        map.insert(format!("key-{i}"), i).unwrap();
    }
    assert_eq!(map.block(), block);
    assert_eq!(map["key-999"], 999);
}

/// Invariant: map entries survive any number of growth steps with the
/// first-inserted value kept for duplicate keys.
#[test]
fn map_growth_keeps_first_values() {
    let mut map: AllocatingMap<u32, u32> = AllocatingMap::new();
    for k in 0..3000 {
        map.insert(k % 1500, k).unwrap();
    }
    assert_eq!(map.len(), 1500);
    for k in 0..1500 {
        assert_eq!(map.get(&k), Some(&k));
    }
}

/// Invariant: a growth request whose byte count cannot exist fails with
/// `OutOfMemory` before touching the allocator, and the set keeps working.
#[test]
fn impossible_growth_is_out_of_memory() {
    let mut budget = Budgeted::new(1 << 20);
    let mut set: AllocatingSet<u64, DefaultHashBuilder, &mut Budgeted> = AllocatingSet::new_in(&mut budget);
    for k in 0..10 {
        set.insert(k).unwrap();
    }
    let block = set.block();
    assert!(set.rehash(1 << 60).unwrap_err().is_out_of_memory());
    assert!(set.reserve(1 << 60).unwrap_err().is_out_of_memory());
    assert!(set.reserve(usize::MAX).unwrap_err().is_out_of_memory());
    assert_eq!(set.block(), block);
    assert_eq!(set.allocator().live, 1);
    for k in 10..100 {
        set.insert(k).unwrap();
    }
    assert!((0..100).all(|k| set.contains(&k)));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(align(32))]
struct CacheKey(u32);

/// Invariant: elements aligned beyond what the allocator guarantees still
/// land on aligned addresses after every growth step.
#[test]
fn over_aligned_keys_grow_through_the_safe_api() {
    let mut map: AllocatingMap<CacheKey, u8> = AllocatingMap::new();
    for k in 0..300 {
        map.insert(CacheKey(k), k as u8).unwrap();
    }
    for (key, _) in &map {
        assert_eq!(key as *const CacheKey as usize % 32, 0);
    }
    assert_eq!(map[&CacheKey(299)], 299u32 as u8);
    assert_eq!(map.len(), 300);
}
