use arena_hashset::{
    make_merged, make_pool_allocator, merged_memory_requirement, AllocatingPool, Allocator,
    FreeListAllocator, Map, Pool, PoolAllocator, Set, StackAllocator, Storage, SystemAllocator,
};

/// Invariant: tables carved from one arena stay inside it and fail with a
/// capacity error once the arena is used up.
#[test]
fn tables_share_a_stack_arena() {
    let mut storage = Storage::<8192>::new();
    let mut arena = unsafe { StackAllocator::new(storage.block()) };
    let (_a, mut small) = Set::<u32>::make(&mut arena, 32).unwrap();
    let (_b, mut names) = Map::<u32, &str>::make(&mut arena, 32).unwrap();
    small.insert(1).unwrap();
    names.insert(1, "one").unwrap();
    assert!(arena.owns(small.block()));
    assert!(arena.owns(names.block()));

    let err = Set::<u64>::make(&mut arena, 10_000).unwrap_err();
    assert!(err.is_capacity());
    assert!(small.contains(&1));
}

/// Invariant: a free list over a stack arena recycles same-class blocks
/// before taking fresh memory.
#[test]
fn free_list_over_stack() {
    let mut storage = Storage::<256>::new();
    let stack = unsafe { StackAllocator::new(storage.block()) };
    let mut a = FreeListAllocator::new(stack, 8, 32);
    let x = a.alloc(20).unwrap();
    let used = a.parent().used();
    unsafe { a.free(x) };
    let y = a.alloc(9).unwrap();
    assert_eq!(y.begin, x.begin);
    assert_eq!(a.parent().used(), used);
}

/// Invariant: a pool hands out exactly `max_objects` blocks.
#[test]
fn pool_allocator_limits() {
    let mut sys = SystemAllocator::new();
    let (block, mut pool) = make_pool_allocator(&mut sys, 24, 24, 5).unwrap();
    let blocks: Vec<_> = (0..5).map(|_| pool.alloc(24).unwrap()).collect();
    assert!(pool.alloc(24).unwrap_err().is_capacity());
    for b in blocks {
        unsafe { pool.free(b) };
    }
    assert!(pool.alloc(24).is_ok());
    drop(pool);
    unsafe { sys.free(block) };
}

/// Invariant: merged parts are laid out in one block, in order.
#[test]
fn merged_set_map_and_pool() {
    type Parts = (Set<u16>, Map<u16, u16>, Pool<u64>, PoolAllocator);
    let args = ((10, 10), (5, 8), 4, (16, 16, 4));
    let mut sys = SystemAllocator::new();
    let (block, (mut set, mut map, mut objects, mut raw)) =
        make_merged::<Parts, _>(&mut sys, args).unwrap();
    assert_eq!(block.size(), merged_memory_requirement::<Parts>(&args));

    for k in 0..10 {
        set.insert(k).unwrap();
    }
    for k in 0..5 {
        map.insert(k, k + 1).unwrap();
    }
    assert!(set.insert(10).is_err());
    assert!(map.insert(6, 0).is_err());
    let p = objects.insert(77).unwrap();
    assert_eq!(unsafe { objects.remove(p) }, 77);
    raw.alloc(16).unwrap();

    assert!(set.block().end <= map.block().begin);
    assert!(map.block().end <= objects.block().begin);
    assert!(objects.block().end <= raw.block().begin);
    drop((set, map, objects, raw));
    unsafe { sys.free(block) };
}

/// Invariant: an allocating pool frees its block on drop and recycles
/// slots while alive.
#[test]
fn allocating_pool_recycles() {
    let mut pool: AllocatingPool<[u8; 40]> = AllocatingPool::with_capacity(2).unwrap();
    let a = pool.insert([1; 40]).unwrap();
    let _b = pool.insert([2; 40]).unwrap();
    assert!(pool.insert([3; 40]).is_err());
    let old = unsafe { pool.remove(a) };
    assert_eq!(old[0], 1);
    let c = pool.insert([4; 40]).unwrap();
    assert_eq!(c, a);
}

/// Invariant: requests no arena could hold report `Capacity`, never an
/// arithmetic overflow, and leave the arena as it was.
#[test]
fn absurd_requests_are_capacity_errors() {
    let mut storage = Storage::<128>::new();
    let mut stack = unsafe { StackAllocator::new(storage.block()) };
    stack.alloc(10).unwrap();
    let used = stack.used();
    assert!(stack.alloc(usize::MAX).unwrap_err().is_capacity());
    assert!(stack.alloc(usize::MAX - 3).unwrap_err().is_capacity());

    let mut list = FreeListAllocator::new(stack, 8, 16);
    assert!(list.alloc(usize::MAX).unwrap_err().is_capacity());
    assert_eq!(list.parent().used(), used);
}

/// Invariant: tables for over-aligned elements built in a byte-aligned
/// arena start on an aligned address.
#[test]
fn over_aligned_table_in_byte_arena() {
    #[derive(Debug, PartialEq, Eq, Hash)]
    #[repr(align(64))]
    struct Line(u16);

    let mut storage = Storage::<4096>::new();
    let mut arena = unsafe { StackAllocator::with_alignment(storage.block(), 1) };
    arena.alloc(3).unwrap();
    let (_block, mut lines) = Set::<Line>::make(&mut arena, 8).unwrap();
    assert_eq!(lines.block().begin as usize % 64, 0);
    for k in 0..8 {
        lines.insert(Line(k)).unwrap();
    }
    assert!(lines.insert(Line(8)).unwrap_err().is_capacity());
    assert!((0..8).all(|k| lines.contains(&Line(k))));
}
