//! arena-hashset: fixed-capacity hash sets and maps that live entirely
//! inside a caller-supplied memory block, plus the small allocator toolkit
//! used to carve those blocks.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: hash tables whose whole footprint (bucket array and nodes) is
//!   one contiguous block, sized up front with `memory_requirement`, so
//!   many tables can share an arena or a single allocation.
//! - Layers:
//!   - Allocators (`Allocator`, `StackAllocator`, `FreeListAllocator`,
//!     `PoolAllocator`, `SystemAllocator`, `PolymorphicAllocator`): hand
//!     out raw `Block`s and report exhaustion as `AllocError`.
//!   - Set<T, S>: the hash engine. Open chaining over one global doubly
//!     linked list where every bucket's nodes form a contiguous run.
//!   - Map<K, V, S>: a `Set<(K, V)>` that hashes and compares keys only.
//!   - AllocatingSet / AllocatingMap: own an allocator and move to a
//!     bigger block when full.
//!
//! Constraints
//! - Single-threaded: tables and allocators hold raw pointers and are
//!   `!Send`/`!Sync`.
//! - No per-element heap allocation. A raw table never allocates; inserting
//!   into a full one fails with `AllocError::Capacity`.
//! - Insert probes before it mutates: user `Hash`/`Eq` code and capacity
//!   checks run while the table is still untouched.
//!
//! Hasher and rehashing invariants
//! - Each node stores its `u64` hash. Bucket selection is Fibonacci
//!   hashing of that value (`hash * 0x9E3779B97F4A7C15 >> (64 - log2
//!   buckets)`), so rehashing and growth never call `Hash` again.
//! - Buckets only grow from inserts, up to `max_bucket_count`; past that
//!   the load factor is allowed to exceed its maximum.
//!
//! Reentrancy policy
//! - A debug-only guard panics if user `Hash`/`Eq` code re-enters the same
//!   table while it probes. Element drops run after the node is unlinked,
//!   so `Drop` may touch the table.
//!
//! Notes and non-goals
//! - Raw tables never free their block; the caller (or the allocating
//!   wrapper) does, after dropping the table.
//! - A default-constructed table is unbound: zero capacity, no block.
//!
//! ```
//! use arena_hashset::AllocatingMap;
//!
//! let mut ages: AllocatingMap<String, u32> = AllocatingMap::new();
//! ages.insert("ada".to_string(), 36).unwrap();
//! assert!(!ages.insert("ada".to_string(), 37).unwrap().1);
//! assert_eq!(ages["ada"], 36);
//! ```

pub mod allocating;
pub mod allocator;
pub mod block;
pub mod error;
pub mod free_list;
pub mod map;
pub mod merged;
pub mod pool;
mod probe_guard;
pub mod set;
mod set_proptest;
pub mod stack_allocator;

// Public surface
pub use allocating::{AllocatingMap, AllocatingSet};
pub use allocator::{alloc_aligned, Allocator, PolymorphicAllocator, SystemAllocator, UniqueBlock};
pub use block::{align_up, checked_align_up, ptrdiff, Block, ConstBlock, Storage, MAX_ALIGN};
pub use error::AllocError;
pub use free_list::{make_pool_allocator, FreeListAllocator, PoolAllocator};
pub use hashbrown::hash_map::DefaultHashBuilder;
pub use map::Map;
pub use merged::{make_merged, merged_memory_requirement, Carve, Parts};
pub use pool::{AllocatingPool, Pool};
pub use set::Set;
pub use stack_allocator::StackAllocator;
