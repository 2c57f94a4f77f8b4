//! Failure kinds shared by allocators and tables.

use thiserror::Error;

/// Why a request for memory or for a new element could not be satisfied.
///
/// Both kinds are raised before any observable state changes, so the
/// structure that reported them stays fully usable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum AllocError {
    /// A fixed-capacity structure (stack or pool allocator, raw table) has
    /// no room left within its bound.
    #[error("capacity exceeded: requested {requested}, available {available}")]
    Capacity { requested: usize, available: usize },
    /// The underlying heap could not provide the memory at all.
    #[error("out of memory: failed to allocate {requested} bytes")]
    OutOfMemory { requested: usize },
}

impl AllocError {
    pub fn is_capacity(&self) -> bool {
        matches!(self, AllocError::Capacity { .. })
    }

    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, AllocError::OutOfMemory { .. })
    }

    /// A byte count that does not fit in `usize`.
    pub(crate) const fn size_overflow() -> Self {
        AllocError::OutOfMemory { requested: usize::MAX }
    }
}
