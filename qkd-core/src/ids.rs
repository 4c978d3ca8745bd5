//! Identifier allocation
//!
//! Buffer ids, key ids and frame message ids are handed out by allocators owned
//! by the simulation context and passed to whoever needs them. Two contexts never
//! share counters, so tests stay reproducible and can run in parallel.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Monotonic `u32` counter shared between clones
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next: Arc<AtomicU32>,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdAllocator {
    /// Allocator whose first id is 1 (0 is reserved for "no key")
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u32) -> Self {
        Self {
            next: Arc::new(AtomicU32::new(first)),
        }
    }

    /// Hand out the next id
    pub fn next_id(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// The id the next call to `next_id` will return
    pub fn peek(&self) -> u32 {
        self.next.load(Ordering::Relaxed)
    }
}

/// Every id namespace of one simulation
#[derive(Debug, Clone, Default)]
pub struct IdSpace {
    pub buffers: IdAllocator,
    pub keys: IdAllocator,
    pub messages: IdAllocator,
}

impl IdSpace {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_monotonic() {
        let ids = IdAllocator::new();
        assert_eq!(ids.next_id(), 1);
        assert_eq!(ids.next_id(), 2);
        assert_eq!(ids.peek(), 3);
    }

    #[test]
    fn test_clones_share_counter() {
        let space = IdSpace::new();
        let other = space.clone();
        assert_eq!(space.keys.next_id(), 1);
        assert_eq!(other.keys.next_id(), 2);
        // Separate namespaces stay independent
        assert_eq!(other.messages.next_id(), 1);
    }

    #[test]
    fn test_independent_spaces() {
        let a = IdSpace::new();
        let b = IdSpace::new();
        a.buffers.next_id();
        assert_eq!(b.buffers.next_id(), 1);
    }
}
