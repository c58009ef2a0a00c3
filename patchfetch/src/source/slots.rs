//! Concurrency slots shared by the built-in sources.
//!
//! A source with `n` slots runs at most `n` downloads at once; when every
//! slot is taken it reports itself busy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Counter of in-use download slots.
#[derive(Debug)]
pub struct SourceSlots {
    in_use: Arc<AtomicUsize>,
    capacity: usize,
}

impl SourceSlots {
    /// Create slots for `capacity` concurrent downloads (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            in_use: Arc::new(AtomicUsize::new(0)),
            capacity: capacity.max(1),
        }
    }

    /// Claim a slot, or `None` if all are taken.
    pub fn try_acquire(&self) -> Option<SlotGuard> {
        self.in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .ok()
            .map(|_| SlotGuard {
                in_use: Arc::clone(&self.in_use),
            })
    }

    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// A claimed slot; released on drop.
#[derive(Debug)]
pub struct SlotGuard {
    in_use: Arc<AtomicUsize>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.in_use.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimum_capacity() {
        assert_eq!(SourceSlots::new(0).capacity(), 1);
    }

    #[test]
    fn test_acquire_until_full() {
        let slots = SourceSlots::new(2);
        let a = slots.try_acquire();
        let b = slots.try_acquire();
        assert!(a.is_some());
        assert!(b.is_some());
        assert!(slots.try_acquire().is_none());
        assert_eq!(slots.in_use(), 2);

        drop(a);
        assert_eq!(slots.in_use(), 1);
        assert!(slots.try_acquire().is_some());
    }

    #[test]
    fn test_guard_released_on_other_thread() {
        let slots = SourceSlots::new(1);
        let guard = slots.try_acquire().unwrap();
        std::thread::spawn(move || drop(guard)).join().unwrap();
        assert_eq!(slots.in_use(), 0);
    }
}
