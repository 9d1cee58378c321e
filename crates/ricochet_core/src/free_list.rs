//! Bounded append/consume stack of free slot indices
//!
//! Host mirror of the device free-list: an atomic counter over a fixed
//! array of slot indices. Consume and append are compare-exchange loops,
//! so the count never goes below zero or above capacity no matter how many
//! invocations race on it.
//!
//! Within one dispatch a kernel only consumes (Emit) or only appends
//! (Init, Update). The two never interleave, which is what makes the
//! reserve-then-write append safe without a lock.

use std::sync::atomic::{AtomicU32, Ordering};

/// LIFO free-list with a fixed capacity
pub struct FreeList {
    indices: Box<[AtomicU32]>,
    count: AtomicU32,
}

impl FreeList {
    /// Create an empty free-list able to hold `capacity` indices
    pub fn new(capacity: u32) -> Self {
        let indices = (0..capacity).map(|_| AtomicU32::new(0)).collect();
        Self {
            indices,
            count: AtomicU32::new(0),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Current logical size
    pub fn len(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pop one index, or `None` if the list is empty at this instant
    pub fn consume(&self) -> Option<u32> {
        let mut current = self.count.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return None;
            }
            match self.count.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(self.indices[(current - 1) as usize].load(Ordering::Acquire)),
                Err(actual) => current = actual,
            }
        }
    }

    /// Push one index; returns false if the list is already full
    pub fn append(&self, index: u32) -> bool {
        let capacity = self.capacity();
        let mut current = self.count.load(Ordering::Acquire);
        loop {
            if current >= capacity {
                return false;
            }
            match self.count.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.indices[current as usize].store(index, Ordering::Release);
                    return true;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.count.store(0, Ordering::Release);
    }

    /// Copy of the live entries, bottom of the stack first
    pub fn snapshot(&self) -> Vec<u32> {
        let len = self.len() as usize;
        self.indices[..len]
            .iter()
            .map(|index| index.load(Ordering::Acquire))
            .collect()
    }
}

impl std::fmt::Debug for FreeList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FreeList")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
