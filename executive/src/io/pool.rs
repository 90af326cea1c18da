//! Child Buffer Pool
//!
//! Misaligned mass storage transfers are staged through track-sized
//! scratch buffers. The pool pre-allocates a fixed number of them at
//! startup and hands them out by index:
//!
//! - Every buffer is either available or in use, never both
//! - Acquire never blocks; an empty pool means "try again next pass"
//! - Release always succeeds for a buffer that is in use
//!
//! The pool lives under the I/O manager's lock together with the pending
//! tracker list, so it needs no synchronization of its own.

use std::collections::{BTreeSet, VecDeque};

use super::word::WordBuffer;
use crate::ex::SystemFault;

/// Index of a buffer within the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChildBufferId(usize);

impl ChildBufferId {
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Pool usage counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChildBufferStats {
    /// Buffers in the pool
    pub capacity: usize,
    /// Buffers currently available
    pub available: usize,
    /// Successful acquires
    pub acquires: u64,
    /// Acquires refused because the pool was empty
    pub exhausted: u64,
}

/// Fixed set of track-sized scratch buffers
#[derive(Debug, Default)]
pub struct ChildBufferPool {
    buffers: Vec<WordBuffer>,
    available: VecDeque<ChildBufferId>,
    in_use: BTreeSet<ChildBufferId>,
    acquires: u64,
    exhausted: u64,
}

impl ChildBufferPool {
    /// Allocate `count` buffers of `words_per_buffer` words each
    pub fn new(count: usize, words_per_buffer: usize) -> Self {
        Self {
            buffers: (0..count).map(|_| WordBuffer::new(words_per_buffer)).collect(),
            available: (0..count).map(ChildBufferId).collect(),
            in_use: BTreeSet::new(),
            acquires: 0,
            exhausted: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffers.len()
    }

    pub fn available_count(&self) -> usize {
        self.available.len()
    }

    pub fn in_use_count(&self) -> usize {
        self.in_use.len()
    }

    /// Take a buffer if one is free
    pub fn try_acquire(&mut self) -> Option<ChildBufferId> {
        match self.available.pop_front() {
            Some(id) => {
                self.in_use.insert(id);
                self.acquires += 1;
                Some(id)
            }
            None => {
                self.exhausted += 1;
                None
            }
        }
    }

    /// Return a buffer to the available set
    pub fn release(&mut self, id: ChildBufferId) -> Result<(), SystemFault> {
        if !self.in_use.remove(&id) {
            return Err(SystemFault::ChildBufferNotInUse { index: id.0 });
        }
        self.available.push_back(id);
        Ok(())
    }

    /// Storage behind an id handed out by this pool
    pub fn buffer(&self, id: ChildBufferId) -> &WordBuffer {
        &self.buffers[id.0]
    }

    /// Available and in-use sets are disjoint and together cover the pool
    pub fn is_consistent(&self) -> bool {
        let available: BTreeSet<ChildBufferId> = self.available.iter().copied().collect();
        available.len() == self.available.len()
            && available.is_disjoint(&self.in_use)
            && available.len() + self.in_use.len() == self.buffers.len()
            && self.in_use.iter().all(|id| id.0 < self.buffers.len())
    }

    pub fn stats(&self) -> ChildBufferStats {
        ChildBufferStats {
            capacity: self.buffers.len(),
            available: self.available.len(),
            acquires: self.acquires,
            exhausted: self.exhausted,
        }
    }
}
