//! Priority set of stale computations.
//!
//! A small binary min-heap keyed through [`PqItem::pq_before`].  The engine
//! keys entries by start timestamp, so draining the set replays stale nodes
//! in the order they were first executed.  Duplicate suppression is by node
//! identity ([`PqItem::pq_id`]): inserting an entry whose identity is
//! already present is a no-op.
//!
//! Popping an empty set is not an error: it returns `None`, which the
//! propagation loop treats as "queue drained".

use std::fmt::{self, Debug, Formatter};

pub trait PqItem {
    /// Strict heap order: does `self` come before `other`?
    fn pq_before(&self, other: &Self) -> bool;
    /// Stable identity used for duplicate suppression and removal.
    fn pq_id(&self) -> u64;
}

pub struct PrioritySet<T: PqItem> {
    heap: Vec<T>,
}

impl<T: PqItem> PrioritySet<T> {
    pub fn new() -> Self {
        PrioritySet { heap: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Insert `x`; returns false (and drops `x`) if an entry with the same
    /// identity is already present.
    pub fn add(&mut self, x: T) -> bool {
        if self.heap.iter().any(|y| y.pq_id() == x.pq_id()) {
            return false;
        }
        self.heap.push(x);
        self.sift_up(self.heap.len() - 1);
        true
    }

    /// Remove the entry with identity `id`, if present.
    pub fn remove(&mut self, id: u64) -> bool {
        match self.heap.iter().position(|y| y.pq_id() == id) {
            None => false,
            Some(i) => {
                let last = self.heap.len() - 1;
                self.heap.swap(i, last);
                self.heap.pop();
                if i < self.heap.len() {
                    self.sift_down(i);
                    self.sift_up(i);
                }
                true
            }
        }
    }

    /// The minimal entry, without removing it.
    pub fn top(&self) -> Option<&T> {
        self.heap.first()
    }

    /// Remove and return the minimal entry; `None` when empty.
    pub fn pop(&mut self) -> Option<T> {
        if self.heap.is_empty() {
            return None;
        }
        let last = self.heap.len() - 1;
        self.heap.swap(0, last);
        let min = self.heap.pop();
        if !self.heap.is_empty() {
            self.sift_down(0);
        }
        min
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.heap[i].pq_before(&self.heap[parent]) {
                self.heap.swap(i, parent);
                i = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        loop {
            let l = 2 * i + 1;
            let r = 2 * i + 2;
            let mut least = i;
            if l < self.heap.len() && self.heap[l].pq_before(&self.heap[least]) {
                least = l;
            }
            if r < self.heap.len() && self.heap[r].pq_before(&self.heap[least]) {
                least = r;
            }
            if least == i {
                break;
            }
            self.heap.swap(i, least);
            i = least;
        }
    }
}

impl<T: PqItem> Default for PrioritySet<T> {
    fn default() -> Self {
        PrioritySet::new()
    }
}

impl<T: PqItem> Debug for PrioritySet<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "PrioritySet(len={})", self.heap.len())
    }
}
