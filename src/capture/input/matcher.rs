//! Press/release pairing
//!
//! One matcher per input channel (keys, mouse buttons). A press opens an
//! interval for its identifier, the matching release closes it and yields an
//! [`IntervalRecord`].

use crate::capture::input::types::IntervalRecord;
use crate::recorder::clock::SessionTime;
use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug)]
pub struct IntervalMatcher<K> {
    pending: HashMap<K, SessionTime>,
}

impl<K: Eq + Hash + Copy> Default for IntervalMatcher<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Copy> IntervalMatcher<K> {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }

    /// Record a press. A repeated press before the release (key auto-repeat)
    /// keeps the original press time.
    pub fn on_press(&mut self, id: K, at: SessionTime) {
        self.pending.entry(id).or_insert(at);
    }

    /// Close the interval for `id`. Releases with no pending press (e.g. the
    /// press happened before recording began) are discarded.
    pub fn on_release(&mut self, id: K, at: SessionTime) -> Option<IntervalRecord> {
        self.pending
            .remove(&id)
            .map(|start| IntervalRecord::between(start, at))
    }

    pub fn is_pending(&self, id: &K) -> bool {
        self.pending.contains_key(id)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drop every open interval without emitting records; returns how many
    /// were discarded.
    pub fn clear(&mut self) -> usize {
        let n = self.pending.len();
        self.pending.clear();
        n
    }
}
