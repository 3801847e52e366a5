//! Pointer move spacing

use crate::capture::input::types::MoveSample;
use crate::recorder::clock::SessionTime;

/// Elapsed time between consecutive pointer moves
#[derive(Debug, Default)]
pub struct MoveDeltaTracker {
    last: Option<u64>,
}

impl MoveDeltaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce the sample for a move at `at`. The first move of a session has
    /// no predecessor and carries `None` as its delta.
    pub fn observe(&mut self, at: SessionTime, x: i32, y: i32) -> MoveSample {
        let (delta, out_of_order) = match self.last {
            Some(last) => (Some(at.ms.saturating_sub(last)), at.ms < last),
            None => (None, false),
        };
        self.last = Some(at.ms);

        MoveSample {
            timestamp_ms: at.ms,
            x,
            y,
            delta_since_previous_ms: delta,
            suspect: at.suspect || out_of_order,
        }
    }
}
