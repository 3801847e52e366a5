//! Record buffers
//!
//! One append-only sequence per record category. Producers (the input hook
//! thread, the frame delivery thread) append; the session drains. Each
//! category has its own lock so keyboard, mouse and frame producers never
//! contend with one another.

use crate::capture::input::types::{IntervalRecord, MoveSample};
use crate::capture::screen::types::FrameRecord;
use parking_lot::Mutex as ParkingMutex;

/// Append-only, concurrency-safe record sequence
#[derive(Debug)]
pub struct RecordBuffer<T> {
    records: ParkingMutex<Vec<T>>,
}

impl<T> Default for RecordBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RecordBuffer<T> {
    pub fn new() -> Self {
        Self {
            records: ParkingMutex::new(Vec::new()),
        }
    }

    pub fn append(&self, record: T) {
        self.records.lock().push(record);
    }

    /// Atomically take the current contents, leaving the buffer empty.
    ///
    /// Appends that race with a drain land either in this snapshot or in the
    /// next one, never both and never neither.
    pub fn drain(&self) -> Vec<T> {
        std::mem::take(&mut *self.records.lock())
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

/// The built-in categories of one session
#[derive(Debug, Default)]
pub struct SessionBuffers {
    pub keypress: RecordBuffer<IntervalRecord>,
    pub mouse_click: RecordBuffer<IntervalRecord>,
    pub mouse_move: RecordBuffer<MoveSample>,
    pub frames: RecordBuffer<FrameRecord>,
}

impl SessionBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain every category at once
    pub fn drain_all(&self) -> DrainedRecords {
        DrainedRecords {
            keypress: self.keypress.drain(),
            mouse_click: self.mouse_click.drain(),
            mouse_move: self.mouse_move.drain(),
            frames: self.frames.drain(),
        }
    }
}

/// Snapshot of all categories taken by [`SessionBuffers::drain_all`]
#[derive(Debug, Default)]
pub struct DrainedRecords {
    pub keypress: Vec<IntervalRecord>,
    pub mouse_click: Vec<IntervalRecord>,
    pub mouse_move: Vec<MoveSample>,
    pub frames: Vec<FrameRecord>,
}

impl DrainedRecords {
    pub fn total(&self) -> usize {
        self.keypress.len() + self.mouse_click.len() + self.mouse_move.len() + self.frames.len()
    }
}
