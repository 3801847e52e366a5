//! Input callback router
//!
//! Runs on the thread the OS delivers input notifications on. Every call must
//! finish quickly and must never fail outward: faults are counted, logged at
//! trace level and swallowed. Forwarding the original event to the next hook
//! is the platform layer's job and happens regardless of what happens here.

use crate::capture::input::matcher::IntervalMatcher;
use crate::capture::input::tracker::MoveDeltaTracker;
use crate::capture::input::types::{ButtonPhase, InputEventKind, MouseButton, RawInputEvent};
use crate::recorder::buffer::SessionBuffers;
use crate::recorder::clock::SessionClock;
use parking_lot::Mutex as ParkingMutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Why a single notification produced nothing
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteError {
    #[error("virtual key code {0} out of range")]
    MalformedKeyCode(u32),

    #[error("router panicked")]
    Panicked,
}

/// What a routed notification turned into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    /// A record was appended
    Recorded,
    /// A press opened (or was already holding) an interval
    Pending,
    /// A release without a matching press
    Unmatched,
    /// Not recording, or an event kind that is not tracked
    Ignored,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub recorded: u64,
    pub dropped: u64,
    pub suspect: u64,
}

pub struct InputRouter {
    clock: SessionClock,
    buffers: Arc<SessionBuffers>,
    is_recording: Arc<AtomicBool>,
    keys: ParkingMutex<IntervalMatcher<u32>>,
    buttons: ParkingMutex<IntervalMatcher<MouseButton>>,
    moves: ParkingMutex<MoveDeltaTracker>,
    recorded: AtomicU64,
    dropped: AtomicU64,
    suspect: AtomicU64,
}

impl InputRouter {
    pub fn new(
        clock: SessionClock,
        buffers: Arc<SessionBuffers>,
        is_recording: Arc<AtomicBool>,
    ) -> Self {
        Self {
            clock,
            buffers,
            is_recording,
            keys: ParkingMutex::new(IntervalMatcher::new()),
            buttons: ParkingMutex::new(IntervalMatcher::new()),
            moves: ParkingMutex::new(MoveDeltaTracker::new()),
            recorded: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            suspect: AtomicU64::new(0),
        }
    }

    /// Entry point for every raw notification. Never panics, never fails.
    pub fn handle(&self, event: RawInputEvent) -> Routed {
        let outcome = catch_unwind(AssertUnwindSafe(|| self.route(event)))
            .unwrap_or(Err(RouteError::Panicked));

        match outcome {
            Ok(routed) => routed,
            Err(e) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::trace!("Dropped input event {:?}: {}", event, e);
                Routed::Ignored
            }
        }
    }

    fn route(&self, event: RawInputEvent) -> Result<Routed, RouteError> {
        if !self.is_recording.load(Ordering::Acquire) {
            return Ok(Routed::Ignored);
        }

        let at = self.clock.rebase(event.time_ms);

        match event.kind {
            InputEventKind::Key { vk_code, phase } => {
                if !(1..=254).contains(&vk_code) {
                    return Err(RouteError::MalformedKeyCode(vk_code));
                }
                match phase {
                    ButtonPhase::Press => {
                        self.keys.lock().on_press(vk_code, at);
                        Ok(Routed::Pending)
                    }
                    ButtonPhase::Release => {
                        let released = self.keys.lock().on_release(vk_code, at);
                        Ok(match released {
                            Some(record) => {
                                self.count(record.suspect);
                                self.buffers.keypress.append(record);
                                Routed::Recorded
                            }
                            None => Routed::Unmatched,
                        })
                    }
                }
            }
            InputEventKind::Button { button, phase } => {
                match phase {
                    ButtonPhase::Press => {
                        self.buttons.lock().on_press(button, at);
                        Ok(Routed::Pending)
                    }
                    ButtonPhase::Release => {
                        let released = self.buttons.lock().on_release(button, at);
                        Ok(match released {
                            Some(record) => {
                                self.count(record.suspect);
                                self.buffers.mouse_click.append(record);
                                Routed::Recorded
                            }
                            None => Routed::Unmatched,
                        })
                    }
                }
            }
            InputEventKind::Move { x, y } => {
                let sample = self.moves.lock().observe(at, x, y);
                self.count(sample.suspect);
                self.buffers.mouse_move.append(sample);
                Ok(Routed::Recorded)
            }
            InputEventKind::Wheel => Ok(Routed::Ignored),
        }
    }

    fn count(&self, suspect: bool) {
        self.recorded.fetch_add(1, Ordering::Relaxed);
        if suspect {
            self.suspect.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Discard presses that were never released; returns how many.
    pub fn discard_pending(&self) -> usize {
        self.keys.lock().clear() + self.buttons.lock().clear()
    }

    pub fn pending_len(&self) -> usize {
        self.keys.lock().pending_len() + self.buttons.lock().pending_len()
    }

    pub fn stats(&self) -> RouterStats {
        RouterStats {
            recorded: self.recorded.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            suspect: self.suspect.load(Ordering::Relaxed),
        }
    }
}
