//! Frame correlation
//!
//! Runs on the capture driver's delivery thread. Each frame gets a video
//! timestamp (relative to the first frame) and a session timestamp (relative
//! to the session epoch), the cursor overlay, and is handed to the encoder.
//! Per-frame failures are logged and never stop the stream.

use crate::capture::screen::cursor::{composite, CursorSource};
use crate::capture::screen::driver::FrameSink;
use crate::capture::screen::encoder::FrameEncoder;
use crate::capture::screen::types::FrameRecord;
use crate::recorder::buffer::SessionBuffers;
use crate::recorder::channel::CapturedFrame;
use crate::recorder::clock::SessionClock;
use parking_lot::Mutex as ParkingMutex;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub delivered: u64,
    pub recorded: u64,
    pub dropped: u64,
    pub encode_failures: u64,
    pub overlays: u64,
}

pub struct FrameCorrelator {
    clock: SessionClock,
    buffers: Arc<SessionBuffers>,
    encoder: Box<dyn FrameEncoder>,
    cursor: Box<dyn CursorSource>,
    flush_every: u64,
    video_epoch_ms: Option<u64>,
    last_capture_ms: Option<u64>,
    stats: FrameStats,
    output_files: Arc<ParkingMutex<Vec<String>>>,
}

impl FrameCorrelator {
    pub fn new(
        clock: SessionClock,
        buffers: Arc<SessionBuffers>,
        encoder: Box<dyn FrameEncoder>,
        cursor: Box<dyn CursorSource>,
        flush_every: u64,
        output_files: Arc<ParkingMutex<Vec<String>>>,
    ) -> Self {
        Self {
            clock,
            buffers,
            encoder,
            cursor,
            flush_every: flush_every.max(1),
            video_epoch_ms: None,
            last_capture_ms: None,
            stats: FrameStats::default(),
            output_files,
        }
    }

    /// Compute the timing record for a frame captured at `capture_ms`.
    ///
    /// Returns `None` when the capture time does not move strictly forward;
    /// such frames are dropped so both timelines stay strictly increasing.
    /// Nothing is committed until [`commit`](Self::commit) is called for a
    /// frame the encoder accepted.
    pub fn correlate(&self, capture_ms: u64) -> Option<FrameRecord> {
        if self.last_capture_ms.is_some_and(|last| capture_ms <= last) {
            return None;
        }

        let video_epoch = self.video_epoch_ms.unwrap_or(capture_ms);
        let session = self.clock.rebase(capture_ms);

        Some(FrameRecord {
            session_timestamp_ms: session.ms,
            video_timestamp_ms: capture_ms - video_epoch,
            suspect: session.suspect,
        })
    }

    /// Record `capture_ms` as the latest encoded frame. The first commit
    /// fixes the video epoch.
    pub fn commit(&mut self, capture_ms: u64) {
        self.video_epoch_ms.get_or_insert(capture_ms);
        self.last_capture_ms = Some(capture_ms);
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }
}

impl FrameSink for FrameCorrelator {
    fn on_frame(&mut self, mut frame: CapturedFrame) {
        self.stats.delivered += 1;

        let Some(record) = self.correlate(frame.capture_ms) else {
            self.stats.dropped += 1;
            tracing::debug!(
                "Dropped frame with non-increasing capture time {}",
                frame.capture_ms
            );
            return;
        };

        if let Some(cursor) = self.cursor.read() {
            if composite(&mut frame, &cursor) {
                self.stats.overlays += 1;
            }
        }

        if let Err(e) = self.encoder.write_frame(&frame, record.video_timestamp_ms) {
            self.stats.encode_failures += 1;
            tracing::warn!("Frame failed at {}ms: {}", record.video_timestamp_ms, e);
            return;
        }

        self.commit(frame.capture_ms);
        self.buffers.frames.append(record);
        self.stats.recorded += 1;

        if self.stats.recorded % self.flush_every == 0 {
            if let Err(e) = self.encoder.flush() {
                tracing::warn!("Encoder flush failed: {}", e);
            }
            tracing::debug!(
                "Captured {} frames ({:.1}s)",
                self.stats.recorded,
                record.video_timestamp_ms as f64 / 1000.0
            );
        }
    }

    fn finish(&mut self) {
        match self.encoder.finish() {
            Ok(files) => self.output_files.lock().extend(files),
            Err(e) => tracing::warn!("Failed to finish encoding: {}", e),
        }

        tracing::info!(
            "Frame correlation finished (delivered={}, recorded={}, dropped={}, encode_failures={}, overlays={})",
            self.stats.delivered,
            self.stats.recorded,
            self.stats.dropped,
            self.stats.encode_failures,
            self.stats.overlays
        );
    }
}
