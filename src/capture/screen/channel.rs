//! Display capture channel
//!
//! Each start builds a fresh correlator and encoder for the session folder;
//! the driver and cursor source carry over between sessions.

use crate::capture::screen::correlator::FrameCorrelator;
use crate::capture::screen::cursor::{CursorSource, SharedCursor};
use crate::capture::screen::driver::CaptureDriver;
use crate::capture::screen::encoder::FrameEncoder;
use crate::recorder::channel::{
    ChannelType, RecordingChannel, RecordingError, RecordingResult, SessionContext,
};
use async_trait::async_trait;
use parking_lot::Mutex as ParkingMutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Builds the encoder for a session folder
pub type EncoderFactory =
    Box<dyn Fn(&Path) -> RecordingResult<Box<dyn FrameEncoder>> + Send + Sync>;

/// Owns the capture driver. Frames flow driver → [`FrameCorrelator`] →
/// encoder, with frame timing records appended to the session buffers.
pub struct DisplayCaptureChannel {
    /// Channel identifier
    id: String,

    /// Whether currently recording
    is_recording: Arc<AtomicBool>,

    /// Output files created
    output_files: Arc<ParkingMutex<Vec<String>>>,

    driver: Box<dyn CaptureDriver>,

    encoder_factory: EncoderFactory,

    /// Shared with the correlator of the running session
    cursor: SharedCursor,

    /// Encoder flush cadence, in recorded frames
    flush_every: u64,
}

impl DisplayCaptureChannel {
    pub fn new(
        driver: Box<dyn CaptureDriver>,
        encoder_factory: EncoderFactory,
        cursor: Box<dyn CursorSource>,
        flush_every: u64,
    ) -> Self {
        Self {
            id: "display".to_string(),
            is_recording: Arc::new(AtomicBool::new(false)),
            output_files: Arc::new(ParkingMutex::new(Vec::new())),
            driver,
            encoder_factory,
            cursor: SharedCursor::new(cursor),
            flush_every,
        }
    }
}

#[async_trait]
impl RecordingChannel for DisplayCaptureChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn channel_type(&self) -> ChannelType {
        ChannelType::Display
    }

    async fn start(&mut self, ctx: &SessionContext) -> RecordingResult<()> {
        if self.is_recording.load(Ordering::SeqCst) {
            return Err(RecordingError::AlreadyRecording);
        }

        let encoder = (self.encoder_factory)(&ctx.output_dir)?;
        self.output_files.lock().clear();

        let correlator = FrameCorrelator::new(
            ctx.clock,
            ctx.buffers.clone(),
            encoder,
            Box::new(self.cursor.clone()),
            self.flush_every,
            self.output_files.clone(),
        );

        self.driver.start(Box::new(correlator)).await?;
        self.is_recording.store(true, Ordering::SeqCst);

        tracing::info!("Display capture started (flush every {} frames)", self.flush_every);
        Ok(())
    }

    async fn stop(&mut self) -> RecordingResult<()> {
        if !self.is_recording.load(Ordering::SeqCst) {
            return Err(RecordingError::NotRecording);
        }

        // Blocks until the delivery thread has finished the encoder.
        self.driver.stop().await?;
        self.is_recording.store(false, Ordering::SeqCst);

        tracing::info!("Display capture stopped");
        Ok(())
    }

    async fn release(&mut self) -> RecordingResult<()> {
        // The driver releases its screen handles when its thread exits.
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.is_recording.load(Ordering::SeqCst)
    }

    fn output_files(&self) -> Vec<String> {
        self.output_files.lock().clone()
    }
}
