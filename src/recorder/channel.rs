//! Recording channel trait
//!
//! Defines the interface for the capture sources of a session (display, input)
//! and the error type shared by every recording operation.

use crate::recorder::buffer::SessionBuffers;
use crate::recorder::clock::SessionClock;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during recording
#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Already recording")]
    AlreadyRecording,

    #[error("Not recording")]
    NotRecording,

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("Failed to install input hook: {0}")]
    HookInstall(String),

    #[error("Capture error: {0}")]
    CaptureError(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Platform error: {0}")]
    PlatformError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Unknown record category: {0}")]
    UnknownCategory(String),

    #[error("Sync error: {0}")]
    SyncError(String),
}

/// Result type for recording operations
pub type RecordingResult<T> = Result<T, RecordingError>;

/// Frame data from a capture source
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Raw pixel data (BGRA format, top-down rows)
    pub data: Vec<u8>,

    /// Frame width in pixels
    pub width: u32,

    /// Frame height in pixels
    pub height: u32,

    /// Bytes per row (may include padding)
    pub bytes_per_row: u32,

    /// Capture time on the OS tick clock, in milliseconds
    pub capture_ms: u64,
}

impl CapturedFrame {
    /// Allocate a black frame of the given size
    pub fn blank(width: u32, height: u32, capture_ms: u64) -> Self {
        Self {
            data: vec![0; (width * height * 4) as usize],
            width,
            height,
            bytes_per_row: width * 4,
            capture_ms,
        }
    }

    /// Pixel bytes without row padding
    pub fn packed(&self) -> std::borrow::Cow<'_, [u8]> {
        let row = (self.width * 4) as usize;
        if self.bytes_per_row as usize == row {
            let end = (row * self.height as usize).min(self.data.len());
            return std::borrow::Cow::Borrowed(&self.data[..end]);
        }
        let mut out = Vec::with_capacity(row * self.height as usize);
        for chunk in self.data.chunks(self.bytes_per_row as usize) {
            out.extend_from_slice(&chunk[..row.min(chunk.len())]);
        }
        std::borrow::Cow::Owned(out)
    }
}

/// Everything a channel needs from the session it records into
#[derive(Clone)]
pub struct SessionContext {
    /// Session epoch and rebasing
    pub clock: SessionClock,

    /// Buffers shared with the drain side
    pub buffers: Arc<SessionBuffers>,

    /// Session folder (`<root>/<session name>`)
    pub output_dir: PathBuf,

    /// Lowered once at session end, before the grace interval
    pub is_recording: Arc<AtomicBool>,
}

/// Trait for recording channels
///
/// Each channel represents a capture source (display or input).
/// Channels are managed by the `ActivityRecorder`, which stops them in
/// registration order and releases their OS resources only after the final
/// drain.
#[async_trait]
pub trait RecordingChannel: Send {
    /// Get the channel identifier (e.g., "display", "input")
    fn id(&self) -> &str;

    /// Get the channel type
    fn channel_type(&self) -> ChannelType;

    /// Acquire OS resources and start producing records.
    ///
    /// A failure here is an acquisition fault: the session must not begin.
    async fn start(&mut self, ctx: &SessionContext) -> RecordingResult<()>;

    /// Stop producing. For display capture this blocks until no further
    /// frames will arrive.
    async fn stop(&mut self) -> RecordingResult<()>;

    /// Release OS-level handles. Called after the final drain.
    async fn release(&mut self) -> RecordingResult<()>;

    /// Check if the channel is currently recording
    fn is_recording(&self) -> bool;

    /// Get output files created by this channel
    fn output_files(&self) -> Vec<String>;
}

/// Types of recording channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelType {
    /// Screen/display capture
    Display,
    /// Input tracking (mouse, keyboard)
    Input,
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelType::Display => write!(f, "display"),
            ChannelType::Input => write!(f, "input"),
        }
    }
}
