//! Recorder configuration
//!
//! Loaded from a JSON file (camelCase keys). Every field has a default, so
//! an empty object is a valid configuration.

use crate::recorder::channel::{RecordingError, RecordingResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderConfig {
    /// Wait between lowering the recording flag and the final drain
    pub grace_interval_ms: u64,

    /// Screen grab cadence
    pub frame_interval_ms: u64,

    /// Output video frame rate
    pub video_fps: u32,

    /// Encoder flush cadence, in recorded frames
    pub flush_every_frames: u64,

    /// ffmpeg binary, resolved through PATH when not absolute
    pub ffmpeg_path: String,

    /// Video file name inside the session folder
    pub video_file_name: String,

    /// Drain buffers to disk at this interval while recording
    pub periodic_flush_ms: Option<u64>,

    /// User the session is attributed to in the remote store
    pub username: Option<String>,

    pub sync: Option<SyncConfig>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            grace_interval_ms: 200,
            frame_interval_ms: 33,
            video_fps: 30,
            flush_every_frames: 120,
            ffmpeg_path: "ffmpeg".to_string(),
            video_file_name: "screenCaptureVideo.mp4".to_string(),
            periodic_flush_ms: None,
            username: None,
            sync: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    /// Base URL of the remote store
    pub endpoint: String,

    #[serde(default = "default_sync_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_sync_timeout_ms() -> u64 {
    10_000
}

impl RecorderConfig {
    /// Read and validate a JSON configuration file
    pub fn load(path: &Path) -> RecordingResult<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data).map_err(|e| {
            RecordingError::ConfigurationError(format!("{}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> RecordingResult<()> {
        if self.frame_interval_ms == 0 {
            return Err(RecordingError::ConfigurationError(
                "frameIntervalMs must be positive".to_string(),
            ));
        }
        if self.video_fps == 0 {
            return Err(RecordingError::ConfigurationError(
                "videoFps must be positive".to_string(),
            ));
        }
        if self.flush_every_frames == 0 {
            return Err(RecordingError::ConfigurationError(
                "flushEveryFrames must be positive".to_string(),
            ));
        }
        if self.periodic_flush_ms == Some(0) {
            return Err(RecordingError::ConfigurationError(
                "periodicFlushMs must be positive when set".to_string(),
            ));
        }
        if self.video_file_name.is_empty() {
            return Err(RecordingError::ConfigurationError(
                "videoFileName must not be empty".to_string(),
            ));
        }
        if let Some(sync) = &self.sync {
            if sync.endpoint.is_empty() {
                return Err(RecordingError::ConfigurationError(
                    "sync.endpoint must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn grace_interval(&self) -> Duration {
        Duration::from_millis(self.grace_interval_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}
