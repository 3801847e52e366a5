//! Video encoding
//!
//! Frames are piped as raw BGRA into an FFmpeg child process. Raw video
//! carries no timestamps, so the encoder repeats or skips frames to keep the
//! constant-rate output aligned with each frame's video timestamp. Gaps longer
//! than [`MAX_GAP_MS`] (a suspended machine, a stalled driver) are cut from
//! the output instead of filled.

use crate::recorder::channel::{CapturedFrame, RecordingError, RecordingResult};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

/// Destination for composited frames
pub trait FrameEncoder: Send {
    /// Encode one frame positioned `video_ms` after the first frame.
    fn write_frame(&mut self, frame: &CapturedFrame, video_ms: u64) -> RecordingResult<()>;

    /// Push buffered data towards the output file.
    fn flush(&mut self) -> RecordingResult<()>;

    /// Close the stream and return the files written.
    fn finish(&mut self) -> RecordingResult<Vec<String>>;
}

/// Number of output frames that should exist once a frame at `video_ms` has
/// been written.
pub fn frames_due(video_ms: u64, fps: u32) -> u64 {
    video_ms * u64::from(fps) / 1000 + 1
}

/// Longest capture gap filled with repeated frames
pub const MAX_GAP_MS: u64 = 2_000;

/// Split the frames owed at a new input frame into frames to write and
/// output slots to cut. Owing more than `max_repeats` writes one frame and
/// cuts the rest of the gap from the timeline.
pub fn pace(due: u64, written: u64, max_repeats: u64) -> (u64, u64) {
    let owed = due.saturating_sub(written);
    if owed > max_repeats.max(1) {
        (1, owed - 1)
    } else {
        (owed, 0)
    }
}

/// FFmpeg encoder writing a single H.264 file
pub struct FfmpegEncoder {
    ffmpeg_path: String,
    output_path: PathBuf,
    fps: u32,
    process: Option<Child>,
    size: Option<(u32, u32)>,
    frames_written: u64,
    frames_skipped: u64,
    /// Output slots cut after long gaps; later frames shift back by this much
    slots_cut: u64,
}

impl FfmpegEncoder {
    /// Check FFmpeg is runnable. The process itself starts on the first frame,
    /// once the frame size is known.
    pub fn open(ffmpeg_path: &str, output_path: &Path, fps: u32) -> RecordingResult<Self> {
        if Command::new(ffmpeg_path).arg("-version").output().is_err() {
            return Err(RecordingError::ConfigurationError(format!(
                "FFmpeg not found at '{}'. Please install FFmpeg",
                ffmpeg_path
            )));
        }

        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        Ok(Self {
            ffmpeg_path: ffmpeg_path.to_string(),
            output_path: output_path.to_path_buf(),
            fps,
            process: None,
            size: None,
            frames_written: 0,
            frames_skipped: 0,
            slots_cut: 0,
        })
    }

    fn spawn(&mut self, width: u32, height: u32) -> RecordingResult<()> {
        // Input: raw BGRA frames from stdin
        // Output: H.264 in MP4, fragmented so an abrupt stop leaves a playable file
        let process = Command::new(&self.ffmpeg_path)
            .args([
                "-y",
                "-hide_banner",
                "-nostats",
                "-loglevel", "error",
                "-f", "rawvideo",
                "-pixel_format", "bgra",
                "-video_size", &format!("{width}x{height}"),
                "-framerate", &self.fps.to_string(),
                "-i", "-",
                "-c:v", "libx264",
                "-preset", "ultrafast",
                "-tune", "zerolatency",
                "-pix_fmt", "yuv420p",
                "-crf", "23",
                "-g", &(self.fps * 2).to_string(),
                "-movflags", "+frag_keyframe+empty_moov",
            ])
            .arg(&self.output_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RecordingError::EncodingError(format!("Failed to start FFmpeg: {}", e)))?;

        tracing::info!(
            "Started FFmpeg encoder: {}x{} @ {}fps, output {:?}",
            width,
            height,
            self.fps,
            self.output_path
        );

        self.process = Some(process);
        self.size = Some((width, height));
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl FrameEncoder for FfmpegEncoder {
    fn write_frame(&mut self, frame: &CapturedFrame, video_ms: u64) -> RecordingResult<()> {
        match self.size {
            None => self.spawn(frame.width, frame.height)?,
            Some(size) if size != (frame.width, frame.height) => {
                return Err(RecordingError::EncodingError(format!(
                    "frame size {}x{} differs from stream size {}x{}",
                    frame.width, frame.height, size.0, size.1
                )));
            }
            Some(_) => {}
        }

        let due = frames_due(video_ms, self.fps).saturating_sub(self.slots_cut);
        let max_repeats = MAX_GAP_MS * u64::from(self.fps) / 1000;
        let (repeats, cut) = pace(due, self.frames_written, max_repeats);
        if cut > 0 {
            self.slots_cut += cut;
            tracing::warn!(
                "Capture gap of {} frames at {}ms cut from the video",
                cut,
                video_ms
            );
        }
        if repeats == 0 {
            self.frames_skipped += 1;
            return Ok(());
        }

        let data = frame.packed();
        let stdin = self
            .process
            .as_mut()
            .and_then(|p| p.stdin.as_mut())
            .ok_or_else(|| RecordingError::EncodingError("encoder is closed".to_string()))?;

        for _ in 0..repeats {
            stdin.write_all(&data)?;
            self.frames_written += 1;
        }
        Ok(())
    }

    fn flush(&mut self) -> RecordingResult<()> {
        if let Some(stdin) = self.process.as_mut().and_then(|p| p.stdin.as_mut()) {
            stdin.flush()?;
        }
        Ok(())
    }

    fn finish(&mut self) -> RecordingResult<Vec<String>> {
        let Some(mut process) = self.process.take() else {
            return Ok(Vec::new());
        };

        // Close stdin to signal EOF
        drop(process.stdin.take());
        let output = process.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!("FFmpeg exited with status {}: {}", output.status, stderr);
        }

        tracing::info!(
            "FFmpeg finished: {} frames written, {} skipped, {} slots cut",
            self.frames_written,
            self.frames_skipped,
            self.slots_cut
        );

        Ok(vec![self.output_path.to_string_lossy().to_string()])
    }
}
