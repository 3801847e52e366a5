//! Activity Recorder - keystrokes, mouse and screen on one session clock.
//!
//! Records a bounded desktop session: keyboard and mouse intervals from
//! low-level OS hooks, pointer moves, and screen frames with their video
//! timestamps. Every record is rebased onto the session epoch and written to
//! per-category CSV files when the session ends.

pub mod capture;
pub mod config;
pub mod recorder;
pub mod storage;
pub mod sync;

pub use config::{RecorderConfig, SyncConfig};
pub use recorder::{ActivityRecorder, RecordingError, RecordingResult, RecordingState};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the default filter. Calling this twice is harmless.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "activity_recorder_lib=debug,activity_recorder=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
