//! Recording coordination
//!
//! The [`ActivityRecorder`] owns the session lifecycle: it prepares the
//! session folder, starts the capture channels on a shared clock and, at the
//! end, drains the buffers to disk before releasing OS resources.

pub mod buffer;
pub mod channel;
pub mod clock;
pub mod coordinator;
pub mod state;

pub use buffer::{DrainedRecords, RecordBuffer, SessionBuffers};
pub use channel::{
    CapturedFrame, ChannelType, RecordingChannel, RecordingError, RecordingResult,
    SessionContext,
};
pub use clock::{SessionClock, SessionTime, SystemTicks, TickSource};
pub use coordinator::ActivityRecorder;
pub use state::RecordingState;
