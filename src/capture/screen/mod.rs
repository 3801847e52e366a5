//! Screen capture
//!
//! A capture driver delivers frames on its own thread; the correlator stamps
//! them onto the session clock, draws the cursor and feeds the encoder.

pub mod channel;
pub mod correlator;
pub mod cursor;
pub mod driver;
pub mod encoder;
pub mod types;

pub use channel::{DisplayCaptureChannel, EncoderFactory};
pub use correlator::{FrameCorrelator, FrameStats};
pub use cursor::{composite, CursorIcon, CursorSource, CursorState, NoCursor, SharedCursor};
pub use driver::{CaptureDriver, FrameSink, PollingCaptureDriver, ScreenSource};
pub use encoder::{FfmpegEncoder, FrameEncoder};
pub use types::FrameRecord;
