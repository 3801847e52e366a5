//! Input tracking (keyboard, mouse) capture
//!
//! Raw OS notifications enter through the [`InputRouter`], which pairs
//! presses with releases and times pointer moves before appending records to
//! the session buffers.

pub mod channel;
pub mod hook;
pub mod matcher;
pub mod router;
pub mod tracker;
pub mod types;

pub use channel::InputTrackingChannel;
pub use hook::InputHook;
pub use matcher::IntervalMatcher;
pub use router::{InputRouter, Routed, RouterStats};
pub use tracker::MoveDeltaTracker;
pub use types::{
    ButtonPhase, InputEventKind, IntervalRecord, MouseButton, MoveSample, RawInputEvent,
};
