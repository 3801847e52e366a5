//! Recorder lifecycle states

use serde::{Deserialize, Serialize};

/// Lifecycle of a recorder
///
/// `Idle → Prepared` on `create_session`, `Prepared → Recording` on
/// `begin_recording`, `Recording → Ended` on `end_session`. An ended
/// recorder can prepare a new session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordingState {
    #[default]
    Idle,
    Prepared,
    Recording,
    Ended,
}

impl RecordingState {
    pub fn can_prepare(self) -> bool {
        matches!(self, RecordingState::Idle | RecordingState::Ended)
    }
}

impl std::fmt::Display for RecordingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RecordingState::Idle => "idle",
            RecordingState::Prepared => "prepared",
            RecordingState::Recording => "recording",
            RecordingState::Ended => "ended",
        };
        f.write_str(name)
    }
}
