//! Frame metadata rows

use crate::storage::CsvRecord;
use serde::{Deserialize, Serialize};

/// Timing metadata for one encoded frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameRecord {
    /// Milliseconds since the session epoch
    pub session_timestamp_ms: u64,
    /// Milliseconds since the first frame of the session
    pub video_timestamp_ms: u64,
    /// Capture stamp predated the session epoch
    pub suspect: bool,
}

impl CsvRecord for FrameRecord {
    fn csv_fields(&self) -> Vec<String> {
        vec![
            self.session_timestamp_ms.to_string(),
            self.video_timestamp_ms.to_string(),
            u8::from(self.suspect).to_string(),
        ]
    }
}
