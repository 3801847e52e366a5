//! Stand-ins for platforms without a capture backend
//!
//! Acquisition fails with `PlatformError`, so `begin_recording` reports the
//! platform instead of recording nothing.

use crate::capture::input::hook::InputHook;
use crate::capture::input::router::InputRouter;
use crate::capture::screen::cursor::{CursorSource, CursorState};
use crate::capture::screen::driver::ScreenSource;
use crate::recorder::channel::{CapturedFrame, RecordingError, RecordingResult};
use async_trait::async_trait;
use std::sync::Arc;

fn unsupported(what: &str) -> RecordingError {
    RecordingError::PlatformError(format!(
        "{} is not supported on {}",
        what,
        std::env::consts::OS
    ))
}

#[derive(Debug, Default)]
pub struct UnsupportedInputHook;

#[async_trait]
impl InputHook for UnsupportedInputHook {
    async fn install(&mut self, _router: Arc<InputRouter>) -> RecordingResult<()> {
        Err(RecordingError::HookInstall(unsupported("Input hooking").to_string()))
    }

    async fn release(&mut self) -> RecordingResult<()> {
        Ok(())
    }

    fn is_installed(&self) -> bool {
        false
    }
}

#[derive(Debug, Default)]
pub struct UnsupportedScreenSource;

impl ScreenSource for UnsupportedScreenSource {
    fn open(&mut self) -> RecordingResult<(u32, u32)> {
        Err(unsupported("Screen capture"))
    }

    fn grab(&mut self) -> RecordingResult<CapturedFrame> {
        Err(unsupported("Screen capture"))
    }
}

#[derive(Debug, Default)]
pub struct UnsupportedCursorSource;

impl CursorSource for UnsupportedCursorSource {
    fn read(&mut self) -> Option<CursorState> {
        None
    }
}
