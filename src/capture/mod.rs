//! Platform-specific capture implementations
//!
//! The portable halves (routing, correlation, encoding) live in `input` and
//! `screen`; the OS bindings behind them are picked here.

pub mod input;
pub mod screen;

#[cfg(target_os = "windows")]
pub mod windows;

#[cfg(not(target_os = "windows"))]
pub mod unsupported;

pub use input::{InputHook, InputRouter, InputTrackingChannel};
pub use screen::{
    CaptureDriver, CursorSource, DisplayCaptureChannel, FfmpegEncoder, FrameEncoder,
    PollingCaptureDriver, ScreenSource,
};

/// Input hook for the current platform
pub fn default_input_hook() -> Box<dyn InputHook> {
    #[cfg(target_os = "windows")]
    {
        Box::new(windows::WindowsInputHook::new())
    }

    #[cfg(not(target_os = "windows"))]
    {
        Box::new(unsupported::UnsupportedInputHook)
    }
}

/// Screen source for the current platform
pub fn default_screen_source() -> Box<dyn ScreenSource> {
    #[cfg(target_os = "windows")]
    {
        Box::new(windows::GdiScreenSource::new())
    }

    #[cfg(not(target_os = "windows"))]
    {
        Box::new(unsupported::UnsupportedScreenSource)
    }
}

/// Cursor source for the current platform
pub fn default_cursor_source() -> Box<dyn CursorSource> {
    #[cfg(target_os = "windows")]
    {
        Box::new(windows::WindowsCursorSource::new())
    }

    #[cfg(not(target_os = "windows"))]
    {
        Box::new(unsupported::UnsupportedCursorSource)
    }
}
