//! Windows capture implementations
//!
//! Low-level keyboard/mouse hooks for input, GDI for screen and cursor.

pub mod input;
pub mod screen;

pub use input::WindowsInputHook;
pub use screen::{GdiScreenSource, WindowsCursorSource};
