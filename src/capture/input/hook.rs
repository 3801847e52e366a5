//! Input hook seam
//!
//! The platform hook installs OS callbacks and hands every raw event to an
//! [`InputRouter`](crate::capture::input::router::InputRouter).

use crate::capture::input::router::InputRouter;
use crate::recorder::channel::RecordingResult;
use async_trait::async_trait;
use std::sync::Arc;

/// OS-level input interception
///
/// Implementations register keyboard and mouse notifications with the OS and
/// feed every one of them to the router, then pass the event on unmodified.
#[async_trait]
pub trait InputHook: Send {
    /// Register the hooks. Returns once they are live, or with
    /// `RecordingError::HookInstall` if the OS refused them.
    async fn install(&mut self, router: Arc<InputRouter>) -> RecordingResult<()>;

    /// Unregister the hooks. Safe to call when nothing is installed.
    async fn release(&mut self) -> RecordingResult<()>;

    fn is_installed(&self) -> bool;
}
