//! Input tracking channel

use crate::capture::input::hook::InputHook;
use crate::capture::input::router::InputRouter;
use crate::recorder::channel::{
    ChannelType, RecordingChannel, RecordingError, RecordingResult, SessionContext,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Keyboard and mouse tracking channel
///
/// Installs the platform hook at start. The hook stays installed past
/// `stop` so that events racing the recording flag still reach the
/// router; it is removed in `release`, after the final drain.
pub struct InputTrackingChannel {
    id: String,
    is_recording: Arc<AtomicBool>,
    hook: Box<dyn InputHook>,
    router: Option<Arc<InputRouter>>,
}

impl InputTrackingChannel {
    pub fn new(hook: Box<dyn InputHook>) -> Self {
        Self {
            id: "input".to_string(),
            is_recording: Arc::new(AtomicBool::new(false)),
            hook,
            router: None,
        }
    }
}

#[async_trait]
impl RecordingChannel for InputTrackingChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn channel_type(&self) -> ChannelType {
        ChannelType::Input
    }

    async fn start(&mut self, ctx: &SessionContext) -> RecordingResult<()> {
        if self.is_recording.load(Ordering::SeqCst) {
            return Err(RecordingError::AlreadyRecording);
        }

        let router = Arc::new(InputRouter::new(
            ctx.clock,
            ctx.buffers.clone(),
            ctx.is_recording.clone(),
        ));

        self.hook.install(router.clone()).await.map_err(|e| match e {
            RecordingError::HookInstall(_) => e,
            other => RecordingError::HookInstall(other.to_string()),
        })?;

        self.router = Some(router);
        self.is_recording.store(true, Ordering::SeqCst);

        tracing::info!("Input tracking started (epoch={}ms)", ctx.clock.epoch_ms());
        Ok(())
    }

    async fn stop(&mut self) -> RecordingResult<()> {
        if !self.is_recording.load(Ordering::SeqCst) {
            return Ok(());
        }

        // The session flag gates the router; the hook keeps forwarding.
        self.is_recording.store(false, Ordering::SeqCst);
        tracing::info!("Input tracking stopped");
        Ok(())
    }

    async fn release(&mut self) -> RecordingResult<()> {
        if let Some(router) = self.router.take() {
            let discarded = router.discard_pending();
            if discarded > 0 {
                tracing::debug!("Discarded {} unreleased presses", discarded);
            }

            let stats = router.stats();
            tracing::info!(
                "Input tracking summary (recorded={}, dropped={}, suspect={})",
                stats.recorded,
                stats.dropped,
                stats.suspect
            );
        }

        self.hook.release().await
    }

    fn is_recording(&self) -> bool {
        self.is_recording.load(Ordering::SeqCst)
    }

    fn output_files(&self) -> Vec<String> {
        // Input records are persisted by the session writer.
        Vec::new()
    }
}
