//! Screen capture driver
//!
//! Grabs the screen at a fixed cadence on its own thread and pushes each
//! frame, stamped on the OS tick clock, into a [`FrameSink`].

use crate::recorder::channel::{CapturedFrame, RecordingError, RecordingResult};
use crate::recorder::clock::TickSource;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Receives frames on the driver's delivery thread
pub trait FrameSink: Send {
    fn on_frame(&mut self, frame: CapturedFrame);

    /// Called once on the delivery thread after the last frame.
    fn finish(&mut self);
}

/// Something that can grab the whole screen
pub trait ScreenSource: Send {
    /// Acquire the OS resources for grabbing; returns the frame size.
    fn open(&mut self) -> RecordingResult<(u32, u32)>;

    /// Grab one frame. `capture_ms` is filled in by the driver.
    fn grab(&mut self) -> RecordingResult<CapturedFrame>;

    /// Release what `open` acquired. The source may be opened again later.
    fn close(&mut self) {}
}

#[async_trait]
pub trait CaptureDriver: Send {
    /// Open the screen source and start delivering frames into `sink`.
    /// Fails if the source cannot be opened.
    async fn start(&mut self, sink: Box<dyn FrameSink>) -> RecordingResult<()>;

    /// Stop delivery. Returns once no further frames will reach the sink.
    async fn stop(&mut self) -> RecordingResult<()>;

    fn is_running(&self) -> bool;
}

/// Driver polling a [`ScreenSource`] on a dedicated thread
pub struct PollingCaptureDriver {
    source: Option<Box<dyn ScreenSource>>,
    ticks: Arc<dyn TickSource>,
    interval: Duration,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<Box<dyn ScreenSource>>>,
}

impl PollingCaptureDriver {
    pub fn new(source: Box<dyn ScreenSource>, ticks: Arc<dyn TickSource>, interval: Duration) -> Self {
        Self {
            source: Some(source),
            ticks,
            interval,
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }
}

#[async_trait]
impl CaptureDriver for PollingCaptureDriver {
    async fn start(&mut self, mut sink: Box<dyn FrameSink>) -> RecordingResult<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(RecordingError::AlreadyRecording);
        }
        let mut source = self.source.take().ok_or_else(|| {
            RecordingError::CaptureError("Screen source is in use".to_string())
        })?;

        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
        let running = self.running.clone();
        let ticks = self.ticks.clone();
        let interval = self.interval;
        running.store(true, Ordering::SeqCst);

        let handle = std::thread::Builder::new()
            .name("screen-capture".to_string())
            .spawn(move || {
                // The source is opened on the thread that will use it.
                match source.open() {
                    Ok(size) => {
                        let _ = ready_tx.send(Ok(size));
                    }
                    Err(e) => {
                        source.close();
                        running.store(false, Ordering::SeqCst);
                        let _ = ready_tx.send(Err(e));
                        return source;
                    }
                }

                tracing::info!("Screen capture thread started (interval={:?})", interval);

                let mut failures: u64 = 0;
                while running.load(Ordering::Relaxed) {
                    let loop_start = Instant::now();
                    let capture_ms = ticks.now_ms();

                    match source.grab() {
                        Ok(mut frame) => {
                            frame.capture_ms = capture_ms;
                            sink.on_frame(frame);
                        }
                        Err(e) => {
                            failures += 1;
                            if failures == 1 || failures % 100 == 0 {
                                tracing::warn!("Screen grab failed ({} so far): {}", failures, e);
                            }
                        }
                    }

                    let elapsed = loop_start.elapsed();
                    if elapsed < interval {
                        std::thread::sleep(interval - elapsed);
                    }
                }

                source.close();
                sink.finish();
                tracing::info!("Screen capture thread stopped");
                source
            });

        // The source moved into the closure; a failed spawn loses it.
        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        };

        let opened = ready_rx.await.unwrap_or_else(|_| {
            Err(RecordingError::CaptureError(
                "Screen capture thread exited during startup".to_string(),
            ))
        });

        match opened {
            Ok((width, height)) => {
                self.thread = Some(handle);
                tracing::info!("Screen capture started ({}x{})", width, height);
                Ok(())
            }
            Err(e) => {
                // The thread hands the source back so a later start can retry.
                if let Ok(source) = handle.join() {
                    self.source = Some(source);
                }
                Err(e)
            }
        }
    }

    async fn stop(&mut self) -> RecordingResult<()> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let source = tokio::task::spawn_blocking(move || handle.join())
                .await
                .map_err(|e| RecordingError::CaptureError(format!("Failed to join capture thread: {}", e)))?
                .map_err(|_| RecordingError::CaptureError("Capture thread panicked".to_string()))?;
            self.source = Some(source);
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::clock::SystemTicks;
    use parking_lot::Mutex as ParkingMutex;
    use std::sync::atomic::AtomicU32;

    struct TestSource {
        /// Number of `open` calls that fail before one succeeds
        failing_opens: u32,
        closes: Arc<AtomicU32>,
    }

    impl TestSource {
        fn new(failing_opens: u32) -> (Self, Arc<AtomicU32>) {
            let closes = Arc::new(AtomicU32::new(0));
            let source = Self {
                failing_opens,
                closes: closes.clone(),
            };
            (source, closes)
        }
    }

    impl ScreenSource for TestSource {
        fn open(&mut self) -> RecordingResult<(u32, u32)> {
            if self.failing_opens > 0 {
                self.failing_opens -= 1;
                Err(RecordingError::CaptureError("no display".to_string()))
            } else {
                Ok((2, 2))
            }
        }

        fn grab(&mut self) -> RecordingResult<CapturedFrame> {
            Ok(CapturedFrame::blank(2, 2, 0))
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct CountingSink {
        frames: Arc<ParkingMutex<Vec<u64>>>,
        finished: Arc<AtomicBool>,
    }

    impl FrameSink for CountingSink {
        fn on_frame(&mut self, frame: CapturedFrame) {
            self.frames.lock().push(frame.capture_ms);
        }

        fn finish(&mut self) {
            self.finished.store(true, Ordering::SeqCst);
        }
    }

    fn counting_sink() -> (Box<dyn FrameSink>, Arc<ParkingMutex<Vec<u64>>>, Arc<AtomicBool>) {
        let frames = Arc::new(ParkingMutex::new(Vec::new()));
        let finished = Arc::new(AtomicBool::new(false));
        let sink = CountingSink {
            frames: frames.clone(),
            finished: finished.clone(),
        };
        (Box::new(sink), frames, finished)
    }

    fn driver(source: TestSource) -> PollingCaptureDriver {
        PollingCaptureDriver::new(
            Box::new(source),
            Arc::new(SystemTicks),
            Duration::from_millis(5),
        )
    }

    #[tokio::test]
    async fn test_delivers_until_stopped() {
        let (source, closes) = TestSource::new(0);
        let mut driver = driver(source);
        let (sink, frames, finished) = counting_sink();

        driver.start(sink).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        driver.stop().await.unwrap();

        let seen = frames.lock().len();
        assert!(seen > 0);
        assert!(finished.load(Ordering::SeqCst));
        assert!(!driver.is_running());
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        // Nothing arrives after stop returns.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(frames.lock().len(), seen);
    }

    #[tokio::test]
    async fn test_open_failure_surfaces_from_start() {
        let (source, closes) = TestSource::new(1);
        let mut driver = driver(source);
        let (sink, _, finished) = counting_sink();

        let result = driver.start(sink).await;
        assert!(matches!(result, Err(RecordingError::CaptureError(_))));
        assert!(!driver.is_running());
        assert!(!finished.load(Ordering::SeqCst));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_restart_after_stop_reuses_source() {
        let (source, closes) = TestSource::new(0);
        let mut driver = driver(source);

        for _ in 0..2 {
            let (sink, frames, finished) = counting_sink();
            driver.start(sink).await.unwrap();
            tokio::time::sleep(Duration::from_millis(30)).await;
            driver.stop().await.unwrap();
            assert!(!frames.lock().is_empty());
            assert!(finished.load(Ordering::SeqCst));
        }
        assert_eq!(closes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_after_open_failure() {
        let (source, _) = TestSource::new(1);
        let mut driver = driver(source);

        let (sink, _, _) = counting_sink();
        assert!(driver.start(sink).await.is_err());

        let (sink, frames, _) = counting_sink();
        driver.start(sink).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        driver.stop().await.unwrap();
        assert!(!frames.lock().is_empty());
    }
}
