use activity_recorder_lib::capture::input::types::{
    ButtonPhase, MouseButton, RawInputEvent, VK_CONTROL, VK_SPACE,
};
use activity_recorder_lib::capture::screen::{
    CaptureDriver, DisplayCaptureChannel, EncoderFactory, FrameEncoder, NoCursor,
    PollingCaptureDriver, ScreenSource,
};
use activity_recorder_lib::capture::{InputHook, InputRouter, InputTrackingChannel};
use activity_recorder_lib::recorder::{
    CapturedFrame, RecordingChannel, RecordingError, RecordingResult, TickSource,
};
use activity_recorder_lib::storage::CsvSessionWriter;
use activity_recorder_lib::{ActivityRecorder, RecorderConfig, RecordingState};
use async_trait::async_trait;
use parking_lot::Mutex as ParkingMutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const EPOCH: u64 = 10_000;

/// Tick counter that advances by one on every read
struct SteppingTicks(AtomicU64);

impl TickSource for SteppingTicks {
    fn now_ms(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

#[derive(Clone, Default)]
struct FakeHook {
    router: Arc<ParkingMutex<Option<Arc<InputRouter>>>>,
    refuse: Arc<AtomicBool>,
    released: Arc<AtomicBool>,
}

impl FakeHook {
    fn send(&self, event: RawInputEvent) {
        if let Some(router) = self.router.lock().as_ref() {
            router.handle(event);
        }
    }
}

#[async_trait]
impl InputHook for FakeHook {
    async fn install(&mut self, router: Arc<InputRouter>) -> RecordingResult<()> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(RecordingError::HookInstall("access denied".to_string()));
        }
        *self.router.lock() = Some(router);
        Ok(())
    }

    async fn release(&mut self) -> RecordingResult<()> {
        self.router.lock().take();
        self.released.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_installed(&self) -> bool {
        self.router.lock().is_some()
    }
}

struct FakeScreen {
    closes: Arc<AtomicU64>,
}

impl ScreenSource for FakeScreen {
    fn open(&mut self) -> RecordingResult<(u32, u32)> {
        Ok((4, 4))
    }

    fn grab(&mut self) -> RecordingResult<CapturedFrame> {
        Ok(CapturedFrame::blank(4, 4, 0))
    }

    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeEncoder {
    frames: Arc<AtomicU64>,
    finished: Arc<AtomicU64>,
}

impl FrameEncoder for FakeEncoder {
    fn write_frame(&mut self, _frame: &CapturedFrame, _video_ms: u64) -> RecordingResult<()> {
        self.frames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn flush(&mut self) -> RecordingResult<()> {
        Ok(())
    }

    fn finish(&mut self) -> RecordingResult<Vec<String>> {
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(vec!["screenCaptureVideo.mp4".to_string()])
    }
}

struct Harness {
    recorder: ActivityRecorder,
    hook: FakeHook,
    screen_closes: Arc<AtomicU64>,
    frames_encoded: Arc<AtomicU64>,
    encoders_finished: Arc<AtomicU64>,
}

fn harness(refuse_hook: bool) -> Harness {
    let ticks = Arc::new(SteppingTicks(AtomicU64::new(EPOCH)));
    let screen_closes = Arc::new(AtomicU64::new(0));
    let frames_encoded = Arc::new(AtomicU64::new(0));
    let encoders_finished = Arc::new(AtomicU64::new(0));

    let driver: Box<dyn CaptureDriver> = Box::new(PollingCaptureDriver::new(
        Box::new(FakeScreen {
            closes: screen_closes.clone(),
        }),
        ticks.clone(),
        Duration::from_millis(5),
    ));
    let frames = frames_encoded.clone();
    let finished = encoders_finished.clone();
    let factory: EncoderFactory =
        Box::new(move |_folder: &Path| -> RecordingResult<Box<dyn FrameEncoder>> {
            Ok(Box::new(FakeEncoder {
                frames: frames.clone(),
                finished: finished.clone(),
            }))
        });
    let display = DisplayCaptureChannel::new(driver, factory, Box::new(NoCursor), 120);

    let hook = FakeHook {
        refuse: Arc::new(AtomicBool::new(refuse_hook)),
        ..Default::default()
    };
    let input = InputTrackingChannel::new(Box::new(hook.clone()));

    let channels: Vec<Box<dyn RecordingChannel>> = vec![Box::new(display), Box::new(input)];
    let config = RecorderConfig {
        grace_interval_ms: 20,
        ..Default::default()
    };
    let recorder = ActivityRecorder::with_parts(
        config,
        ticks,
        channels,
        Arc::new(CsvSessionWriter::new()),
        None,
    );

    Harness {
        recorder,
        hook,
        screen_closes,
        frames_encoded,
        encoders_finished,
    }
}

fn lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_full_session_writes_session_relative_csvs() {
    let root = tempfile::tempdir().unwrap();
    let mut h = harness(false);

    let folder = h
        .recorder
        .create_session(
            "session-a",
            &["surveyData".to_string()],
            &["question,answer".to_string()],
            root.path(),
        )
        .unwrap();
    h.recorder.begin_recording().await.unwrap();
    assert_eq!(h.recorder.state(), RecordingState::Recording);

    h.hook.send(RawInputEvent::key(VK_SPACE, ButtonPhase::Press, EPOCH + 200));
    h.hook.send(RawInputEvent::key(VK_SPACE, ButtonPhase::Press, EPOCH + 260));
    h.hook.send(RawInputEvent::key(VK_SPACE, ButtonPhase::Release, EPOCH + 350));
    h.hook.send(RawInputEvent::button(MouseButton::Right, ButtonPhase::Press, EPOCH + 1_000));
    h.hook.send(RawInputEvent::button(MouseButton::Right, ButtonPhase::Release, EPOCH + 1_000));
    h.hook.send(RawInputEvent::button(MouseButton::Left, ButtonPhase::Release, EPOCH + 1_100));
    h.hook.send(RawInputEvent::key(VK_CONTROL, ButtonPhase::Press, EPOCH + 5_000));
    h.hook.send(RawInputEvent::moved(0, 0, EPOCH));
    h.hook.send(RawInputEvent::moved(3, 4, EPOCH + 25));

    h.recorder
        .save_data("surveyData", &[vec!["q1".to_string(), "yes".to_string()]])
        .unwrap();

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(h.recorder.end_session().await);
    assert_eq!(h.recorder.state(), RecordingState::Ended);

    assert_eq!(
        lines(&folder.join("keypressData.csv")),
        vec![
            "timestamp_keydown_(sess_start_ms),timestamp_keyup_(sess_start_ms),duration_(ms),suspect",
            "200,350,150,0",
        ]
    );
    assert_eq!(
        lines(&folder.join("mouseClickData.csv")),
        vec![
            "timestamp_mouseclickdown_(sess_start_ms),timestamp_mouseclickup_(sess_start_ms),duration_(ms),suspect",
            "1000,1000,0,0",
        ]
    );
    assert_eq!(
        lines(&folder.join("mouseMoveData.csv")),
        vec![
            "timestamp_mousemove_(sess_start_ms),abs_x,abs_y,duration_since_last_move_(ms),suspect",
            "25,3,4,25,0",
        ]
    );
    assert_eq!(
        lines(&folder.join("surveyData.csv")),
        vec!["question,answer", "q1,yes"]
    );

    let frames = lines(&folder.join("screenCaptureMetaData.csv"));
    assert_eq!(frames[0], "timestamp_(sess_start_ms),frame_timestamp,suspect");
    let rows: Vec<(u64, u64)> = frames[1..]
        .iter()
        .map(|line| {
            let fields: Vec<&str> = line.split(',').collect();
            (fields[0].parse().unwrap(), fields[1].parse().unwrap())
        })
        .collect();
    assert!(!rows.is_empty());
    assert_eq!(rows[0].1, 0);
    assert!(rows.windows(2).all(|w| w[1].0 > w[0].0 && w[1].1 > w[0].1));
    assert_eq!(rows.len() as u64, h.frames_encoded.load(Ordering::SeqCst));

    assert!(h.hook.released.load(Ordering::SeqCst));
    assert_eq!(h.encoders_finished.load(Ordering::SeqCst), 1);
    assert_eq!(h.screen_closes.load(Ordering::SeqCst), 1);
    assert_eq!(h.recorder.output_files(), vec!["screenCaptureVideo.mp4".to_string()]);
}

#[tokio::test]
async fn test_events_after_end_are_not_recorded() {
    let root = tempfile::tempdir().unwrap();
    let mut h = harness(false);
    let folder = h
        .recorder
        .create_session("session-b", &[], &[], root.path())
        .unwrap();
    h.recorder.begin_recording().await.unwrap();

    // Captured before the end; the router is gone afterwards.
    let router = h.hook.router.lock().clone().unwrap();
    assert!(h.recorder.end_session().await);

    router.handle(RawInputEvent::key(VK_SPACE, ButtonPhase::Press, EPOCH + 10));
    router.handle(RawInputEvent::key(VK_SPACE, ButtonPhase::Release, EPOCH + 20));
    assert_eq!(lines(&folder.join("keypressData.csv")).len(), 1);
    assert!(!h.recorder.end_session().await);
}

#[tokio::test]
async fn test_hook_failure_aborts_start_and_releases_capture() {
    let root = tempfile::tempdir().unwrap();
    let mut h = harness(true);
    h.recorder
        .create_session("session-c", &[], &[], root.path())
        .unwrap();

    let result = h.recorder.begin_recording().await;
    assert!(matches!(result, Err(RecordingError::HookInstall(_))));
    assert_eq!(h.recorder.state(), RecordingState::Prepared);

    // The display channel had started; rollback stopped its driver.
    assert_eq!(h.screen_closes.load(Ordering::SeqCst), 1);
    assert_eq!(h.encoders_finished.load(Ordering::SeqCst), 1);
    assert!(!h.hook.is_installed());
}

/// Key press and release far enough past `EPOCH` to land after any session
/// epoch the stepping ticks reach in a test.
fn late_keystroke(hook: &FakeHook) {
    hook.send(RawInputEvent::key(VK_SPACE, ButtonPhase::Press, EPOCH + 1_000_000));
    hook.send(RawInputEvent::key(VK_SPACE, ButtonPhase::Release, EPOCH + 1_000_150));
}

fn assert_one_keystroke(folder: &Path) {
    let keys = lines(&folder.join("keypressData.csv"));
    assert_eq!(keys.len(), 2);
    assert!(keys[1].ends_with(",150,0"), "{}", keys[1]);
}

fn assert_frames_recorded(folder: &Path) {
    let frames = lines(&folder.join("screenCaptureMetaData.csv"));
    assert!(frames.len() > 1);
    assert_eq!(frames[1].split(',').nth(1), Some("0"));
}

#[tokio::test]
async fn test_second_session_after_end_records_again() {
    let root = tempfile::tempdir().unwrap();
    let mut h = harness(false);

    let first = h
        .recorder
        .create_session("session-e1", &[], &[], root.path())
        .unwrap();
    h.recorder.begin_recording().await.unwrap();
    late_keystroke(&h.hook);
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(h.recorder.end_session().await);

    let second = h
        .recorder
        .create_session("session-e2", &[], &[], root.path())
        .unwrap();
    h.recorder.begin_recording().await.unwrap();
    assert_eq!(h.recorder.state(), RecordingState::Recording);
    assert!(h.hook.is_installed());
    late_keystroke(&h.hook);
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(h.recorder.end_session().await);

    assert_one_keystroke(&first);
    assert_one_keystroke(&second);
    assert_frames_recorded(&first);
    assert_frames_recorded(&second);
    assert_eq!(h.screen_closes.load(Ordering::SeqCst), 2);
    assert_eq!(h.encoders_finished.load(Ordering::SeqCst), 2);
    assert_eq!(h.recorder.output_files(), vec!["screenCaptureVideo.mp4".to_string()]);
}

#[tokio::test]
async fn test_begin_recording_retries_after_hook_failure() {
    let root = tempfile::tempdir().unwrap();
    let mut h = harness(true);
    let folder = h
        .recorder
        .create_session("session-f", &[], &[], root.path())
        .unwrap();

    let result = h.recorder.begin_recording().await;
    assert!(matches!(result, Err(RecordingError::HookInstall(_))));
    assert_eq!(h.recorder.state(), RecordingState::Prepared);

    h.hook.refuse.store(false, Ordering::SeqCst);
    h.recorder.begin_recording().await.unwrap();
    assert_eq!(h.recorder.state(), RecordingState::Recording);
    late_keystroke(&h.hook);
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(h.recorder.end_session().await);

    assert_one_keystroke(&folder);
    assert_frames_recorded(&folder);
    assert_eq!(h.screen_closes.load(Ordering::SeqCst), 2);
    assert_eq!(h.encoders_finished.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_periodic_flush_writes_mid_session() {
    let root = tempfile::tempdir().unwrap();
    let mut h = harness(false);
    let ticks = Arc::new(SteppingTicks(AtomicU64::new(EPOCH)));
    let config = RecorderConfig {
        grace_interval_ms: 1,
        periodic_flush_ms: Some(10),
        ..Default::default()
    };
    let hook = h.hook.clone();
    h.recorder = ActivityRecorder::with_parts(
        config,
        ticks,
        vec![Box::new(InputTrackingChannel::new(Box::new(hook.clone())))],
        Arc::new(CsvSessionWriter::new()),
        None,
    );

    let folder = h
        .recorder
        .create_session("session-d", &[], &[], root.path())
        .unwrap();
    h.recorder.begin_recording().await.unwrap();

    hook.send(RawInputEvent::key(VK_SPACE, ButtonPhase::Press, EPOCH + 1));
    hook.send(RawInputEvent::key(VK_SPACE, ButtonPhase::Release, EPOCH + 9));
    tokio::time::sleep(Duration::from_millis(60)).await;

    // Written by the flush task while still recording.
    assert_eq!(
        lines(&folder.join("keypressData.csv"))[1..],
        ["1,9,8,0".to_string()]
    );
    assert!(h.recorder.end_session().await);
    assert_eq!(lines(&folder.join("keypressData.csv")).len(), 2);
}
