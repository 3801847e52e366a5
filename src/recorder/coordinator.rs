//! Session lifecycle
//!
//! Termination order matters: stop the capture driver (no more frames),
//! lower the recording flag, wait out the grace interval so in-flight hook
//! callbacks land, drain once, persist, and only then release the hooks.

use crate::capture::screen::EncoderFactory;
use crate::capture::{
    default_cursor_source, default_input_hook, default_screen_source, DisplayCaptureChannel,
    FfmpegEncoder, FrameEncoder, InputTrackingChannel, PollingCaptureDriver,
};
use crate::config::RecorderConfig;
use crate::recorder::buffer::{DrainedRecords, SessionBuffers};
use crate::recorder::channel::{RecordingChannel, RecordingError, RecordingResult, SessionContext};
use crate::recorder::clock::{SessionClock, SystemTicks, TickSource};
use crate::recorder::state::RecordingState;
use crate::storage::{to_rows, Category, CategorySpec, CsvSessionWriter, PersistenceWriter};
use crate::sync::{self, HttpRemoteSync, RemoteSync, SessionRecord, UserRecord};
use parking_lot::Mutex as ParkingMutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

struct ActiveSession {
    name: String,
    folder: PathBuf,
    record: SessionRecord,
    context: Option<SessionContext>,
    started_at: Option<Instant>,
    ended_at: Option<Instant>,
    flush_task: Option<JoinHandle<()>>,
}

/// Records one session at a time
pub struct ActivityRecorder {
    config: RecorderConfig,
    ticks: Arc<dyn TickSource>,
    channels: Vec<Box<dyn RecordingChannel>>,
    writer: Arc<dyn PersistenceWriter>,
    /// Held from drain to write so concurrent flushes keep row order
    persist_lock: Arc<ParkingMutex<()>>,
    sync: Option<Arc<dyn RemoteSync>>,
    state: RecordingState,
    session: Option<ActiveSession>,
}

impl ActivityRecorder {
    /// Recorder with the platform capture backends, CSV persistence and,
    /// when configured, HTTP sync.
    pub fn new(config: RecorderConfig) -> RecordingResult<Self> {
        config.validate()?;

        let ticks: Arc<dyn TickSource> = Arc::new(SystemTicks);

        let driver = PollingCaptureDriver::new(
            default_screen_source(),
            ticks.clone(),
            config.frame_interval(),
        );
        let ffmpeg_path = config.ffmpeg_path.clone();
        let video_file_name = config.video_file_name.clone();
        let fps = config.video_fps;
        let encoder_factory: EncoderFactory =
            Box::new(move |folder: &Path| -> RecordingResult<Box<dyn FrameEncoder>> {
                let encoder =
                    FfmpegEncoder::open(&ffmpeg_path, &folder.join(&video_file_name), fps)?;
                Ok(Box::new(encoder) as Box<dyn FrameEncoder>)
            });
        let display = DisplayCaptureChannel::new(
            Box::new(driver),
            encoder_factory,
            default_cursor_source(),
            config.flush_every_frames,
        );
        let input = InputTrackingChannel::new(default_input_hook());

        let sync = match &config.sync {
            Some(sync_config) => {
                Some(Arc::new(HttpRemoteSync::new(sync_config)?) as Arc<dyn RemoteSync>)
            }
            None => None,
        };

        Ok(Self::with_parts(
            config,
            ticks,
            vec![Box::new(display), Box::new(input)],
            Arc::new(CsvSessionWriter::new()),
            sync,
        ))
    }

    /// Recorder from explicit parts. Channels start in the given order and
    /// stop in the same order, so the display channel goes first.
    pub fn with_parts(
        config: RecorderConfig,
        ticks: Arc<dyn TickSource>,
        channels: Vec<Box<dyn RecordingChannel>>,
        writer: Arc<dyn PersistenceWriter>,
        sync: Option<Arc<dyn RemoteSync>>,
    ) -> Self {
        Self {
            config,
            ticks,
            channels,
            writer,
            persist_lock: Arc::new(ParkingMutex::new(())),
            sync,
            state: RecordingState::Idle,
            session: None,
        }
    }

    /// Create `<root>/<name>/` with the four built-in CSV files plus one per
    /// extra category. `extra_headers[i]` is the comma-separated header line
    /// of `extra_categories[i]`.
    pub fn create_session(
        &mut self,
        name: &str,
        extra_categories: &[String],
        extra_headers: &[String],
        root: &Path,
    ) -> RecordingResult<PathBuf> {
        if !self.state.can_prepare() {
            return Err(RecordingError::InvalidState(format!(
                "Cannot create a session while {}",
                self.state
            )));
        }
        if extra_categories.len() != extra_headers.len() {
            return Err(RecordingError::ConfigurationError(format!(
                "{} extra categories but {} headers",
                extra_categories.len(),
                extra_headers.len()
            )));
        }

        let mut specs: Vec<CategorySpec> = Category::BUILT_IN
            .into_iter()
            .map(CategorySpec::built_in)
            .collect();
        for (category, header) in extra_categories.iter().zip(extra_headers) {
            let spec = CategorySpec::extra(category, header);
            if specs.iter().any(|s| s.category.name() == category.as_str()) {
                return Err(RecordingError::ConfigurationError(format!(
                    "Duplicate category {}",
                    category
                )));
            }
            specs.push(spec);
        }

        let folder = self.writer.prepare(&specs, name, root)?;

        let username = self
            .config
            .username
            .clone()
            .unwrap_or_else(|| "anonymous".to_string());
        let record = SessionRecord::new(&username);
        self.push_sync(&record);

        tracing::info!(
            "Created session {} ({}) at {}",
            name,
            record.session_id,
            folder.display()
        );

        self.session = Some(ActiveSession {
            name: name.to_string(),
            folder: folder.clone(),
            record,
            context: None,
            started_at: None,
            ended_at: None,
            flush_task: None,
        });
        self.state = RecordingState::Prepared;
        Ok(folder)
    }

    /// Fix the session epoch and start every channel. If any channel fails
    /// to acquire its resources, the ones already started are stopped and
    /// released and the session stays prepared.
    pub async fn begin_recording(&mut self) -> RecordingResult<()> {
        match self.state {
            RecordingState::Prepared => {}
            RecordingState::Recording => return Err(RecordingError::AlreadyRecording),
            other => {
                return Err(RecordingError::InvalidState(format!(
                    "Cannot begin recording while {}",
                    other
                )))
            }
        }
        let folder = match &self.session {
            Some(session) => session.folder.clone(),
            None => {
                return Err(RecordingError::InvalidState(
                    "No session created".to_string(),
                ))
            }
        };

        let context = SessionContext {
            clock: SessionClock::start(self.ticks.as_ref()),
            buffers: Arc::new(SessionBuffers::new()),
            output_dir: folder,
            is_recording: Arc::new(AtomicBool::new(true)),
        };

        for index in 0..self.channels.len() {
            if let Err(e) = self.channels[index].start(&context).await {
                tracing::warn!(
                    "Channel {} failed to start: {}",
                    self.channels[index].id(),
                    e
                );
                context.is_recording.store(false, Ordering::SeqCst);
                self.roll_back(index).await;
                return Err(e);
            }
        }

        let flush_task = self.config.periodic_flush_ms.and_then(|ms| {
            spawn_periodic_flush(
                context.buffers.clone(),
                self.writer.clone(),
                self.persist_lock.clone(),
                Duration::from_millis(ms),
            )
        });

        tracing::info!(
            "Recording started (epoch={}ms, channels={})",
            context.clock.epoch_ms(),
            self.channels.len()
        );

        if let Some(session) = self.session.as_mut() {
            session.context = Some(context);
            session.started_at = Some(Instant::now());
            session.flush_task = flush_task;
        }
        self.state = RecordingState::Recording;
        Ok(())
    }

    /// Undo a partial start: channels `0..failed` were started, `failed`
    /// itself may hold partial resources.
    async fn roll_back(&mut self, failed: usize) {
        for channel in self.channels[..failed].iter_mut() {
            if let Err(e) = channel.stop().await {
                tracing::warn!("Rollback: failed to stop {}: {}", channel.id(), e);
            }
        }
        for channel in self.channels[..=failed].iter_mut().rev() {
            if let Err(e) = channel.release().await {
                tracing::warn!("Rollback: failed to release {}: {}", channel.id(), e);
            }
        }
    }

    /// Stop recording, persist everything captured and release OS resources.
    ///
    /// Returns false if the recorder was not recording or any step failed;
    /// the remaining steps still run.
    pub async fn end_session(&mut self) -> bool {
        if self.state != RecordingState::Recording {
            tracing::warn!("end_session called while {}", self.state);
            return false;
        }
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let Some(context) = session.context.take() else {
            return false;
        };

        let mut ok = true;

        if let Some(task) = session.flush_task.take() {
            task.abort();
            let _ = task.await;
        }

        for channel in self.channels.iter_mut() {
            if let Err(e) = channel.stop().await {
                tracing::warn!("Failed to stop {}: {}", channel.id(), e);
                ok = false;
            }
        }

        context.is_recording.store(false, Ordering::SeqCst);
        tokio::time::sleep(self.config.grace_interval()).await;

        let total = match drain_and_persist(
            &context.buffers,
            self.writer.as_ref(),
            &self.persist_lock,
        ) {
            Ok(total) => total,
            Err(e) => {
                tracing::warn!("Failed to persist session {}: {}", session.name, e);
                ok = false;
                0
            }
        };

        for channel in self.channels.iter_mut() {
            if let Err(e) = channel.release().await {
                tracing::warn!("Failed to release {}: {}", channel.id(), e);
                ok = false;
            }
        }

        session.ended_at = Some(Instant::now());
        session.record.touch();
        let record = session.record.clone();
        let name = session.name.clone();
        self.push_sync(&record);

        self.state = RecordingState::Ended;
        tracing::info!(
            "Session {} ended ({} records in final drain, ok={})",
            name,
            total,
            ok
        );
        ok
    }

    /// Append host rows to an extra category of the current session. The
    /// built-in categories are written only from the capture buffers.
    pub fn save_data(&self, category: &str, rows: &[Vec<String>]) -> RecordingResult<()> {
        if self.session.is_none() {
            return Err(RecordingError::InvalidState("No session created".to_string()));
        }
        match Category::from_name(category) {
            extra @ Category::Extra(_) => self.writer.write(&extra, rows),
            built_in => Err(RecordingError::ConfigurationError(format!(
                "{} is written by the recorder, not by save_data",
                built_in
            ))),
        }
    }

    /// Drain the buffers to disk mid-session. Returns the number of records
    /// drained.
    pub fn flush(&self) -> RecordingResult<usize> {
        let context = self
            .session
            .as_ref()
            .and_then(|s| s.context.as_ref())
            .ok_or(RecordingError::NotRecording)?;

        drain_and_persist(&context.buffers, self.writer.as_ref(), &self.persist_lock)
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    /// Time since recording began; frozen once the session ends
    pub fn duration_ms(&self) -> f64 {
        let Some(session) = &self.session else {
            return 0.0;
        };
        match (session.started_at, session.ended_at) {
            (Some(start), Some(end)) => end.duration_since(start).as_secs_f64() * 1000.0,
            (Some(start), None) => start.elapsed().as_secs_f64() * 1000.0,
            _ => 0.0,
        }
    }

    pub fn session_folder(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.folder.as_path())
    }

    pub fn session_record(&self) -> Option<&SessionRecord> {
        self.session.as_ref().map(|s| &s.record)
    }

    /// Files produced by the channels (the video), in addition to the CSVs
    pub fn output_files(&self) -> Vec<String> {
        self.channels
            .iter()
            .flat_map(|channel| channel.output_files())
            .collect()
    }

    fn push_sync(&self, record: &SessionRecord) {
        let Some(remote) = &self.sync else {
            return;
        };
        let user = self.config.username.as_ref().map(|username| UserRecord {
            username: username.clone(),
            optin: true,
        });
        let timeout = self
            .config
            .sync
            .as_ref()
            .map(|s| Duration::from_millis(s.timeout_ms))
            .unwrap_or(Duration::from_secs(10));
        sync::dispatch(remote.clone(), user, record.clone(), timeout);
    }
}

/// Write one drain to every built-in category. The first move of the
/// session carries no delta and is not persisted.
fn persist(writer: &dyn PersistenceWriter, drained: DrainedRecords) -> RecordingResult<()> {
    let moves: Vec<_> = drained
        .mouse_move
        .into_iter()
        .filter(|sample| sample.has_predecessor())
        .collect();

    let writes = [
        (Category::Keypress, to_rows(&drained.keypress)),
        (Category::MouseMove, to_rows(&moves)),
        (Category::MouseClick, to_rows(&drained.mouse_click)),
        (Category::ScreenFrames, to_rows(&drained.frames)),
    ];

    let mut first_error = None;
    for (category, rows) in writes {
        if let Err(e) = writer.write(&category, &rows) {
            tracing::warn!("Failed to write {}: {}", category.file_name(), e);
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Drain the buffers and write the records. Returns the number drained.
fn drain_and_persist(
    buffers: &SessionBuffers,
    writer: &dyn PersistenceWriter,
    lock: &ParkingMutex<()>,
) -> RecordingResult<usize> {
    let _guard = lock.lock();
    let drained = buffers.drain_all();
    let total = drained.total();
    if total > 0 {
        persist(writer, drained)?;
    }
    Ok(total)
}

fn spawn_periodic_flush(
    buffers: Arc<SessionBuffers>,
    writer: Arc<dyn PersistenceWriter>,
    lock: Arc<ParkingMutex<()>>,
    period: Duration,
) -> Option<JoinHandle<()>> {
    let runtime = tokio::runtime::Handle::try_current().ok()?;
    Some(runtime.spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match drain_and_persist(&buffers, writer.as_ref(), &lock) {
                Ok(0) => {}
                Ok(total) => tracing::debug!("Periodic flush wrote {} records", total),
                Err(e) => tracing::warn!("Periodic flush failed: {}", e),
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::input::types::{IntervalRecord, MoveSample};
    use crate::recorder::channel::ChannelType;
    use async_trait::async_trait;

    #[derive(Default)]
    struct MemoryWriter {
        rows: ParkingMutex<Vec<(Category, Vec<String>)>>,
        prepared: ParkingMutex<Vec<Category>>,
    }

    impl PersistenceWriter for MemoryWriter {
        fn prepare(
            &self,
            categories: &[CategorySpec],
            session_name: &str,
            root: &Path,
        ) -> RecordingResult<PathBuf> {
            *self.prepared.lock() = categories.iter().map(|c| c.category.clone()).collect();
            Ok(root.join(session_name))
        }

        fn write(&self, category: &Category, rows: &[Vec<String>]) -> RecordingResult<()> {
            if !self.prepared.lock().contains(category) {
                return Err(RecordingError::UnknownCategory(category.to_string()));
            }
            let mut stored = self.rows.lock();
            for row in rows {
                stored.push((category.clone(), row.clone()));
            }
            Ok(())
        }
    }

    /// Appends one record per category when started
    struct SeedChannel {
        log: Arc<ParkingMutex<Vec<String>>>,
        fail_start: bool,
        recording: bool,
    }

    #[async_trait]
    impl RecordingChannel for SeedChannel {
        fn id(&self) -> &str {
            "seed"
        }

        fn channel_type(&self) -> ChannelType {
            ChannelType::Input
        }

        async fn start(&mut self, ctx: &SessionContext) -> RecordingResult<()> {
            self.log.lock().push("start".to_string());
            if self.fail_start {
                return Err(RecordingError::HookInstall("refused".to_string()));
            }
            ctx.buffers.keypress.append(IntervalRecord {
                start_ms: 200,
                end_ms: 350,
                duration_ms: 150,
                suspect: false,
            });
            for (t, x, y, delta) in [(0, 0, 0, None), (25, 3, 4, Some(25))] {
                ctx.buffers.mouse_move.append(MoveSample {
                    timestamp_ms: t,
                    x,
                    y,
                    delta_since_previous_ms: delta,
                    suspect: false,
                });
            }
            self.recording = true;
            Ok(())
        }

        async fn stop(&mut self) -> RecordingResult<()> {
            self.log.lock().push("stop".to_string());
            self.recording = false;
            Ok(())
        }

        async fn release(&mut self) -> RecordingResult<()> {
            self.log.lock().push("release".to_string());
            Ok(())
        }

        fn is_recording(&self) -> bool {
            self.recording
        }

        fn output_files(&self) -> Vec<String> {
            Vec::new()
        }
    }

    fn recorder(
        fail_start: bool,
    ) -> (ActivityRecorder, Arc<MemoryWriter>, Arc<ParkingMutex<Vec<String>>>) {
        let writer = Arc::new(MemoryWriter::default());
        let log = Arc::new(ParkingMutex::new(Vec::new()));
        let channel = SeedChannel {
            log: log.clone(),
            fail_start,
            recording: false,
        };
        let config = RecorderConfig {
            grace_interval_ms: 1,
            ..Default::default()
        };
        let recorder = ActivityRecorder::with_parts(
            config,
            Arc::new(SystemTicks),
            vec![Box::new(channel)],
            writer.clone(),
            None,
        );
        (recorder, writer, log)
    }

    #[tokio::test]
    async fn test_lifecycle_persists_and_filters_first_move() {
        let (mut recorder, writer, log) = recorder(false);
        recorder
            .create_session("s1", &[], &[], Path::new("/tmp"))
            .unwrap();
        assert_eq!(recorder.state(), RecordingState::Prepared);

        recorder.begin_recording().await.unwrap();
        assert_eq!(recorder.state(), RecordingState::Recording);
        assert!(recorder.end_session().await);
        assert_eq!(recorder.state(), RecordingState::Ended);

        let rows = writer.rows.lock();
        let moves: Vec<_> = rows
            .iter()
            .filter(|(c, _)| *c == Category::MouseMove)
            .map(|(_, r)| r.clone())
            .collect();
        assert_eq!(moves, vec![vec!["25", "3", "4", "25", "0"]]);
        assert!(rows
            .iter()
            .any(|(c, r)| *c == Category::Keypress && r[..3] == ["200", "350", "150"]));
        assert_eq!(*log.lock(), vec!["start", "stop", "release"]);
    }

    #[tokio::test]
    async fn test_failed_start_keeps_session_prepared() {
        let (mut recorder, _, log) = recorder(true);
        recorder
            .create_session("s2", &[], &[], Path::new("/tmp"))
            .unwrap();
        let result = recorder.begin_recording().await;
        assert!(matches!(result, Err(RecordingError::HookInstall(_))));
        assert_eq!(recorder.state(), RecordingState::Prepared);
        assert_eq!(*log.lock(), vec!["start", "release"]);
    }

    #[tokio::test]
    async fn test_end_without_recording_is_false() {
        let (mut recorder, _, _) = recorder(false);
        assert!(!recorder.end_session().await);
    }

    #[test]
    fn test_extra_categories_need_matching_headers() {
        let (mut recorder, writer, _) = recorder(false);
        let result = recorder.create_session(
            "s3",
            &["surveyData".to_string()],
            &[],
            Path::new("/tmp"),
        );
        assert!(matches!(result, Err(RecordingError::ConfigurationError(_))));

        recorder
            .create_session(
                "s3",
                &["surveyData".to_string()],
                &["question,answer".to_string()],
                Path::new("/tmp"),
            )
            .unwrap();
        assert_eq!(writer.prepared.lock().len(), 5);
        recorder
            .save_data("surveyData", &[vec!["q1".to_string(), "yes".to_string()]])
            .unwrap();
        assert!(recorder.save_data("unknownData", &[]).is_err());
    }

    #[test]
    fn test_save_data_refuses_built_in_categories() {
        let (mut recorder, writer, _) = recorder(false);
        recorder
            .create_session("s6", &[], &[], Path::new("/tmp"))
            .unwrap();

        for name in ["keypressData", "mouseMoveData", "mouseClickData", "screenCaptureMetaData"] {
            let result = recorder.save_data(name, &[vec!["1".to_string(), "2".to_string()]]);
            assert!(matches!(result, Err(RecordingError::ConfigurationError(_))), "{}", name);
        }
        assert!(writer.rows.lock().is_empty());
    }

    #[test]
    fn test_concurrent_flushes_keep_row_order() {
        let writer = MemoryWriter::default();
        *writer.prepared.lock() = Category::BUILT_IN.to_vec();
        let buffers = SessionBuffers::new();
        let lock = ParkingMutex::new(());
        let done = AtomicBool::new(false);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 0..2_000u64 {
                    buffers.keypress.append(IntervalRecord {
                        start_ms: i,
                        end_ms: i + 1,
                        duration_ms: 1,
                        suspect: false,
                    });
                }
                done.store(true, Ordering::SeqCst);
            });
            for _ in 0..4 {
                scope.spawn(|| {
                    while !done.load(Ordering::SeqCst) {
                        drain_and_persist(&buffers, &writer, &lock).unwrap();
                    }
                });
            }
        });
        drain_and_persist(&buffers, &writer, &lock).unwrap();

        let starts: Vec<u64> = writer
            .rows
            .lock()
            .iter()
            .map(|(_, row)| row[0].parse().unwrap())
            .collect();
        assert_eq!(starts, (0..2_000).collect::<Vec<_>>());
    }

    #[test]
    fn test_duplicate_category_rejected() {
        let (mut recorder, _, _) = recorder(false);
        let result = recorder.create_session(
            "s4",
            &["keypressData".to_string()],
            &["a,b".to_string()],
            Path::new("/tmp"),
        );
        assert!(matches!(result, Err(RecordingError::ConfigurationError(_))));
        assert_eq!(recorder.state(), RecordingState::Idle);
    }

    #[tokio::test]
    async fn test_flush_requires_recording() {
        let (mut recorder, writer, _) = recorder(false);
        assert!(matches!(recorder.flush(), Err(RecordingError::NotRecording)));

        recorder
            .create_session("s5", &[], &[], Path::new("/tmp"))
            .unwrap();
        recorder.begin_recording().await.unwrap();
        assert_eq!(recorder.flush().unwrap(), 3);
        assert_eq!(writer.rows.lock().len(), 2);
        assert!(recorder.end_session().await);
    }
}
