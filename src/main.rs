use activity_recorder_lib::{init_tracing, ActivityRecorder, RecorderConfig};
use anyhow::Context;
use std::path::{Path, PathBuf};

/// Usage: activity-recorder <session-name> [root-dir] [config.json]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    tracing::info!("Starting activity recorder v{}", env!("CARGO_PKG_VERSION"));

    let mut args = std::env::args().skip(1);
    let session_name = args
        .next()
        .unwrap_or_else(|| chrono::Local::now().format("session-%Y%m%d-%H%M%S").to_string());
    let root = args.next().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    let config = match args.next() {
        Some(path) => RecorderConfig::load(Path::new(&path))
            .with_context(|| format!("Failed to load config from {}", path))?,
        None => RecorderConfig::default(),
    };

    let mut recorder = ActivityRecorder::new(config).context("Failed to set up recorder")?;
    let folder = recorder
        .create_session(&session_name, &[], &[], &root)
        .context("Failed to create session")?;
    recorder
        .begin_recording()
        .await
        .context("Failed to begin recording")?;

    tracing::info!("Recording into {} - press Ctrl-C to stop", folder.display());
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    let ok = recorder.end_session().await;
    tracing::info!(
        "Session saved to {} ({:.1}s, ok={})",
        folder.display(),
        recorder.duration_ms() / 1000.0,
        ok
    );
    for file in recorder.output_files() {
        tracing::info!("Output: {}", file);
    }

    if !ok {
        anyhow::bail!("Session ended with errors");
    }
    Ok(())
}
