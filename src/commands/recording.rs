//! Recording commands

use super::AppState;
use crate::recorder::{CaptureSession, SessionEvent, SessionSnapshot};
use crate::utils::AppResult;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};

/// How long [`pump_recording`] waits between polls
pub const PUMP_INTERVAL: Duration = Duration::from_millis(200);

/// Application state for recording
pub struct RecorderState {
    pub session: Arc<Mutex<CaptureSession>>,
}

impl RecorderState {
    pub fn new(session: CaptureSession) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
        }
    }
}

/// Start a new recording
pub async fn start_recording(state: &AppState) -> AppResult<SessionSnapshot> {
    let mut session = state.recorder.session.lock().await;
    session.start().await?;
    Ok(session.snapshot())
}

/// Stop the current recording
pub async fn stop_recording(state: &AppState) -> AppResult<SessionSnapshot> {
    let mut session = state.recorder.session.lock().await;
    session.drain_events();
    session.stop();
    Ok(session.snapshot())
}

/// Apply queued capture events and catch up the clock, then wait one poll interval
/// with the lock released. Returns false once the session is no longer recording.
pub async fn pump_recording(state: &AppState) -> bool {
    let recording = {
        let mut session = state.recorder.session.lock().await;
        session.drain_events();
        session.is_recording()
    };
    if recording {
        tokio::time::sleep(PUMP_INTERVAL).await;
    }
    recording
}

/// Upload the stopped recording
///
/// The session lock is released while the transfer runs so snapshots stay available.
pub async fn upload_recording(state: &AppState) -> AppResult<SessionSnapshot> {
    let job = state.recorder.session.lock().await.begin_upload()?;
    tracing::debug!("Upload job {} ({} bytes) started", job.file_name(), job.size());

    let result = job.run().await;

    let mut session = state.recorder.session.lock().await;
    session.finish_upload(result)?;
    Ok(session.snapshot())
}

/// Save the stopped recording into the configured download directory
pub async fn download_recording(state: &AppState) -> AppResult<PathBuf> {
    let session = state.recorder.session.lock().await;
    Ok(session.download(&state.config.download_dir)?)
}

/// Discard the current recording
pub async fn reset_recording(state: &AppState) -> AppResult<SessionSnapshot> {
    let mut session = state.recorder.session.lock().await;
    session.reset();
    Ok(session.snapshot())
}

pub async fn get_recorder_snapshot(state: &AppState) -> SessionSnapshot {
    state.recorder.session.lock().await.snapshot()
}

pub async fn subscribe_recorder(state: &AppState) -> broadcast::Receiver<SessionEvent> {
    state.recorder.session.lock().await.subscribe()
}
