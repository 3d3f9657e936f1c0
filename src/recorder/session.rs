//! Capture session
//!
//! Drives one recording attempt: device acquisition, fragment collection,
//! the elapsed-time ticker, and handing the artifact to download or upload.
//! Capture data, sharing revocation and ticks all arrive on one queue and
//! are applied one at a time by [`CaptureSession::process_next_event`].

use super::state::{
    Artifact, FinishedRecording, Fragment, SessionError, SessionPhase, SessionResult,
    SessionSnapshot,
};
use crate::api::{ApiResult, MediaUpload, RecordingsApi, UploadProgress};
use crate::capture::codec::{self, DEFAULT_VIDEO_BITS_PER_SECOND};
use crate::capture::{
    CaptureDevices, CaptureEvent, CaptureEventSink, CaptureResult, DisplayConstraints,
    EncoderOptions, MediaEncoder, MediaStream, MicrophoneConstraints,
};
use crate::catalog::RefreshTrigger;
use crate::utils::format::{download_file_name, format_elapsed, upload_file_name};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, Interval};

/// Elapsed-time resolution
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// How often the encoder delivers a fragment
pub const ENCODER_TIMESLICE: Duration = Duration::from_secs(1);

/// Events emitted by the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    PhaseChanged(SessionPhase),
    /// Elapsed seconds after a tick
    Tick(u64),
    FragmentCaptured { index: usize, size: usize },
    UploadProgress(u8),
    Uploaded,
    Error(String),
}

struct ActiveRecording {
    stream: MediaStream,
    encoder: Box<dyn MediaEncoder>,
    events: mpsc::UnboundedReceiver<CaptureEvent>,
    ticker: Interval,
    started_at: Instant,
    fragments: Vec<Fragment>,
}

impl ActiveRecording {
    /// Keep a non-empty fragment. Returns its index.
    fn push(&mut self, bytes: Vec<u8>) -> Option<usize> {
        if bytes.is_empty() {
            return None;
        }
        self.fragments.push(Fragment::new(bytes));
        Some(self.fragments.len() - 1)
    }

    fn elapsed_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    fn shut_down(&mut self) -> usize {
        self.encoder.stop();
        self.stream.release()
    }
}

enum SessionState {
    Idle,
    RequestingDevices,
    Recording(ActiveRecording),
    Stopped(FinishedRecording),
    Uploading {
        recording: FinishedRecording,
        progress: UploadProgress,
    },
}

impl SessionState {
    fn phase(&self) -> SessionPhase {
        match self {
            SessionState::Idle => SessionPhase::Idle,
            SessionState::RequestingDevices => SessionPhase::RequestingDevices,
            SessionState::Recording(_) => SessionPhase::Recording,
            SessionState::Stopped(_) => SessionPhase::Stopped,
            SessionState::Uploading { .. } => SessionPhase::Uploading,
        }
    }

    fn finished(&self) -> Option<&FinishedRecording> {
        match self {
            SessionState::Stopped(recording) | SessionState::Uploading { recording, .. } => {
                Some(recording)
            }
            _ => None,
        }
    }
}

enum Signal {
    Capture(CaptureEvent),
    Tick,
}

/// Puts a session still requesting devices back to idle if `start` is dropped mid-await
struct StartGuard<'a> {
    state: &'a mut SessionState,
    events: &'a broadcast::Sender<SessionEvent>,
    armed: bool,
}

impl StartGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        if self.armed && matches!(self.state, SessionState::RequestingDevices) {
            tracing::debug!("Start cancelled while requesting devices");
            *self.state = SessionState::Idle;
            let _ = self.events.send(SessionEvent::PhaseChanged(SessionPhase::Idle));
        }
    }
}

/// A pending upload, run without borrowing the session
pub struct UploadJob {
    api: Arc<dyn RecordingsApi>,
    upload: MediaUpload,
    progress: UploadProgress,
}

impl UploadJob {
    pub fn file_name(&self) -> &str {
        &self.upload.file_name
    }

    pub fn size(&self) -> u64 {
        self.upload.size()
    }

    pub async fn run(self) -> ApiResult<()> {
        self.api.upload(self.upload, self.progress).await
    }
}

/// State machine for one recording attempt
pub struct CaptureSession {
    devices: Arc<dyn CaptureDevices>,
    api: Arc<dyn RecordingsApi>,
    refresh: Option<RefreshTrigger>,
    display: DisplayConstraints,
    microphone: MicrophoneConstraints,
    state: SessionState,
    elapsed_secs: u64,
    last_error: Option<String>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl CaptureSession {
    pub fn new(devices: Arc<dyn CaptureDevices>, api: Arc<dyn RecordingsApi>) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            devices,
            api,
            refresh: None,
            display: DisplayConstraints::default(),
            microphone: MicrophoneConstraints::default(),
            state: SessionState::Idle,
            elapsed_secs: 0,
            last_error: None,
            event_tx,
        }
    }

    /// Notify `trigger` after every successful upload
    pub fn with_refresh_trigger(mut self, trigger: RefreshTrigger) -> Self {
        self.refresh = Some(trigger);
        self
    }

    pub fn with_constraints(
        mut self,
        display: DisplayConstraints,
        microphone: MicrophoneConstraints,
    ) -> Self {
        self.display = display;
        self.microphone = microphone;
        self
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, SessionState::Recording(_))
    }

    /// Whole seconds recorded, counted from the start instant while recording
    pub fn elapsed_secs(&self) -> u64 {
        match &self.state {
            SessionState::Recording(active) => self.elapsed_secs.max(active.elapsed_secs()),
            _ => self.elapsed_secs,
        }
    }

    pub fn elapsed_label(&self) -> String {
        format_elapsed(self.elapsed_secs())
    }

    pub fn fragment_count(&self) -> usize {
        match &self.state {
            SessionState::Recording(active) => active.fragments.len(),
            state => state.finished().map(|r| r.fragments.len()).unwrap_or(0),
        }
    }

    /// Fragments frozen at stop
    pub fn fragments(&self) -> &[Fragment] {
        self.state.finished().map(|r| r.fragments.as_slice()).unwrap_or(&[])
    }

    /// The previewable artifact, once stopped
    pub fn artifact(&self) -> Option<&Artifact> {
        self.state.finished().and_then(|r| r.artifact.as_ref())
    }

    pub fn upload_progress(&self) -> u8 {
        match &self.state {
            SessionState::Uploading { progress, .. } => progress.percent(),
            _ => 0,
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase(),
            elapsed_secs: self.elapsed_secs(),
            elapsed_label: self.elapsed_label(),
            fragment_count: self.fragment_count(),
            artifact_size: self.artifact().map(Artifact::size),
            upload_progress: self.upload_progress(),
            last_error: self.last_error.clone(),
        }
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state;
        self.emit(SessionEvent::PhaseChanged(self.state.phase()));
    }

    fn record_error(&mut self, error: &SessionError) {
        let message = error.to_string();
        self.last_error = Some(message.clone());
        self.emit(SessionEvent::Error(message));
    }

    /// Acquire devices and begin recording. Only valid from idle.
    pub async fn start(&mut self) -> SessionResult<()> {
        let phase = self.phase();
        if phase != SessionPhase::Idle {
            tracing::debug!("Ignoring start while {}", phase);
            return Err(SessionError::InvalidTransition {
                action: "start recording",
                phase,
            });
        }

        self.last_error = None;
        self.set_state(SessionState::RequestingDevices);

        let opening = open_recording(
            self.devices.clone(),
            self.display.clone(),
            self.microphone.clone(),
        );
        let guard = StartGuard {
            state: &mut self.state,
            events: &self.event_tx,
            armed: true,
        };
        let opened = opening.await;
        guard.disarm();

        match opened {
            Ok(active) => {
                tracing::info!(
                    "Recording started with {} tracks ({})",
                    active.stream.track_count(),
                    active.encoder.mime_type()
                );
                self.elapsed_secs = 0;
                self.set_state(SessionState::Recording(active));
                Ok(())
            }
            Err(e) => {
                let error = SessionError::Start(e.to_string());
                tracing::error!("{}", error);
                self.record_error(&error);
                self.set_state(SessionState::Idle);
                Err(error)
            }
        }
    }

    /// Wait for and apply the next capture event or tick.
    ///
    /// Returns false without waiting when not recording.
    pub async fn process_next_event(&mut self) -> bool {
        let signal = match &mut self.state {
            SessionState::Recording(active) => tokio::select! {
                biased;
                event = active.events.recv() => Signal::Capture(event.unwrap_or(CaptureEvent::Ended)),
                _ = active.ticker.tick() => Signal::Tick,
            },
            _ => return false,
        };
        self.apply(signal);
        true
    }

    /// Apply every capture event already queued. Returns how many were handled.
    pub fn drain_events(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let event = match &mut self.state {
                SessionState::Recording(active) => match active.events.try_recv() {
                    Ok(event) => event,
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => CaptureEvent::Ended,
                },
                _ => break,
            };
            self.apply(Signal::Capture(event));
            handled += 1;
        }
        self.update_elapsed();
        handled
    }

    /// Catch the counter up with the clock, emitting a tick if it moved
    fn update_elapsed(&mut self) {
        if !self.is_recording() {
            return;
        }
        let secs = self.elapsed_secs();
        if secs > self.elapsed_secs {
            self.elapsed_secs = secs;
            self.emit(SessionEvent::Tick(secs));
        }
    }

    fn apply(&mut self, signal: Signal) {
        match signal {
            Signal::Capture(CaptureEvent::Data(bytes)) => {
                if let SessionState::Recording(active) = &mut self.state {
                    let size = bytes.len();
                    if let Some(index) = active.push(bytes) {
                        let _ = self
                            .event_tx
                            .send(SessionEvent::FragmentCaptured { index, size });
                    }
                }
            }
            Signal::Capture(CaptureEvent::Ended) => {
                tracing::info!("Screen sharing ended outside the application");
                self.stop();
            }
            Signal::Tick => self.update_elapsed(),
        }
    }

    /// Stop recording and build the artifact. A no-op unless recording.
    pub fn stop(&mut self) {
        self.elapsed_secs = self.elapsed_secs();
        let mut active = match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::Recording(active) => active,
            other => {
                tracing::debug!("Ignoring stop while {}", other.phase());
                self.state = other;
                return;
            }
        };

        active.encoder.stop();
        while let Ok(event) = active.events.try_recv() {
            if let CaptureEvent::Data(bytes) = event {
                active.push(bytes);
            }
        }
        let released = active.stream.release();

        let mime_type = codec::container_type(active.encoder.mime_type()).to_string();
        let finished = FinishedRecording::new(std::mem::take(&mut active.fragments), &mime_type);

        tracing::info!(
            "Recording stopped after {}s: {} fragments, {} bytes, {} tracks released",
            self.elapsed_secs,
            finished.fragments.len(),
            finished.artifact.as_ref().map(Artifact::size).unwrap_or(0),
            released
        );
        self.set_state(SessionState::Stopped(finished));
    }

    /// Move to uploading and hand back the transfer to run.
    pub fn begin_upload(&mut self) -> SessionResult<UploadJob> {
        let (recording, artifact) = match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::Stopped(recording) => match recording.artifact.clone() {
                Some(artifact) => (recording, artifact),
                None => {
                    self.state = SessionState::Stopped(recording);
                    return Err(SessionError::NothingToUpload);
                }
            },
            SessionState::Idle => return Err(SessionError::NothingToUpload),
            other => {
                let phase = other.phase();
                self.state = other;
                return Err(SessionError::InvalidTransition {
                    action: "upload",
                    phase,
                });
            }
        };

        let tx = self.event_tx.clone();
        let progress = UploadProgress::with_listener(move |percent| {
            let _ = tx.send(SessionEvent::UploadProgress(percent));
        });
        let upload = MediaUpload {
            file_name: upload_file_name(Utc::now()),
            mime_type: artifact.mime_type().to_string(),
            data: artifact.data().clone(),
        };

        tracing::debug!("Preparing upload of {} fragments", recording.fragments.len());
        self.last_error = None;
        self.set_state(SessionState::Uploading {
            recording,
            progress: progress.clone(),
        });

        Ok(UploadJob {
            api: self.api.clone(),
            upload,
            progress,
        })
    }

    /// Apply the outcome of an upload started with [`begin_upload`](Self::begin_upload)
    pub fn finish_upload(&mut self, result: ApiResult<()>) -> SessionResult<()> {
        let recording = match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::Uploading { recording, .. } => recording,
            other => {
                tracing::warn!("Upload finished while {}, ignoring result", other.phase());
                self.state = other;
                if result.is_ok() {
                    self.notify_refresh();
                }
                return result.map_err(|e| SessionError::Upload(e.describe()));
            }
        };

        match result {
            Ok(()) => {
                tracing::info!("Recording uploaded successfully");
                self.emit(SessionEvent::Uploaded);
                self.notify_refresh();
                self.clear();
                Ok(())
            }
            Err(e) => {
                let error = SessionError::Upload(e.describe());
                tracing::warn!("{}", error);
                self.record_error(&error);
                self.set_state(SessionState::Stopped(recording));
                Err(error)
            }
        }
    }

    /// Upload the artifact and wait for the outcome
    pub async fn upload(&mut self) -> SessionResult<()> {
        let job = self.begin_upload()?;
        let result = job.run().await;
        self.finish_upload(result)
    }

    /// Save the artifact into `dir`. Does not change state.
    pub fn download(&self, dir: &Path) -> SessionResult<PathBuf> {
        let artifact = self.artifact().ok_or(SessionError::NothingToDownload)?;
        let path = dir.join(download_file_name(Utc::now()));

        std::fs::create_dir_all(dir).map_err(|e| SessionError::Save(e.to_string()))?;
        std::fs::write(&path, artifact.data().as_ref())
            .map_err(|e| SessionError::Save(e.to_string()))?;

        tracing::info!("Saved recording to {:?} ({} bytes)", path, artifact.size());
        Ok(path)
    }

    /// Discard everything and return to idle
    pub fn reset(&mut self) {
        if let SessionState::Recording(active) = &mut self.state {
            let released = active.shut_down();
            tracing::info!("Recording discarded, {} tracks released", released);
        }
        self.clear();
    }

    fn clear(&mut self) {
        self.elapsed_secs = 0;
        self.last_error = None;
        self.set_state(SessionState::Idle);
    }

    fn notify_refresh(&self) {
        if let Some(trigger) = &self.refresh {
            trigger.notify();
        }
    }

    /// Release the ticker and any open tracks as the owning surface goes away
    pub fn teardown(self) {
        tracing::debug!("Tearing down capture session while {}", self.phase());
        drop(self);
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if let SessionState::Recording(active) = &mut self.state {
            let released = active.shut_down();
            tracing::debug!("Released {} tracks on teardown", released);
        }
    }
}

async fn open_recording(
    devices: Arc<dyn CaptureDevices>,
    display: DisplayConstraints,
    microphone: MicrophoneConstraints,
) -> CaptureResult<ActiveRecording> {
    let (tx, events) = mpsc::unbounded_channel();
    let sink = CaptureEventSink::new(tx);

    let screen = devices.acquire_display_capture(&display, sink.clone()).await?;

    let mic = match devices.acquire_microphone(&microphone).await {
        Ok(stream) => Some(stream),
        Err(e) => {
            tracing::warn!("Microphone access denied, recording without mic audio: {}", e);
            None
        }
    };

    let stream = MediaStream::combine(screen, mic);
    let mime_type = codec::negotiate(|mime| devices.is_type_supported(mime));
    let options = EncoderOptions {
        mime_type: mime_type.to_string(),
        video_bits_per_second: DEFAULT_VIDEO_BITS_PER_SECOND,
        timeslice: ENCODER_TIMESLICE,
    };

    let mut encoder = devices.create_encoder(&stream, &options, sink)?;
    encoder.start()?;

    let started_at = Instant::now();
    Ok(ActiveRecording {
        stream,
        encoder,
        events,
        ticker: tokio::time::interval_at(started_at + TICK_INTERVAL, TICK_INTERVAL),
        started_at,
        fragments: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, InMemoryRecordings, Operation};
    use crate::capture::{CaptureError, FakeCaptureDevices};

    struct Harness {
        devices: FakeCaptureDevices,
        backend: Arc<InMemoryRecordings>,
        refresh: RefreshTrigger,
        session: CaptureSession,
    }

    fn harness_with(devices: FakeCaptureDevices) -> Harness {
        let backend = Arc::new(InMemoryRecordings::new("http://localhost:5000"));
        let refresh = RefreshTrigger::new();
        let session = CaptureSession::new(Arc::new(devices.clone()), backend.clone())
            .with_refresh_trigger(refresh.clone());
        Harness {
            devices,
            backend,
            refresh,
            session,
        }
    }

    fn harness() -> Harness {
        harness_with(FakeCaptureDevices::new())
    }

    async fn record(h: &mut Harness, sizes: &[usize]) {
        h.session.start().await.unwrap();
        for &size in sizes {
            assert!(h.devices.emit_fragment(vec![0xAB; size]));
        }
        h.session.drain_events();
        h.session.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_second_recording() {
        let mut h = harness();
        h.session.start().await.unwrap();
        assert_eq!(h.session.phase(), SessionPhase::Recording);

        for size in [100, 120, 110] {
            h.devices.emit_fragment(vec![1; size]);
            // Data is applied before the tick
            assert!(h.session.process_next_event().await);
            assert!(h.session.process_next_event().await);
        }
        h.session.stop();

        assert_eq!(h.session.phase(), SessionPhase::Stopped);
        assert_eq!(h.session.fragments().len(), 3);
        assert_eq!(h.session.artifact().unwrap().size(), 330);
        assert_eq!(h.session.artifact().unwrap().mime_type(), "video/webm");
        assert_eq!(h.session.elapsed_label(), "00:03");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_counts_a_tick_that_is_due() {
        let mut h = harness();
        let mut events = h.session.subscribe();
        h.session.start().await.unwrap();
        assert!(h.session.process_next_event().await);
        assert!(h.session.process_next_event().await);
        assert_eq!(h.session.elapsed_secs(), 2);

        // The third tick is due but nobody polled for it
        tokio::time::advance(Duration::from_secs(1)).await;
        h.session.stop();

        assert_eq!(h.session.elapsed_label(), "00:03");
        let ticks: Vec<u64> = std::iter::from_fn(|| events.try_recv().ok())
            .filter_map(|event| match event {
                SessionEvent::Tick(secs) => Some(secs),
                _ => None,
            })
            .collect();
        assert_eq!(ticks, vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_follows_the_clock_without_polling() {
        let mut h = harness();
        h.session.start().await.unwrap();

        tokio::time::advance(Duration::from_millis(3500)).await;
        assert_eq!(h.session.snapshot().elapsed_label, "00:03");

        h.session.stop();
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(h.session.elapsed_secs(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_start_returns_to_idle() {
        let devices = FakeCaptureDevices::new().hold_display();
        let mut h = harness_with(devices);
        let mut events = h.session.subscribe();

        let start = tokio::time::timeout(Duration::from_millis(10), h.session.start()).await;

        assert!(start.is_err());
        assert_eq!(h.session.phase(), SessionPhase::Idle);
        assert_eq!(h.devices.display_requests(), 1);
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::PhaseChanged(SessionPhase::RequestingDevices)
        );
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::PhaseChanged(SessionPhase::Idle)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_stops_advancing_after_stop() {
        let mut h = harness();
        h.session.start().await.unwrap();
        assert!(h.session.process_next_event().await);
        h.session.stop();

        assert!(!h.session.process_next_event().await);
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(h.session.elapsed_secs(), 1);
    }

    #[tokio::test]
    async fn test_artifact_size_is_sum_of_fragments() {
        let mut h = harness();
        record(&mut h, &[10, 0, 2048, 7]).await;

        // Empty data events are discarded
        assert_eq!(h.session.fragments().len(), 3);
        let total: usize = h.session.fragments().iter().map(Fragment::len).sum();
        assert_eq!(h.session.artifact().unwrap().size(), total as u64);
        assert_eq!(total, 2065);
    }

    #[tokio::test]
    async fn test_start_only_from_idle() {
        let mut h = harness();
        h.session.start().await.unwrap();

        let error = h.session.start().await.unwrap_err();
        assert_eq!(
            error,
            SessionError::InvalidTransition {
                action: "start recording",
                phase: SessionPhase::Recording
            }
        );
        assert_eq!(h.devices.display_requests(), 1);

        h.session.stop();
        assert!(h.session.start().await.is_err());
        assert_eq!(h.session.phase(), SessionPhase::Stopped);
        assert_eq!(h.devices.display_requests(), 1);
    }

    #[tokio::test]
    async fn test_stop_twice_releases_each_track_once() {
        let mut h = harness();
        h.session.start().await.unwrap();
        assert_eq!(h.devices.stop_counts().len(), 3);

        h.session.stop();
        h.session.stop();

        assert!(h.devices.stop_counts().values().all(|&count| count == 1));
        assert!(!h.devices.encoder_running());
    }

    #[tokio::test]
    async fn test_display_failure_returns_to_idle() {
        let devices = FakeCaptureDevices::new()
            .fail_display(CaptureError::PermissionDenied("Permission denied by user".into()));
        let mut h = harness_with(devices);

        let error = h.session.start().await.unwrap_err();

        assert!(matches!(error, SessionError::Start(_)));
        assert_eq!(h.session.phase(), SessionPhase::Idle);
        assert_eq!(
            h.session.last_error(),
            Some("Failed to start recording: Permission denied: Permission denied by user")
        );
        assert_eq!(h.devices.microphone_requests(), 0);
        assert!(h.devices.stop_counts().is_empty());
    }

    #[tokio::test]
    async fn test_encoder_failure_releases_tracks() {
        let devices = FakeCaptureDevices::new()
            .fail_encoder(CaptureError::Encoder("no encoder".into()));
        let mut h = harness_with(devices);

        assert!(h.session.start().await.is_err());
        // Tracks acquired before the encoder failed are released
        assert_eq!(h.devices.open_track_count(), 0);
        assert!(h.session.last_error().is_some());
    }

    #[tokio::test]
    async fn test_microphone_failure_is_not_fatal() {
        let devices = FakeCaptureDevices::new()
            .fail_microphone(CaptureError::PermissionDenied("mic".into()));
        let mut h = harness_with(devices);

        h.session.start().await.unwrap();

        assert_eq!(h.session.phase(), SessionPhase::Recording);
        assert_eq!(h.devices.microphone_requests(), 1);
        // Screen video and screen audio only
        assert_eq!(h.devices.stop_counts().len(), 2);
        assert!(h.session.last_error().is_none());
    }

    #[tokio::test]
    async fn test_codec_fallback() {
        let devices = FakeCaptureDevices::new().supporting(&["video/webm;codecs=vp8,opus"]);
        let mut h = harness_with(devices);
        h.session.start().await.unwrap();

        let options = h.devices.encoder_options().unwrap();
        assert_eq!(options.mime_type, "video/webm;codecs=vp8,opus");
        assert_eq!(options.video_bits_per_second, 2_500_000);
        assert_eq!(options.timeslice, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_revoked_sharing_stops_recording() {
        let mut h = harness();
        h.session.start().await.unwrap();
        h.devices.emit_fragment(vec![9; 50]);
        assert!(h.devices.revoke_sharing());

        assert!(h.session.process_next_event().await);
        assert!(h.session.process_next_event().await);

        assert_eq!(h.session.phase(), SessionPhase::Stopped);
        assert_eq!(h.session.artifact().unwrap().size(), 50);
        assert_eq!(h.devices.open_track_count(), 0);
    }

    #[tokio::test]
    async fn test_final_flush_is_kept() {
        let devices = FakeCaptureDevices::new().flush_on_stop(vec![5; 40]);
        let mut h = harness_with(devices);
        record(&mut h, &[60]).await;

        assert_eq!(h.session.fragments().len(), 2);
        assert_eq!(h.session.artifact().unwrap().size(), 100);
    }

    #[tokio::test]
    async fn test_upload_success_resets_session() {
        let mut h = harness();
        let mut events = h.session.subscribe();
        let before = h.refresh.current();
        record(&mut h, &[100, 120, 110]).await;

        h.session.upload().await.unwrap();

        assert_eq!(h.session.phase(), SessionPhase::Idle);
        assert!(h.session.fragments().is_empty());
        assert!(h.session.artifact().is_none());
        assert_eq!(h.session.upload_progress(), 0);
        assert_eq!(h.session.last_error(), None);
        assert_eq!(h.session.elapsed_secs(), 0);
        assert_eq!(h.refresh.current(), before + 1);

        let records = h.backend.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].size, 330);
        assert!(records[0]
            .original_name
            .as_deref()
            .unwrap()
            .starts_with("recording-"));

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(seen.contains(&SessionEvent::UploadProgress(100)));
        assert!(seen.contains(&SessionEvent::Uploaded));
    }

    #[tokio::test]
    async fn test_upload_failure_keeps_artifact() {
        let mut h = harness();
        record(&mut h, &[100, 120, 110]).await;
        let fragments = h.session.fragments().to_vec();
        let artifact = h.session.artifact().cloned();
        h.backend
            .fail_next(Operation::Upload, ApiError::Rejected(Some("disk full".into())));

        let error = h.session.upload().await.unwrap_err();

        assert_eq!(error, SessionError::Upload("disk full".into()));
        assert_eq!(h.session.phase(), SessionPhase::Stopped);
        assert_eq!(h.session.fragments(), fragments.as_slice());
        assert_eq!(h.session.artifact().cloned(), artifact);
        assert_eq!(h.session.last_error(), Some("Upload failed: disk full"));
        assert_eq!(h.session.upload_progress(), 0);
        assert_eq!(h.refresh.current(), 0);

        // Retry from the start
        h.session.upload().await.unwrap();
        assert_eq!(h.backend.calls(Operation::Upload), 2);
        assert_eq!(h.backend.records().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_recording_is_never_uploaded() {
        let mut h = harness();
        record(&mut h, &[]).await;

        assert_eq!(h.session.phase(), SessionPhase::Stopped);
        assert!(h.session.artifact().is_none());
        assert_eq!(h.session.begin_upload().err(), Some(SessionError::NothingToUpload));
        assert_eq!(h.session.phase(), SessionPhase::Stopped);
        assert_eq!(h.backend.calls(Operation::Upload), 0);
    }

    #[tokio::test]
    async fn test_upload_while_recording_is_rejected() {
        let mut h = harness();
        h.session.start().await.unwrap();

        assert!(matches!(
            h.session.begin_upload(),
            Err(SessionError::InvalidTransition { .. })
        ));
        assert_eq!(h.session.phase(), SessionPhase::Recording);
    }

    #[tokio::test]
    async fn test_download_while_uploading() {
        let mut h = harness();
        record(&mut h, &[64, 64]).await;
        let dir = tempfile::tempdir().unwrap();

        let job = h.session.begin_upload().unwrap();
        assert_eq!(h.session.phase(), SessionPhase::Uploading);

        let path = h.session.download(dir.path()).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("screen-recording-"));
        assert!(name.ends_with(".webm"));
        assert!(!name.contains(':'));
        assert_eq!(std::fs::read(&path).unwrap().len(), 128);
        assert_eq!(h.session.phase(), SessionPhase::Uploading);

        let result = job.run().await;
        h.session.finish_upload(result).unwrap();
        assert_eq!(h.session.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn test_download_requires_artifact() {
        let h = harness();
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            h.session.download(dir.path()).unwrap_err(),
            SessionError::NothingToDownload
        );
    }

    #[tokio::test]
    async fn test_reset_discards_recording() {
        let mut h = harness();
        record(&mut h, &[10]).await;

        h.session.reset();

        assert_eq!(h.session.snapshot().phase, SessionPhase::Idle);
        assert!(h.session.artifact().is_none());
        assert_eq!(h.backend.calls(Operation::Upload), 0);
        h.session.start().await.unwrap();
    }

    #[tokio::test]
    async fn test_upload_result_after_reset_is_ignored() {
        let mut h = harness();
        record(&mut h, &[10]).await;
        let job = h.session.begin_upload().unwrap();

        h.session.reset();
        let result = job.run().await;
        h.session.finish_upload(result).unwrap();

        assert_eq!(h.session.phase(), SessionPhase::Idle);
        assert_eq!(h.refresh.current(), 1);
    }

    #[tokio::test]
    async fn test_teardown_releases_tracks() {
        let h = harness();
        let Harness {
            devices,
            mut session,
            ..
        } = h;
        session.start().await.unwrap();
        assert_eq!(devices.open_track_count(), 3);

        session.teardown();

        assert_eq!(devices.open_track_count(), 0);
        assert!(devices.stop_counts().values().all(|&count| count == 1));
    }

    #[tokio::test]
    async fn test_snapshot() {
        let mut h = harness();
        record(&mut h, &[1536]).await;

        let snapshot = h.session.snapshot();
        assert_eq!(snapshot.phase, SessionPhase::Stopped);
        assert_eq!(snapshot.fragment_count, 1);
        assert_eq!(snapshot.artifact_size, Some(1536));
        assert_eq!(snapshot.elapsed_label, "00:00");
    }
}
