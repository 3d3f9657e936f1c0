//! In-memory capture devices
//!
//! Stands in for real hardware: fragments and sharing revocation are emitted
//! on command, and every track records how often it was stopped.

use super::traits::{
    CaptureDevices, CaptureError, CaptureEventSink, CaptureResult, DisplayConstraints,
    EncoderOptions, MediaEncoder, MediaStream, MediaTrack, MicrophoneConstraints, TrackKind,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct FakeState {
    display_error: Option<CaptureError>,
    microphone_error: Option<CaptureError>,
    encoder_error: Option<CaptureError>,
    supported: Option<Vec<String>>,
    display_sink: Option<CaptureEventSink>,
    encoder_sink: Option<CaptureEventSink>,
    encoder_options: Option<EncoderOptions>,
    flush_on_stop: Option<Vec<u8>>,
    hold_display: bool,
    display_requests: usize,
    microphone_requests: usize,
    stops: HashMap<String, Arc<AtomicUsize>>,
    encoder_running: bool,
}

/// Scriptable capture devices
#[derive(Clone, Default)]
pub struct FakeCaptureDevices {
    state: Arc<Mutex<FakeState>>,
}

impl FakeCaptureDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the display prompt fail (e.g. user dismissed it)
    pub fn fail_display(self, error: CaptureError) -> Self {
        self.state.lock().display_error = Some(error);
        self
    }

    pub fn fail_microphone(self, error: CaptureError) -> Self {
        self.state.lock().microphone_error = Some(error);
        self
    }

    pub fn fail_encoder(self, error: CaptureError) -> Self {
        self.state.lock().encoder_error = Some(error);
        self
    }

    /// Restrict the MIME types reported as supported. All are supported by default.
    pub fn supporting(self, mime_types: &[&str]) -> Self {
        self.state.lock().supported = Some(mime_types.iter().map(|m| m.to_string()).collect());
        self
    }

    /// Leave the display prompt unanswered forever
    pub fn hold_display(self) -> Self {
        self.state.lock().hold_display = true;
        self
    }

    /// Fragment delivered by the encoder when it is stopped
    pub fn flush_on_stop(self, bytes: Vec<u8>) -> Self {
        self.state.lock().flush_on_stop = Some(bytes);
        self
    }

    /// Deliver one encoded fragment. Returns false if no encoder is running.
    pub fn emit_fragment(&self, bytes: Vec<u8>) -> bool {
        let state = self.state.lock();
        match (&state.encoder_sink, state.encoder_running) {
            (Some(sink), true) => sink.data(bytes),
            _ => false,
        }
    }

    /// Simulate the user stopping the share from the OS
    pub fn revoke_sharing(&self) -> bool {
        let state = self.state.lock();
        state.display_sink.as_ref().map(|s| s.ended()).unwrap_or(false)
    }

    /// Number of times each track has been stopped, by track ID
    pub fn stop_counts(&self) -> HashMap<String, usize> {
        self.state
            .lock()
            .stops
            .iter()
            .map(|(id, count)| (id.clone(), count.load(Ordering::SeqCst)))
            .collect()
    }

    pub fn open_track_count(&self) -> usize {
        self.stop_counts().values().filter(|&&c| c == 0).count()
    }

    pub fn display_requests(&self) -> usize {
        self.state.lock().display_requests
    }

    pub fn microphone_requests(&self) -> usize {
        self.state.lock().microphone_requests
    }

    /// Options the most recent encoder was created with
    pub fn encoder_options(&self) -> Option<EncoderOptions> {
        self.state.lock().encoder_options.clone()
    }

    pub fn encoder_running(&self) -> bool {
        self.state.lock().encoder_running
    }

    fn new_track(&self, prefix: &str, kind: TrackKind) -> Box<dyn MediaTrack> {
        let id = format!("{}-{}", prefix, uuid::Uuid::new_v4());
        let stops = Arc::new(AtomicUsize::new(0));
        self.state.lock().stops.insert(id.clone(), stops.clone());
        Box::new(FakeTrack { id, kind, stops })
    }
}

#[async_trait]
impl CaptureDevices for FakeCaptureDevices {
    async fn acquire_display_capture(
        &self,
        constraints: &DisplayConstraints,
        sink: CaptureEventSink,
    ) -> CaptureResult<MediaStream> {
        let hold = {
            let mut state = self.state.lock();
            state.display_requests += 1;
            if let Some(error) = state.display_error.clone() {
                return Err(error);
            }
            state.display_sink = Some(sink);
            state.hold_display
        };
        if hold {
            std::future::pending::<()>().await;
        }

        let mut tracks = vec![self.new_track("screen-video", TrackKind::Video)];
        if constraints.system_audio {
            tracks.push(self.new_track("screen-audio", TrackKind::Audio));
        }
        Ok(MediaStream::new(tracks))
    }

    async fn acquire_microphone(
        &self,
        _constraints: &MicrophoneConstraints,
    ) -> CaptureResult<MediaStream> {
        {
            let mut state = self.state.lock();
            state.microphone_requests += 1;
            if let Some(error) = state.microphone_error.clone() {
                return Err(error);
            }
        }
        Ok(MediaStream::new(vec![self.new_track("mic", TrackKind::Audio)]))
    }

    fn is_type_supported(&self, mime_type: &str) -> bool {
        match &self.state.lock().supported {
            Some(list) => list.iter().any(|m| m == mime_type),
            None => true,
        }
    }

    fn create_encoder(
        &self,
        _stream: &MediaStream,
        options: &EncoderOptions,
        sink: CaptureEventSink,
    ) -> CaptureResult<Box<dyn MediaEncoder>> {
        let mut state = self.state.lock();
        if let Some(error) = state.encoder_error.clone() {
            return Err(error);
        }
        state.encoder_sink = Some(sink);
        state.encoder_options = Some(options.clone());
        Ok(Box::new(FakeEncoder {
            mime_type: options.mime_type.clone(),
            devices: self.clone(),
        }))
    }
}

struct FakeTrack {
    id: String,
    kind: TrackKind,
    stops: Arc<AtomicUsize>,
}

impl MediaTrack for FakeTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeEncoder {
    mime_type: String,
    devices: FakeCaptureDevices,
}

impl MediaEncoder for FakeEncoder {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn start(&mut self) -> CaptureResult<()> {
        self.devices.state.lock().encoder_running = true;
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = self.devices.state.lock();
        if !state.encoder_running {
            return;
        }
        let flush = state.flush_on_stop.take();
        if let (Some(bytes), Some(sink)) = (flush, state.encoder_sink.as_ref()) {
            sink.data(bytes);
        }
        state.encoder_running = false;
    }
}
