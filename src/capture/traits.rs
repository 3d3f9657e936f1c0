//! Capture trait definitions
//!
//! Platform-agnostic capability traits for screen, microphone and encoder
//! access. A recording session only ever talks to devices through these.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Capture errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Unsupported encoder configuration: {0}")]
    UnsupportedType(String),

    #[error("Encoder error: {0}")]
    Encoder(String),
}

pub type CaptureResult<T> = Result<T, CaptureError>;

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

/// A single live media track.
///
/// Stopping a track releases the underlying hardware. `MediaStream` guarantees
/// `stop` is called at most once per track.
pub trait MediaTrack: Send {
    /// Unique track ID
    fn id(&self) -> &str;

    fn kind(&self) -> TrackKind;

    /// Release the device behind this track
    fn stop(&mut self);
}

/// An ordered set of live tracks.
///
/// Tracks are released when the stream is released or dropped.
#[derive(Default)]
pub struct MediaStream {
    tracks: Vec<Box<dyn MediaTrack>>,
}

impl MediaStream {
    pub fn new(tracks: Vec<Box<dyn MediaTrack>>) -> Self {
        Self { tracks }
    }

    /// Combine the screen tracks with the optional microphone tracks
    pub fn combine(mut screen: MediaStream, microphone: Option<MediaStream>) -> Self {
        let mut tracks = std::mem::take(&mut screen.tracks);
        if let Some(mut mic) = microphone {
            tracks.append(&mut mic.tracks);
        }
        Self { tracks }
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn has_kind(&self, kind: TrackKind) -> bool {
        self.tracks.iter().any(|t| t.kind() == kind)
    }

    pub fn track_ids(&self) -> Vec<String> {
        self.tracks.iter().map(|t| t.id().to_string()).collect()
    }

    /// Stop every track still held. Returns how many were released.
    pub fn release(&mut self) -> usize {
        let count = self.tracks.len();
        for mut track in self.tracks.drain(..) {
            tracing::debug!("Releasing {:?} track {}", track.kind(), track.id());
            track.stop();
        }
        count
    }
}

impl Drop for MediaStream {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStream")
            .field("tracks", &self.track_ids())
            .finish()
    }
}

/// Events delivered by capture devices and encoders
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// One encoded fragment (may be empty)
    Data(Vec<u8>),
    /// Sharing was revoked outside the application
    Ended,
}

/// Sending half of a session's capture event queue
#[derive(Debug, Clone)]
pub struct CaptureEventSink {
    tx: mpsc::UnboundedSender<CaptureEvent>,
}

impl CaptureEventSink {
    pub fn new(tx: mpsc::UnboundedSender<CaptureEvent>) -> Self {
        Self { tx }
    }

    /// Deliver an encoded fragment. Returns false once the session is gone.
    pub fn data(&self, bytes: Vec<u8>) -> bool {
        self.tx.send(CaptureEvent::Data(bytes)).is_ok()
    }

    /// Signal that the capture was ended by the user or the OS
    pub fn ended(&self) -> bool {
        self.tx.send(CaptureEvent::Ended).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Screen capture constraints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayConstraints {
    /// Ideal width in pixels
    pub width: u32,

    /// Ideal height in pixels
    pub height: u32,

    /// Ideal frame rate
    pub frame_rate: u32,

    /// Capture system audio when the platform offers it
    pub system_audio: bool,
}

impl Default for DisplayConstraints {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            frame_rate: 30,
            system_audio: true,
        }
    }
}

/// Microphone constraints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicrophoneConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub sample_rate: u32,
}

impl Default for MicrophoneConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            sample_rate: 44_100,
        }
    }
}

/// Encoder configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncoderOptions {
    /// Negotiated MIME type, e.g. `video/webm;codecs=vp9,opus`
    pub mime_type: String,

    pub video_bits_per_second: u32,

    /// Interval between data events
    pub timeslice: Duration,
}

/// A running media encoder
pub trait MediaEncoder: Send {
    fn mime_type(&self) -> &str;

    /// Begin emitting fragments every timeslice
    fn start(&mut self) -> CaptureResult<()>;

    /// Stop emitting. Only a final fragment queued before this returns is kept.
    fn stop(&mut self);
}

/// Device capability interface
#[async_trait]
pub trait CaptureDevices: Send + Sync {
    /// Prompt for and acquire a screen capture stream.
    ///
    /// `sink` receives `CaptureEvent::Ended` when sharing is revoked.
    async fn acquire_display_capture(
        &self,
        constraints: &DisplayConstraints,
        sink: CaptureEventSink,
    ) -> CaptureResult<MediaStream>;

    /// Acquire a microphone stream
    async fn acquire_microphone(
        &self,
        constraints: &MicrophoneConstraints,
    ) -> CaptureResult<MediaStream>;

    /// Whether an encoder for this MIME type can be created
    fn is_type_supported(&self, mime_type: &str) -> bool;

    /// Create an encoder over `stream` that delivers fragments into `sink`
    fn create_encoder(
        &self,
        stream: &MediaStream,
        options: &EncoderOptions,
        sink: CaptureEventSink,
    ) -> CaptureResult<Box<dyn MediaEncoder>>;
}
