//! Capture devices
//!
//! This module provides the device capability traits, encoder negotiation,
//! an ffmpeg-backed native implementation and an in-memory fake.

pub mod codec;
pub mod fake;
pub mod ffmpeg;
pub mod traits;

// Re-export traits
pub use traits::{
    CaptureDevices, CaptureError, CaptureEvent, CaptureEventSink, CaptureResult,
    DisplayConstraints, EncoderOptions, MediaEncoder, MediaStream, MediaTrack,
    MicrophoneConstraints, TrackKind,
};

pub use fake::FakeCaptureDevices;
pub use ffmpeg::{FfmpegCapture, InputSpec};
