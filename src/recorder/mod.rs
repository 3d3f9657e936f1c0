//! Recording system module
//!
//! The capture session state machine and the data a recording produces:
//! - `CaptureSession` drives idle, requesting devices, recording, stopped and uploading
//! - `state` holds phases, fragments, the artifact and session errors

pub mod session;
pub mod state;

pub use session::{CaptureSession, SessionEvent, UploadJob, ENCODER_TIMESLICE, TICK_INTERVAL};
pub use state::{
    Artifact, FinishedRecording, Fragment, SessionError, SessionPhase, SessionResult,
    SessionSnapshot,
};
