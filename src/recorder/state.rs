//! Recording state management
//!
//! Defines the session phases and the data a finished recording carries.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Current phase of the capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Nothing recorded, ready to start
    #[default]
    Idle,
    /// Waiting on device permission prompts
    RequestingDevices,
    /// Capturing
    Recording,
    /// Finished, artifact available for preview
    Stopped,
    /// Artifact is being sent to the backend
    Uploading,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::RequestingDevices => "requesting devices",
            SessionPhase::Recording => "recording",
            SessionPhase::Stopped => "stopped",
            SessionPhase::Uploading => "uploading",
        };
        f.write_str(name)
    }
}

/// Session errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Cannot {action} while {phase}")]
    InvalidTransition {
        action: &'static str,
        phase: SessionPhase,
    },

    #[error("No recording to upload")]
    NothingToUpload,

    #[error("No recording to download")]
    NothingToDownload,

    #[error("Failed to start recording: {0}")]
    Start(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Failed to save recording: {0}")]
    Save(String),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// One chunk of encoder output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment(Vec<u8>);

impl Fragment {
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// The combined, playable recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    data: Arc<[u8]>,
    mime_type: String,
}

impl Artifact {
    /// Concatenate `fragments` in order
    pub fn from_fragments(fragments: &[Fragment], mime_type: impl Into<String>) -> Self {
        let total = fragments.iter().map(Fragment::len).sum();
        let mut data = Vec::with_capacity(total);
        for fragment in fragments {
            data.extend_from_slice(fragment.as_bytes());
        }
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn data(&self) -> &Arc<[u8]> {
        &self.data
    }
}

/// Frozen output of a stopped recording
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinishedRecording {
    pub fragments: Vec<Fragment>,
    /// Present only when at least one fragment was captured
    pub artifact: Option<Artifact>,
}

impl FinishedRecording {
    pub fn new(fragments: Vec<Fragment>, mime_type: &str) -> Self {
        let artifact = (!fragments.is_empty()).then(|| Artifact::from_fragments(&fragments, mime_type));
        Self {
            fragments,
            artifact,
        }
    }
}

/// Point-in-time view of a session for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub phase: SessionPhase,

    /// Elapsed recording time in whole seconds
    pub elapsed_secs: u64,

    /// `MM:SS` form of `elapsed_secs`
    pub elapsed_label: String,

    pub fragment_count: usize,

    /// Size of the artifact, if one exists
    pub artifact_size: Option<u64>,

    /// Upload progress, 0 to 100
    pub upload_progress: u8,

    pub last_error: Option<String>,
}
