//! Recordings backend
//!
//! The HTTP contract (list, upload, delete, fetch media) behind the
//! `RecordingsApi` trait, plus an in-process implementation.

pub mod client;
pub mod memory;
pub mod progress;
pub mod types;

pub use client::{HttpRecordingsApi, RecordingsApi};
pub use memory::{InMemoryRecordings, Operation};
pub use progress::UploadProgress;
pub use types::{
    ApiEnvelope, ApiError, ApiResult, CreatedAt, MediaUpload, RecordingId, RecordingRecord,
};
