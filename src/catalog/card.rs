//! Presentation of one recording record

use crate::api::{CreatedAt, RecordingId, RecordingRecord, RecordingsApi};
use crate::utils::format::{format_file_size, format_local_timestamp};
use serde::{Deserialize, Serialize};

/// Display fields for one catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingCard {
    pub id: RecordingId,
    pub title: String,
    pub size_label: String,
    pub created_label: String,
    pub mimetype: Option<String>,
    pub media_url: String,
    /// A delete for this record is in flight
    pub deleting: bool,
}

impl RecordingCard {
    pub fn new(record: &RecordingRecord, api: &dyn RecordingsApi, deleting: bool) -> Self {
        Self {
            id: record.id.clone(),
            title: record.display_name().to_string(),
            size_label: format_file_size(record.size),
            created_label: match &record.created_at {
                CreatedAt::At(at) => format_local_timestamp(at),
                CreatedAt::Unparsed(text) => text.clone(),
            },
            mimetype: record.mimetype.clone(),
            media_url: api.media_url(&record.filename),
            deleting,
        }
    }
}
