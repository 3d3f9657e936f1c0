//! Backend wire types
//!
//! Every endpoint answers with `{ success, data?, error? }`.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::convert::Infallible;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Multipart field carrying the uploaded media
pub const UPLOAD_FIELD: &str = "recording";

/// Backend errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("{0}")]
    Transport(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Request failed with status code {status}")]
    Status { status: u16, message: Option<String> },

    #[error("{}", .0.as_deref().unwrap_or("Request was rejected by the server"))]
    Rejected(Option<String>),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// Error text supplied by the server, if any
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Status { message, .. } | ApiError::Rejected(message) => message.as_deref(),
            _ => None,
        }
    }

    /// Server-provided text, or `fallback` when the server gave none
    pub fn message_or(&self, fallback: &str) -> String {
        self.server_message().unwrap_or(fallback).to_string()
    }

    /// Server-provided text, or this error's own description
    pub fn describe(&self) -> String {
        match self.server_message() {
            Some(message) => message.to_string(),
            None => self.to_string(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Response envelope shared by all endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(data: Option<T>) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    pub fn into_result(self) -> ApiResult<Option<T>> {
        if self.success {
            Ok(self.data)
        } else {
            Err(ApiError::Rejected(self.error))
        }
    }
}

/// Opaque record identifier. The backend may send it as a string or a number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RecordingId(String);

impl RecordingId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for RecordingId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for RecordingId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for RecordingId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(serde_json::Number),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(id) => Self(id),
            RawId::Number(id) => Self(id.to_string()),
        })
    }
}

/// Creation time of a record as the server sent it
///
/// Offset-less timestamps are read as UTC. Anything unparseable is kept
/// verbatim so one bad record does not fail the whole list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreatedAt {
    At(DateTime<Utc>),
    Unparsed(String),
}

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

impl CreatedAt {
    pub fn parse(text: &str) -> Self {
        if let Ok(at) = DateTime::parse_from_rfc3339(text) {
            return CreatedAt::At(at.with_timezone(&Utc));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
            .map(|naive| CreatedAt::At(naive.and_utc()))
            .unwrap_or_else(|| CreatedAt::Unparsed(text.to_string()))
    }

    pub fn as_datetime(&self) -> Option<&DateTime<Utc>> {
        match self {
            CreatedAt::At(at) => Some(at),
            CreatedAt::Unparsed(_) => None,
        }
    }
}

impl From<DateTime<Utc>> for CreatedAt {
    fn from(at: DateTime<Utc>) -> Self {
        CreatedAt::At(at)
    }
}

impl FromStr for CreatedAt {
    type Err = Infallible;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(text))
    }
}

impl Serialize for CreatedAt {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            CreatedAt::At(at) => at.serialize(serializer),
            CreatedAt::Unparsed(text) => serializer.serialize_str(text),
        }
    }
}

impl<'de> Deserialize<'de> for CreatedAt {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawTime {
            Text(String),
            Millis(i64),
            Other(serde_json::Value),
        }

        Ok(match RawTime::deserialize(deserializer)? {
            RawTime::Text(text) => Self::parse(&text),
            RawTime::Millis(millis) => DateTime::from_timestamp_millis(millis)
                .map(CreatedAt::At)
                .unwrap_or_else(|| CreatedAt::Unparsed(millis.to_string())),
            RawTime::Other(value) => CreatedAt::Unparsed(value.to_string()),
        })
    }
}

/// Server-held metadata for one uploaded recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingRecord {
    pub id: RecordingId,

    /// Stored filename, used to build the media URL
    pub filename: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,

    /// Size in bytes
    pub size: u64,

    pub created_at: CreatedAt,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
}

impl RecordingRecord {
    /// Name shown to the user
    pub fn display_name(&self) -> &str {
        self.original_name.as_deref().unwrap_or(&self.filename)
    }
}

/// One media upload
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub file_name: String,
    pub mime_type: String,
    pub data: Arc<[u8]>,
}

impl MediaUpload {
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}
