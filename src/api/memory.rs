//! In-process recordings backend
//!
//! Implements `RecordingsApi` against a local store. Failures can be queued
//! per operation and every call is counted.

use super::client::RecordingsApi;
use super::progress::{UploadProgress, UPLOAD_CHUNK_SIZE};
use super::types::{ApiError, ApiResult, MediaUpload, RecordingId, RecordingRecord};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// Backend operations, for failure injection and call counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    Upload,
    Delete,
    FetchMedia,
}

#[derive(Default)]
struct Store {
    records: Vec<RecordingRecord>,
    files: HashMap<String, Vec<u8>>,
    next_id: u64,
    failures: HashMap<Operation, VecDeque<ApiError>>,
    calls: HashMap<Operation, usize>,
}

impl Store {
    fn enter(&mut self, op: Operation) -> ApiResult<()> {
        *self.calls.entry(op).or_default() += 1;
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

pub struct InMemoryRecordings {
    base_url: String,
    store: Mutex<Store>,
}

impl InMemoryRecordings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            store: Mutex::new(Store {
                next_id: 1,
                ..Store::default()
            }),
        }
    }

    /// Seed the store with existing records
    pub fn with_records(self, records: Vec<RecordingRecord>) -> Self {
        {
            let mut store = self.store.lock();
            let highest = records
                .iter()
                .filter_map(|r| r.id.as_str().parse::<u64>().ok())
                .max()
                .unwrap_or(0);
            store.next_id = store.next_id.max(highest + 1);
            store.records = records;
        }
        self
    }

    /// Make the next call of `op` fail with `error`
    pub fn fail_next(&self, op: Operation, error: ApiError) {
        self.store.lock().failures.entry(op).or_default().push_back(error);
    }

    pub fn calls(&self, op: Operation) -> usize {
        self.store.lock().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn records(&self) -> Vec<RecordingRecord> {
        self.store.lock().records.clone()
    }

    pub fn stored_bytes(&self, filename: &str) -> Option<Vec<u8>> {
        self.store.lock().files.get(filename).cloned()
    }
}

#[async_trait]
impl RecordingsApi for InMemoryRecordings {
    async fn list(&self) -> ApiResult<Vec<RecordingRecord>> {
        let mut store = self.store.lock();
        store.enter(Operation::List)?;
        Ok(store.records.clone())
    }

    async fn upload(&self, upload: MediaUpload, progress: UploadProgress) -> ApiResult<()> {
        let mut store = self.store.lock();
        store.enter(Operation::Upload)?;

        let total = upload.size();
        let mut sent = 0u64;
        for chunk in upload.data.chunks(UPLOAD_CHUNK_SIZE) {
            sent += chunk.len() as u64;
            progress.record(sent, total);
        }
        progress.record(total, total);

        let created_at = Utc::now();
        let filename = format!("{}-{}", created_at.timestamp_millis(), upload.file_name);
        let id = RecordingId::from(store.next_id);
        store.next_id += 1;

        store.files.insert(filename.clone(), upload.data.to_vec());
        store.records.push(RecordingRecord {
            id,
            filename,
            original_name: Some(upload.file_name),
            size: total,
            created_at: created_at.into(),
            mimetype: Some(upload.mime_type),
        });
        Ok(())
    }

    async fn delete(&self, id: &RecordingId) -> ApiResult<()> {
        let mut store = self.store.lock();
        store.enter(Operation::Delete)?;

        let index = store
            .records
            .iter()
            .position(|r| &r.id == id)
            .ok_or_else(|| ApiError::Status {
                status: 404,
                message: Some("Recording not found".to_string()),
            })?;
        let record = store.records.remove(index);
        store.files.remove(&record.filename);
        Ok(())
    }

    async fn fetch_media(&self, filename: &str) -> ApiResult<Vec<u8>> {
        let mut store = self.store.lock();
        store.enter(Operation::FetchMedia)?;
        store
            .files
            .get(filename)
            .cloned()
            .ok_or(ApiError::Status {
                status: 404,
                message: None,
            })
    }

    fn media_url(&self, filename: &str) -> String {
        format!(
            "{}/uploads/{}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(filename)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(bytes: usize) -> MediaUpload {
        MediaUpload {
            file_name: "recording-1.webm".to_string(),
            mime_type: "video/webm".to_string(),
            data: vec![0u8; bytes].into(),
        }
    }

    #[tokio::test]
    async fn test_upload_then_list_and_fetch() {
        let backend = InMemoryRecordings::new("http://localhost:5000");
        backend.upload(upload(330), UploadProgress::new()).await.unwrap();

        let records = backend.list().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].size, 330);
        assert_eq!(records[0].original_name.as_deref(), Some("recording-1.webm"));

        let bytes = backend.fetch_media(&records[0].filename).await.unwrap();
        assert_eq!(bytes.len(), 330);
    }

    #[tokio::test]
    async fn test_queued_failure_is_consumed_once() {
        let backend = InMemoryRecordings::new("http://localhost:5000");
        backend.fail_next(Operation::List, ApiError::Rejected(None));

        assert!(backend.list().await.is_err());
        assert!(backend.list().await.is_ok());
        assert_eq!(backend.calls(Operation::List), 2);
    }

    #[tokio::test]
    async fn test_delete_unknown_id() {
        let backend = InMemoryRecordings::new("http://localhost:5000");
        let error = backend.delete(&RecordingId::from(3)).await.unwrap_err();
        assert_eq!(error.server_message(), Some("Recording not found"));
    }
}
