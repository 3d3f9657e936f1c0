//! Recording catalog view
//!
//! Holds the last fetched collection of recordings, re-fetches when the
//! refresh token changes, and deletes single records after confirmation.

use super::card::RecordingCard;
use crate::api::{ApiResult, RecordingId, RecordingRecord, RecordingsApi};
use crate::utils::format::recording_count_label;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

pub const FETCH_FAILED: &str = "Failed to fetch recordings";
pub const DELETE_FAILED: &str = "Failed to delete recording";
pub const DELETE_CONFIRMATION: &str = "Are you sure you want to delete this recording?";

/// Load status of the collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CatalogStatus {
    Loading,
    Failed { message: String },
    Ready,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("{0}")]
    Fetch(String),

    #[error("Delete cancelled")]
    Cancelled,

    #[error("Recording {0} is already being deleted")]
    AlreadyDeleting(RecordingId),

    #[error("{0}")]
    Delete(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Interactive confirmation and alerts
pub trait Prompt: Send + Sync {
    fn confirm(&self, message: &str) -> bool;
    fn alert(&self, message: &str);
}

/// A pending delete, run without borrowing the view
pub struct DeleteJob {
    api: Arc<dyn RecordingsApi>,
    id: RecordingId,
}

impl DeleteJob {
    pub fn id(&self) -> &RecordingId {
        &self.id
    }

    pub async fn run(&self) -> ApiResult<()> {
        self.api.delete(&self.id).await
    }
}

pub struct CatalogView {
    api: Arc<dyn RecordingsApi>,
    records: Vec<RecordingRecord>,
    status: CatalogStatus,
    deleting: HashSet<RecordingId>,
    seen_token: Option<u64>,
}

impl CatalogView {
    pub fn new(api: Arc<dyn RecordingsApi>) -> Self {
        Self {
            api,
            records: Vec::new(),
            status: CatalogStatus::Loading,
            deleting: HashSet::new(),
            seen_token: None,
        }
    }

    pub fn status(&self) -> &CatalogStatus {
        &self.status
    }

    pub fn records(&self) -> &[RecordingRecord] {
        &self.records
    }

    pub fn is_deleting(&self, id: &RecordingId) -> bool {
        self.deleting.contains(id)
    }

    /// Fetch the full collection
    pub async fn load(&mut self) -> CatalogResult<usize> {
        self.status = CatalogStatus::Loading;

        match self.api.list().await {
            Ok(records) => {
                tracing::info!("Fetched {} recordings", records.len());
                self.records = records;
                self.status = CatalogStatus::Ready;
                Ok(self.records.len())
            }
            Err(e) => {
                let message = e.message_or(FETCH_FAILED);
                tracing::warn!("Failed to fetch recordings: {}", e);
                self.status = CatalogStatus::Failed {
                    message: message.clone(),
                };
                Err(CatalogError::Fetch(message))
            }
        }
    }

    /// Re-issue the fetch after a failure
    pub async fn retry(&mut self) -> CatalogResult<usize> {
        tracing::debug!("Retrying catalog fetch");
        self.load().await
    }

    /// Load if `token` differs from the last one seen. Returns whether a fetch was issued.
    pub async fn sync(&mut self, token: u64) -> CatalogResult<bool> {
        if self.seen_token == Some(token) {
            return Ok(false);
        }
        self.seen_token = Some(token);
        self.load().await.map(|_| true)
    }

    /// Sync against the latest value of a refresh subscription
    pub async fn follow(&mut self, refresh: &mut watch::Receiver<u64>) -> CatalogResult<bool> {
        let token = *refresh.borrow_and_update();
        self.sync(token).await
    }

    /// Confirm and mark `id` as deleting
    pub fn begin_delete(&mut self, id: &RecordingId, prompt: &dyn Prompt) -> CatalogResult<DeleteJob> {
        if self.deleting.contains(id) {
            tracing::debug!("Delete of recording {} already pending", id);
            return Err(CatalogError::AlreadyDeleting(id.clone()));
        }
        if !prompt.confirm(DELETE_CONFIRMATION) {
            return Err(CatalogError::Cancelled);
        }

        self.deleting.insert(id.clone());
        Ok(DeleteJob {
            api: self.api.clone(),
            id: id.clone(),
        })
    }

    /// Apply the outcome of a delete started with [`begin_delete`](Self::begin_delete)
    pub fn finish_delete(
        &mut self,
        id: &RecordingId,
        result: ApiResult<()>,
        prompt: &dyn Prompt,
    ) -> CatalogResult<()> {
        self.deleting.remove(id);

        match result {
            Ok(()) => {
                self.records.retain(|record| &record.id != id);
                tracing::info!("Deleted recording {}", id);
                Ok(())
            }
            Err(e) => {
                let message = e.message_or(DELETE_FAILED);
                tracing::warn!("Failed to delete recording {}: {}", id, e);
                prompt.alert(&message);
                Err(CatalogError::Delete(message))
            }
        }
    }

    pub async fn delete(&mut self, id: &RecordingId, prompt: &dyn Prompt) -> CatalogResult<()> {
        let job = self.begin_delete(id, prompt)?;
        let result = job.run().await;
        self.finish_delete(job.id(), result, prompt)
    }

    pub fn cards(&self) -> Vec<RecordingCard> {
        self.records
            .iter()
            .map(|record| {
                RecordingCard::new(record, self.api.as_ref(), self.deleting.contains(&record.id))
            })
            .collect()
    }

    pub fn count_label(&self) -> String {
        recording_count_label(self.records.len())
    }
}
