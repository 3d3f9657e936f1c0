//! Catalog commands

use super::AppState;
use crate::api::RecordingId;
use crate::catalog::{CatalogStatus, CatalogView, Prompt, RecordingCard};
use crate::utils::AppResult;
use std::path::{Path, PathBuf};
use tokio::sync::{watch, Mutex};

/// Application state for the recordings list
pub struct CatalogState {
    pub view: Mutex<CatalogView>,
    refresh: Mutex<watch::Receiver<u64>>,
}

impl CatalogState {
    pub fn new(view: CatalogView, refresh: watch::Receiver<u64>) -> Self {
        Self {
            view: Mutex::new(view),
            refresh: Mutex::new(refresh),
        }
    }
}

/// Fetch the catalog if it has never loaded or the refresh token moved
pub async fn sync_catalog(state: &AppState) -> AppResult<bool> {
    let mut refresh = state.catalog.refresh.lock().await;
    let mut view = state.catalog.view.lock().await;
    Ok(view.follow(&mut refresh).await?)
}

/// Fetch the catalog unconditionally
pub async fn refresh_catalog(state: &AppState) -> AppResult<usize> {
    Ok(state.catalog.view.lock().await.load().await?)
}

/// Re-issue the fetch after a failure
pub async fn retry_catalog(state: &AppState) -> AppResult<usize> {
    Ok(state.catalog.view.lock().await.retry().await?)
}

pub async fn catalog_status(state: &AppState) -> CatalogStatus {
    state.catalog.view.lock().await.status().clone()
}

pub async fn list_cards(state: &AppState) -> Vec<RecordingCard> {
    state.catalog.view.lock().await.cards()
}

/// Delete one recording after confirmation
///
/// The view is unlocked while the request runs so other ids can be deleted meanwhile.
pub async fn delete_recording(
    state: &AppState,
    id: &RecordingId,
    prompt: &dyn Prompt,
) -> AppResult<()> {
    let job = state.catalog.view.lock().await.begin_delete(id, prompt)?;
    let result = job.run().await;
    state
        .catalog
        .view
        .lock()
        .await
        .finish_delete(job.id(), result, prompt)?;
    Ok(())
}

/// Download a stored recording into the configured download directory
pub async fn fetch_recording(state: &AppState, filename: &str) -> AppResult<PathBuf> {
    let bytes = state.api.fetch_media(filename).await?;

    let name = Path::new(filename)
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "recording.webm".into());
    let dir = &state.config.download_dir;
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(name);
    tokio::fs::write(&path, &bytes).await?;

    tracing::info!("Fetched {} ({} bytes) to {:?}", filename, bytes.len(), path);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, InMemoryRecordings, MediaUpload, Operation, RecordingsApi, UploadProgress};
    use crate::capture::FakeCaptureDevices;
    use crate::catalog::FETCH_FAILED;
    use crate::config::ClientConfig;
    use crate::utils::AppError;
    use std::sync::Arc;

    struct Yes;

    impl Prompt for Yes {
        fn confirm(&self, _message: &str) -> bool {
            true
        }

        fn alert(&self, _message: &str) {}
    }

    fn state_with(backend: Arc<InMemoryRecordings>, config: ClientConfig) -> AppState {
        AppState::new(config, Arc::new(FakeCaptureDevices::new()), backend)
    }

    async fn seed(backend: &InMemoryRecordings, name: &str, bytes: usize) {
        let upload = MediaUpload {
            file_name: name.to_string(),
            mime_type: "video/webm".to_string(),
            data: vec![3u8; bytes].into(),
        };
        backend.upload(upload, UploadProgress::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_sync_then_retry() {
        let backend = Arc::new(InMemoryRecordings::new("http://localhost:5000"));
        backend.fail_next(Operation::List, ApiError::Timeout);
        let state = state_with(backend.clone(), ClientConfig::default());

        let error = sync_catalog(&state).await.unwrap_err();
        assert!(matches!(error, AppError::Catalog(_)));
        assert_eq!(
            catalog_status(&state).await,
            CatalogStatus::Failed {
                message: FETCH_FAILED.to_string()
            }
        );

        // Same token, nothing re-issued
        assert!(!sync_catalog(&state).await.unwrap());
        assert_eq!(retry_catalog(&state).await.unwrap(), 0);
        assert_eq!(backend.calls(Operation::List), 2);
    }

    #[tokio::test]
    async fn test_delete_and_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(InMemoryRecordings::new("http://localhost:5000"));
        seed(&backend, "recording-1.webm", 40).await;
        seed(&backend, "recording-2.webm", 50).await;
        let config = ClientConfig {
            download_dir: dir.path().to_path_buf(),
            ..ClientConfig::default()
        };
        let state = state_with(backend.clone(), config);
        refresh_catalog(&state).await.unwrap();

        let records = backend.records();
        let path = fetch_recording(&state, &records[1].filename).await.unwrap();
        assert_eq!(std::fs::read(path).unwrap().len(), 50);

        delete_recording(&state, &records[0].id, &Yes).await.unwrap();
        let cards = list_cards(&state).await;
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].id, records[1].id);
    }
}
