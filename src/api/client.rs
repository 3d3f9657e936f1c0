//! Recordings backend client

use super::progress::{body_stream, UploadProgress};
use super::types::{
    ApiEnvelope, ApiError, ApiResult, MediaUpload, RecordingId, RecordingRecord, UPLOAD_FIELD,
};
use crate::config::ClientConfig;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Backend operations the client relies on
#[async_trait]
pub trait RecordingsApi: Send + Sync {
    /// Fetch the full collection
    async fn list(&self) -> ApiResult<Vec<RecordingRecord>>;

    /// Upload one recording as a single multipart POST
    async fn upload(&self, upload: MediaUpload, progress: UploadProgress) -> ApiResult<()>;

    async fn delete(&self, id: &RecordingId) -> ApiResult<()>;

    /// Raw bytes of a stored recording
    async fn fetch_media(&self, filename: &str) -> ApiResult<Vec<u8>>;

    /// URL the stored recording is served from
    fn media_url(&self, filename: &str) -> String;
}

/// `RecordingsApi` over HTTP
#[derive(Clone)]
pub struct HttpRecordingsApi {
    client: reqwest::Client,
    base_url: String,
    upload_timeout: Duration,
}

impl HttpRecordingsApi {
    pub fn new(config: &ClientConfig) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;

        tracing::info!("Using recordings backend at {}", config.api_base_url);

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            upload_timeout: config.upload_timeout(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self) -> String {
        format!("{}/", self.base_url)
    }

    fn record_url(&self, id: &RecordingId) -> String {
        format!(
            "{}/api/recordings/{}",
            self.base_url,
            urlencoding::encode(id.as_str())
        )
    }
}

fn transport_error(error: reqwest::Error) -> ApiError {
    if error.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Transport(error.to_string())
    }
}

/// Decode an envelope, turning non-2xx statuses into `ApiError::Status`
async fn read_envelope<T: DeserializeOwned>(
    response: reqwest::Response,
) -> ApiResult<ApiEnvelope<T>> {
    let status = response.status();
    let body = response.text().await.map_err(transport_error)?;

    if !status.is_success() {
        let message = serde_json::from_str::<ApiEnvelope<serde_json::Value>>(&body)
            .ok()
            .and_then(|envelope| envelope.error);
        return Err(ApiError::Status {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_str(&body).map_err(|e| ApiError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl RecordingsApi for HttpRecordingsApi {
    async fn list(&self) -> ApiResult<Vec<RecordingRecord>> {
        let response = self
            .client
            .get(self.collection_url())
            .send()
            .await
            .map_err(transport_error)?;

        let envelope: ApiEnvelope<Vec<RecordingRecord>> = read_envelope(response).await?;
        let records = envelope.into_result()?.unwrap_or_default();
        tracing::debug!("Fetched {} recordings", records.len());
        Ok(records)
    }

    async fn upload(&self, upload: MediaUpload, progress: UploadProgress) -> ApiResult<()> {
        let total = upload.size();
        let body = reqwest::Body::wrap_stream(body_stream(upload.data.clone(), progress));
        let part = reqwest::multipart::Part::stream_with_length(body, total)
            .file_name(upload.file_name.clone())
            .mime_str(&upload.mime_type)
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part(UPLOAD_FIELD, part);

        tracing::info!("Uploading {} ({} bytes)", upload.file_name, total);

        let response = self
            .client
            .post(self.collection_url())
            .multipart(form)
            .timeout(self.upload_timeout)
            .send()
            .await
            .map_err(transport_error)?;

        let envelope: ApiEnvelope<serde_json::Value> = read_envelope(response).await?;
        envelope.into_result()?;
        Ok(())
    }

    async fn delete(&self, id: &RecordingId) -> ApiResult<()> {
        let response = self
            .client
            .delete(self.record_url(id))
            .send()
            .await
            .map_err(transport_error)?;

        let envelope: ApiEnvelope<serde_json::Value> = read_envelope(response).await?;
        envelope.into_result()?;
        Ok(())
    }

    async fn fetch_media(&self, filename: &str) -> ApiResult<Vec<u8>> {
        let response = self
            .client
            .get(self.media_url(filename))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: None,
            });
        }
        let bytes = response.bytes().await.map_err(transport_error)?;
        Ok(bytes.to_vec())
    }

    fn media_url(&self, filename: &str) -> String {
        format!("{}/uploads/{}", self.base_url, urlencoding::encode(filename))
    }
}
