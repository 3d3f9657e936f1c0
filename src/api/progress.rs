//! Upload progress tracking

use futures::Stream;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Size of each chunk handed to the HTTP body
pub const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

type ProgressListener = Arc<dyn Fn(u8) + Send + Sync>;

/// Shared, monotonically non-decreasing upload percentage
#[derive(Clone, Default)]
pub struct UploadProgress {
    percent: Arc<AtomicU8>,
    listener: Option<ProgressListener>,
}

impl UploadProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `listener` every time the percentage increases
    pub fn with_listener<F>(listener: F) -> Self
    where
        F: Fn(u8) + Send + Sync + 'static,
    {
        Self {
            percent: Arc::default(),
            listener: Some(Arc::new(listener)),
        }
    }

    pub fn percent(&self) -> u8 {
        self.percent.load(Ordering::SeqCst)
    }

    /// Record that `loaded` of `total` bytes have been sent
    pub fn record(&self, loaded: u64, total: u64) {
        let percent = percent_of(loaded, total);
        let previous = self.percent.fetch_max(percent, Ordering::SeqCst);
        if percent > previous {
            if let Some(listener) = &self.listener {
                listener(percent);
            }
        }
    }
}

impl std::fmt::Debug for UploadProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadProgress")
            .field("percent", &self.percent())
            .finish()
    }
}

/// `loaded / total` as a rounded percentage in 0..=100
pub fn percent_of(loaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let loaded = loaded.min(total) as u128;
    let total = total as u128;
    ((loaded * 100 + total / 2) / total) as u8
}

/// Stream `data` in chunks, recording progress as each chunk is handed off
pub fn body_stream(
    data: Arc<[u8]>,
    progress: UploadProgress,
) -> impl Stream<Item = Result<Vec<u8>, std::io::Error>> + Send + 'static {
    let total = data.len() as u64;
    futures::stream::unfold(0usize, move |offset| {
        let data = data.clone();
        let progress = progress.clone();
        async move {
            if offset >= data.len() {
                progress.record(total, total);
                return None;
            }
            let end = (offset + UPLOAD_CHUNK_SIZE).min(data.len());
            let chunk = data[offset..end].to_vec();
            progress.record(end as u64, total);
            Some((Ok::<_, std::io::Error>(chunk), end))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use parking_lot::Mutex;

    #[test]
    fn test_percent_rounding() {
        assert_eq!(percent_of(0, 200), 0);
        assert_eq!(percent_of(1, 200), 1);
        assert_eq!(percent_of(99, 200), 50);
        assert_eq!(percent_of(200, 200), 100);
        assert_eq!(percent_of(500, 200), 100);
        assert_eq!(percent_of(0, 0), 100);
    }

    #[test]
    fn test_progress_never_decreases() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let progress = UploadProgress::with_listener(move |p| sink.lock().push(p));

        progress.record(50, 100);
        progress.record(20, 100);
        progress.record(50, 100);
        progress.record(100, 100);

        assert_eq!(progress.percent(), 100);
        assert_eq!(*seen.lock(), vec![50, 100]);
    }

    #[tokio::test]
    async fn test_body_stream_reports_all_bytes() {
        let data: Arc<[u8]> = vec![7u8; UPLOAD_CHUNK_SIZE * 2 + 10].into();
        let progress = UploadProgress::new();

        let chunks: Vec<Vec<u8>> = body_stream(data.clone(), progress.clone())
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.iter().map(Vec::len).sum::<usize>(), data.len());
        assert_eq!(chunks[2].len(), 10);
        assert_eq!(progress.percent(), 100);
    }
}
