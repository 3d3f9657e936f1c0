//! Command handlers
//!
//! This module contains the operations a front end invokes: recording
//! control on the shared capture session and catalog browsing.

pub mod catalog;
pub mod recording;

use crate::api::{HttpRecordingsApi, RecordingsApi};
use crate::capture::CaptureDevices;
use crate::catalog::{CatalogView, RefreshTrigger};
use crate::config::ClientConfig;
use crate::recorder::CaptureSession;
use crate::utils::AppResult;
use std::sync::Arc;

pub use catalog::CatalogState;
pub use recording::RecorderState;

/// Everything the commands share: one session, one catalog and the trigger between them
pub struct AppState {
    pub config: ClientConfig,
    pub api: Arc<dyn RecordingsApi>,
    pub refresh: RefreshTrigger,
    pub recorder: RecorderState,
    pub catalog: CatalogState,
}

impl AppState {
    pub fn new(
        config: ClientConfig,
        devices: Arc<dyn CaptureDevices>,
        api: Arc<dyn RecordingsApi>,
    ) -> Self {
        let refresh = RefreshTrigger::new();
        let session = CaptureSession::new(devices, api.clone()).with_refresh_trigger(refresh.clone());
        let catalog = CatalogView::new(api.clone());

        Self {
            recorder: RecorderState::new(session),
            catalog: CatalogState::new(catalog, refresh.subscribe()),
            config,
            api,
            refresh,
        }
    }

    /// Validate `config` and talk to the backend it names over HTTP
    pub fn connect(config: ClientConfig, devices: Arc<dyn CaptureDevices>) -> AppResult<Self> {
        let config = config.validated()?;
        let api = HttpRecordingsApi::new(&config)?;
        Ok(Self::new(config, devices, Arc::new(api)))
    }
}
