//! Error types and handling
//!
//! Common error type used by the application shell.

use crate::api::ApiError;
use crate::capture::CaptureError;
use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::recorder::SessionError;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Recording error: {0}")]
    Recording(#[from] SessionError),

    #[error("Backend error: {0}")]
    Api(#[from] ApiError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

impl AppError {
    /// Stable code for the error category
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Io(_) => "IO_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Capture(_) => "CAPTURE_ERROR",
            AppError::Recording(_) => "RECORDING_ERROR",
            AppError::Api(_) => "BACKEND_ERROR",
            AppError::Catalog(_) => "CATALOG_ERROR",
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_messages() {
        let error = AppError::from(ApiError::Timeout);
        assert_eq!(error.code(), "BACKEND_ERROR");
        assert_eq!(error.to_string(), "Backend error: Request timed out");

        let error = AppError::from(SessionError::NothingToUpload);
        assert_eq!(error.code(), "RECORDING_ERROR");
    }
}
