//! Screen Recorder Studio - record the screen, keep the recordings on a server.
//!
//! This is the main library crate. It provides the capture session, the
//! recordings backend client, the catalog view and the command layer the
//! binary drives.

pub mod api;
pub mod capture;
pub mod catalog;
pub mod commands;
pub mod config;
pub mod recorder;
pub mod utils;

pub use commands::AppState;
pub use config::ClientConfig;
pub use recorder::{CaptureSession, SessionPhase};
pub use utils::{AppError, AppResult};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber
///
/// `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "screen_recorder_studio=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
