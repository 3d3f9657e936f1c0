use anyhow::Context;
use clap::{Parser, Subcommand};
use screen_recorder_studio::api::RecordingId;
use screen_recorder_studio::capture::{CaptureDevices, FfmpegCapture, InputSpec};
use screen_recorder_studio::catalog::Prompt;
use screen_recorder_studio::commands::{catalog, recording, AppState};
use screen_recorder_studio::config::{
    ClientConfig, API_URL_ENV, DEFAULT_API_URL, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_UPLOAD_TIMEOUT_SECS,
};
use screen_recorder_studio::recorder::SessionEvent;
use screen_recorder_studio::utils::format::format_elapsed;
use std::collections::HashSet;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "screen-recorder-studio")]
#[command(version)]
#[command(about = "Record the screen and manage recordings stored on a backend")]
struct Args {
    /// Backend base URL
    #[arg(long, env = API_URL_ENV, default_value = DEFAULT_API_URL)]
    api_url: String,

    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    request_timeout_secs: u64,

    #[arg(long, default_value_t = DEFAULT_UPLOAD_TIMEOUT_SECS)]
    upload_timeout_secs: u64,

    /// Where recordings are saved locally
    #[arg(long, default_value = ".")]
    download_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record until Ctrl-C, the time limit, or the share is stopped
    Record {
        /// Stop after this many seconds
        #[arg(long)]
        seconds: Option<u64>,

        /// Upload instead of saving locally
        #[arg(long)]
        upload: bool,

        /// Record without the microphone
        #[arg(long)]
        no_mic: bool,
    },
    /// List uploaded recordings
    List,
    /// Delete an uploaded recording
    Delete {
        id: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Download an uploaded recording by stored filename
    Fetch { filename: String },
}

struct TerminalPrompt {
    assume_yes: bool,
}

impl Prompt for TerminalPrompt {
    fn confirm(&self, message: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        print!("{} [y/N] ", message);
        let _ = std::io::stdout().flush();

        let mut answer = String::new();
        if std::io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
    }

    fn alert(&self, message: &str) {
        eprintln!("{}", message);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    screen_recorder_studio::init_tracing();

    let args = Args::parse();
    tracing::info!("Starting Screen Recorder Studio v{}", env!("CARGO_PKG_VERSION"));

    let config = ClientConfig {
        api_base_url: args.api_url,
        request_timeout_secs: args.request_timeout_secs,
        upload_timeout_secs: args.upload_timeout_secs,
        download_dir: args.download_dir,
    };

    let devices: Arc<dyn CaptureDevices> = match &args.command {
        Command::Record { no_mic, .. } => {
            let capture = FfmpegCapture::detect()
                .await
                .context("Screen capture is unavailable")?;
            if *no_mic {
                Arc::new(capture.without_microphone())
            } else {
                Arc::new(capture)
            }
        }
        // Never asked to capture
        _ => Arc::new(FfmpegCapture::new(
            "ffmpeg",
            InputSpec::default_screen(),
            HashSet::new(),
        )),
    };

    let state = AppState::connect(config, devices)?;

    match args.command {
        Command::Record {
            seconds, upload, ..
        } => record(&state, seconds, upload).await,
        Command::List => list(&state).await,
        Command::Delete { id, yes } => {
            let prompt = TerminalPrompt { assume_yes: yes };
            catalog::delete_recording(&state, &RecordingId::new(id.clone()), &prompt).await?;
            println!("Deleted recording {}", id);
            Ok(())
        }
        Command::Fetch { filename } => {
            let path = catalog::fetch_recording(&state, &filename).await?;
            println!("Saved {}", path.display());
            Ok(())
        }
    }
}

async fn record(state: &AppState, seconds: Option<u64>, upload: bool) -> anyhow::Result<()> {
    let mut events = recording::subscribe_recorder(state).await;
    recording::start_recording(state).await?;
    eprintln!("Recording. Press Ctrl-C to stop.");

    let limit = async {
        match seconds {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(limit);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = &mut limit => break,
            recording = recording::pump_recording(state) => {
                if !recording {
                    eprintln!();
                    eprintln!("Screen sharing ended");
                    break;
                }
            }
        }
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::Tick(secs) = event {
                eprint!("\r{}", format_elapsed(secs));
            }
        }
    }

    let snapshot = recording::stop_recording(state).await?;
    eprintln!();
    let Some(size) = snapshot.artifact_size else {
        println!("Nothing was recorded");
        recording::reset_recording(state).await?;
        return Ok(());
    };
    eprintln!("Recorded {} ({} bytes)", snapshot.elapsed_label, size);

    if upload {
        let printer = tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                match event {
                    SessionEvent::UploadProgress(percent) => eprint!("\rUploading {}%", percent),
                    SessionEvent::Uploaded | SessionEvent::Error(_) => break,
                    _ => {}
                }
            }
        });
        let result = recording::upload_recording(state).await;
        printer.abort();
        eprintln!();

        match result {
            Ok(_) => {
                println!("Recording uploaded");
                return Ok(());
            }
            Err(e) => eprintln!("{}. Saving locally instead.", e),
        }
    }

    let path = recording::download_recording(state).await?;
    println!("Saved {}", path.display());
    Ok(())
}

async fn list(state: &AppState) -> anyhow::Result<()> {
    catalog::sync_catalog(state).await?;
    let view = state.catalog.view.lock().await;

    println!("{}", view.count_label());
    for card in view.cards() {
        println!(
            "{}\t{}\t{}\t{}\t{}",
            card.id, card.title, card.size_label, card.created_label, card.media_url
        );
    }
    Ok(())
}
