//! FFmpeg-backed capture devices
//!
//! Screen (and optionally microphone) input is grabbed by an `ffmpeg` child
//! process that muxes WebM to stdout. Stdout is collected and handed to the
//! session as one fragment per timeslice. The process exiting on its own
//! (e.g. the display went away) is reported as sharing revoked.

use super::codec;
use super::traits::{
    CaptureDevices, CaptureError, CaptureEventSink, CaptureResult, DisplayConstraints,
    EncoderOptions, MediaEncoder, MediaStream, MediaTrack, MicrophoneConstraints, TrackKind,
};
use async_trait::async_trait;
use parking_lot::Mutex as ParkingMutex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// An ffmpeg input device (`-f <format> -i <target>`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSpec {
    pub format: String,
    pub target: String,
}

impl InputSpec {
    pub fn new(format: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            target: target.into(),
        }
    }

    /// Default screen grabber for the current platform
    pub fn default_screen() -> Self {
        #[cfg(target_os = "macos")]
        {
            Self::new("avfoundation", "1:none")
        }

        #[cfg(target_os = "windows")]
        {
            Self::new("gdigrab", "desktop")
        }

        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        {
            let display = std::env::var("DISPLAY").unwrap_or_else(|_| ":0.0".to_string());
            Self::new("x11grab", display)
        }
    }

    /// Default microphone input, if the platform has a name-independent one
    pub fn default_microphone() -> Option<Self> {
        #[cfg(target_os = "macos")]
        {
            Some(Self::new("avfoundation", "none:0"))
        }

        #[cfg(target_os = "windows")]
        {
            // dshow needs the device's friendly name
            None
        }

        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        {
            Some(Self::new("pulse", "default"))
        }
    }
}

/// Shared handle to the capture process, owned jointly by all tracks
#[derive(Default)]
struct ProcessSlot {
    child: Option<Child>,
    released: bool,
}

impl ProcessSlot {
    fn kill(&mut self) {
        self.released = true;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                tracing::debug!("ffmpeg already exited: {}", e);
            }
        }
    }
}

type SharedSlot = Arc<ParkingMutex<ProcessSlot>>;

#[derive(Default)]
struct PendingCapture {
    display: Option<(DisplayConstraints, CaptureEventSink)>,
    microphone: Option<MicrophoneConstraints>,
    slot: Option<SharedSlot>,
}

impl PendingCapture {
    fn slot(&mut self) -> SharedSlot {
        self.slot.get_or_insert_with(SharedSlot::default).clone()
    }
}

/// Capture devices implemented on top of an `ffmpeg` binary
pub struct FfmpegCapture {
    program: PathBuf,
    screen: InputSpec,
    microphone: Option<InputSpec>,
    encoders: HashSet<String>,
    pending: ParkingMutex<PendingCapture>,
}

impl FfmpegCapture {
    pub fn new(program: impl Into<PathBuf>, screen: InputSpec, encoders: HashSet<String>) -> Self {
        Self {
            program: program.into(),
            screen,
            microphone: None,
            encoders,
            pending: ParkingMutex::new(PendingCapture::default()),
        }
    }

    /// Locate `ffmpeg` on PATH and probe its encoders
    pub async fn detect() -> CaptureResult<Self> {
        Self::detect_program("ffmpeg").await
    }

    pub async fn detect_program(program: impl Into<PathBuf>) -> CaptureResult<Self> {
        let program = program.into();
        let output = Command::new(&program)
            .args(["-hide_banner", "-encoders"])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                CaptureError::DeviceUnavailable(format!(
                    "FFmpeg not found. Please install FFmpeg and add it to PATH ({})",
                    e
                ))
            })?;

        let encoders = parse_encoders(&String::from_utf8_lossy(&output.stdout));
        tracing::info!("Detected ffmpeg with {} encoders", encoders.len());

        let capture = Self::new(program, InputSpec::default_screen(), encoders);
        Ok(match InputSpec::default_microphone() {
            Some(mic) => capture.with_microphone(mic),
            None => capture,
        })
    }

    pub fn with_microphone(mut self, input: InputSpec) -> Self {
        self.microphone = Some(input);
        self
    }

    pub fn without_microphone(mut self) -> Self {
        self.microphone = None;
        self
    }

    fn encoder_for(&self, codec: &str) -> Option<&'static str> {
        let name = match codec {
            "vp9" => "libvpx-vp9",
            "vp8" => "libvpx",
            "opus" => "libopus",
            "vorbis" => "libvorbis",
            _ => return None,
        };
        self.encoders.contains(name).then_some(name)
    }

    fn new_track(kind: TrackKind, slot: SharedSlot) -> Box<dyn MediaTrack> {
        let prefix = match kind {
            TrackKind::Video => "ffmpeg-video",
            TrackKind::Audio => "ffmpeg-audio",
        };
        Box::new(FfmpegTrack {
            id: format!("{}-{}", prefix, uuid::Uuid::new_v4()),
            kind,
            slot,
        })
    }

    fn build_args(
        &self,
        display: &DisplayConstraints,
        microphone: Option<(&InputSpec, &MicrophoneConstraints)>,
        options: &EncoderOptions,
    ) -> Vec<String> {
        let mut args = Vec::new();
        push(&mut args, &["-hide_banner", "-loglevel", "error"]);

        let frame_rate = display.frame_rate.to_string();
        push(&mut args, &["-f", self.screen.format.as_str(), "-framerate", frame_rate.as_str()]);
        if self.screen.format == "x11grab" {
            let size = format!("{}x{}", display.width, display.height);
            push(&mut args, &["-video_size", size.as_str()]);
        }
        push(&mut args, &["-i", self.screen.target.as_str()]);

        if let Some((input, constraints)) = microphone {
            push(&mut args, &["-f", input.format.as_str()]);
            if input.format == "pulse" {
                let rate = constraints.sample_rate.to_string();
                push(&mut args, &["-sample_rate", rate.as_str()]);
            }
            push(&mut args, &["-i", input.target.as_str(), "-map", "0:v", "-map", "1:a"]);
            if constraints.noise_suppression {
                push(&mut args, &["-af", "afftdn"]);
            }
        }

        let codecs = codec::codecs(&options.mime_type);
        let video = codecs
            .iter()
            .filter(|c| matches!(**c, "vp9" | "vp8"))
            .find_map(|c| self.encoder_for(c))
            .or_else(|| self.encoder_for("vp8"));
        if let Some(video) = video {
            push(&mut args, &["-c:v", video, "-deadline", "realtime"]);
        }
        let bitrate = options.video_bits_per_second.to_string();
        push(&mut args, &["-b:v", bitrate.as_str()]);

        if microphone.is_some() {
            let audio = codecs
                .iter()
                .filter(|c| matches!(**c, "opus" | "vorbis"))
                .find_map(|c| self.encoder_for(c))
                .or_else(|| self.encoder_for("opus"));
            if let Some(audio) = audio {
                push(&mut args, &["-c:a", audio]);
            }
        }

        let cluster_ms = options.timeslice.as_millis().to_string();
        push(&mut args, &["-f", "webm", "-cluster_time_limit", cluster_ms.as_str(), "pipe:1"]);
        args
    }
}

fn push(args: &mut Vec<String>, items: &[&str]) {
    args.extend(items.iter().map(|item| item.to_string()));
}

#[async_trait]
impl CaptureDevices for FfmpegCapture {
    async fn acquire_display_capture(
        &self,
        constraints: &DisplayConstraints,
        sink: CaptureEventSink,
    ) -> CaptureResult<MediaStream> {
        let status = Command::new(&self.program)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| CaptureError::DeviceUnavailable(format!("Failed to run ffmpeg: {}", e)))?;
        if !status.success() {
            return Err(CaptureError::DeviceUnavailable(format!(
                "ffmpeg -version exited with {}",
                status
            )));
        }

        if constraints.system_audio {
            tracing::debug!("System audio is not offered by {} input", self.screen.format);
        }

        let mut pending = self.pending.lock();
        *pending = PendingCapture::default();
        pending.display = Some((constraints.clone(), sink));
        let slot = pending.slot();

        tracing::info!(
            "Screen capture ready: {} {} ({}x{} @ {}fps)",
            self.screen.format,
            self.screen.target,
            constraints.width,
            constraints.height,
            constraints.frame_rate
        );
        Ok(MediaStream::new(vec![Self::new_track(TrackKind::Video, slot)]))
    }

    async fn acquire_microphone(
        &self,
        constraints: &MicrophoneConstraints,
    ) -> CaptureResult<MediaStream> {
        let input = self.microphone.as_ref().ok_or_else(|| {
            CaptureError::DeviceUnavailable("No microphone input configured".to_string())
        })?;

        if constraints.echo_cancellation {
            tracing::debug!("Echo cancellation is not available for {} input", input.format);
        }

        let mut pending = self.pending.lock();
        pending.microphone = Some(constraints.clone());
        let slot = pending.slot();
        Ok(MediaStream::new(vec![Self::new_track(TrackKind::Audio, slot)]))
    }

    fn is_type_supported(&self, mime_type: &str) -> bool {
        if codec::container_type(mime_type) != "video/webm" {
            return false;
        }
        codec::codecs(mime_type)
            .iter()
            .all(|c| self.encoder_for(c).is_some())
    }

    fn create_encoder(
        &self,
        stream: &MediaStream,
        options: &EncoderOptions,
        sink: CaptureEventSink,
    ) -> CaptureResult<Box<dyn MediaEncoder>> {
        let mut pending = self.pending.lock();
        let (display, _) = pending.display.clone().ok_or_else(|| {
            CaptureError::Encoder("Screen capture has not been acquired".to_string())
        })?;

        let microphone = match (&self.microphone, &pending.microphone) {
            (Some(input), Some(constraints)) if stream.has_kind(TrackKind::Audio) => {
                Some((input, constraints))
            }
            _ => None,
        };
        let args = self.build_args(&display, microphone, options);
        let slot = pending.slot();
        let revoke = pending.display.take().map(|(_, s)| s);

        Ok(Box::new(FfmpegEncoder {
            program: self.program.clone(),
            args,
            mime_type: options.mime_type.clone(),
            timeslice: options.timeslice,
            sink,
            revoke,
            slot,
            stopping: Arc::new(AtomicBool::new(false)),
            reader: None,
        }))
    }
}

struct FfmpegTrack {
    id: String,
    kind: TrackKind,
    slot: SharedSlot,
}

impl MediaTrack for FfmpegTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn stop(&mut self) {
        self.slot.lock().kill();
    }
}

struct FfmpegEncoder {
    program: PathBuf,
    args: Vec<String>,
    mime_type: String,
    timeslice: Duration,
    sink: CaptureEventSink,
    revoke: Option<CaptureEventSink>,
    slot: SharedSlot,
    stopping: Arc<AtomicBool>,
    reader: Option<tokio::task::JoinHandle<()>>,
}

impl MediaEncoder for FfmpegEncoder {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn start(&mut self) -> CaptureResult<()> {
        let mut slot = self.slot.lock();
        if slot.released {
            return Err(CaptureError::Encoder("Capture tracks already released".to_string()));
        }

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CaptureError::Encoder(format!("Failed to start FFmpeg: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CaptureError::Encoder("FFmpeg stdout unavailable".to_string()))?;
        slot.child = Some(child);

        tracing::info!("Started FFmpeg encoder: {} {}", self.program.display(), self.args.join(" "));

        self.reader = Some(tokio::spawn(pump(
            stdout,
            self.timeslice,
            self.sink.clone(),
            self.revoke.clone().unwrap_or_else(|| self.sink.clone()),
            self.stopping.clone(),
        )));
        Ok(())
    }

    fn stop(&mut self) {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        self.slot.lock().kill();
        tracing::info!("FFmpeg encoder stopped");
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        self.stop();
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Forward ffmpeg output as one fragment per timeslice
async fn pump(
    mut stdout: ChildStdout,
    timeslice: Duration,
    sink: CaptureEventSink,
    revoke: CaptureEventSink,
    stopping: Arc<AtomicBool>,
) {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut pending = Vec::new();
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + timeslice, timeslice);

    loop {
        tokio::select! {
            read = stdout.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => pending.extend_from_slice(&buf[..n]),
                Err(e) => {
                    tracing::warn!("Failed to read ffmpeg output: {}", e);
                    break;
                }
            },
            _ = ticker.tick() => {
                if !pending.is_empty() && !sink.data(std::mem::take(&mut pending)) {
                    return;
                }
            }
        }
    }

    if !pending.is_empty() {
        sink.data(pending);
    }
    if stopping.load(Ordering::SeqCst) {
        return;
    }
    tracing::info!("ffmpeg exited unexpectedly, treating capture as ended");
    revoke.ended();
}

/// Encoder names from `ffmpeg -encoders` output
pub fn parse_encoders(output: &str) -> HashSet<String> {
    output
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("------"))
        .skip(1)
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::codec::DEFAULT_VIDEO_BITS_PER_SECOND;
    use tokio::sync::mpsc;

    const ENCODERS: &str = "Encoders:
 V..... = Video
 ------
 V....D libvpx               libvpx VP8 (codec vp8)
 V....D libvpx-vp9           libvpx VP9 (codec vp9)
 A....D libopus              libopus Opus (codec opus)
 V....D libx264              libx264 H.264 (codec h264)
";

    fn capture(encoders: &str) -> FfmpegCapture {
        FfmpegCapture::new("ffmpeg", InputSpec::new("x11grab", ":1.0"), parse_encoders(encoders))
    }

    fn options(mime: &str) -> EncoderOptions {
        EncoderOptions {
            mime_type: mime.to_string(),
            video_bits_per_second: DEFAULT_VIDEO_BITS_PER_SECOND,
            timeslice: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_parse_encoders() {
        let encoders = parse_encoders(ENCODERS);
        assert_eq!(encoders.len(), 4);
        assert!(encoders.contains("libvpx-vp9"));
        assert!(!encoders.contains("="));
    }

    #[test]
    fn test_type_support_follows_encoders() {
        let full = capture(ENCODERS);
        assert!(full.is_type_supported("video/webm;codecs=vp9,opus"));
        assert!(full.is_type_supported("video/webm"));
        assert!(!full.is_type_supported("video/mp4"));

        let vp8_only = capture(" ------\n V....D libvpx  VP8\n A....D libopus  Opus\n");
        assert!(!vp8_only.is_type_supported("video/webm;codecs=vp9,opus"));
        assert!(vp8_only.is_type_supported("video/webm;codecs=vp8,opus"));
    }

    #[test]
    fn test_build_args_screen_only() {
        let capture = capture(ENCODERS);
        let args = capture.build_args(
            &DisplayConstraints::default(),
            None,
            &options("video/webm;codecs=vp9,opus"),
        );
        let line = args.join(" ");

        assert!(line.contains("-f x11grab -framerate 30 -video_size 1920x1080 -i :1.0"));
        assert!(line.contains("-c:v libvpx-vp9"));
        assert!(line.contains("-b:v 2500000"));
        assert!(!line.contains("-c:a"));
        assert!(line.ends_with("-f webm -cluster_time_limit 1000 pipe:1"));
    }

    #[test]
    fn test_build_args_with_microphone() {
        let mic = InputSpec::new("pulse", "default");
        let capture = capture(ENCODERS).with_microphone(mic.clone());
        let constraints = MicrophoneConstraints::default();
        let args = capture.build_args(
            &DisplayConstraints::default(),
            Some((&mic, &constraints)),
            &options("video/webm;codecs=vp8,opus"),
        );
        let line = args.join(" ");

        assert!(line.contains("-f pulse -sample_rate 44100 -i default"));
        assert!(line.contains("-map 0:v -map 1:a"));
        assert!(line.contains("-af afftdn"));
        assert!(line.contains("-c:v libvpx "));
        assert!(line.contains("-c:a libopus"));
    }

    #[tokio::test]
    async fn test_microphone_requires_input() {
        let capture = capture(ENCODERS).without_microphone();
        let result = capture.acquire_microphone(&MicrophoneConstraints::default()).await;
        assert!(matches!(result, Err(CaptureError::DeviceUnavailable(_))));
    }

    #[test]
    fn test_encoder_requires_display() {
        let capture = capture(ENCODERS);
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = capture.create_encoder(
            &MediaStream::default(),
            &options("video/webm"),
            CaptureEventSink::new(tx),
        );
        assert!(matches!(result, Err(CaptureError::Encoder(_))));
    }

    #[tokio::test]
    async fn test_detect_missing_program() {
        let result = FfmpegCapture::detect_program("/nonexistent/ffmpeg-for-tests").await;
        assert!(matches!(result, Err(CaptureError::DeviceUnavailable(_))));
    }
}
