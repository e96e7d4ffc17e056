//! FFmpeg encoder module for the RTMP playlist streamer
//!
//! Builds the per-file ffmpeg invocation and runs it to completion while
//! forwarding its diagnostic output to the log.

use crate::config::Config;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Fixed encoder settings shared by every invocation
const VIDEO_CODEC: &str = "libx264";
const PRESET: &str = "medium";
const BUFFER_SIZE: &str = "5000k";
const AUDIO_CODEC: &str = "aac";
const AUDIO_CHANNELS: &str = "2";
/// FLV is the container RTMP expects
const OUTPUT_FORMAT: &str = "flv";

/// Error type for encoding operations
#[derive(Debug, Error)]
pub enum EncodeError {
    /// FFmpeg could not be started (missing executable, permission denied)
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// FFmpeg process exited with non-zero status
    #[error("FFmpeg process exited with code {0}")]
    FfmpegFailed(i32),

    /// FFmpeg process was terminated by signal
    #[error("FFmpeg process was terminated ({0})")]
    FfmpegTerminated(String),

    /// IO error while waiting on the process
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parameters for streaming one playlist entry
#[derive(Debug, Clone)]
pub struct FfmpegParams {
    /// Encoder executable
    pub program: String,
    /// File to stream
    pub input_path: PathBuf,
    pub resolution: String,
    pub video_bitrate: String,
    pub audio_bitrate: String,
    pub fps: u32,
    /// Full RTMP destination including the stream key
    pub destination: String,
}

impl FfmpegParams {
    /// Take encoding settings from `config` for a single input file
    pub fn new(config: &Config, input_path: impl Into<PathBuf>, destination: &str) -> Self {
        Self {
            program: config.encoder.ffmpeg_path.clone(),
            input_path: input_path.into(),
            resolution: config.encoding.resolution.clone(),
            video_bitrate: config.encoding.video_bitrate.clone(),
            audio_bitrate: config.encoding.audio_bitrate.clone(),
            fps: config.encoding.fps,
            destination: destination.to_string(),
        }
    }
}


/// Build the ffmpeg command for a single playlist entry
///
/// Argument order is fixed:
/// `-re -i <input> -c:v libx264 -preset medium -s <res> -b:v <vbr> -maxrate <vbr>
/// -bufsize 5000k -r <fps> -c:a aac -b:a <abr> -ac 2 -f flv <destination>`
pub fn build_ffmpeg_command(params: &FfmpegParams) -> Command {
    let mut cmd = Command::new(&params.program);

    // Read input at native frame rate, required for live output
    cmd.arg("-re");
    cmd.arg("-i").arg(&params.input_path);

    // Video
    cmd.arg("-c:v").arg(VIDEO_CODEC);
    cmd.arg("-preset").arg(PRESET);
    cmd.arg("-s").arg(&params.resolution);
    cmd.arg("-b:v").arg(&params.video_bitrate);
    cmd.arg("-maxrate").arg(&params.video_bitrate);
    cmd.arg("-bufsize").arg(BUFFER_SIZE);
    cmd.arg("-r").arg(params.fps.to_string());

    // Audio
    cmd.arg("-c:a").arg(AUDIO_CODEC);
    cmd.arg("-b:a").arg(&params.audio_bitrate);
    cmd.arg("-ac").arg(AUDIO_CHANNELS);

    // Output
    cmd.arg("-f").arg(OUTPUT_FORMAT);
    cmd.arg(&params.destination);

    cmd
}


/// Stream one file by running ffmpeg until it exits
///
/// The child is killed if the returned future is dropped before it exits.
///
/// # Returns
/// * `Ok(())` - FFmpeg exited with status 0
/// * `Err(EncodeError)` - FFmpeg failed to start, exited non-zero, or was killed
pub async fn run_ffmpeg(params: &FfmpegParams) -> Result<(), EncodeError> {
    let mut cmd = tokio::process::Command::from(build_ffmpeg_command(params));
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|source| EncodeError::Spawn {
        program: params.program.clone(),
        source,
    })?;
    debug!(pid = ?child.id(), input = %params.input_path.display(), "Spawned ffmpeg");

    let forwarder = child.stderr.take().map(|stderr| {
        tokio::spawn(forward_lines(stderr, |line| info!(target: "ffmpeg", "{}", line)))
    });

    let status = child.wait().await?;

    // Drain whatever ffmpeg wrote before exiting
    if let Some(task) = forwarder {
        join_forwarder(task).await;
    }

    if status.success() {
        Ok(())
    } else {
        match status.code() {
            Some(code) => Err(EncodeError::FfmpegFailed(code)),
            None => Err(EncodeError::FfmpegTerminated(status.to_string())),
        }
    }
}

/// Wait for the stderr forwarder; returns false if it panicked or was cancelled
async fn join_forwarder(task: JoinHandle<()>) -> bool {
    match task.await {
        Ok(()) => true,
        Err(e) => {
            warn!("FFmpeg output forwarder failed: {}", e);
            false
        }
    }
}

/// Pass each line of `reader` to `sink`
///
/// FFmpeg rewrites its progress line with `\r`, so both `\r` and `\n` end a line.
/// Blank lines are skipped.
pub async fn forward_lines<R, F>(reader: R, mut sink: F)
where
    R: AsyncRead + Unpin,
    F: FnMut(&str),
{
    let mut reader = BufReader::new(reader);
    let mut pending: Vec<u8> = Vec::new();

    loop {
        let chunk = match reader.fill_buf().await {
            Ok(chunk) => chunk,
            Err(e) => {
                debug!("Stopped reading encoder output: {}", e);
                break;
            }
        };
        if chunk.is_empty() {
            break;
        }

        for &byte in chunk {
            if byte == b'\n' || byte == b'\r' {
                emit_line(&mut pending, &mut sink);
            } else {
                pending.push(byte);
            }
        }

        let consumed = chunk.len();
        reader.consume(consumed);
    }

    emit_line(&mut pending, &mut sink);
}

fn emit_line<F: FnMut(&str)>(pending: &mut Vec<u8>, sink: &mut F) {
    if pending.is_empty() {
        return;
    }
    let line = String::from_utf8_lossy(pending);
    let line = line.trim_end();
    if !line.is_empty() {
        sink(line);
    }
    pending.clear();
}
