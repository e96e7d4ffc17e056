//! Startup checks module for the RTMP playlist streamer
//!
//! Preflight checks run before the first file is streamed:
//! - FFmpeg availability (and the version it reports)
//! - Playlist entries that do not exist on disk

use crate::config::Config;
use std::path::Path;
use std::process::Command;
use thiserror::Error;

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("FFmpeg not available: {0}")]
    FfmpegUnavailable(String),
}

/// Parse the version token from `ffmpeg -version` output
///
/// Handles various FFmpeg version formats:
/// - Standard: "ffmpeg version 7.1 ..."
/// - N-prefixed git builds: "ffmpeg version n7.1-12-gabcdef ..."
/// - Distro builds: "ffmpeg version 6.1.1-3ubuntu5 ..."
///
/// Returns the token with any leading `n` removed.
pub fn parse_ffmpeg_version(version_output: &str) -> Option<String> {
    let version_line = version_output
        .lines()
        .find(|line| line.to_lowercase().contains("ffmpeg version"))?;

    let lower = version_line.to_lowercase();
    let token = lower
        .split("ffmpeg version")
        .nth(1)?
        .split_whitespace()
        .next()?;

    let version = token.strip_prefix('n').unwrap_or(token);
    if version.starts_with(|c: char| c.is_ascii_digit()) {
        Some(version.to_string())
    } else {
        None
    }
}

/// Check that FFmpeg can be launched by running `<program> -version`
///
/// # Returns
/// The version reported by FFmpeg, or `"unknown"` when the output is unrecognised.
pub fn check_ffmpeg_available(program: &str) -> Result<String, StartupError> {
    let output = Command::new(program)
        .arg("-version")
        .output()
        .map_err(|e| {
            StartupError::FfmpegUnavailable(format!(
                "{} -version failed; is FFmpeg installed and in PATH? Error: {}",
                program, e
            ))
        })?;

    if !output.status.success() {
        return Err(StartupError::FfmpegUnavailable(format!(
            "{} -version exited with {}",
            program, output.status
        )));
    }

    let version_output = String::from_utf8_lossy(&output.stdout);
    Ok(parse_ffmpeg_version(&version_output).unwrap_or_else(|| "unknown".to_string()))
}

/// Playlist entries that do not exist on disk
///
/// Missing files are streamed anyway; ffmpeg exits quickly and the playlist moves on.
pub fn missing_inputs(cfg: &Config) -> Vec<&str> {
    cfg.playlist
        .files
        .iter()
        .map(String::as_str)
        .filter(|file| !Path::new(file).exists())
        .collect()
}

/// Run all startup checks
///
/// Returns the detected FFmpeg version.
pub fn run_startup_checks(cfg: &Config) -> Result<String, StartupError> {
    check_ffmpeg_available(&cfg.encoder.ffmpeg_path)
}
