//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// A value parsed but is not usable for streaming
    Invalid(String),
    /// `.env` file could not be read or parsed
    Env(dotenvy::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
            ConfigError::Env(e) => write!(f, "Failed to load env file: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<dotenvy::Error> for ConfigError {
    fn from(e: dotenvy::Error) -> Self {
        ConfigError::Env(e)
    }
}

/// Playlist contents and looping behaviour
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaylistConfig {
    /// Input files, streamed in order
    #[serde(default = "default_files")]
    pub files: Vec<String>,
    /// Restart from the first file after the last one (default true)
    #[serde(default = "default_loop_playlist")]
    pub loop_playlist: bool,
}

fn default_files() -> Vec<String> {
    vec!["./input.mp4".to_string()]
}

fn default_loop_playlist() -> bool {
    true
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self {
            files: default_files(),
            loop_playlist: default_loop_playlist(),
        }
    }
}

/// Streaming destination
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    /// Base URL of the RTMP server
    #[serde(default = "default_rtmp_url")]
    pub rtmp_url: String,
    /// Path segment appended to the base URL
    #[serde(default = "default_stream_key")]
    pub stream_key: String,
}

fn default_rtmp_url() -> String {
    "rtmp://localhost:1935/live".to_string()
}

fn default_stream_key() -> String {
    "stream".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            rtmp_url: default_rtmp_url(),
            stream_key: default_stream_key(),
        }
    }
}

/// Encoding parameters passed through to ffmpeg
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncodingConfig {
    /// Output resolution, `WIDTHxHEIGHT`
    #[serde(default = "default_resolution")]
    pub resolution: String,
    /// Video bitrate, also used as the max rate
    #[serde(default = "default_video_bitrate")]
    pub video_bitrate: String,
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,
    /// Output frame rate (default 30)
    #[serde(default = "default_fps")]
    pub fps: u32,
}

fn default_resolution() -> String {
    "1920x1080".to_string()
}

fn default_video_bitrate() -> String {
    "5000k".to_string()
}

fn default_audio_bitrate() -> String {
    "128k".to_string()
}

fn default_fps() -> u32 {
    30
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            resolution: default_resolution(),
            video_bitrate: default_video_bitrate(),
            audio_bitrate: default_audio_bitrate(),
            fps: default_fps(),
        }
    }
}

/// External encoder location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncoderConfig {
    /// Program name or path of the ffmpeg executable
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub playlist: PlaylistConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub encoding: EncodingConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
}

/// Load `.env` from the current directory or its parents, if one exists
///
/// Variables already present in the process environment are not replaced.
/// Returns the path of the file that was loaded.
pub fn load_dotenv() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}

/// Load variables from a specific env file
///
/// Variables already present in the process environment are not replaced.
pub fn load_env_file<P: AsRef<Path>>(path: P) -> Result<(), ConfigError> {
    dotenvy::from_path(path.as_ref())?;
    Ok(())
}

/// Split a comma-separated file list, trimming each entry and dropping empty ones
pub fn parse_file_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(String::from)
        .collect()
}

fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// `WIDTHxHEIGHT` with both sides positive integers
fn is_resolution(s: &str) -> bool {
    match s.split_once('x') {
        Some((w, h)) => {
            matches!(w.parse::<u32>(), Ok(w) if w > 0) && matches!(h.parse::<u32>(), Ok(h) if h > 0)
        }
        None => false,
    }
}

/// `<number>k`, e.g. `5000k`
fn is_bitrate(s: &str) -> bool {
    match s.strip_suffix('k') {
        Some(n) => matches!(n.parse::<u32>(), Ok(n) if n > 0),
        None => false,
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the file and fills missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - INPUT_FILE -> playlist.files (comma-separated)
    /// - RTMP_URL -> output.rtmp_url
    /// - STREAM_KEY -> output.stream_key
    /// - FPS -> encoding.fps
    /// - LOOP_PLAYLIST -> playlist.loop_playlist
    /// - FFMPEG_PATH -> encoder.ffmpeg_path
    ///
    /// Empty or unparsable values leave the existing setting in place.
    pub fn apply_env_overrides(&mut self) {
        // INPUT_FILE
        if let Ok(val) = env::var("INPUT_FILE") {
            let files = parse_file_list(&val);
            if !files.is_empty() {
                self.playlist.files = files;
            }
        }

        // RTMP_URL
        if let Ok(val) = env::var("RTMP_URL") {
            if !val.is_empty() {
                self.output.rtmp_url = val;
            }
        }

        // STREAM_KEY
        if let Ok(val) = env::var("STREAM_KEY") {
            if !val.is_empty() {
                self.output.stream_key = val;
            }
        }

        // FPS
        if let Ok(val) = env::var("FPS") {
            if let Ok(fps) = val.trim().parse::<u32>() {
                if fps > 0 {
                    self.encoding.fps = fps;
                }
            }
        }

        // LOOP_PLAYLIST
        if let Ok(val) = env::var("LOOP_PLAYLIST") {
            if let Some(looping) = parse_bool(&val) {
                self.playlist.loop_playlist = looping;
            }
        }

        // FFMPEG_PATH
        if let Ok(val) = env::var("FFMPEG_PATH") {
            if !val.is_empty() {
                self.encoder.ffmpeg_path = val;
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Build configuration from defaults and the environment only
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Check that the configuration can drive a stream
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.playlist.files.is_empty() {
            return Err(ConfigError::Invalid("playlist has no input files".to_string()));
        }
        if let Some(pos) = self.playlist.files.iter().position(|f| f.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "playlist entry {} is empty",
                pos + 1
            )));
        }
        if !is_resolution(&self.encoding.resolution) {
            return Err(ConfigError::Invalid(format!(
                "resolution '{}' is not of the form WIDTHxHEIGHT",
                self.encoding.resolution
            )));
        }
        for (name, value) in [
            ("video_bitrate", &self.encoding.video_bitrate),
            ("audio_bitrate", &self.encoding.audio_bitrate),
        ] {
            if !is_bitrate(value) {
                return Err(ConfigError::Invalid(format!(
                    "{} '{}' is not of the form <number>k",
                    name, value
                )));
            }
        }
        if self.encoding.fps == 0 {
            return Err(ConfigError::Invalid("fps must be positive".to_string()));
        }
        if self.output.rtmp_url.is_empty() || self.output.stream_key.is_empty() {
            return Err(ConfigError::Invalid(
                "rtmp_url and stream_key must not be empty".to_string(),
            ));
        }
        if self.encoder.ffmpeg_path.is_empty() {
            return Err(ConfigError::Invalid("ffmpeg_path must not be empty".to_string()));
        }
        Ok(())
    }

    /// Full destination URL: base URL and stream key joined by `/`
    pub fn destination_url(&self) -> String {
        format!("{}/{}", self.output.rtmp_url, self.output.stream_key)
    }
}
