//! Encoding modules for the RTMP playlist streamer

pub mod ffmpeg;

pub use ffmpeg::{build_ffmpeg_command, forward_lines, run_ffmpeg, EncodeError, FfmpegParams};
