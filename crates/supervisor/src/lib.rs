//! RTMP playlist streamer
//!
//! Streams a playlist of local video files to an RTMP endpoint, one ffmpeg
//! process per file, looping the playlist when configured to.

pub mod cursor;
pub mod encode;
pub mod startup;
pub mod supervisor;

pub use rtmp_playlist_config as config;
pub use rtmp_playlist_config::Config;
pub use cursor::{Advance, PlaylistCursor};
pub use encode::{build_ffmpeg_command, forward_lines, run_ffmpeg, EncodeError, FfmpegParams};
pub use startup::{
    check_ffmpeg_available, missing_inputs, parse_ffmpeg_version, run_startup_checks,
    StartupError,
};
pub use supervisor::{RunOutcome, Supervisor, SupervisorError, SupervisorState};
