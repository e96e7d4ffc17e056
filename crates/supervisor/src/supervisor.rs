//! Playlist supervisor for the RTMP playlist streamer
//!
//! Streams playlist entries one at a time: spawn ffmpeg for the entry under
//! the cursor, wait for it to exit, advance, repeat. Every exit advances the
//! playlist, whether the file played to the end or ffmpeg failed.

use crate::config::{Config, ConfigError};
use crate::cursor::{Advance, PlaylistCursor};
use crate::encode::{run_ffmpeg, EncodeError, FfmpegParams};
use crate::startup::{run_startup_checks, StartupError};
use std::future::Future;
use thiserror::Error;
use tracing::{error, info, warn};

/// Error type for supervisor construction
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Startup check failed
    #[error("Startup check failed: {0}")]
    Startup(#[from] StartupError),
}

/// Supervisor state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// More files remain (always the case when looping)
    Streaming,
    /// A non-looping playlist has been played through
    Stopped,
}

/// How a supervisor run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Non-looping playlist finished
    Completed,
    /// Shutdown was requested; the active encoder was killed
    Interrupted,
}

/// Owns the playlist cursor and the single active encoder
pub struct Supervisor {
    config: Config,
    /// Base URL and stream key, joined once at construction
    destination: String,
    cursor: PlaylistCursor,
    state: SupervisorState,
    /// Failed encoder runs since the playlist last wrapped
    failures_this_pass: usize,
    /// Whether every file failed in the pass that ended at the last wrap
    last_pass_failed: bool,
}

impl Supervisor {
    /// Create a supervisor positioned at the first file
    ///
    /// Fails if the configuration does not validate (e.g. an empty playlist).
    pub fn new(config: Config) -> Result<Self, SupervisorError> {
        config.validate()?;

        let cursor = PlaylistCursor::new(config.playlist.files.len(), config.playlist.loop_playlist)
            .ok_or_else(|| ConfigError::Invalid("playlist has no input files".to_string()))?;
        let destination = config.destination_url();

        Ok(Self {
            config,
            destination,
            cursor,
            state: SupervisorState::Streaming,
            failures_this_pass: 0,
            last_pass_failed: false,
        })
    }

    /// Create a supervisor after verifying that ffmpeg can be launched
    pub fn with_startup_checks(config: Config) -> Result<Self, SupervisorError> {
        config.validate()?;
        let version = run_startup_checks(&config)?;
        info!("Using ffmpeg {} ({})", version, config.encoder.ffmpeg_path);
        Self::new(config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Destination URL passed to every encoder invocation
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Index of the file currently (or next) streaming
    pub fn cursor(&self) -> usize {
        self.cursor.index()
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// True when the most recently completed looping pass had no successful file
    pub fn last_pass_failed(&self) -> bool {
        self.last_pass_failed
    }

    /// Log the startup summary
    pub fn log_summary(&self) {
        let cfg = &self.config;
        info!("Starting live stream with playlist...");
        info!("Videos: {}", cfg.playlist.files.join(", "));
        info!("Output: {}", self.destination);
        info!("Stream Key: {}", cfg.output.stream_key);
        info!("Resolution: {}", cfg.encoding.resolution);
        info!("Video Bitrate: {}", cfg.encoding.video_bitrate);
        info!("Frame Rate: {}fps", cfg.encoding.fps);
        info!("Loop Playlist: {}", cfg.playlist.loop_playlist);
    }

    /// Stream from the first file until the playlist is exhausted
    ///
    /// With looping enabled this never returns.
    pub async fn start_stream(&mut self) -> RunOutcome {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Stream until the playlist is exhausted or `shutdown` resolves
    ///
    /// When `shutdown` resolves mid-file the active encoder is killed.
    /// That kill is deliberate and is not reported as an encoder error.
    pub async fn run_until<F>(&mut self, shutdown: F) -> RunOutcome
    where
        F: Future<Output = ()>,
    {
        self.log_summary();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                state = self.step() => {
                    if state == SupervisorState::Stopped {
                        return RunOutcome::Completed;
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping stream");
                    return RunOutcome::Interrupted;
                }
            }
        }
    }

    /// Stream the file under the cursor, then advance
    pub async fn step(&mut self) -> SupervisorState {
        if self.state == SupervisorState::Stopped {
            return self.state;
        }

        let index = self.cursor.index();
        let file = self.config.playlist.files[index].clone();
        if self.stream_file(&file, index).await.is_err() {
            self.failures_this_pass += 1;
        }

        self.advance()
    }

    /// Run one encoder for `file_path` and wait for it to exit
    ///
    /// Every failure is logged here and then returned; none of them stops the
    /// playlist. A non-zero exit is a warning. Launch failures and foreign
    /// signals are errors.
    pub async fn stream_file(&self, file_path: &str, file_index: usize) -> Result<(), EncodeError> {
        info!(
            "Playing video {}/{}: {}",
            file_index + 1,
            self.cursor.len(),
            file_path
        );

        let params = FfmpegParams::new(&self.config, file_path, &self.destination);
        let result = run_ffmpeg(&params).await;

        match &result {
            Ok(()) => info!("Finished {}", file_path),
            Err(e @ EncodeError::FfmpegFailed(_)) => warn!("{}", e),
            Err(e) => error!("FFmpeg error: {}", e),
        }

        result
    }

    /// Move the cursor past the current file
    ///
    /// Wraps to the first file when looping, otherwise moves to `Stopped`.
    pub fn advance(&mut self) -> SupervisorState {
        if self.state == SupervisorState::Stopped {
            return self.state;
        }

        match self.cursor.advance() {
            Advance::Next(_) => {}
            Advance::Wrapped => {
                self.last_pass_failed = self.failures_this_pass >= self.cursor.len();
                if self.last_pass_failed {
                    warn!(
                        "Every file failed during the last pass ({} consecutive failures)",
                        self.failures_this_pass
                    );
                }
                self.failures_this_pass = 0;
                info!("Playlist ended. Looping from the beginning...");
            }
            Advance::Exhausted => {
                info!("Playlist ended. Stopping stream.");
                self.state = SupervisorState::Stopped;
            }
        }

        self.state
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_files(files: &[&str], loop_playlist: bool) -> Config {
        let mut config = Config::default();
        config.playlist.files = files.iter().map(|f| f.to_string()).collect();
        config.playlist.loop_playlist = loop_playlist;
        config
    }

    #[test]
    fn test_new_rejects_empty_playlist() {
        let config = config_with_files(&[], true);
        let result = Supervisor::new(config);
        assert!(matches!(result, Err(SupervisorError::Config(_))));
    }

    #[test]
    fn test_new_computes_destination_once() {
        let mut config = config_with_files(&["a.mp4"], true);
        config.output.rtmp_url = "rtmp://ingest.example.com/app".to_string();
        config.output.stream_key = "live_123".to_string();

        let supervisor = Supervisor::new(config).unwrap();

        assert_eq!(supervisor.destination(), "rtmp://ingest.example.com/app/live_123");
        assert_eq!(supervisor.cursor(), 0);
        assert_eq!(supervisor.state(), SupervisorState::Streaming);
    }

    #[test]
    fn test_with_startup_checks_fails_without_ffmpeg() {
        let mut config = config_with_files(&["a.mp4"], true);
        config.encoder.ffmpeg_path = "/nonexistent/rtmp-playlist-ffmpeg".to_string();

        let result = Supervisor::with_startup_checks(config);
        assert!(matches!(result, Err(SupervisorError::Startup(_))));
    }

    #[test]
    fn test_advance_non_looping_stops_after_last() {
        let mut supervisor = Supervisor::new(config_with_files(&["a.mp4", "b.mp4"], false)).unwrap();

        assert_eq!(supervisor.advance(), SupervisorState::Streaming);
        assert_eq!(supervisor.cursor(), 1);
        assert_eq!(supervisor.advance(), SupervisorState::Stopped);
        assert_eq!(supervisor.cursor(), 1);
        assert_eq!(supervisor.advance(), SupervisorState::Stopped);
    }

    #[test]
    fn test_advance_looping_wraps_to_zero() {
        let mut supervisor = Supervisor::new(config_with_files(&["a.mp4", "b.mp4"], true)).unwrap();

        for expected in [1, 0, 1, 0] {
            assert_eq!(supervisor.advance(), SupervisorState::Streaming);
            assert_eq!(supervisor.cursor(), expected);
        }
    }

    #[tokio::test]
    async fn test_missing_encoder_still_advances() {
        let mut config = config_with_files(&["a.mp4", "b.mp4"], false);
        config.encoder.ffmpeg_path = "/nonexistent/rtmp-playlist-ffmpeg".to_string();
        let mut supervisor = Supervisor::new(config).unwrap();

        let result = supervisor.stream_file("a.mp4", 0).await;
        assert!(matches!(result, Err(EncodeError::Spawn { .. })));

        assert_eq!(supervisor.step().await, SupervisorState::Streaming);
        assert_eq!(supervisor.cursor(), 1);
        assert_eq!(supervisor.step().await, SupervisorState::Stopped);
        assert_eq!(supervisor.start_stream().await, RunOutcome::Completed);
    }

    /// End-to-end runs against a shell script standing in for ffmpeg
    #[cfg(unix)]
    mod fake_encoder {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::path::{Path, PathBuf};
        use std::time::Duration;
        use tempfile::TempDir;

        /// Writes its arguments to `calls.log`, exits 1 for inputs containing
        /// "bad", sleeps for inputs containing "slow", and sends itself SIGTERM
        /// for inputs containing "sigterm".
        fn install_fake_ffmpeg(dir: &Path) -> (PathBuf, PathBuf) {
            let log = dir.join("calls.log");
            let script = dir.join("fake-ffmpeg");
            let body = format!(
                "#!/bin/sh\n\
                 printf '%s\\n' \"$*\" >> '{log}'\n\
                 echo \"frame=1 fps=30 input=$3\" >&2\n\
                 case \"$3\" in\n\
                 *slow*) exec sleep 30 ;;\n\
                 *sigterm*) kill -TERM $$ ;;\n\
                 *bad*) exit 1 ;;\n\
                 esac\n\
                 exit 0\n",
                log = log.display()
            );
            std::fs::write(&script, body).unwrap();
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
            (script, log)
        }

        /// Each logged invocation as its argument list
        fn read_calls(log: &Path) -> Vec<Vec<String>> {
            std::fs::read_to_string(log)
                .unwrap_or_default()
                .lines()
                .map(|line| line.split_whitespace().map(String::from).collect())
                .collect()
        }

        fn inputs(calls: &[Vec<String>]) -> Vec<String> {
            calls.iter().map(|args| args[2].clone()).collect()
        }

        fn fake_config(dir: &TempDir, files: &[&str], loop_playlist: bool) -> (Config, PathBuf) {
            let (script, log) = install_fake_ffmpeg(dir.path());
            let mut config = config_with_files(files, loop_playlist);
            config.encoder.ffmpeg_path = script.to_string_lossy().to_string();
            config.output.rtmp_url = "rtmp://127.0.0.1:1935/live".to_string();
            config.output.stream_key = "test-key".to_string();
            (config, log)
        }

        #[tokio::test]
        async fn test_non_looping_streams_each_file_once_in_order() {
            let dir = tempfile::tempdir().unwrap();
            let (config, log) = fake_config(&dir, &["a.mp4", "b.mp4", "c.mp4"], false);
            let mut supervisor = Supervisor::new(config).unwrap();

            let outcome = supervisor.start_stream().await;

            assert_eq!(outcome, RunOutcome::Completed);
            assert_eq!(supervisor.state(), SupervisorState::Stopped);
            let calls = read_calls(&log);
            assert_eq!(inputs(&calls), vec!["a.mp4", "b.mp4", "c.mp4"]);
            for args in &calls {
                assert_eq!(args.last().map(String::as_str), Some("rtmp://127.0.0.1:1935/live/test-key"));
                assert_eq!(args[0], "-re");
            }
        }

        #[tokio::test]
        async fn test_failed_file_still_advances() {
            let dir = tempfile::tempdir().unwrap();
            let (config, log) = fake_config(&dir, &["bad.mp4", "good.mp4"], false);
            let mut supervisor = Supervisor::new(config).unwrap();

            let first = supervisor.stream_file("bad.mp4", 0).await;
            assert!(matches!(first, Err(EncodeError::FfmpegFailed(1))));

            let outcome = supervisor.start_stream().await;
            assert_eq!(outcome, RunOutcome::Completed);

            let calls = read_calls(&log);
            assert_eq!(inputs(&calls), vec!["bad.mp4", "bad.mp4", "good.mp4"]);
        }

        #[tokio::test]
        async fn test_looping_wraps_for_two_cycles() {
            let dir = tempfile::tempdir().unwrap();
            let (config, log) = fake_config(&dir, &["a.mp4", "bad.mp4", "c.mp4"], true);
            let mut supervisor = Supervisor::new(config).unwrap();

            let mut cursors = Vec::new();
            for _ in 0..7 {
                assert_eq!(supervisor.step().await, SupervisorState::Streaming);
                assert!(supervisor.cursor() < 3);
                cursors.push(supervisor.cursor());
            }

            assert_eq!(cursors, vec![1, 2, 0, 1, 2, 0, 1]);
            let calls = read_calls(&log);
            assert_eq!(
                inputs(&calls),
                vec!["a.mp4", "bad.mp4", "c.mp4", "a.mp4", "bad.mp4", "c.mp4", "a.mp4"]
            );
            let destinations: Vec<&String> = calls.iter().filter_map(|args| args.last()).collect();
            assert!(destinations.iter().all(|d| *d == supervisor.destination()));
        }

        #[tokio::test]
        async fn test_shutdown_kills_active_encoder() {
            let dir = tempfile::tempdir().unwrap();
            let (config, log) = fake_config(&dir, &["slow.mp4", "next.mp4"], true);
            let mut supervisor = Supervisor::new(config).unwrap();

            let outcome = tokio::time::timeout(
                Duration::from_secs(10),
                supervisor.run_until(tokio::time::sleep(Duration::from_millis(300))),
            )
            .await
            .expect("shutdown should interrupt the running encoder");

            assert_eq!(outcome, RunOutcome::Interrupted);
            assert_eq!(supervisor.cursor(), 0);
            assert_eq!(inputs(&read_calls(&log)), vec!["slow.mp4"]);
        }

        #[tokio::test]
        async fn test_foreign_signal_still_advances() {
            let dir = tempfile::tempdir().unwrap();
            let (config, log) = fake_config(&dir, &["sigterm.mp4", "next.mp4"], false);
            let mut supervisor = Supervisor::new(config).unwrap();

            let result = supervisor.stream_file("sigterm.mp4", 0).await;
            assert!(matches!(result, Err(EncodeError::FfmpegTerminated(_))));

            assert_eq!(supervisor.step().await, SupervisorState::Streaming);
            assert_eq!(supervisor.cursor(), 1);
            assert_eq!(supervisor.step().await, SupervisorState::Stopped);
            assert_eq!(
                inputs(&read_calls(&log)),
                vec!["sigterm.mp4", "sigterm.mp4", "next.mp4"]
            );
        }

        #[tokio::test]
        async fn test_all_failed_pass_is_flagged_at_wrap() {
            let dir = tempfile::tempdir().unwrap();
            let (config, _log) = fake_config(&dir, &["bad1.mp4", "bad2.mp4"], true);
            let mut supervisor = Supervisor::new(config).unwrap();

            supervisor.step().await;
            assert!(!supervisor.last_pass_failed());
            supervisor.step().await;
            assert_eq!(supervisor.cursor(), 0);
            assert!(supervisor.last_pass_failed());
        }

        #[tokio::test]
        async fn test_pass_with_one_good_file_is_not_flagged() {
            let dir = tempfile::tempdir().unwrap();
            let (config, _log) = fake_config(&dir, &["bad.mp4", "good.mp4"], true);
            let mut supervisor = Supervisor::new(config).unwrap();

            for _ in 0..4 {
                supervisor.step().await;
                assert!(!supervisor.last_pass_failed());
            }
            assert_eq!(supervisor.cursor(), 0);
        }
    }
}
