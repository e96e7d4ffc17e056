//! CLI entry point for the RTMP playlist streamer
//!
//! Parses command line arguments, builds the configuration and runs the
//! playlist supervisor until the playlist ends or Ctrl-C is pressed.

use clap::Parser;
use rtmp_playlist::config::load_dotenv;
use rtmp_playlist::{missing_inputs, Config, RunOutcome, Supervisor};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

/// Stream a playlist of video files to an RTMP server through ffmpeg
#[derive(Parser, Debug)]
#[command(name = "rtmp-playlist")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file. Without it, defaults and environment variables are used.
    /// A `.env` file in the working directory is loaded into the environment first.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop after the last file instead of looping the playlist
    #[arg(long, default_value = "false")]
    no_loop: bool,

    /// Skip the ffmpeg availability check
    #[arg(long, default_value = "false")]
    skip_checks: bool,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if verbose {
            "rtmp_playlist=debug,rtmp_playlist_cli=debug,ffmpeg=info".to_string()
        } else {
            "rtmp_playlist=info,rtmp_playlist_cli=info,ffmpeg=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    // Before logging, so RUST_LOG may come from .env
    let dotenv_path = load_dotenv();
    init_logging(args.verbose);

    if let Some(path) = dotenv_path {
        info!("Loaded environment from {}", path.display());
    }

    let config_result = match &args.config {
        Some(path) => {
            info!("Config file: {}", path.display());
            Config::load(path)
        }
        None => Ok(Config::from_env()),
    };

    let mut config = match config_result {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if args.no_loop {
        config.playlist.loop_playlist = false;
    }

    let supervisor_result = if args.skip_checks {
        warn!("Skipping startup checks (--skip-checks enabled)");
        Supervisor::new(config)
    } else {
        Supervisor::with_startup_checks(config)
    };

    let mut supervisor = match supervisor_result {
        Ok(supervisor) => supervisor,
        Err(e) => {
            error!("Failed to start: {}", e);
            return ExitCode::FAILURE;
        }
    };

    for file in missing_inputs(supervisor.config()) {
        warn!("Input file not found: {}", file);
    }

    match supervisor.run_until(shutdown_signal()).await {
        RunOutcome::Completed => info!("Stream finished"),
        RunOutcome::Interrupted => info!("Stream interrupted"),
    }

    ExitCode::SUCCESS
}
