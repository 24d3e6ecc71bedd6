//! Reelcap CLI: record the screen into a single media file.
//!
//! Usage:
//!   reelcap record [OPTIONS]   Start a recording, stop with Ctrl+C
//!   reelcap sources            List capturable displays and windows
//!   reelcap check              Check system capabilities

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "reelcap",
    about = "Screen recording with system audio and microphone tracks",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a recording session; stop with Ctrl+C
    Record {
        /// Output directory (defaults to the saved configuration)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Target frame rate
        #[arg(long)]
        fps: Option<u32>,

        /// Display id to record
        #[arg(long, conflicts_with = "window")]
        display: Option<u32>,

        /// Window id to record (hex or decimal)
        #[arg(long)]
        window: Option<String>,

        /// Record the microphone as a separate track
        #[arg(long)]
        mic: bool,

        /// Hide the mouse cursor in the capture
        #[arg(long)]
        no_cursor: bool,

        /// Exclude reelcap's own windows from the source catalog
        #[arg(long)]
        exclude_self: bool,

        /// Container format: mp4|mov
        #[arg(long)]
        container: Option<String>,

        /// Video codec: h264|h265
        #[arg(long)]
        codec: Option<String>,

        /// Audio format: aac|alac|flac|opus
        #[arg(long)]
        audio_format: Option<String>,

        /// Audio quality: normal|good|high|extreme
        #[arg(long)]
        audio_quality: Option<String>,

        /// Keep a partially written file when the session fails
        #[arg(long)]
        keep_partial: bool,

        /// Persist these settings as the new defaults
        #[arg(long)]
        save_defaults: bool,
    },

    /// List capturable displays and windows after exclusion filtering
    Sources {
        /// Apply self-exclusion to the listing
        #[arg(long)]
        exclude_self: bool,
    },

    /// Check system capabilities
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    reelcap_common::logging::init_logging(log_level, false);

    match cli.command {
        Commands::Record {
            output,
            fps,
            display,
            window,
            mic,
            no_cursor,
            exclude_self,
            container,
            codec,
            audio_format,
            audio_quality,
            keep_partial,
            save_defaults,
        } => {
            commands::record::run(commands::record::RecordArgs {
                output,
                fps,
                display,
                window,
                mic,
                no_cursor,
                exclude_self,
                container,
                codec,
                audio_format,
                audio_quality,
                keep_partial,
                save_defaults,
            })
            .await
        }
        Commands::Sources { exclude_self } => commands::sources::run(exclude_self),
        Commands::Check => commands::check::run(),
    }
}
