//! Start a recording session.

use std::path::PathBuf;

use reelcap_capture_engine::{RecordingSession, SessionResult};
use reelcap_common::config::{
    AudioFormat, AudioQuality, CaptureConfiguration, SourceSelection, VideoCodec, VideoContainer,
};

pub struct RecordArgs {
    pub output: Option<PathBuf>,
    pub fps: Option<u32>,
    pub display: Option<u32>,
    pub window: Option<String>,
    pub mic: bool,
    pub no_cursor: bool,
    pub exclude_self: bool,
    pub container: Option<String>,
    pub codec: Option<String>,
    pub audio_format: Option<String>,
    pub audio_quality: Option<String>,
    pub keep_partial: bool,
    pub save_defaults: bool,
}

pub async fn run(args: RecordArgs) -> anyhow::Result<()> {
    let config = build_config(args)?;

    println!("Starting recording:");
    println!("  Output: {}", config.output_directory.display());
    println!("  FPS: {}", config.frame_rate);
    println!(
        "  Container/codec: {:?}/{:?}",
        config.container, config.video_codec
    );
    println!(
        "  Audio: {:?} ({:?})",
        config.effective_audio_format(),
        config.audio_quality
    );
    println!("  Mic: {}", config.record_mic);
    println!();

    let session = RecordingSession::new(config);
    session.start()?;

    println!("Recording... press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    println!();
    println!("Stopping after {:.1}s...", session.elapsed_secs());
    let result = session.stop()?;

    match result {
        SessionResult::Finalized { path, summary } => {
            println!("Recording saved to: {}", path.display());
            print_summary(&summary);
        }
        SessionResult::FinalizedWithWarnings {
            path,
            summary,
            degraded,
        } => {
            println!("Recording saved to: {}", path.display());
            print_summary(&summary);
            println!("Warnings:");
            for d in degraded {
                println!("  {} track degraded: {}", d.track, d.reason);
            }
            if summary.partially_complete {
                println!("  File is partially complete (final drain timed out)");
            }
        }
        SessionResult::Failed { reason } => {
            anyhow::bail!("Recording failed: {reason}");
        }
    }

    Ok(())
}

fn print_summary(summary: &reelcap_capture_engine::muxer::FileSummary) {
    for track in &summary.tracks {
        println!(
            "  {}: {} chunks, {} bytes, {} dropped",
            track.kind, track.chunks, track.bytes, track.dropped_units
        );
    }
}

/// Layer CLI flags over the persisted defaults.
fn build_config(args: RecordArgs) -> anyhow::Result<CaptureConfiguration> {
    let mut config = CaptureConfiguration::load();

    if let Some(output) = args.output {
        config.output_directory = output;
    }
    if let Some(fps) = args.fps {
        config.frame_rate = fps;
    }
    if let Some(id) = args.display {
        config.source = SourceSelection::Display(id);
    }
    if let Some(ref window) = args.window {
        let id = parse_window_id(window)?;
        config.source = SourceSelection::Window(id);
    }
    if args.mic {
        config.record_mic = true;
    }
    if args.no_cursor {
        config.show_cursor = false;
    }
    if args.exclude_self {
        config.exclude_self = true;
    }
    if args.keep_partial {
        config.keep_partial_output = true;
    }
    if let Some(ref container) = args.container {
        config.container = match container.as_str() {
            "mp4" => VideoContainer::Mp4,
            "mov" => VideoContainer::Mov,
            other => anyhow::bail!("Unknown container: {other} (expected mp4|mov)"),
        };
    }
    if let Some(ref codec) = args.codec {
        config.video_codec = match codec.as_str() {
            "h264" => VideoCodec::H264,
            "h265" => VideoCodec::H265,
            other => anyhow::bail!("Unknown codec: {other} (expected h264|h265)"),
        };
    }
    if let Some(ref format) = args.audio_format {
        config.audio_format = match format.as_str() {
            "aac" => AudioFormat::Aac,
            "alac" => AudioFormat::Alac,
            "flac" => AudioFormat::Flac,
            "opus" => AudioFormat::Opus,
            other => anyhow::bail!("Unknown audio format: {other} (expected aac|alac|flac|opus)"),
        };
    }
    if let Some(ref quality) = args.audio_quality {
        config.audio_quality = match quality.as_str() {
            "normal" => AudioQuality::Normal,
            "good" => AudioQuality::Good,
            "high" => AudioQuality::High,
            "extreme" => AudioQuality::Extreme,
            other => {
                anyhow::bail!("Unknown audio quality: {other} (expected normal|good|high|extreme)")
            }
        };
    }

    if args.save_defaults {
        config.save()?;
        println!("Saved as new defaults.");
    }

    Ok(config)
}

fn parse_window_id(raw: &str) -> anyhow::Result<u64> {
    let id = if let Some(hex) = raw.strip_prefix("0x") {
        u64::from_str_radix(hex, 16)?
    } else {
        raw.parse()?
    };
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::parse_window_id;

    #[test]
    fn window_ids_parse_hex_and_decimal() {
        assert_eq!(parse_window_id("0x3c00041").unwrap(), 0x3c00041);
        assert_eq!(parse_window_id("42").unwrap(), 42);
        assert!(parse_window_id("zzz").is_err());
    }
}
