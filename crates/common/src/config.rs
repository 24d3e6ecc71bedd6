//! Capture configuration.
//!
//! A `CaptureConfiguration` is the immutable snapshot the settings layer
//! hands to a recording session: target source, frame rate, codec and
//! container choices, audio format/quality, and output location. The
//! session reads it once at start and never mutates it.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{RecorderError, RecorderResult};

/// Which kind of source a recording targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum SourceSelection {
    /// An entire display, by display identifier.
    Display(u32),
    /// A single window, by window identifier.
    Window(u64),
}

/// Output container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoContainer {
    Mp4,
    Mov,
}

impl VideoContainer {
    pub fn extension(&self) -> &'static str {
        match self {
            VideoContainer::Mp4 => "mp4",
            VideoContainer::Mov => "mov",
        }
    }
}

/// Video encoder selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    H265,
}

/// Audio encoder selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Aac,
    Alac,
    Flac,
    Opus,
}

impl AudioFormat {
    /// Lossless formats ignore the quality setting.
    pub fn is_lossless(&self) -> bool {
        matches!(self, AudioFormat::Alac | AudioFormat::Flac)
    }
}

/// Audio quality tier for lossy formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioQuality {
    Normal,
    Good,
    High,
    Extreme,
}

impl AudioQuality {
    /// Bitrate in kbps for lossy encoding.
    pub fn bitrate_kbps(&self) -> u32 {
        match self {
            AudioQuality::Normal => 128,
            AudioQuality::Good => 192,
            AudioQuality::High => 256,
            AudioQuality::Extreme => 320,
        }
    }
}

/// Immutable settings snapshot consumed once at session start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfiguration {
    /// What to record.
    pub source: SourceSelection,

    /// Target frame rate, 1–240.
    pub frame_rate: u32,

    /// Output container.
    pub container: VideoContainer,

    /// Video encoder.
    pub video_codec: VideoCodec,

    /// Audio encoder, shared by the system-audio and mic tracks.
    pub audio_format: AudioFormat,

    /// Audio quality tier; ignored for lossless formats.
    pub audio_quality: AudioQuality,

    /// Record the microphone as a separate track.
    pub record_mic: bool,

    /// Keep the mouse cursor visible in the capture.
    pub show_cursor: bool,

    /// Hide the recorder's own windows from the source catalog.
    pub exclude_self: bool,

    /// Directory the output file is written into.
    pub output_directory: PathBuf,

    /// On fatal failure, keep the partially written file instead of
    /// deleting it.
    #[serde(default)]
    pub keep_partial_output: bool,
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            source: SourceSelection::Display(0),
            frame_rate: 60,
            container: VideoContainer::Mp4,
            video_codec: VideoCodec::H264,
            audio_format: AudioFormat::Aac,
            audio_quality: AudioQuality::High,
            record_mic: false,
            show_cursor: true,
            exclude_self: false,
            output_directory: default_output_directory(),
            keep_partial_output: false,
        }
    }
}

impl CaptureConfiguration {
    /// Check internal consistency and environment preconditions.
    ///
    /// The output directory must exist and be writable before a session
    /// opens any capture resource.
    pub fn validate(&self) -> RecorderResult<()> {
        if self.frame_rate == 0 || self.frame_rate > 240 {
            return Err(RecorderError::config(format!(
                "Frame rate {} outside supported range 1-240",
                self.frame_rate
            )));
        }

        if !self.output_directory.is_dir() {
            return Err(RecorderError::config(format!(
                "Output directory does not exist: {}",
                self.output_directory.display()
            )));
        }

        let probe = self.output_directory.join(".reelcap-write-probe");
        std::fs::write(&probe, b"").map_err(|e| {
            RecorderError::config(format!(
                "Output directory not writable ({}): {e}",
                self.output_directory.display()
            ))
        })?;
        let _ = std::fs::remove_file(&probe);

        Ok(())
    }

    /// Audio format after applying container constraints.
    ///
    /// MP4 cannot carry Opus, so Opus falls back to AAC there. The
    /// session only ever sees the resolved format.
    pub fn effective_audio_format(&self) -> AudioFormat {
        match (self.audio_format, self.container) {
            (AudioFormat::Opus, VideoContainer::Mp4) => AudioFormat::Aac,
            (format, _) => format,
        }
    }

    /// Audio bitrate in kbps, or `None` for lossless formats.
    pub fn audio_bitrate_kbps(&self) -> Option<u32> {
        if self.effective_audio_format().is_lossless() {
            None
        } else {
            Some(self.audio_quality.bitrate_kbps())
        }
    }

    /// Deterministic, collision-free output file name for a recording
    /// started at `started_at`.
    pub fn output_file_name(&self, started_at: chrono::DateTime<chrono::Local>) -> String {
        format!(
            "Recording {}.{}",
            started_at.format("%Y-%m-%d at %H.%M.%S"),
            self.container.extension()
        )
    }

    /// Full output path for a recording started at `started_at`.
    pub fn output_path(&self, started_at: chrono::DateTime<chrono::Local>) -> PathBuf {
        self.output_directory.join(self.output_file_name(started_at))
    }

    /// Load persisted defaults, falling back to registered defaults when
    /// the file is missing or unreadable.
    pub fn load() -> Self {
        let path = config_file_path();
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", path, e);
                }
            }
        }
        Self::default()
    }

    /// Persist as the new defaults.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let path = config_file_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("reelcap").join("config.json")
}

/// Default output directory: the user's Videos directory when present,
/// else the home directory.
fn default_output_directory() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    let videos = PathBuf::from(&home).join("Videos");
    if videos.is_dir() {
        videos
    } else {
        PathBuf::from(home)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: PathBuf) -> CaptureConfiguration {
        CaptureConfiguration {
            output_directory: dir,
            ..Default::default()
        }
    }

    #[test]
    fn validate_rejects_out_of_range_frame_rate() {
        let dir = std::env::temp_dir();
        let mut config = test_config(dir);
        config.frame_rate = 0;
        assert!(matches!(
            config.validate(),
            Err(RecorderError::Config { .. })
        ));
        config.frame_rate = 241;
        assert!(matches!(
            config.validate(),
            Err(RecorderError::Config { .. })
        ));
        config.frame_rate = 240;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_output_directory() {
        let config = test_config(PathBuf::from("/nonexistent/reelcap-test"));
        assert!(matches!(
            config.validate(),
            Err(RecorderError::Config { .. })
        ));
    }

    #[test]
    fn opus_falls_back_to_aac_in_mp4() {
        let mut config = test_config(std::env::temp_dir());
        config.audio_format = AudioFormat::Opus;
        config.container = VideoContainer::Mp4;
        assert_eq!(config.effective_audio_format(), AudioFormat::Aac);

        config.container = VideoContainer::Mov;
        assert_eq!(config.effective_audio_format(), AudioFormat::Opus);
    }

    #[test]
    fn lossless_formats_ignore_quality() {
        let mut config = test_config(std::env::temp_dir());
        config.audio_format = AudioFormat::Flac;
        config.audio_quality = AudioQuality::Extreme;
        assert_eq!(config.audio_bitrate_kbps(), None);

        config.audio_format = AudioFormat::Aac;
        assert_eq!(config.audio_bitrate_kbps(), Some(320));
    }

    #[test]
    fn quality_tiers_map_to_expected_bitrates() {
        assert_eq!(AudioQuality::Normal.bitrate_kbps(), 128);
        assert_eq!(AudioQuality::Good.bitrate_kbps(), 192);
        assert_eq!(AudioQuality::High.bitrate_kbps(), 256);
        assert_eq!(AudioQuality::Extreme.bitrate_kbps(), 320);
    }

    #[test]
    fn output_name_is_timestamped_with_container_extension() {
        use chrono::TimeZone;
        let mut config = test_config(PathBuf::from("/tmp"));
        config.container = VideoContainer::Mov;
        let t = chrono::Local.with_ymd_and_hms(2026, 8, 6, 14, 30, 5).unwrap();
        assert_eq!(
            config.output_file_name(t),
            "Recording 2026-08-06 at 14.30.05.mov"
        );
        assert_eq!(
            config.output_path(t),
            PathBuf::from("/tmp/Recording 2026-08-06 at 14.30.05.mov")
        );
    }
}
