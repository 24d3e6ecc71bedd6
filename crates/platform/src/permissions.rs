//! Permission and capability probing.
//!
//! All checks happen before a session starts recording: screen-capture
//! denial is fatal, microphone denial only degrades the mic track. The
//! core never prompts; surfacing the denial to the user is the settings
//! layer's job.

use reelcap_common::error::{RecorderError, RecorderResult};

/// A system capability the recorder may need.
#[derive(Debug, Clone)]
pub struct Capability {
    pub name: String,
    pub description: String,
    pub available: bool,
    pub required: bool,
    pub fix_instructions: Option<String>,
}

/// Check all capabilities and report status.
pub fn check_capabilities() -> Vec<Capability> {
    vec![
        check_display_access(),
        check_gstreamer(),
        check_audio_access(),
        check_microphone(),
    ]
}

/// Verify screen-capture access, failing before any recording starts.
///
/// Denial is fatal to the whole session and must never surface
/// mid-recording.
pub fn ensure_screen_capture_access() -> RecorderResult<()> {
    let cap = check_display_access();
    if cap.available {
        Ok(())
    } else {
        Err(RecorderError::permission_denied(
            "No graphical session available for screen capture",
        ))
    }
}

/// Probe for a usable microphone input.
///
/// Failure degrades the session (mic track omitted) rather than aborting
/// it.
pub fn probe_microphone() -> RecorderResult<()> {
    let cap = check_microphone();
    if cap.available {
        Ok(())
    } else {
        Err(RecorderError::mic_unavailable(
            "No microphone input device detected",
        ))
    }
}

fn check_display_access() -> Capability {
    let available = std::env::var("WAYLAND_DISPLAY").is_ok() || std::env::var("DISPLAY").is_ok();

    Capability {
        name: "Screen Capture".to_string(),
        description: "Graphical session for display/window capture".to_string(),
        available,
        required: true,
        fix_instructions: if !available {
            Some(
                "Ensure you are running a graphical desktop session (GNOME, KDE, etc.)".to_string(),
            )
        } else {
            None
        },
    }
}

fn check_gstreamer() -> Capability {
    let available = std::process::Command::new("gst-inspect-1.0")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);

    Capability {
        name: "GStreamer".to_string(),
        description: "Media framework for capture, encoding, and muxing".to_string(),
        available,
        required: true,
        fix_instructions: if !available {
            Some(
                "Install GStreamer: sudo apt install gstreamer1.0-tools gstreamer1.0-plugins-good"
                    .to_string(),
            )
        } else {
            None
        },
    }
}

fn check_audio_access() -> Capability {
    let available = std::path::Path::new("/run/user").exists();

    Capability {
        name: "System Audio".to_string(),
        description: "PipeWire/PulseAudio loopback for system-audio capture".to_string(),
        available,
        required: false,
        fix_instructions: if !available {
            Some("Install PipeWire: sudo apt install pipewire pipewire-pulse".to_string())
        } else {
            None
        },
    }
}

fn check_microphone() -> Capability {
    // pactl lists sources when an audio server is up; /dev/snd covers
    // bare ALSA setups.
    let via_pactl = std::process::Command::new("pactl")
        .args(["list", "short", "sources"])
        .output()
        .map(|o| o.status.success() && !o.stdout.is_empty())
        .unwrap_or(false);
    let via_alsa = std::path::Path::new("/dev/snd").exists();

    let available = via_pactl || via_alsa;

    Capability {
        name: "Microphone".to_string(),
        description: "Audio input device for the mic track".to_string(),
        available,
        required: false,
        fix_instructions: if !available {
            Some("Connect a microphone and verify it appears in `pactl list sources`".to_string())
        } else {
            None
        },
    }
}

/// Print a user-friendly capability report.
pub fn print_capability_report(capabilities: &[Capability]) {
    println!("Reelcap System Capabilities:");
    println!("{}", "-".repeat(60));

    for cap in capabilities {
        let status = if cap.available {
            "[OK]"
        } else if cap.required {
            "[MISSING - REQUIRED]"
        } else {
            "[MISSING - OPTIONAL]"
        };

        println!("  {} {}: {}", status, cap.name, cap.description);

        if let Some(ref fix) = cap.fix_instructions {
            println!("    Fix: {fix}");
        }
    }
}
