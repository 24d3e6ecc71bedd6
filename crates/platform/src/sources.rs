//! Capturable source discovery and exclusion policy.
//!
//! The enumerator queries the OS for displays and on-screen windows,
//! drops anything on the exclusion list, and returns an immutable
//! catalog snapshot. Consumers only ever hold a snapshot; every refresh
//! rebuilds the catalog wholesale.

use std::collections::HashSet;

use reelcap_common::error::{RecorderError, RecorderResult};
use serde::{Deserialize, Serialize};

/// Display server type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayServer {
    Wayland,
    X11,
    Unknown,
}

/// Detect the current display server.
pub fn detect_display_server() -> DisplayServer {
    if std::env::var("WAYLAND_DISPLAY").is_ok() {
        DisplayServer::Wayland
    } else if std::env::var("DISPLAY").is_ok() {
        DisplayServer::X11
    } else {
        DisplayServer::Unknown
    }
}

/// A capturable display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayInfo {
    pub id: u32,
    pub name: String,

    /// Resolution in physical pixels.
    pub width: u32,
    pub height: u32,

    /// Position in the virtual desktop.
    pub x: i32,
    pub y: i32,

    pub primary: bool,
}

/// A capturable on-screen window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowInfo {
    pub id: u64,

    /// Application identifier (WM_CLASS on X11), matched against the
    /// exclusion list.
    pub app_id: String,

    pub title: String,
}

/// Immutable snapshot of currently capturable sources.
#[derive(Debug, Clone, Default)]
pub struct SourceCatalog {
    pub displays: Vec<DisplayInfo>,
    pub windows: Vec<WindowInfo>,
}

impl SourceCatalog {
    pub fn display(&self, id: u32) -> Option<&DisplayInfo> {
        self.displays.iter().find(|d| d.id == id)
    }

    pub fn window(&self, id: u64) -> Option<&WindowInfo> {
        self.windows.iter().find(|w| w.id == id)
    }
}

/// Application identifiers that must never be offered as capturable
/// windows. Static, loaded once, never mutated at runtime.
#[derive(Debug, Clone)]
pub struct ExclusionList {
    ids: HashSet<String>,
}

/// Desktop-shell surfaces excluded by default: panels, docks, and
/// notification daemons that show up in window listings but are never a
/// meaningful recording target.
const DEFAULT_EXCLUSIONS: &[&str] = &[
    "gnome-shell",
    "plasmashell",
    "xfce4-panel",
    "lxpanel",
    "polybar",
    "waybar",
    "plank",
    "latte-dock",
    "dunst",
    "notification-daemon",
];

/// Identifiers of the recorder's own windows, suppressed when the
/// configuration sets `exclude_self`.
const SELF_IDS: &[&str] = &["reelcap", "reelcap-cli"];

impl ExclusionList {
    /// The built-in exclusion set.
    pub fn with_defaults() -> Self {
        Self {
            ids: DEFAULT_EXCLUSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// An exclusion set from explicit identifiers.
    pub fn from_ids(ids: impl IntoIterator<Item = String>) -> Self {
        Self {
            ids: ids.into_iter().map(|id| id.to_ascii_lowercase()).collect(),
        }
    }

    pub fn contains(&self, app_id: &str) -> bool {
        self.ids.contains(&app_id.to_ascii_lowercase())
    }
}

/// Discovers capturable sources and applies the exclusion policy.
pub struct SourceEnumerator {
    exclusions: ExclusionList,
    exclude_self: bool,
}

impl SourceEnumerator {
    pub fn new(exclusions: ExclusionList, exclude_self: bool) -> Self {
        Self {
            exclusions,
            exclude_self,
        }
    }

    /// Query the OS and return a fresh catalog.
    ///
    /// Fails with an enumeration error when the OS reports zero displays;
    /// at least one display must always exist, so this is treated as an
    /// unrecoverable environment error and never retried.
    pub fn refresh(&self) -> RecorderResult<SourceCatalog> {
        let server = detect_display_server();
        tracing::debug!(?server, "Refreshing source catalog");

        let mut displays = detect_displays(server)?;
        if displays.is_empty() {
            return Err(RecorderError::enumeration(
                "OS reported zero displays; at least one display must exist",
            ));
        }
        displays.sort_by_key(|d| d.id);

        let mut windows =
            filter_windows(detect_windows(server), &self.exclusions, self.exclude_self);
        windows.sort_by_key(|w| w.id);

        tracing::debug!(
            displays = displays.len(),
            windows = windows.len(),
            "Source catalog refreshed"
        );

        Ok(SourceCatalog { displays, windows })
    }
}

/// Drop excluded and (optionally) self-owned windows.
fn filter_windows(
    windows: Vec<WindowInfo>,
    exclusions: &ExclusionList,
    exclude_self: bool,
) -> Vec<WindowInfo> {
    windows
        .into_iter()
        .filter(|w| {
            if exclusions.contains(&w.app_id) {
                return false;
            }
            if exclude_self {
                let app = w.app_id.to_ascii_lowercase();
                if SELF_IDS.iter().any(|id| app.contains(id)) {
                    return false;
                }
            }
            true
        })
        .collect()
}

fn detect_displays(server: DisplayServer) -> RecorderResult<Vec<DisplayInfo>> {
    match server {
        DisplayServer::X11 => {
            let output = std::process::Command::new("xrandr")
                .arg("--listmonitors")
                .output();
            match output {
                Ok(out) if out.status.success() => {
                    let text = String::from_utf8_lossy(&out.stdout);
                    Ok(parse_xrandr_monitors(&text))
                }
                _ => {
                    tracing::debug!("xrandr unavailable; assuming a single default display");
                    Ok(vec![default_display()])
                }
            }
        }
        // Wayland compositors negotiate the concrete output through the
        // capture consent dialog; the catalog advertises one logical
        // display entry.
        DisplayServer::Wayland => Ok(vec![default_display()]),
        DisplayServer::Unknown => Err(RecorderError::enumeration(
            "No display server detected (neither WAYLAND_DISPLAY nor DISPLAY is set)",
        )),
    }
}

fn detect_windows(server: DisplayServer) -> Vec<WindowInfo> {
    if server != DisplayServer::X11 {
        return Vec::new();
    }
    let output = std::process::Command::new("wmctrl").arg("-lx").output();
    match output {
        Ok(out) if out.status.success() => {
            parse_wmctrl_windows(&String::from_utf8_lossy(&out.stdout))
        }
        _ => {
            tracing::debug!("wmctrl unavailable; window capture targets not listed");
            Vec::new()
        }
    }
}

fn default_display() -> DisplayInfo {
    DisplayInfo {
        id: 0,
        name: "default".to_string(),
        width: 1920,
        height: 1080,
        x: 0,
        y: 0,
        primary: true,
    }
}

/// Parse `xrandr --listmonitors` output.
///
/// ```text
/// Monitors: 2
///  0: +*eDP-1 1920/344x1080/194+0+0  eDP-1
///  1: +HDMI-1 2560/597x1440/336+1920+0  HDMI-1
/// ```
fn parse_xrandr_monitors(text: &str) -> Vec<DisplayInfo> {
    let mut displays = Vec::new();
    for line in text.lines().skip(1) {
        let mut parts = line.split_whitespace();
        let Some(index) = parts.next() else { continue };
        let Some(id) = index.trim_end_matches(':').parse::<u32>().ok() else {
            continue;
        };
        let Some(flags) = parts.next() else { continue };
        let primary = flags.contains('*');
        let Some(geometry) = parts.next() else { continue };
        let Some((width, height, x, y)) = parse_monitor_geometry(geometry) else {
            continue;
        };
        let name = parts.next().unwrap_or("unknown").to_string();
        displays.push(DisplayInfo {
            id,
            name,
            width,
            height,
            x,
            y,
            primary,
        });
    }
    displays
}

/// Parse a geometry token like `1920/344x1080/194+0+0`.
fn parse_monitor_geometry(token: &str) -> Option<(u32, u32, i32, i32)> {
    let (size, offsets) = token.split_once('+')?;
    let (x_str, y_str) = offsets.split_once('+')?;
    let (w_part, h_part) = size.split_once('x')?;
    let width = w_part.split('/').next()?.parse().ok()?;
    let height = h_part.split('/').next()?.parse().ok()?;
    let x = x_str.parse().ok()?;
    let y = y_str.parse().ok()?;
    Some((width, height, x, y))
}

/// Parse `wmctrl -lx` output.
///
/// ```text
/// 0x03c00041  0 navigator.Firefox   host Mozilla Firefox
/// ```
fn parse_wmctrl_windows(text: &str) -> Vec<WindowInfo> {
    let mut windows = Vec::new();
    for line in text.lines() {
        let mut parts = line.split_whitespace();
        let Some(id_hex) = parts.next() else { continue };
        let Some(id) = u64::from_str_radix(id_hex.trim_start_matches("0x"), 16).ok() else {
            continue;
        };
        let Some(_desktop) = parts.next() else { continue };
        let Some(wm_class) = parts.next() else { continue };
        // WM_CLASS comes as instance.Class; the class half identifies
        // the application.
        let app_id = wm_class
            .rsplit('.')
            .next()
            .unwrap_or(wm_class)
            .to_ascii_lowercase();
        let Some(_host) = parts.next() else { continue };
        let title = parts.collect::<Vec<_>>().join(" ");
        windows.push(WindowInfo { id, app_id, title });
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(id: u64, app_id: &str) -> WindowInfo {
        WindowInfo {
            id,
            app_id: app_id.to_string(),
            title: format!("window {id}"),
        }
    }

    #[test]
    fn excluded_identifiers_never_appear_in_catalog() {
        let exclusions = ExclusionList::with_defaults();
        let windows = vec![
            window(1, "firefox"),
            window(2, "gnome-shell"),
            window(3, "plasmashell"),
            window(4, "terminal"),
        ];
        let filtered = filter_windows(windows, &exclusions, false);
        let ids: Vec<u64> = filtered.iter().map(|w| w.id).collect();
        assert_eq!(ids, vec![1, 4]);
    }

    #[test]
    fn exclude_self_drops_own_windows() {
        let exclusions = ExclusionList::from_ids(std::iter::empty());
        let windows = vec![window(1, "firefox"), window(2, "Reelcap")];
        let filtered = filter_windows(windows, &exclusions, true);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, 1);
    }

    #[test]
    fn self_windows_stay_when_not_excluding_self() {
        let exclusions = ExclusionList::from_ids(std::iter::empty());
        let windows = vec![window(1, "reelcap")];
        assert_eq!(filter_windows(windows, &exclusions, false).len(), 1);
    }

    #[test]
    fn exclusion_matching_is_case_insensitive() {
        let exclusions = ExclusionList::with_defaults();
        assert!(exclusions.contains("Gnome-shell"));
        assert!(exclusions.contains("POLYBAR"));
        assert!(!exclusions.contains("firefox"));
    }

    #[test]
    fn parses_xrandr_listmonitors_output() {
        let text = "Monitors: 2\n 0: +*eDP-1 1920/344x1080/194+0+0  eDP-1\n 1: +HDMI-1 2560/597x1440/336+1920+0  HDMI-1\n";
        let displays = parse_xrandr_monitors(text);
        assert_eq!(displays.len(), 2);
        assert_eq!(displays[0].id, 0);
        assert_eq!(displays[0].width, 1920);
        assert_eq!(displays[0].height, 1080);
        assert!(displays[0].primary);
        assert_eq!(displays[1].x, 1920);
        assert!(!displays[1].primary);
        assert_eq!(displays[1].name, "HDMI-1");
    }

    #[test]
    fn parses_wmctrl_window_listing() {
        let text = "0x03c00041  0 navigator.Firefox   host Mozilla Firefox\n0x04200003  0 term.Gnome-terminal host Terminal\n";
        let windows = parse_wmctrl_windows(text);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].id, 0x03c00041);
        assert_eq!(windows[0].app_id, "firefox");
        assert_eq!(windows[0].title, "Mozilla Firefox");
        assert_eq!(windows[1].app_id, "gnome-terminal");
    }
}
