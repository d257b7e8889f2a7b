//! Desired-state configuration model.
//!
//! A [`DesiredState`] is one immutable snapshot of everything the control
//! plane should converge on: process-wide settings plus a map of display id
//! to [`DisplaySpec`]. Snapshots are produced by an external config source
//! (the server binary reads them from a JSON file) and consumed wholesale by
//! the reconciliation controller; specs are replaced, never patched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default control port, used when a fresh config file is generated.
pub const DEFAULT_API_PORT: u16 = 5270;

fn default_true() -> bool {
    true
}

/// Desired configuration for a single display.
///
/// Identity is the id keying the map in [`DesiredState`], not the spec
/// value. Field names follow the JSON config file (camelCase).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplaySpec {
    /// X-position of the display window. When unset the surface picks.
    #[serde(default)]
    pub x: Option<i32>,
    /// Y-position of the display window.
    #[serde(default)]
    pub y: Option<i32>,
    pub width: u32,
    pub height: u32,

    #[serde(default)]
    pub full_screen: bool,
    /// Keep the display above other windows (only honored in fullscreen).
    #[serde(default)]
    pub on_top: bool,
    /// Render without a window frame.
    #[serde(default)]
    pub frameless: bool,
    /// Content zoom factor.
    #[serde(default)]
    pub zoom: Option<f64>,

    /// CSS background color injected behind the content.
    #[serde(default)]
    pub background_color: Option<String>,
    /// Overlay the display id and current URL on top of the content.
    #[serde(default)]
    pub display_debug: bool,

    /// Content to load when no explicit content has been played.
    #[serde(default, rename = "defaultURL")]
    pub default_url: Option<String>,

    /// Disabled displays are treated as absent by reconciliation.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for DisplaySpec {
    fn default() -> Self {
        Self {
            x: None,
            y: None,
            width: 1280,
            height: 720,
            full_screen: false,
            on_top: false,
            frameless: false,
            zoom: None,
            background_color: None,
            display_debug: false,
            default_url: Some("https://bouncingdvdlogo.com/".to_string()),
            enabled: true,
        }
    }
}

impl DisplaySpec {
    /// Whether the injected content decoration (background, debug overlay)
    /// differs between two specs, requiring a reload to re-apply.
    pub fn content_decoration_differs(&self, other: &DisplaySpec) -> bool {
        self.background_color != other.background_color || self.display_debug != other.display_debug
    }
}

/// Settings shared by every display in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SharedSettings {
    /// Base URL that relative content references are joined against.
    #[serde(default, rename = "baseURL")]
    pub base_url: Option<String>,
}

/// One desired-state snapshot for the whole fleet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesiredState {
    /// Port for the control API. `None` disables the API entirely.
    #[serde(default)]
    pub api_port: Option<u16>,
    /// Optional shared secret required by the control API.
    #[serde(default)]
    pub api_key: Option<String>,
    /// When true, interactively-modified specs are not written back to disk.
    #[serde(default)]
    pub freeze: bool,
    #[serde(default)]
    pub shared: SharedSettings,
    #[serde(default)]
    pub displays: BTreeMap<String, DisplaySpec>,
}

impl Default for DesiredState {
    fn default() -> Self {
        let mut displays = BTreeMap::new();
        displays.insert("default".to_string(), DisplaySpec::default());
        Self {
            api_port: Some(DEFAULT_API_PORT),
            api_key: None,
            freeze: false,
            shared: SharedSettings::default(),
            displays,
        }
    }
}

impl DesiredState {
    /// Ids of all enabled displays in this snapshot.
    pub fn enabled_ids(&self) -> impl Iterator<Item = &str> {
        self.displays
            .iter()
            .filter(|(_, spec)| spec.enabled)
            .map(|(id, _)| id.as_str())
    }
}
