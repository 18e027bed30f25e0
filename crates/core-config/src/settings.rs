//! Application settings parsed from `marigraph.toml`.
//!
//! Discovery prefers a local `marigraph.toml` before falling back to the
//! platform config directory. Unknown fields are ignored (TOML
//! deserialization tolerance) to allow forward evolution.

use anyhow::Result;
use serde::Deserialize;
use std::{fs, path::PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RenderSettings {
    /// Auto-rotation step per tick, degrees.
    #[serde(default = "RenderSettings::default_rotate_step")]
    pub rotate_step_degrees: f64,
    /// Auto-rotation cadence, milliseconds.
    #[serde(default = "RenderSettings::default_rotate_interval")]
    pub rotate_interval_ms: u64,
    /// Surface shading (Lambert + specular) on mesh segments.
    #[serde(default)]
    pub lighting: bool,
    /// Bottom grid divisions.
    #[serde(default = "RenderSettings::default_grid_divisions")]
    pub grid_divisions: usize,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            rotate_step_degrees: Self::default_rotate_step(),
            rotate_interval_ms: Self::default_rotate_interval(),
            lighting: false,
            grid_divisions: Self::default_grid_divisions(),
        }
    }
}

impl RenderSettings {
    const fn default_rotate_step() -> f64 {
        5.0
    }
    const fn default_rotate_interval() -> u64 {
        200
    }
    const fn default_grid_divisions() -> usize {
        4
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RouterSettings {
    /// Global ready-handshake timeout, milliseconds.
    #[serde(default = "RouterSettings::default_ready_timeout")]
    pub ready_timeout_ms: u64,
    /// Grace period before a worker that ignored SHUTDOWN is killed.
    #[serde(default = "RouterSettings::default_shutdown_grace")]
    pub shutdown_grace_ms: u64,
    /// Per-worker outbound queue bound, frames.
    #[serde(default = "RouterSettings::default_outbound_queue")]
    pub outbound_queue: usize,
    /// Largest accepted frame payload, bytes.
    #[serde(default = "RouterSettings::default_max_payload")]
    pub max_payload_bytes: u32,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            ready_timeout_ms: Self::default_ready_timeout(),
            shutdown_grace_ms: Self::default_shutdown_grace(),
            outbound_queue: Self::default_outbound_queue(),
            max_payload_bytes: Self::default_max_payload(),
        }
    }
}

impl RouterSettings {
    const fn default_ready_timeout() -> u64 {
        10_000
    }
    const fn default_shutdown_grace() -> u64 {
        2_000
    }
    const fn default_outbound_queue() -> usize {
        256
    }
    const fn default_max_payload() -> u32 {
        16 * 1024 * 1024
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub render: RenderSettings,
    #[serde(default)]
    pub router: RouterSettings,
}

/// Best-effort config path: local working directory first, then the
/// platform config dir.
pub fn discover() -> PathBuf {
    let local = PathBuf::from("marigraph.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("marigraph").join("marigraph.toml");
    }
    PathBuf::from("marigraph.toml")
}

/// Load settings from `path` (or the discovered location). A missing or
/// unreadable file yields defaults; a present-but-invalid file is an
/// error so typos never silently revert the dashboard to defaults.
pub fn load_settings(path: Option<PathBuf>) -> Result<Settings> {
    let path = path.unwrap_or_else(discover);
    match fs::read_to_string(&path) {
        Ok(content) => {
            let settings: Settings = toml::from_str(&content)?;
            info!(target: "config.settings", path = %path.display(), "settings loaded");
            Ok(settings)
        }
        Err(_) => {
            info!(target: "config.settings", path = %path.display(), "no settings file, using defaults");
            Ok(Settings::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_contract() {
        let s = Settings::default();
        assert_eq!(s.render.rotate_step_degrees, 5.0);
        assert_eq!(s.render.rotate_interval_ms, 200);
        assert_eq!(s.router.ready_timeout_ms, 10_000);
        assert_eq!(s.router.shutdown_grace_ms, 2_000);
        assert_eq!(s.router.outbound_queue, 256);
        assert_eq!(s.router.max_payload_bytes, 16 * 1024 * 1024);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let s: Settings = toml::from_str("[router]\nready_timeout_ms = 500\n").unwrap();
        assert_eq!(s.router.ready_timeout_ms, 500);
        assert_eq!(s.router.outbound_queue, 256);
        assert_eq!(s.render, RenderSettings::default());
    }

    #[test]
    fn unknown_fields_ignored() {
        let s: Settings =
            toml::from_str("[render]\nlighting = true\nfuture_knob = \"x\"\n").unwrap();
        assert!(s.render.lighting);
    }

    #[test]
    fn missing_file_is_defaults_invalid_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert_eq!(
            load_settings(Some(missing)).unwrap(),
            Settings::default()
        );
        let bad = dir.path().join("bad.toml");
        let mut f = fs::File::create(&bad).unwrap();
        writeln!(f, "[render\nbroken").unwrap();
        assert!(load_settings(Some(bad)).is_err());
    }
}
