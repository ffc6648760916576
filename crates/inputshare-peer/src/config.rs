//! TOML-based configuration for the peer application.
//!
//! Reads and writes `PeerConfig` at the platform-appropriate location:
//! - Linux:    `~/.config/inputshare/config.toml`
//! - macOS:    `~/Library/Application Support/inputshare/config.toml`
//! - Windows:  `%APPDATA%\inputshare\config.toml`
//!
//! Every field has a serde default so a partial (or absent) file works on
//! first run and across upgrades. CLI flags override file values.
//!
//! The display list exists because the HID backends are the only component
//! allowed to talk to the OS: on hosts where the backend cannot enumerate
//! displays the session falls back to the layout configured here.

use std::path::PathBuf;
use std::time::Duration;

use inputshare_core::domain::geometry::{GeometryError, Rect, ScreenGeometry};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid display layout: {0}")]
    Layout(#[from] GeometryError),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PeerConfig {
    #[serde(default)]
    pub network: NetworkSettings,
    #[serde(default)]
    pub handoff: HandoffSettings,
    /// Display layout used when the platform backend cannot enumerate
    /// displays. Empty means "single primary display".
    #[serde(default)]
    pub displays: Vec<DisplayEntry>,
    /// Friendly name advertised over discovery. Defaults to the hostname.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    /// Stable identifier carried in every envelope. Generated on first run
    /// and persisted so the peer keeps its identity across restarts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

/// Network port and bind-address settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSettings {
    /// TCP port for the session channel.
    #[serde(default = "default_port")]
    pub port: u16,
    /// IP address the receiver binds. `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// Edge-trigger and forwarding-pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HandoffSettings {
    /// Pixels from the boundary at which the cursor is "in zone".
    #[serde(default = "default_enter_threshold")]
    pub enter_threshold_px: f64,
    /// Pixels from the boundary at which the cursor is "out of zone".
    /// Must exceed `enter_threshold_px`.
    #[serde(default = "default_exit_threshold")]
    pub exit_threshold_px: f64,
    /// How long the cursor must dwell in zone before the handoff starts.
    #[serde(default = "default_dwell_ms")]
    pub dwell_ms: u64,
    /// How long to wait for the receiver's `activated` answer.
    #[serde(default = "default_activation_timeout_ms")]
    pub activation_timeout_ms: u64,
    /// Coalescer flush period while forwarding. 4 ms ≈ 250 Hz.
    #[serde(default = "default_coalesce_interval_ms")]
    pub coalesce_interval_ms: u64,
}

/// One display rectangle in the fallback layout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisplayEntry {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_port() -> u16 {
    4242
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_enter_threshold() -> f64 {
    3.0
}
fn default_exit_threshold() -> f64 {
    32.0
}
fn default_dwell_ms() -> u64 {
    75
}
fn default_activation_timeout_ms() -> u64 {
    inputshare_core::domain::handoff::DEFAULT_ACTIVATION_TIMEOUT.as_millis() as u64
}
fn default_coalesce_interval_ms() -> u64 {
    4
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
        }
    }
}

impl Default for HandoffSettings {
    fn default() -> Self {
        Self {
            enter_threshold_px: default_enter_threshold(),
            exit_threshold_px: default_exit_threshold(),
            dwell_ms: default_dwell_ms(),
            activation_timeout_ms: default_activation_timeout_ms(),
            coalesce_interval_ms: default_coalesce_interval_ms(),
        }
    }
}

impl HandoffSettings {
    pub fn dwell(&self) -> Duration {
        Duration::from_millis(self.dwell_ms)
    }

    pub fn activation_timeout(&self) -> Duration {
        Duration::from_millis(self.activation_timeout_ms)
    }

    pub fn coalesce_interval(&self) -> Duration {
        Duration::from_millis(self.coalesce_interval_ms.max(1))
    }
}

impl PeerConfig {
    /// Builds the screen geometry from the configured display list, or a
    /// single 1920×1080 primary when none is configured.
    pub fn geometry(&self) -> Result<ScreenGeometry, ConfigError> {
        if self.displays.is_empty() {
            return Ok(ScreenGeometry::single(1920.0, 1080.0));
        }
        let rects = self
            .displays
            .iter()
            .map(|d| Rect::new(d.x, d.y, d.width, d.height))
            .collect();
        Ok(ScreenGeometry::new(rects)?)
    }

    /// The stable device id, generating one on first use. The caller saves
    /// the config afterwards so the id survives restarts.
    pub fn ensure_device_id(&mut self) -> String {
        if let Some(id) = &self.device_id {
            return id.clone();
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.device_id = Some(id.clone());
        id
    }

    /// The name advertised to the peer, defaulting to the hostname.
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.device_name {
            return name.clone();
        }
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "inputshare-peer".to_string())
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the platform base
/// directory cannot be determined from the environment.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the config from disk, returning defaults if the file does not yet
/// exist.
pub fn load_config() -> Result<PeerConfig, ConfigError> {
    let path = config_file_path()?;
    match std::fs::read_to_string(&path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PeerConfig::default()),
        Err(e) => Err(ConfigError::Io { path, source: e }),
    }
}

/// Persists the config, creating the directory if needed.
pub fn save_config(config: &PeerConfig) -> Result<(), ConfigError> {
    let path = config_file_path()?;
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("inputshare"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("inputshare")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("inputshare"))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_expected_network_values() {
        let cfg = PeerConfig::default();
        assert_eq!(cfg.network.port, 4242);
        assert_eq!(cfg.network.bind_address, "0.0.0.0");
    }

    #[test]
    fn test_default_handoff_tuning() {
        let cfg = PeerConfig::default();
        assert_eq!(cfg.handoff.enter_threshold_px, 3.0);
        assert_eq!(cfg.handoff.exit_threshold_px, 32.0);
        assert_eq!(cfg.handoff.dwell(), Duration::from_millis(75));
        assert_eq!(cfg.handoff.activation_timeout(), Duration::from_secs(2));
        assert_eq!(cfg.handoff.coalesce_interval(), Duration::from_millis(4));
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let mut cfg = PeerConfig::default();
        cfg.network.port = 5151;
        cfg.handoff.dwell_ms = 120;
        cfg.displays.push(DisplayEntry {
            x: 0.0,
            y: 0.0,
            width: 2560.0,
            height: 1440.0,
        });
        cfg.device_name = Some("studio".to_string());

        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let restored: PeerConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(cfg, restored);
    }

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let cfg: PeerConfig = toml::from_str("").expect("empty config is valid");
        assert_eq!(cfg, PeerConfig::default());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let cfg: PeerConfig = toml::from_str(
            r#"
[handoff]
dwell_ms = 200
"#,
        )
        .expect("partial config is valid");
        assert_eq!(cfg.handoff.dwell_ms, 200);
        assert_eq!(cfg.handoff.coalesce_interval_ms, 4);
        assert_eq!(cfg.network.port, 4242);
    }

    #[test]
    fn test_invalid_toml_is_a_parse_error() {
        let result: Result<PeerConfig, _> = toml::from_str("[[[ not toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_geometry_defaults_to_single_primary() {
        let cfg = PeerConfig::default();
        let geo = cfg.geometry().unwrap();
        assert_eq!(geo.displays().len(), 1);
        assert_eq!(geo.virtual_bounds().width, 1920.0);
    }

    #[test]
    fn test_geometry_uses_configured_displays() {
        let mut cfg = PeerConfig::default();
        cfg.displays.push(DisplayEntry {
            x: 0.0,
            y: 0.0,
            width: 2000.0,
            height: 1200.0,
        });
        cfg.displays.push(DisplayEntry {
            x: 2000.0,
            y: 0.0,
            width: 1440.0,
            height: 900.0,
        });
        let geo = cfg.geometry().unwrap();
        assert_eq!(geo.displays().len(), 2);
        assert_eq!(geo.virtual_bounds().max_x(), 3440.0);
    }

    #[test]
    fn test_ensure_device_id_is_stable_once_generated() {
        let mut cfg = PeerConfig::default();
        let first = cfg.ensure_device_id();
        let second = cfg.ensure_device_id();
        assert_eq!(first, second);
        assert_eq!(cfg.device_id.as_deref(), Some(first.as_str()));
    }

    #[test]
    fn test_display_name_prefers_configured_name() {
        let cfg = PeerConfig {
            device_name: Some("desk-mac".to_string()),
            ..PeerConfig::default()
        };
        assert_eq!(cfg.display_name(), "desk-mac");
    }

    #[test]
    fn test_coalesce_interval_never_goes_to_zero() {
        let cfg: PeerConfig = toml::from_str(
            r#"
[handoff]
coalesce_interval_ms = 0
"#,
        )
        .unwrap();
        assert_eq!(cfg.handoff.coalesce_interval(), Duration::from_millis(1));
    }
}
