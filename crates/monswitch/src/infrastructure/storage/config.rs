//! TOML-based configuration persistence.
//!
//! Reads and writes [`SwitchConfig`] to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\Monswitch\config.toml`
//! - Linux:    `$XDG_CONFIG_HOME/monswitch/config.toml`, else `~/.config/monswitch/config.toml`
//! - macOS:    `~/Library/Application Support/Monswitch/config.toml`
//!
//! A typical file:
//!
//! ```toml
//! trigger_device = "keyboard"
//! log_level = "info"
//!
//! [[monitors]]
//! description = "DELL U2720Q"
//! serial_number = "ABC123"
//! attach = { code = 0x60, value = 0x0F }
//! detach = { code = 0x60, value = 0x11 }
//! ```
//!
//! A custom trigger class is written as `trigger_device = { class = "<guid>" }`.
//!
//! Fields absent from the file fall back to their serde defaults, so an empty
//! file is a valid (if useless) configuration.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use monswitch_core::MonitorRule;

/// Device interface class of keyboards (`GUID_DEVINTERFACE_KEYBOARD`).
pub const KEYBOARD_INTERFACE_CLASS: Uuid = Uuid::from_u128(0x884b96c3_56ef_11d1_bc8c_00a0c91405dd);

/// Device interface class of mice (`GUID_DEVINTERFACE_MOUSE`).
pub const MOUSE_INTERFACE_CLASS: Uuid = Uuid::from_u128(0x378de44c_56ef_11d1_bc8c_00a0c91405dd);

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    /// The config parsed but a rule is unusable.
    #[error("monitor rule #{index} is invalid: {reason}")]
    Invalid { index: usize, reason: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// The device class whose arrival and removal trigger switching.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerDevice {
    #[default]
    Keyboard,
    Mouse,
    /// Any device interface class GUID.
    Class(Uuid),
}

impl TriggerDevice {
    /// The device interface class GUID to register notifications for.
    pub fn interface_class(&self) -> Uuid {
        match self {
            TriggerDevice::Keyboard => KEYBOARD_INTERFACE_CLASS,
            TriggerDevice::Mouse => MOUSE_INTERFACE_CLASS,
            TriggerDevice::Class(class) => *class,
        }
    }
}

impl fmt::Display for TriggerDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerDevice::Keyboard => f.write_str("keyboard"),
            TriggerDevice::Mouse => f.write_str("mouse"),
            TriggerDevice::Class(class) => write!(f, "device class {class}"),
        }
    }
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SwitchConfig {
    /// Device class watched for arrival/removal.
    #[serde(default)]
    pub trigger_device: TriggerDevice,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Switching rules, applied in order.
    #[serde(default)]
    pub monitors: Vec<MonitorRule>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            trigger_device: TriggerDevice::default(),
            log_level: default_log_level(),
            monitors: Vec::new(),
        }
    }
}

impl SwitchConfig {
    /// Checks that every rule can do something.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for the first rule with neither
    /// `attach` nor `detach`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.monitors.iter().position(|rule| !rule.has_action()) {
            Some(index) => Err(ConfigError::Invalid {
                index,
                reason: "a rule needs an `attach` or `detach` setting".to_string(),
            }),
            None => Ok(()),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Parses and validates a TOML config document.
///
/// # Errors
///
/// [`ConfigError::Parse`] for malformed TOML, [`ConfigError::Invalid`] for a
/// rule without actions.
pub fn parse_config(content: &str) -> Result<SwitchConfig, ConfigError> {
    let config: SwitchConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the default config file.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads the config from `path`, or from the default location when `None`.
///
/// A missing file yields [`SwitchConfig::default()`].
///
/// # Errors
///
/// [`ConfigError::Io`] for file-system errors other than "not found", plus
/// everything [`parse_config`] reports.
pub fn load_config(path: Option<&Path>) -> Result<SwitchConfig, ConfigError> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => config_file_path()?,
    };
    match std::fs::read_to_string(&path) {
        Ok(content) => parse_config(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SwitchConfig::default()),
        Err(source) => Err(ConfigError::Io { path, source }),
    }
}

/// Renders `config` as TOML.
pub fn to_toml(config: &SwitchConfig) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(config)?)
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// [`ConfigError::Io`] for file-system failures or [`ConfigError::Serialize`]
/// if serialization fails.
pub fn save_config(config: &SwitchConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = to_toml(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Candidate config locations: an environment variable holding a base
/// directory and the path below it.  The first variable that is set wins.
type ConfigBase = (&'static str, &'static [&'static str]);

#[cfg(target_os = "windows")]
const CONFIG_BASES: &[ConfigBase] = &[("APPDATA", &["Monswitch"])];

#[cfg(target_os = "macos")]
const CONFIG_BASES: &[ConfigBase] = &[("HOME", &["Library", "Application Support", "Monswitch"])];

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const CONFIG_BASES: &[ConfigBase] = &[("XDG_CONFIG_HOME", &["monswitch"]), ("HOME", &[".config", "monswitch"])];

fn platform_config_dir() -> Option<PathBuf> {
    resolve_config_dir(CONFIG_BASES, |name| std::env::var_os(name))
}

fn resolve_config_dir(bases: &[ConfigBase], lookup: impl Fn(&str) -> Option<OsString>) -> Option<PathBuf> {
    bases.iter().find_map(|&(variable, below)| {
        let base = lookup(variable).filter(|value| !value.is_empty())?;
        Some(below.iter().fold(PathBuf::from(base), |dir, part| dir.join(part)))
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use monswitch_core::VcpSetting;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("monswitch_test_{}", Uuid::new_v4()))
    }

    // ── Config directory ─────────────────────────────────────────────────────

    const XDG_STYLE: &[ConfigBase] = &[("XDG_CONFIG_HOME", &["monswitch"]), ("HOME", &[".config", "monswitch"])];

    #[test]
    fn test_config_dir_prefers_first_set_variable() {
        let dir = resolve_config_dir(XDG_STYLE, |name| match name {
            "XDG_CONFIG_HOME" => Some(OsString::from("/cfg")),
            "HOME" => Some(OsString::from("/home/u")),
            _ => None,
        });
        assert_eq!(dir, Some(PathBuf::from("/cfg").join("monswitch")));
    }

    #[test]
    fn test_config_dir_skips_empty_variable() {
        // Arrange
        let lookup = |name: &str| match name {
            "XDG_CONFIG_HOME" => Some(OsString::new()),
            "HOME" => Some(OsString::from("/home/u")),
            _ => None,
        };

        // Act
        let dir = resolve_config_dir(XDG_STYLE, lookup);

        // Assert
        assert_eq!(dir, Some(PathBuf::from("/home/u").join(".config").join("monswitch")));
    }

    #[test]
    fn test_config_dir_is_none_without_variables() {
        assert_eq!(resolve_config_dir(XDG_STYLE, |_| None), None);
    }

    // ── Defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn test_switch_config_default_watches_keyboards_at_info() {
        // Arrange / Act
        let cfg = SwitchConfig::default();

        // Assert
        assert_eq!(cfg.trigger_device, TriggerDevice::Keyboard);
        assert_eq!(cfg.log_level, "info");
        assert!(cfg.monitors.is_empty());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        assert_eq!(parse_config("").unwrap(), SwitchConfig::default());
    }

    // ── Trigger device ────────────────────────────────────────────────────────

    #[test]
    fn test_trigger_device_resolves_well_known_classes() {
        assert_eq!(
            TriggerDevice::Keyboard.interface_class().to_string(),
            "884b96c3-56ef-11d1-bc8c-00a0c91405dd"
        );
        assert_eq!(
            TriggerDevice::Mouse.interface_class().to_string(),
            "378de44c-56ef-11d1-bc8c-00a0c91405dd"
        );
    }

    #[test]
    fn test_trigger_device_accepts_custom_class() {
        // Arrange
        let toml_str = r#"trigger_device = { class = "a5dcbf10-6530-11d2-901f-00c04fb951ed" }"#;

        // Act
        let cfg = parse_config(toml_str).expect("parse");

        // Assert
        assert_eq!(
            cfg.trigger_device.interface_class(),
            Uuid::from_u128(0xa5dcbf10_6530_11d2_901f_00c04fb951ed)
        );
    }

    #[test]
    fn test_trigger_device_parses_mouse() {
        let cfg = parse_config(r#"trigger_device = "mouse""#).expect("parse");
        assert_eq!(cfg.trigger_device, TriggerDevice::Mouse);
    }

    // ── Rules ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_parse_rules_with_hex_values() {
        // Arrange
        let toml_str = r#"
log_level = "debug"

[[monitors]]
description = "DELL U2720Q"
serial_number = "ABC123"
attach = { code = 0x60, value = 0x0F }
detach = { code = 0x60, value = 0x11 }

[[monitors]]
adapter = "Intel(R) UHD Graphics 630"
detach = { code = 0x60, value = 0x12 }
"#;

        // Act
        let cfg = parse_config(toml_str).expect("parse");

        // Assert
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.monitors.len(), 2);
        assert_eq!(cfg.monitors[0].attach, Some(VcpSetting { code: 0x60, value: 0x0F }));
        assert_eq!(cfg.monitors[1].description, None);
        assert_eq!(cfg.monitors[1].attach, None);
    }

    #[test]
    fn test_rule_without_action_is_rejected_with_its_index() {
        // Arrange
        let toml_str = r#"
[[monitors]]
description = "ok"
attach = { code = 0x60, value = 1 }

[[monitors]]
description = "no action"
"#;

        // Act
        let err = parse_config(toml_str).unwrap_err();

        // Assert
        assert!(matches!(err, ConfigError::Invalid { index: 1, .. }), "got {err:?}");
    }

    #[test]
    fn test_vcp_code_out_of_range_is_a_parse_error() {
        let toml_str = r#"
[[monitors]]
attach = { code = 0x160, value = 1 }
"#;
        assert!(matches!(parse_config(toml_str), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_invalid_toml_returns_parse_error() {
        assert!(matches!(parse_config("[[[ not valid toml"), Err(ConfigError::Parse(_))));
    }

    // ── Load / save ───────────────────────────────────────────────────────────

    #[test]
    fn test_load_config_returns_default_when_file_absent() {
        let path = temp_dir().join("config.toml");
        assert_eq!(load_config(Some(&path)).unwrap(), SwitchConfig::default());
    }

    #[test]
    fn test_save_and_load_config_round_trip() {
        // Arrange
        let dir = temp_dir();
        let path = dir.join("nested").join("config.toml");
        let cfg = SwitchConfig {
            trigger_device: TriggerDevice::Mouse,
            log_level: "debug".to_string(),
            monitors: vec![MonitorRule {
                description: Some("description 1".to_string()),
                attach: Some(VcpSetting { code: 17, value: 98 }),
                ..Default::default()
            }],
        };

        // Act
        save_config(&cfg, &path).expect("save");
        let loaded = load_config(Some(&path)).expect("load");

        // Assert
        assert_eq!(loaded, cfg);

        // Cleanup
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(path.ends_with("config.toml"), "got {path:?}");
        }
        // NoPlatformConfigDir is acceptable in a stripped environment.
    }
}
