//! Daemon configuration loaded from TOML.

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub module: ModuleConfig,
    #[serde(default)]
    pub layout_sync: LayoutSyncConfig,
    #[serde(default)]
    pub input: InputConfig,
}

/// Runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Display connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Exit when the primary display disconnects in a Wayland session.
    #[serde(default = "default_true")]
    pub exit_when_main_display_disconnected: bool,
    /// Additional displays to connect to at startup, besides the primary.
    #[serde(default)]
    pub displays: Vec<String>,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            exit_when_main_display_disconnected: true,
            displays: Vec::new(),
        }
    }
}

/// KDE keyboard layout synchronisation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutSyncConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Program used to emit session bus signals.
    #[serde(default = "default_bus_program")]
    pub bus_program: String,
}

impl Default for LayoutSyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bus_program: default_bus_program(),
        }
    }
}

/// Input method settings of the standalone host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Default layout of the active input-method group.
    #[serde(default = "default_layout")]
    pub default_layout: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            default_layout: default_layout(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_bus_program() -> String {
    "dbus-send".to_string()
}

fn default_layout() -> String {
    "us".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("exit_when_main_display_disconnected = true"));
        assert!(toml_str.contains("default_layout = \"us\""));
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.module.exit_when_main_display_disconnected);
        assert!(config.module.displays.is_empty());
        assert!(config.layout_sync.enabled);
        assert_eq!(config.daemon.log_level, "info");
    }

    #[test]
    fn parse_example_config() {
        let toml_str = r#"
[daemon]
log_level = "debug"

[module]
exit_when_main_display_disconnected = false
displays = ["wayland-1", "/run/user/1000/nested-0"]

[layout_sync]
enabled = false
bus_program = "/usr/bin/dbus-send"

[input]
default_layout = "de-nodeadkeys"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.daemon.log_level, "debug");
        assert!(!config.module.exit_when_main_display_disconnected);
        assert_eq!(config.module.displays, vec!["wayland-1", "/run/user/1000/nested-0"]);
        assert!(!config.layout_sync.enabled);
        assert_eq!(config.layout_sync.bus_program, "/usr/bin/dbus-send");
        assert_eq!(config.input.default_layout, "de-nodeadkeys");
    }
}
