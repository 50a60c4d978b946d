//! Daemon Configuration
//!
//! Stored as TOML in `~/.config/cosmic/cosmic-ext-notify/notify.toml`. A
//! default file is written on first start.

use anyhow::{Context, Result};
use clap::ValueEnum;
use cosmic_ext_notify::dispatcher::DEFAULT_APP_NAME;
use cosmic_ext_notify::{EngineConfig, Settings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "notify.toml";

/// Daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// User-facing notification settings
    #[serde(default)]
    pub notifications: Settings,

    /// Scheduling constants
    #[serde(default)]
    pub timing: EngineConfig,

    /// Display backend selection
    #[serde(default)]
    pub backend: BackendConfig,

    /// Notification sound
    #[serde(default)]
    pub sound: SoundConfig,
}

/// Where alerts are displayed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// org.freedesktop.Notifications on the session bus
    #[default]
    Freedesktop,
    /// Bubbles kept by the daemon itself
    InApp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,

    /// Application name sent with each alert and used as hidden title
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Icon name for freedesktop alerts
    #[serde(default = "default_icon")]
    pub icon: String,

    /// Expiry requested from the notification server (-1 = server default)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoundConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Program run once per audible alert pass
    #[serde(default = "default_sound_command")]
    pub command: String,

    #[serde(default = "default_sound_args")]
    pub args: Vec<String>,
}

fn default_app_name() -> String {
    DEFAULT_APP_NAME.to_string()
}

fn default_icon() -> String {
    "mail-unread-symbolic".to_string()
}

fn default_timeout_ms() -> i32 {
    -1
}

fn default_true() -> bool {
    true
}

fn default_sound_command() -> String {
    "canberra-gtk-play".to_string()
}

fn default_sound_args() -> Vec<String> {
    vec!["-i".to_string(), "message-new-instant".to_string()]
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            app_name: default_app_name(),
            icon: default_icon(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for SoundConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            command: default_sound_command(),
            args: default_sound_args(),
        }
    }
}

impl Config {
    /// Directory holding the daemon configuration
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("cosmic")
            .join("cosmic-ext-notify")
    }

    pub fn default_path() -> PathBuf {
        Self::config_dir().join(CONFIG_FILE)
    }

    /// Load from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load from `path`, writing the defaults there if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path).context("Failed to read config file")?;
            let config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        self.timing
            .validate()
            .context("Invalid [timing] section")?;
        if self.notifications.max_count == 0 {
            anyhow::bail!("notifications.max_count must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosmic_ext_notify::NotifyView;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.backend.kind, BackendKind::Freedesktop);
        assert_eq!(config.backend.app_name, DEFAULT_APP_NAME);
        assert_eq!(config.timing.minimum_delay_ms, 100);
        assert!(config.sound.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.timing, config.timing);
        assert_eq!(parsed.notifications, config.notifications);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
            [notifications]
            view = "show_name"

            [backend]
            kind = "in_app"

            [timing]
            grouping_window_ms = 800
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();

        assert_eq!(config.notifications.view, NotifyView::ShowName);
        assert!(config.notifications.desktop_enabled);
        assert_eq!(config.backend.kind, BackendKind::InApp);
        assert_eq!(config.backend.icon, "mail-unread-symbolic");
        assert_eq!(config.timing.grouping_window_ms, 800);
        assert_eq!(config.timing.max_grouping_window_ms, 5000);
        assert_eq!(config.sound.command, "canberra-gtk-play");
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.backend.kind, BackendKind::Freedesktop);

        let mut changed = config.clone();
        changed.backend.kind = BackendKind::InApp;
        changed.notifications.max_count = 5;
        changed.save_to(&path).unwrap();

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.backend.kind, BackendKind::InApp);
        assert_eq!(reloaded.notifications.max_count, 5);
    }

    #[test]
    fn test_invalid_timing_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[timing]\nmax_grouping_window_ms = 0\n").unwrap();

        assert!(Config::load_from(&path).is_err());
    }
}
