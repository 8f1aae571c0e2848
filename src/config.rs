//! Configuration loading and management
//!
//! Handles parsing of `.taskreg.toml` configuration files.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::geometry::Insets;

/// Name of the configuration file looked up by [`Config::load_from_dir`].
pub const CONFIG_FILENAME: &str = ".taskreg.toml";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Display geometry the registry resolves configurations against
    #[serde(default)]
    pub display: DisplayConfig,

    /// Registry policy knobs
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Lock-task whitelist
    #[serde(default)]
    pub lock_task: LockTaskConfig,

    /// Snapshot and thumbnail persistence
    #[serde(default)]
    pub persist: PersistConfig,
}

/// Display geometry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_width_px")]
    pub width_px: u32,

    #[serde(default = "default_height_px")]
    pub height_px: u32,

    #[serde(default = "default_density_dpi")]
    pub density_dpi: u32,

    /// System decorations (status bar, navigation bar) along display edges
    #[serde(default)]
    pub decor_insets: Insets,
}

fn default_width_px() -> u32 {
    1080
}

fn default_height_px() -> u32 {
    1920
}

fn default_density_dpi() -> u32 {
    420
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width_px: default_width_px(),
            height_px: default_height_px(),
            density_dpi: default_density_dpi(),
            decor_insets: Insets::default(),
        }
    }
}

/// Registry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Minimum task edge (dp) when a task declares no minimum size
    #[serde(default = "default_min_size_dp")]
    pub default_min_size_dp: u32,

    /// Treat every task as resizeable
    #[serde(default)]
    pub force_resizable_activities: bool,

    /// Allow freeform, docked and pinned stacks
    #[serde(default = "default_true")]
    pub supports_multi_window: bool,

    /// Allow the docked stack
    #[serde(default = "default_true")]
    pub supports_split_screen: bool,

    /// Upper clamp for a task's max-recents value
    #[serde(default = "default_max_recents_limit")]
    pub max_recents_limit: u32,
}

fn default_min_size_dp() -> u32 {
    220
}

fn default_true() -> bool {
    true
}

fn default_max_recents_limit() -> u32 {
    50
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_min_size_dp: default_min_size_dp(),
            force_resizable_activities: false,
            supports_multi_window: true,
            supports_split_screen: true,
            max_recents_limit: default_max_recents_limit(),
        }
    }
}

/// Lock-task configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LockTaskConfig {
    /// Per-user package whitelists
    #[serde(default)]
    pub users: Vec<LockTaskUser>,
}

/// Whitelisted packages for one user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockTaskUser {
    pub user_id: u32,
    #[serde(default)]
    pub packages: Vec<String>,
}

impl LockTaskConfig {
    /// Whether `package` is whitelisted for `user_id`.
    pub fn is_whitelisted(&self, user_id: u32, package: &str) -> bool {
        self.users
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .any(|entry| entry.packages.iter().any(|pkg| pkg == package))
    }

    fn validate(&self) -> crate::error::Result<()> {
        let mut seen = HashSet::new();
        for entry in &self.users {
            if !seen.insert(entry.user_id) {
                return Err(crate::error::Error::InvalidConfig(format!(
                    "lock_task.users has duplicate user_id {}",
                    entry.user_id
                )));
            }
            if entry.packages.iter().any(|pkg| pkg.trim().is_empty()) {
                return Err(crate::error::Error::InvalidConfig(format!(
                    "lock_task.users[{}].packages cannot include empty entries",
                    entry.user_id
                )));
            }
        }
        Ok(())
    }
}

/// Persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistConfig {
    /// Directory holding the snapshot and thumbnails, relative to the config dir
    #[serde(default = "default_persist_dir")]
    pub dir: PathBuf,

    /// How long to wait for the snapshot lock
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_persist_dir() -> PathBuf {
    PathBuf::from(".taskreg")
}

fn default_lock_timeout_ms() -> u64 {
    crate::lock::DEFAULT_LOCK_TIMEOUT_MS
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            dir: default_persist_dir(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl Config {
    /// Load configuration from a `.taskreg.toml` file
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a directory, or return defaults
    pub fn load_from_dir(dir: &Path) -> Self {
        let config_path = dir.join(CONFIG_FILENAME);
        if !config_path.exists() {
            return Self::default();
        }
        match Self::load(&config_path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(path = %config_path.display(), error = %err, "ignoring invalid config");
                Self::default()
            }
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> crate::error::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> crate::error::Result<()> {
        if self.display.width_px == 0 || self.display.height_px == 0 {
            return Err(crate::error::Error::InvalidConfig(
                "display.width_px and display.height_px must be > 0".to_string(),
            ));
        }
        let limit = crate::geometry::MAX_COORDINATE.unsigned_abs();
        if self.display.width_px > limit || self.display.height_px > limit {
            return Err(crate::error::Error::InvalidConfig(format!(
                "display.width_px and display.height_px must be <= {limit}"
            )));
        }
        if self.display.density_dpi == 0 {
            return Err(crate::error::Error::InvalidConfig(
                "display.density_dpi must be > 0".to_string(),
            ));
        }
        let insets = &self.display.decor_insets;
        if insets.left < 0 || insets.top < 0 || insets.right < 0 || insets.bottom < 0 {
            return Err(crate::error::Error::InvalidConfig(
                "display.decor_insets cannot be negative".to_string(),
            ));
        }
        if i64::from(insets.left) + i64::from(insets.right) >= i64::from(self.display.width_px)
            || i64::from(insets.top) + i64::from(insets.bottom) >= i64::from(self.display.height_px)
        {
            return Err(crate::error::Error::InvalidConfig(
                "display.decor_insets leave no usable area".to_string(),
            ));
        }
        if self.registry.max_recents_limit == 0 {
            return Err(crate::error::Error::InvalidConfig(
                "registry.max_recents_limit must be > 0".to_string(),
            ));
        }
        if self.persist.dir.as_os_str().is_empty() {
            return Err(crate::error::Error::InvalidConfig(
                "persist.dir cannot be empty".to_string(),
            ));
        }
        self.lock_task.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn defaults_are_expected() {
        let cfg = Config::default();
        assert_eq!(cfg.display.width_px, 1080);
        assert_eq!(cfg.display.height_px, 1920);
        assert_eq!(cfg.display.density_dpi, 420);
        assert_eq!(cfg.display.decor_insets, Insets::default());
        assert_eq!(cfg.registry.default_min_size_dp, 220);
        assert!(!cfg.registry.force_resizable_activities);
        assert!(cfg.registry.supports_multi_window);
        assert!(cfg.registry.supports_split_screen);
        assert_eq!(cfg.registry.max_recents_limit, 50);
        assert!(cfg.lock_task.users.is_empty());
        assert_eq!(cfg.persist.dir, PathBuf::from(".taskreg"));
    }

    #[test]
    fn load_parses_overrides() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILENAME);
        let content = r#"
[display]
width_px = 2560
height_px = 1600
density_dpi = 320

[display.decor_insets]
top = 48
bottom = 96

[registry]
default_min_size_dp = 180
force_resizable_activities = true
supports_split_screen = false
max_recents_limit = 20

[[lock_task.users]]
user_id = 0
packages = ["com.example.kiosk"]

[persist]
dir = "state"
lock_timeout_ms = 250
"#;
        fs::write(&path, content.trim()).expect("write config");

        let cfg = Config::load(&path).expect("load config");
        assert_eq!(cfg.display.width_px, 2560);
        assert_eq!(cfg.display.decor_insets.top, 48);
        assert_eq!(cfg.display.decor_insets.bottom, 96);
        assert_eq!(cfg.display.decor_insets.left, 0);
        assert_eq!(cfg.registry.default_min_size_dp, 180);
        assert!(cfg.registry.force_resizable_activities);
        assert!(cfg.registry.supports_multi_window);
        assert!(!cfg.registry.supports_split_screen);
        assert_eq!(cfg.registry.max_recents_limit, 20);
        assert!(cfg.lock_task.is_whitelisted(0, "com.example.kiosk"));
        assert!(!cfg.lock_task.is_whitelisted(10, "com.example.kiosk"));
        assert_eq!(cfg.persist.dir, PathBuf::from("state"));
        assert_eq!(cfg.persist.lock_timeout_ms, 250);
    }

    #[test]
    fn invalid_display_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILENAME);
        fs::write(&path, "[display]\ndensity_dpi = 0").expect("write config");

        let err = Config::load(&path).expect_err("invalid config");
        match err {
            crate::error::Error::InvalidConfig(_) => {}
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn duplicate_lock_task_user_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILENAME);
        let content = r#"
[[lock_task.users]]
user_id = 0
packages = ["a"]

[[lock_task.users]]
user_id = 0
packages = ["b"]
"#;
        fs::write(&path, content.trim()).expect("write config");

        let err = Config::load(&path).expect_err("invalid config");
        assert!(matches!(err, crate::error::Error::InvalidConfig(_)));
    }

    #[test]
    fn load_from_dir_defaults_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = Config::load_from_dir(dir.path());
        assert_eq!(cfg.display.width_px, 1080);
    }

    #[test]
    fn save_writes_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.toml");
        let cfg = Config::default();
        cfg.save(&path).expect("save config");

        let written = fs::read_to_string(&path).expect("read config");
        assert!(written.contains("density_dpi = 420"));
        let reloaded = Config::load(&path).expect("reload");
        assert_eq!(reloaded.registry.max_recents_limit, 50);
    }
}
