//! Configuration management for Scrapo.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides.
//!
//! The host page never signals when lazily loaded content has mounted or a
//! navigation has finished, so every wait in the scroll, pagination and run
//! loops comes from [`TimingPolicy`]. These are fixed pauses, not readiness
//! checks; slow pages can still be extracted before they settle.

use crate::error::{ConfigError, ConfigResult};
use crate::types::SchemaDriftPolicy;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration.
///
/// This is loaded from `~/.config/scrapo/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Browser connection settings
    pub browser: BrowserConfig,
    /// Pauses used while scrolling, paginating and between pages
    pub timing: TimingPolicy,
    /// Scroll checkpoints and container detection
    pub scroll: ScrollConfig,
    /// Persistence settings
    pub storage: StorageConfig,
    /// CSV download settings
    pub export: ExportConfig,
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_file(&config_path)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit file. A missing file is an error.
    pub fn load_file(path: &Path) -> ConfigResult<Self> {
        tracing::debug!("Loading config from {}", path.display());
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(contents: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Reads `path` when given, otherwise the default location. Supports the
    /// following environment variables:
    /// - `SCRAPO_HEADLESS`: Override browser headless mode (true/false)
    /// - `SCRAPO_DEBUGGER_URL`: Connect to a running browser instead of launching one
    /// - `SCRAPO_SETTLE_MS`: Override the delay after a successful page turn
    ///
    /// Values that do not parse are logged and ignored.
    pub fn load_with_env(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => Self::load_file(path)?,
            None => Self::load()?,
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("SCRAPO_HEADLESS") {
            match val.trim().parse() {
                Ok(headless) => {
                    self.browser.headless = headless;
                    tracing::debug!("Override browser.headless from env: {}", headless);
                }
                Err(_) => tracing::warn!("Ignoring SCRAPO_HEADLESS={:?}: expected true or false", val),
            }
        }

        if let Some(val) = lookup("SCRAPO_DEBUGGER_URL") {
            if !val.trim().is_empty() {
                tracing::debug!("Override browser.debugger_url from env: {}", val);
                self.browser.debugger_url = Some(val);
            }
        }

        if let Some(val) = lookup("SCRAPO_SETTLE_MS") {
            match val.trim().parse() {
                Ok(ms) => {
                    self.timing.settle_delay_ms = ms;
                    tracing::debug!("Override timing.settle_delay_ms from env: {}", ms);
                }
                Err(_) => tracing::warn!("Ignoring SCRAPO_SETTLE_MS={:?}: expected milliseconds", val),
            }
        }
    }

    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.timing.scroll_step_min_ms > self.timing.scroll_step_max_ms {
            return Err(ConfigError::InvalidValue {
                field: "timing.scroll_step_min_ms".to_string(),
                reason: format!(
                    "{} is greater than scroll_step_max_ms ({})",
                    self.timing.scroll_step_min_ms, self.timing.scroll_step_max_ms
                ),
            });
        }

        if self.scroll.checkpoints.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "scroll.checkpoints".to_string(),
                reason: "at least one checkpoint is required".to_string(),
            });
        }

        if let Some(bad) = self
            .scroll
            .checkpoints
            .iter()
            .find(|c| !(0.0..=1.0).contains(*c))
        {
            return Err(ConfigError::InvalidValue {
                field: "scroll.checkpoints".to_string(),
                reason: format!("{bad} is outside 0.0..=1.0"),
            });
        }

        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/scrapo/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs = ProjectDirs::from("com", "scrapo", "scrapo").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path.
    ///
    /// Uses XDG base directories: `~/.local/share/scrapo`
    pub fn data_dir() -> ConfigResult<PathBuf> {
        let dirs = ProjectDirs::from("com", "scrapo", "scrapo").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.data_dir().to_path_buf())
    }

    /// Database path from config, or `<data_dir>/scrapo.db`.
    pub fn database_path(&self) -> ConfigResult<PathBuf> {
        match &self.storage.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::data_dir()?.join("scrapo.db")),
        }
    }
}

/// Browser connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run a launched browser in headless mode
    pub headless: bool,
    /// Browser window width
    pub window_width: u32,
    /// Browser window height
    pub window_height: u32,
    /// DevTools websocket URL of an already running browser. When set the
    /// engine attaches to it, reusing the user's logged-in session.
    pub debugger_url: Option<String>,
    /// Pages whose URL starts with this prefix are preferred as the active page
    pub page_url_prefix: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            window_width: 1440,
            window_height: 900,
            debugger_url: None,
            page_url_prefix: "https://www.linkedin.com/sales".to_string(),
        }
    }
}

/// Fixed pauses used in place of page readiness signals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingPolicy {
    /// Lower bound of the randomized pause after each scroll checkpoint
    pub scroll_step_min_ms: u64,
    /// Upper bound of the randomized pause after each scroll checkpoint
    pub scroll_step_max_ms: u64,
    /// Pause once the last checkpoint is reached
    pub scroll_bottom_pause_ms: u64,
    /// Pause after scrolling back to the top
    pub scroll_top_pause_ms: u64,
    /// Pause after bringing the next-page control into view
    pub pre_click_pause_ms: u64,
    /// Pause after activating the next-page control
    pub post_click_pause_ms: u64,
    /// Pause after a verified page turn, before the next extraction
    pub settle_delay_ms: u64,
}

impl TimingPolicy {
    /// A policy with every pause set to zero.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            scroll_step_min_ms: 0,
            scroll_step_max_ms: 0,
            scroll_bottom_pause_ms: 0,
            scroll_top_pause_ms: 0,
            pre_click_pause_ms: 0,
            post_click_pause_ms: 0,
            settle_delay_ms: 0,
        }
    }

    /// Pause after the last scroll checkpoint.
    #[must_use]
    pub fn scroll_bottom_pause(&self) -> Duration {
        Duration::from_millis(self.scroll_bottom_pause_ms)
    }

    /// Pause after returning to the top.
    #[must_use]
    pub fn scroll_top_pause(&self) -> Duration {
        Duration::from_millis(self.scroll_top_pause_ms)
    }

    /// Pause before activating the next-page control.
    #[must_use]
    pub fn pre_click_pause(&self) -> Duration {
        Duration::from_millis(self.pre_click_pause_ms)
    }

    /// Pause after activating the next-page control.
    #[must_use]
    pub fn post_click_pause(&self) -> Duration {
        Duration::from_millis(self.post_click_pause_ms)
    }

    /// Pause after a verified page turn.
    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Default for TimingPolicy {
    fn default() -> Self {
        Self {
            scroll_step_min_ms: 800,
            scroll_step_max_ms: 1200,
            scroll_bottom_pause_ms: 1500,
            scroll_top_pause_ms: 1000,
            pre_click_pause_ms: 2000,
            post_click_pause_ms: 4000,
            settle_delay_ms: 6000,
        }
    }
}

/// Scroll checkpoints and container detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollConfig {
    /// Fractions of the scrollable height visited in order
    pub checkpoints: Vec<f64>,
    /// Minimum visible height for an element to count as the scroll container
    pub min_visible_height: u32,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            checkpoints: vec![0.0, 0.05, 0.33, 0.66, 1.0],
            min_visible_height: 300,
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `SQLite` file holding the key-value store
    pub database_path: Option<PathBuf>,
    /// Handling of row-shaped batches whose header differs from the dataset's
    pub schema_drift: SchemaDriftPolicy,
}

/// CSV download settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Directory receiving downloaded CSV files
    pub output_dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
        }
    }
}
