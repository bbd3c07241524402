//! Configuration management for combine-player

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Synchronization behavior
    #[serde(default)]
    pub sync: SyncConfig,

    /// Where native player commands run
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Logging output
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Path to config file (not serialized)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// How often the engine polls both streams for phase changes (ms).
    /// 0 disables polling; phases then only arrive as explicit notifications.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Initial playback speed applied to both streams
    #[serde(default = "default_playback_speed")]
    pub playback_speed: f64,
}

/// Execution context for native player commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// A worker thread owned by the dispatcher
    #[default]
    DedicatedThread,
    /// Whichever thread calls into the core
    CallerThread,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    #[serde(default)]
    pub mode: DispatchMode,

    /// Name given to the dedicated worker thread
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to also write a daily rolling log file
    #[serde(default = "default_true")]
    pub file_logging: bool,

    /// Log directory override (platform log directory if unset)
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

// Default value functions
fn default_poll_interval() -> u64 {
    250
}

fn default_playback_speed() -> f64 {
    1.0
}

fn default_thread_name() -> String {
    "native-player".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            playback_speed: default_playback_speed(),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            mode: DispatchMode::default(),
            thread_name: default_thread_name(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_logging: true,
            directory: None,
        }
    }
}

impl Config {
    /// Load configuration from default location or create default
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let mut config = Config::default();
            config.config_path = Some(config_path);
            config.save()?;
            Ok(config)
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.validate()?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = self.config_path()?;

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Get the config file path
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config_path {
            Some(path) => Ok(path.clone()),
            None => Self::default_config_path(),
        }
    }

    /// Point this configuration at a different file for [`save`](Self::save)
    pub fn set_config_path(&mut self, path: PathBuf) {
        self.config_path = Some(path);
    }

    /// Get default config path
    fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = directories::ProjectDirs::from("dev", "combine-player", "combine-player")
            .context("Failed to determine config directory")?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Reject values the core cannot work with
    pub fn validate(&self) -> Result<()> {
        let speed = self.sync.playback_speed;
        if !speed.is_finite() || speed <= 0.0 {
            bail!("sync.playback_speed must be a positive number, got {}", speed);
        }

        if self.dispatcher.mode == DispatchMode::DedicatedThread
            && self.dispatcher.thread_name.trim().is_empty()
        {
            bail!("dispatcher.thread_name must not be empty");
        }

        Ok(())
    }
}
