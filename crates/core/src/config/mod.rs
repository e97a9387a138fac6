//! Configuration module for devbridge
//!
//! Configuration can be loaded from TOML files and/or environment variables.
//! Every timing knob of the sync engine lives in [`SyncConfig`].

mod defaults;
mod loading;


use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use defaults::*;

/// Returns the path to the global configuration file
///
/// The global config is stored at `~/.devbridge/config.toml`.
pub fn global_config_path() -> Result<PathBuf> {
    let home_dir = dirs::home_dir()
        .ok_or_else(|| Error::config("Unable to determine home directory".to_string()))?;
    Ok(home_dir.join(".devbridge").join("config.toml"))
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Sync engine configuration
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Configuration for the bidirectional sync engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Debounce delay for changes made in the source tree
    #[serde(default = "default_source_to_target_delay_ms")]
    pub source_to_target_delay_ms: u64,

    /// Debounce delay for changes made in the target tree
    #[serde(default = "default_target_to_source_delay_ms")]
    pub target_to_source_delay_ms: u64,

    /// Safety bound after which an active lock is released unconditionally
    #[serde(default = "default_active_lock_timeout_ms")]
    pub active_lock_timeout_ms: u64,

    /// How long a path stays "recently synced" after its active lock clears
    #[serde(default = "default_recently_synced_window_ms")]
    pub recently_synced_window_ms: u64,

    /// Events within this window of the engine's own write are dropped
    #[serde(default = "default_recently_touched_window_ms")]
    pub recently_touched_window_ms: u64,

    /// Cool-down between finishing a sync and releasing its active lock
    #[serde(default = "default_release_delay_ms")]
    pub release_delay_ms: u64,

    /// Gap between the two size/mtime snapshots of one stability attempt
    #[serde(default = "default_stability_probe_interval_ms")]
    pub stability_probe_interval_ms: u64,

    /// Wait between failed stability attempts
    #[serde(default = "default_stability_retry_delay_ms")]
    pub stability_retry_delay_ms: u64,

    /// Stability attempts before giving up
    #[serde(default = "default_stability_max_attempts")]
    pub stability_max_attempts: u32,

    /// Zero-size waits tolerated before an empty file is reported unstable
    #[serde(default = "default_stability_max_empty_waits")]
    pub stability_max_empty_waits: u32,

    /// Quiet period required on a path before its event leaves the watcher
    #[serde(default = "default_settle_window_ms")]
    pub settle_window_ms: u64,

    /// Path components that are never synced (VCS metadata, OS files, backups)
    #[serde(default = "default_ignored_names")]
    pub ignored_names: Vec<String>,

    /// Glob patterns, matched against root-relative paths, that are never synced
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,

    /// Capacity of the raw filesystem event queue
    #[serde(default = "default_event_queue_size")]
    pub event_queue_size: usize,
}

impl SyncConfig {
    /// Create configuration from builder
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    pub fn source_to_target_delay(&self) -> Duration {
        Duration::from_millis(self.source_to_target_delay_ms)
    }

    pub fn target_to_source_delay(&self) -> Duration {
        Duration::from_millis(self.target_to_source_delay_ms)
    }

    pub fn active_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.active_lock_timeout_ms)
    }

    pub fn recently_synced_window(&self) -> Duration {
        Duration::from_millis(self.recently_synced_window_ms)
    }

    pub fn recently_touched_window(&self) -> Duration {
        Duration::from_millis(self.recently_touched_window_ms)
    }

    pub fn release_delay(&self) -> Duration {
        Duration::from_millis(self.release_delay_ms)
    }

    pub fn stability_probe_interval(&self) -> Duration {
        Duration::from_millis(self.stability_probe_interval_ms)
    }

    pub fn stability_retry_delay(&self) -> Duration {
        Duration::from_millis(self.stability_retry_delay_ms)
    }

    pub fn settle_window(&self) -> Duration {
        Duration::from_millis(self.settle_window_ms)
    }

    /// Validate timings, queue size and ignore patterns
    pub fn validate(&self) -> Result<()> {
        let delays = [
            ("sync.source_to_target_delay_ms", self.source_to_target_delay_ms),
            ("sync.target_to_source_delay_ms", self.target_to_source_delay_ms),
            ("sync.active_lock_timeout_ms", self.active_lock_timeout_ms),
            ("sync.stability_probe_interval_ms", self.stability_probe_interval_ms),
        ];
        for (name, value) in delays {
            if value == 0 {
                return Err(Error::config(format!("{name} must be greater than 0")));
            }
        }

        if self.stability_max_attempts == 0 {
            return Err(Error::config(
                "sync.stability_max_attempts must be greater than 0".to_string(),
            ));
        }

        // The lock must outlive the normal release path or it stops being a safety net.
        if self.active_lock_timeout_ms <= self.release_delay_ms {
            return Err(Error::config(format!(
                "sync.active_lock_timeout_ms ({}) must exceed sync.release_delay_ms ({})",
                self.active_lock_timeout_ms, self.release_delay_ms
            )));
        }

        if self.event_queue_size == 0 {
            return Err(Error::config(
                "sync.event_queue_size must be greater than 0".to_string(),
            ));
        }

        for pattern in &self.ignore_patterns {
            glob::Pattern::new(pattern).map_err(|e| {
                Error::config(format!("Invalid ignore pattern '{pattern}': {e}"))
            })?;
        }

        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            source_to_target_delay_ms: default_source_to_target_delay_ms(),
            target_to_source_delay_ms: default_target_to_source_delay_ms(),
            active_lock_timeout_ms: default_active_lock_timeout_ms(),
            recently_synced_window_ms: default_recently_synced_window_ms(),
            recently_touched_window_ms: default_recently_touched_window_ms(),
            release_delay_ms: default_release_delay_ms(),
            stability_probe_interval_ms: default_stability_probe_interval_ms(),
            stability_retry_delay_ms: default_stability_retry_delay_ms(),
            stability_max_attempts: default_stability_max_attempts(),
            stability_max_empty_waits: default_stability_max_empty_waits(),
            settle_window_ms: default_settle_window_ms(),
            ignored_names: default_ignored_names(),
            ignore_patterns: default_ignore_patterns(),
            event_queue_size: default_event_queue_size(),
        }
    }
}

/// Builder for SyncConfig
#[derive(Debug, Default)]
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    /// Set both debounce delays
    pub fn debounce_ms(mut self, source_to_target: u64, target_to_source: u64) -> Self {
        self.config.source_to_target_delay_ms = source_to_target;
        self.config.target_to_source_delay_ms = target_to_source;
        self
    }

    /// Set the active lock safety timeout
    pub fn active_lock_timeout_ms(mut self, ms: u64) -> Self {
        self.config.active_lock_timeout_ms = ms;
        self
    }

    /// Set the recently-synced grace window
    pub fn recently_synced_window_ms(mut self, ms: u64) -> Self {
        self.config.recently_synced_window_ms = ms;
        self
    }

    /// Set the recently-touched window
    pub fn recently_touched_window_ms(mut self, ms: u64) -> Self {
        self.config.recently_touched_window_ms = ms;
        self
    }

    /// Set the post-sync release delay
    pub fn release_delay_ms(mut self, ms: u64) -> Self {
        self.config.release_delay_ms = ms;
        self
    }

    /// Set stability probe timings
    pub fn stability(mut self, probe_interval_ms: u64, retry_delay_ms: u64, max_attempts: u32) -> Self {
        self.config.stability_probe_interval_ms = probe_interval_ms;
        self.config.stability_retry_delay_ms = retry_delay_ms;
        self.config.stability_max_attempts = max_attempts;
        self
    }

    /// Set the number of zero-size waits tolerated
    pub fn stability_max_empty_waits(mut self, waits: u32) -> Self {
        self.config.stability_max_empty_waits = waits;
        self
    }

    /// Set the watcher's write-settle window
    pub fn settle_window_ms(mut self, ms: u64) -> Self {
        self.config.settle_window_ms = ms;
        self
    }

    /// Add an ignored path component
    pub fn add_ignored_name(mut self, name: impl Into<String>) -> Self {
        self.config.ignored_names.push(name.into());
        self
    }

    /// Add an ignore pattern
    pub fn add_ignore_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.config.ignore_patterns.push(pattern.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> SyncConfig {
        self.config
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level when neither `RUST_LOG` nor `--verbose` is given
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: "pretty" or "compact"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.sync.validate()?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(Error::config(format!(
                "Invalid log level '{}'. Must be one of: {:?}",
                self.logging.level, valid_levels
            )));
        }

        let valid_formats = ["pretty", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(Error::config(format!(
                "Invalid log format '{}'. Must be one of: {:?}",
                self.logging.format, valid_formats
            )));
        }

        Ok(())
    }

    /// Serialize the configuration as pretty TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::config(format!("Failed to serialize config: {e}")))
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        let toml_string = self.to_toml_string()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::config(format!("Failed to create config directory: {e}")))?;
        }

        std::fs::write(path, toml_string)
            .map_err(|e| Error::config(format!("Failed to write config file: {e}")))?;

        Ok(())
    }
}
