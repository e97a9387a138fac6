//! Default values and functions for configuration

pub(crate) const DEFAULT_LOG_LEVEL: &str = "info";
pub(crate) const DEFAULT_LOG_FORMAT: &str = "pretty";

pub(crate) fn default_source_to_target_delay_ms() -> u64 {
    2000
}

// Changes from inside the container tend to come from multi-step installs
// and builds, so they get longer to settle.
pub(crate) fn default_target_to_source_delay_ms() -> u64 {
    4000
}

pub(crate) fn default_active_lock_timeout_ms() -> u64 {
    10_000
}

pub(crate) fn default_recently_synced_window_ms() -> u64 {
    5000
}

pub(crate) fn default_recently_touched_window_ms() -> u64 {
    3000
}

pub(crate) fn default_release_delay_ms() -> u64 {
    1000
}

pub(crate) fn default_stability_probe_interval_ms() -> u64 {
    500
}

pub(crate) fn default_stability_retry_delay_ms() -> u64 {
    1000
}

pub(crate) fn default_stability_max_attempts() -> u32 {
    3
}

pub(crate) fn default_stability_max_empty_waits() -> u32 {
    6
}

pub(crate) fn default_settle_window_ms() -> u64 {
    1000
}

pub(crate) fn default_event_queue_size() -> usize {
    10_000
}

pub(crate) fn default_ignored_names() -> Vec<String> {
    vec![
        // Version control
        ".git".to_string(),
        ".svn".to_string(),
        ".hg".to_string(),
        // OS metadata
        ".DS_Store".to_string(),
        "Thumbs.db".to_string(),
        "desktop.ini".to_string(),
        // Backups written by the provisioning step
        ".devbridge-backup".to_string(),
        ".devbridge-original".to_string(),
    ]
}

pub(crate) fn default_ignore_patterns() -> Vec<String> {
    vec![
        // Editor temporary files
        "*.tmp".to_string(),
        "*.tmp.*".to_string(),
        ".*.sw?".to_string(),
        "*~".to_string(),
        "#*#".to_string(),
        ".#*".to_string(),
        "4913".to_string(),
    ]
}

pub(crate) fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

pub(crate) fn default_log_format() -> String {
    DEFAULT_LOG_FORMAT.to_string()
}
