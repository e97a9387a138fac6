//! Paths that are never synced
//!
//! Matching runs on root-relative paths. A path is ignored when any of its
//! components is an ignored name (VCS metadata, OS metadata files, backup
//! directories) or when the relative path or its file name matches one of
//! the glob patterns.

use devbridge_core::SyncConfig;
use glob::{Pattern, PatternError};
use std::collections::HashSet;
use std::path::{Component, Path};
use std::sync::Arc;
use tracing::trace;

/// Manages sync ignore rules
///
/// By default, ignores nothing.
#[derive(Clone, Default)]
pub struct IgnoreFilter {
    /// Glob patterns to ignore
    patterns: Arc<Vec<Pattern>>,
    /// Path components to always ignore
    ignored_names: Arc<HashSet<String>>,
}

impl IgnoreFilter {
    /// Create a new ignore filter that ignores nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with builder pattern
    pub fn builder() -> IgnoreFilterBuilder {
        IgnoreFilterBuilder::default()
    }

    /// Build the filter described by a sync configuration
    pub fn from_config(config: &SyncConfig) -> Result<Self, PatternError> {
        Self::builder()
            .ignored_names(config.ignored_names.iter().cloned())
            .patterns(config.ignore_patterns.clone())
            .build()
    }

    /// Check if a root-relative path should be ignored
    pub fn should_ignore(&self, relative: &Path) -> bool {
        for component in relative.components() {
            if let Component::Normal(name) = component {
                if self.ignored_names.contains(name.to_string_lossy().as_ref()) {
                    trace!("Ignoring {:?}: component {:?}", relative, name);
                    return true;
                }
            }
        }

        let path_str = relative.to_string_lossy();
        let file_name = relative.file_name().map(|name| name.to_string_lossy());
        for pattern in self.patterns.iter() {
            let name_matches = file_name
                .as_ref()
                .map(|name| pattern.matches(name))
                .unwrap_or(false);
            if name_matches || pattern.matches(&path_str) {
                trace!("Ignoring {:?}: matches {}", relative, pattern);
                return true;
            }
        }

        false
    }
}

/// Builder for IgnoreFilter
#[derive(Default)]
pub struct IgnoreFilterBuilder {
    patterns: Vec<String>,
    ignored_names: HashSet<String>,
}

impl IgnoreFilterBuilder {
    /// Add a glob pattern to ignore
    pub fn add_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into());
        self
    }

    /// Add multiple patterns
    pub fn patterns(mut self, patterns: Vec<String>) -> Self {
        self.patterns.extend(patterns);
        self
    }

    /// Add path components that are always ignored
    pub fn ignored_names(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.ignored_names.extend(names);
        self
    }

    /// Build the ignore filter
    pub fn build(self) -> Result<IgnoreFilter, PatternError> {
        let compiled_patterns = self
            .patterns
            .iter()
            .map(|p| Pattern::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(IgnoreFilter {
            patterns: Arc::new(compiled_patterns),
            ignored_names: Arc::new(self.ignored_names),
        })
    }
}
