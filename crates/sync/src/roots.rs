//! The pair of directory trees kept in sync
//!
//! Both roots are canonicalised once at session start. Every event path is
//! mapped back to a root-relative path, which doubles as the lock key shared
//! by the two copies of a file.

use crate::events::SyncDirection;
use devbridge_core::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Canonical source and target roots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRoots {
    source: Arc<PathBuf>,
    target: Arc<PathBuf>,
}

/// A resolved copy: where to read, where to write, and the shared key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPaths {
    pub relative: PathBuf,
    pub read_from: PathBuf,
    pub write_to: PathBuf,
}

impl SyncRoots {
    /// Build roots from already-canonical paths without touching the filesystem
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: Arc::new(source.into()),
            target: Arc::new(target.into()),
        }
    }

    /// Validate and canonicalise both roots
    ///
    /// Each root must be an existing directory, and neither may contain the
    /// other: a nested pair would copy every sync straight back into the
    /// tree it came from.
    pub async fn resolve(source: &Path, target: &Path) -> Result<Self> {
        let source = canonical_dir(source).await?;
        let target = canonical_dir(target).await?;

        if source.starts_with(&target) || target.starts_with(&source) {
            return Err(Error::invalid_root(
                &target,
                format!("overlaps source root {}", source.display()),
            ));
        }

        Ok(Self::new(source, target))
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Root that events in `direction` originate from
    pub fn origin(&self, direction: SyncDirection) -> &Path {
        match direction {
            SyncDirection::SourceToTarget => &self.source,
            SyncDirection::TargetToSource => &self.target,
        }
    }

    /// Root that syncs in `direction` write into
    pub fn destination(&self, direction: SyncDirection) -> &Path {
        self.origin(direction.reverse())
    }

    /// Direction of a change, decided by the root the path lives under
    pub fn classify(&self, path: &Path) -> Option<SyncDirection> {
        if path.starts_with(self.source.as_path()) {
            Some(SyncDirection::SourceToTarget)
        } else if path.starts_with(self.target.as_path()) {
            Some(SyncDirection::TargetToSource)
        } else {
            None
        }
    }

    /// Path relative to the origin root of `direction`
    ///
    /// Returns `None` for paths outside that root and for the root itself.
    pub fn relative(&self, path: &Path, direction: SyncDirection) -> Option<PathBuf> {
        let relative = path.strip_prefix(self.origin(direction)).ok()?;
        if relative.as_os_str().is_empty() {
            return None;
        }
        Some(relative.to_path_buf())
    }

    /// Resolve the read and write ends of a sync
    pub fn resolve_paths(&self, path: &Path, direction: SyncDirection) -> Option<SyncPaths> {
        let relative = self.relative(path, direction)?;
        let write_to = self.destination(direction).join(&relative);
        Some(SyncPaths {
            read_from: path.to_path_buf(),
            write_to,
            relative,
        })
    }
}

async fn canonical_dir(path: &Path) -> Result<PathBuf> {
    let canonical = tokio::fs::canonicalize(path)
        .await
        .map_err(|e| Error::invalid_root(path, format!("cannot resolve: {e}")))?;

    let metadata = tokio::fs::metadata(&canonical)
        .await
        .map_err(|e| Error::invalid_root(&canonical, format!("cannot stat: {e}")))?;
    if !metadata.is_dir() {
        return Err(Error::invalid_root(&canonical, "not a directory"));
    }

    Ok(canonical)
}
