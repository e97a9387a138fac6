//! Sync direction, outcomes and notices

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Which way a change flows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// Developer's working copy into the running environment
    SourceToTarget,
    /// Running environment back into the working copy
    TargetToSource,
}

impl SyncDirection {
    /// The opposite direction
    pub fn reverse(self) -> Self {
        match self {
            Self::SourceToTarget => Self::TargetToSource,
            Self::TargetToSource => Self::SourceToTarget,
        }
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceToTarget => write!(f, "source → target"),
            Self::TargetToSource => write!(f, "target → source"),
        }
    }
}

/// Why an `execute` call did not copy anything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The path is locked by an in-flight or just-finished sync
    Blocked,
    /// The path is not under the root its direction reads from
    OutsideRoot,
    /// The file never stopped changing within the probe budget
    Unstable,
    /// Content matches the last synchronized fingerprint
    Unchanged,
}

/// Result of one sync cycle
///
/// Never an error: every failure is absorbed at the executor boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Copied { bytes: u64 },
    Skipped(SkipReason),
    Failed(String),
}

impl SyncOutcome {
    pub fn is_copied(&self) -> bool {
        matches!(self, Self::Copied { .. })
    }
}

/// Emitted once per successful copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncNotice {
    pub direction: SyncDirection,
    /// Path relative to both roots
    pub relative_path: PathBuf,
    pub bytes: u64,
}

impl fmt::Display for SyncNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.direction, self.relative_path.display())
    }
}
