//! Workspace Resolution
//!
//! Picks the directory snapshot operations run against. Preference order:
//! an explicitly configured workspace, the process working directory, and
//! finally the legacy home-directory fallback kept for sessions started
//! before workspaces were configurable.

use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct WorkspaceResolver {
    configured: Option<PathBuf>,
}

impl WorkspaceResolver {
    pub fn new(configured: Option<PathBuf>) -> Self {
        Self { configured }
    }

    /// Resolve the working directory for snapshot operations.
    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.configured {
            if path.is_dir() {
                return path.clone();
            }
            warn!(path = %path.display(), "configured workspace does not exist, falling back");
        }
        if let Ok(cwd) = std::env::current_dir() {
            return cwd;
        }
        self.legacy_fallback()
    }

    /// Legacy fallback used when no workspace can be determined.
    fn legacy_fallback(&self) -> PathBuf {
        let fallback = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        warn!(path = %fallback.display(), "using legacy workspace fallback");
        fallback
    }
}

/// Render a path relative to the workspace root when possible, for metadata
/// keys and user-facing messages.
pub fn workspace_relative(workspace: &Path, path: &Path) -> String {
    path.strip_prefix(workspace)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}
