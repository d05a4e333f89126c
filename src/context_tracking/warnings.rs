//! Pending Stale-File Warnings
//!
//! When a task-only restore leaves workspace files ahead of the restored
//! conversation, the affected paths are persisted as a pending warning so the
//! user is told even if the process restarts before the task is reopened.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::host::WorkspaceStateStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingFileContextWarning {
    pub task_id: String,
    pub files: Vec<String>,
}

/// Durable storage facade for pending warnings. All operations are
/// advisory: failures are logged and swallowed, never surfaced to the task.
#[derive(Clone)]
pub struct WarningPersistence {
    store: Arc<dyn WorkspaceStateStore>,
}

impl WarningPersistence {
    pub fn new(store: Arc<dyn WorkspaceStateStore>) -> Self {
        Self { store }
    }

    /// Persist a warning for a task. Replaces any existing one.
    pub async fn record(&self, task_id: &str, files: Vec<String>) {
        if files.is_empty() {
            return;
        }
        let warning = PendingFileContextWarning {
            task_id: task_id.to_string(),
            files,
        };
        if let Err(e) = self.store.set_pending_warning(&warning).await {
            warn!(task_id, error = %e, "failed to persist stale-file warning");
        } else {
            debug!(task_id, files = warning.files.len(), "stale-file warning recorded");
        }
    }

    /// Read-and-clear the warning for a task.
    pub async fn take(&self, task_id: &str) -> Option<Vec<String>> {
        let warning = match self.store.get_pending_warning(task_id).await {
            Ok(warning) => warning?,
            Err(e) => {
                warn!(task_id, error = %e, "failed to read stale-file warning");
                return None;
            }
        };
        if let Err(e) = self.store.delete_pending_warning(task_id).await {
            warn!(task_id, error = %e, "failed to clear stale-file warning");
        }
        Some(warning.files)
    }

    /// Drop warnings for tasks that no longer exist. Returns how many were
    /// removed. Intended to run once at startup.
    pub async fn cleanup_orphaned(&self, active_task_ids: &HashSet<String>) -> usize {
        let warnings = match self.store.list_pending_warnings().await {
            Ok(warnings) => warnings,
            Err(e) => {
                warn!(error = %e, "failed to enumerate pending warnings");
                return 0;
            }
        };
        let mut removed = 0;
        for warning in warnings {
            if active_task_ids.contains(&warning.task_id) {
                continue;
            }
            match self.store.delete_pending_warning(&warning.task_id).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!(task_id = %warning.task_id, error = %e, "failed to remove orphaned warning")
                }
            }
        }
        if removed > 0 {
            debug!(removed, "orphaned stale-file warnings swept");
        }
        removed
    }
}
