//! Host Collaborator Interfaces
//!
//! External services the checkpoint subsystem depends on but does not own:
//! message/history persistence, task metadata storage, workspace warning
//! state, user notifications, the multi-file diff viewer, and task
//! cancellation. Production wires these to the embedding agent; tests wire
//! in-memory fakes.

use async_trait::async_trait;

use crate::context_tracking::metadata::TaskMetadata;
use crate::context_tracking::warnings::PendingFileContextWarning;
use crate::messages::TaskHistory;

/// Durable storage for the task's message log and API conversation history.
#[async_trait]
pub trait HistoryPersistence: Send + Sync {
    async fn persist(&self, task_id: &str, history: &TaskHistory) -> anyhow::Result<()>;
}

/// Per-task file-context metadata storage.
#[async_trait]
pub trait TaskMetadataStore: Send + Sync {
    async fn get_task_metadata(&self, task_id: &str) -> anyhow::Result<TaskMetadata>;
    async fn save_task_metadata(&self, task_id: &str, metadata: &TaskMetadata)
        -> anyhow::Result<()>;
}

/// Workspace-scoped storage for pending stale-file warnings.
///
/// Warnings survive process restarts; `list_pending_warnings` exists so
/// startup can sweep entries for tasks that no longer exist.
#[async_trait]
pub trait WorkspaceStateStore: Send + Sync {
    async fn get_pending_warning(
        &self,
        task_id: &str,
    ) -> anyhow::Result<Option<PendingFileContextWarning>>;
    async fn set_pending_warning(&self, warning: &PendingFileContextWarning)
        -> anyhow::Result<()>;
    async fn delete_pending_warning(&self, task_id: &str) -> anyhow::Result<()>;
    async fn list_pending_warnings(&self) -> anyhow::Result<Vec<PendingFileContextWarning>>;
}

/// User-facing notification channel.
pub trait NotificationSink: Send + Sync {
    fn info(&self, message: &str);
    fn error(&self, message: &str);
    fn success(&self, message: &str);

    /// Hand UI control back to the user, e.g. after an aborted restore.
    fn relinquish_control(&self);
}

/// A single file pane in the multi-file diff view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub file_path: String,
    pub left_content: String,
    pub right_content: String,
}

/// Presentation surface for multi-file diffs.
#[async_trait]
pub trait DiffViewer: Send + Sync {
    async fn open_multi_file_diff(&self, title: &str, diffs: Vec<FileDiff>) -> anyhow::Result<()>;
}

/// Lets the subsystem request cancellation of the running task after a
/// successful restore, since the task must re-initialize against the
/// rewritten history.
pub trait TaskController: Send + Sync {
    fn cancel_task(&self);
}
