//! File Context Tracking
//!
//! Tracks which workspace files the conversation depends on and whether they
//! changed behind the agent's back. One tracker exists per task and composes:
//! metadata persistence ([`metadata`]), agent-vs-user edit disambiguation
//! ([`state`]), the filesystem watcher ([`watcher`]), post-checkpoint edit
//! detection ([`detector`]) and durable stale-file warnings ([`warnings`]).
//!
//! The ordering contract callers must honor: call
//! [`FileContextTracker::mark_file_edited_by_agent`] *before* performing a
//! write. The marker is set synchronously, the watcher event it suppresses
//! can only fire after the write happens, so the happens-before edge is
//! explicit rather than an accident of event-loop scheduling.

pub mod detector;
pub mod metadata;
pub mod state;
pub mod warnings;
pub mod watcher;

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::errors::CheckpointError;
use crate::host::{TaskMetadataStore, WorkspaceStateStore};
use crate::messages::now_ms;
use crate::workspace::workspace_relative;
use detector::CheckpointDetector;
use metadata::{FileMetadataManager, RecordSource};
use state::FileStateDetector;
use warnings::WarningPersistence;
use watcher::{FileEvent, FileWatcher};

/// Per-task facade over the file-context components.
pub struct FileContextTracker {
    task_id: Arc<str>,
    workspace: PathBuf,
    metadata: FileMetadataManager,
    state: Arc<FileStateDetector>,
    warnings: WarningPersistence,
    watcher: Mutex<FileWatcher>,
    router: Mutex<Option<JoinHandle<()>>>,
}

impl FileContextTracker {
    /// Build the tracker and start its event-routing loop. Must be called
    /// from within a tokio runtime.
    pub fn new(
        task_id: &str,
        workspace: PathBuf,
        metadata_store: Arc<dyn TaskMetadataStore>,
        warning_store: Arc<dyn WorkspaceStateStore>,
        debounce: std::time::Duration,
    ) -> anyhow::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = FileWatcher::new(tx, debounce)?;
        let metadata = FileMetadataManager::new(task_id, metadata_store);
        let state = Arc::new(FileStateDetector::new());

        let router = tokio::spawn(route_events(
            rx,
            state.clone(),
            metadata.clone(),
            workspace.clone(),
        ));

        Ok(Self {
            task_id: Arc::from(task_id),
            workspace,
            metadata,
            state: state.clone(),
            warnings: WarningPersistence::new(warning_store),
            watcher: Mutex::new(watcher),
            router: Mutex::new(Some(router)),
        })
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Single entry point for every file operation: records metadata with
    /// stale-superseding rules, then lazily installs a watch on the path.
    ///
    /// Both halves are advisory. Failures are logged and swallowed so a
    /// broken metadata store never takes the task down.
    pub async fn track_file_context(&self, path: &str, source: RecordSource) {
        if let Err(e) = self.metadata.record_operation(path, source, now_ms()).await {
            let e = CheckpointError::MetadataFailure(format!("{e:#}"));
            warn!(task_id = %self.task_id, path, error = %e, "failed to record file metadata");
        }
        let absolute = self.absolute(path);
        if let Err(e) = self.watcher.lock().watch_file(&absolute) {
            warn!(task_id = %self.task_id, path, error = %e, "failed to watch file");
        }
    }

    /// Must run before the write syscall that will trigger the watcher.
    pub fn mark_file_edited_by_agent(&self, path: &str) {
        self.state.mark_edited_by_agent(path);
    }

    /// Drain the set of files the user modified since the last call.
    pub fn get_and_clear_recently_modified_files(&self) -> Vec<String> {
        self.state.get_and_clear_recently_modified()
    }

    /// Detector over this task's metadata, for restore-time staleness scans.
    pub fn checkpoint_detector(&self) -> CheckpointDetector {
        CheckpointDetector::new(&self.task_id, self.metadata_store())
    }

    pub fn warnings(&self) -> &WarningPersistence {
        &self.warnings
    }

    fn metadata_store(&self) -> Arc<dyn TaskMetadataStore> {
        self.metadata.store()
    }

    fn absolute(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.workspace.join(candidate)
        }
    }

    /// Stop the routing loop and drop all watches.
    pub fn dispose(&self) {
        if let Some(router) = self.router.lock().take() {
            router.abort();
        }
        debug!(task_id = %self.task_id, "file context tracker disposed");
    }
}

impl Drop for FileContextTracker {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Routes watcher events: agent-marked changes are consumed silently,
/// everything else is a user edit.
async fn route_events(
    mut rx: mpsc::UnboundedReceiver<FileEvent>,
    state: Arc<FileStateDetector>,
    metadata: FileMetadataManager,
    workspace: PathBuf,
) {
    while let Some(event) = rx.recv().await {
        let path = workspace_relative(&workspace, &event.path);
        if state.consume_agent_edit(&path) {
            debug!(path, "suppressed watcher event for agent edit");
            continue;
        }
        state.note_user_modified(&path);
        if let Err(e) = metadata
            .record_operation(&path, RecordSource::UserEdited, now_ms())
            .await
        {
            let e = CheckpointError::MetadataFailure(format!("{e:#}"));
            warn!(path, error = %e, "failed to record user edit");
        }
    }
}
