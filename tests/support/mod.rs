//! In-memory fakes for the external collaborators, shared by the
//! integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backtrack::checkpoints::{CheckpointManager, CheckpointManagerParams};
use backtrack::config::CheckpointConfig;
use backtrack::context_tracking::metadata::TaskMetadata;
use backtrack::context_tracking::warnings::PendingFileContextWarning;
use backtrack::engine::{DiffEntry, SnapshotEngine, SnapshotHandle};
use backtrack::host::{
    DiffViewer, FileDiff, HistoryPersistence, NotificationSink, TaskController, TaskMetadataStore,
    WorkspaceStateStore,
};
use backtrack::messages::{TaskHistory, TaskMessage};
use backtrack::workspace::WorkspaceResolver;

pub const TASK_ID: &str = "task-under-test";

#[derive(Default)]
pub struct FakeHandle {
    pub commits: AtomicUsize,
    pub queued_commit_results: Mutex<VecDeque<Option<String>>>,
    pub resets: Mutex<Vec<String>>,
    pub fail_reset: AtomicBool,
    pub diff_counts: Mutex<HashMap<(String, String), usize>>,
    pub diff_entries: Mutex<Vec<DiffEntry>>,
}

#[async_trait]
impl SnapshotHandle for FakeHandle {
    async fn commit(&self) -> anyhow::Result<Option<String>> {
        let n = self.commits.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(queued) = self.queued_commit_results.lock().pop_front() {
            return Ok(queued);
        }
        Ok(Some(format!("hash-{n}")))
    }

    async fn reset_head(&self, hash: &str) -> anyhow::Result<()> {
        if self.fail_reset.load(Ordering::SeqCst) {
            anyhow::bail!("simulated reset failure");
        }
        self.resets.lock().push(hash.to_string());
        Ok(())
    }

    async fn diff_set(&self, _lhs: &str, _rhs: Option<&str>) -> anyhow::Result<Vec<DiffEntry>> {
        Ok(self.diff_entries.lock().clone())
    }

    async fn diff_count(&self, lhs: &str, rhs: &str) -> anyhow::Result<usize> {
        Ok(self
            .diff_counts
            .lock()
            .get(&(lhs.to_string(), rhs.to_string()))
            .copied()
            .unwrap_or(0))
    }
}

pub struct FakeEngine {
    pub handle: Arc<FakeHandle>,
    pub creates: AtomicUsize,
    pub delay: Mutex<Duration>,
}

#[async_trait]
impl SnapshotEngine for FakeEngine {
    async fn create(
        &self,
        _task_id: &str,
        _enabled: bool,
        _workspace: &Path,
    ) -> anyhow::Result<Arc<dyn SnapshotHandle>> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(self.handle.clone())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub infos: Mutex<Vec<String>>,
    pub errors: Mutex<Vec<String>>,
    pub successes: Mutex<Vec<String>>,
    pub relinquished: AtomicUsize,
}

impl NotificationSink for RecordingSink {
    fn info(&self, message: &str) {
        self.infos.lock().push(message.to_string());
    }
    fn error(&self, message: &str) {
        self.errors.lock().push(message.to_string());
    }
    fn success(&self, message: &str) {
        self.successes.lock().push(message.to_string());
    }
    fn relinquish_control(&self) {
        self.relinquished.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct RecordingViewer {
    pub opened: Mutex<Vec<(String, Vec<FileDiff>)>>,
}

#[async_trait]
impl DiffViewer for RecordingViewer {
    async fn open_multi_file_diff(&self, title: &str, diffs: Vec<FileDiff>) -> anyhow::Result<()> {
        self.opened.lock().push((title.to_string(), diffs));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingController {
    pub cancels: AtomicUsize,
}

impl TaskController for RecordingController {
    fn cancel_task(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MemHistoryStore {
    pub persists: AtomicUsize,
    pub last: Mutex<Option<TaskHistory>>,
}

#[async_trait]
impl HistoryPersistence for MemHistoryStore {
    async fn persist(&self, _task_id: &str, history: &TaskHistory) -> anyhow::Result<()> {
        self.persists.fetch_add(1, Ordering::SeqCst);
        *self.last.lock() = Some(history.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemMetadataStore {
    pub map: Mutex<HashMap<String, TaskMetadata>>,
}

#[async_trait]
impl TaskMetadataStore for MemMetadataStore {
    async fn get_task_metadata(&self, task_id: &str) -> anyhow::Result<TaskMetadata> {
        Ok(self.map.lock().get(task_id).cloned().unwrap_or_default())
    }

    async fn save_task_metadata(
        &self,
        task_id: &str,
        metadata: &TaskMetadata,
    ) -> anyhow::Result<()> {
        self.map.lock().insert(task_id.to_string(), metadata.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemWarningStore {
    pub map: Mutex<HashMap<String, PendingFileContextWarning>>,
}

#[async_trait]
impl WorkspaceStateStore for MemWarningStore {
    async fn get_pending_warning(
        &self,
        task_id: &str,
    ) -> anyhow::Result<Option<PendingFileContextWarning>> {
        Ok(self.map.lock().get(task_id).cloned())
    }

    async fn set_pending_warning(&self, warning: &PendingFileContextWarning) -> anyhow::Result<()> {
        self.map
            .lock()
            .insert(warning.task_id.clone(), warning.clone());
        Ok(())
    }

    async fn delete_pending_warning(&self, task_id: &str) -> anyhow::Result<()> {
        self.map.lock().remove(task_id);
        Ok(())
    }

    async fn list_pending_warnings(&self) -> anyhow::Result<Vec<PendingFileContextWarning>> {
        Ok(self.map.lock().values().cloned().collect())
    }
}

pub struct TestBed {
    pub manager: CheckpointManager,
    pub history: Arc<Mutex<TaskHistory>>,
    pub handle: Arc<FakeHandle>,
    pub engine: Arc<FakeEngine>,
    pub sink: Arc<RecordingSink>,
    pub viewer: Arc<RecordingViewer>,
    pub controller: Arc<RecordingController>,
    pub metadata_store: Arc<MemMetadataStore>,
    pub warning_store: Arc<MemWarningStore>,
    pub history_store: Arc<MemHistoryStore>,
}

impl TestBed {
    pub fn messages(&self) -> Vec<TaskMessage> {
        self.history.lock().messages.clone()
    }
}

pub fn testbed_with_config(history: TaskHistory, config: CheckpointConfig) -> TestBed {
    let handle = Arc::new(FakeHandle::default());
    let engine = Arc::new(FakeEngine {
        handle: handle.clone(),
        creates: AtomicUsize::new(0),
        delay: Mutex::new(Duration::ZERO),
    });
    let sink = Arc::new(RecordingSink::default());
    let viewer = Arc::new(RecordingViewer::default());
    let controller = Arc::new(RecordingController::default());
    let metadata_store = Arc::new(MemMetadataStore::default());
    let warning_store = Arc::new(MemWarningStore::default());
    let history_store = Arc::new(MemHistoryStore::default());
    let history = Arc::new(Mutex::new(history));

    let manager = CheckpointManager::new(CheckpointManagerParams {
        task_id: TASK_ID.to_string(),
        config,
        engine: engine.clone(),
        resolver: WorkspaceResolver::default(),
        history: history.clone(),
        history_store: history_store.clone(),
        metadata_store: metadata_store.clone(),
        warning_store: warning_store.clone(),
        notifications: sink.clone(),
        diff_viewer: viewer.clone(),
        controller: controller.clone(),
    });

    TestBed {
        manager,
        history,
        handle,
        engine,
        sink,
        viewer,
        controller,
        metadata_store,
        warning_store,
        history_store,
    }
}

pub fn testbed(history: TaskHistory) -> TestBed {
    testbed_with_config(history, CheckpointConfig::default())
}
