//! File Context Metadata
//!
//! Per-task record of every file the agent has read, edited, mentioned, or
//! seen the user edit. Records are superseded, never deleted: a new operation
//! on a path marks all prior entries for that path stale and appends a fresh
//! active entry, carrying timestamps forward so they never regress.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::host::TaskMetadataStore;
use crate::messages::TimestampMs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    /// The authoritative entry for its path.
    Active,
    /// Superseded by a later entry, kept for history.
    Stale,
}

/// What kind of operation produced a metadata entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    ReadTool,
    UserEdited,
    AgentEdited,
    FileMentioned,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadataEntry {
    pub path: String,
    pub record_state: RecordState,
    pub record_source: RecordSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_read_date: Option<TimestampMs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_edit_date: Option<TimestampMs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_edit_date: Option<TimestampMs>,
}

/// Everything this subsystem persists per task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    #[serde(default)]
    pub files_in_context: Vec<FileMetadataEntry>,
}

impl TaskMetadata {
    /// The active entry for a path, if any.
    pub fn active_entry(&self, path: &str) -> Option<&FileMetadataEntry> {
        self.files_in_context
            .iter()
            .find(|e| e.path == path && e.record_state == RecordState::Active)
    }

    /// Latest known value of a date field across all entries for a path.
    fn latest_date<F>(&self, path: &str, field: F) -> Option<TimestampMs>
    where
        F: Fn(&FileMetadataEntry) -> Option<TimestampMs>,
    {
        self.files_in_context
            .iter()
            .filter(|e| e.path == path)
            .filter_map(field)
            .max()
    }
}

/// Persists per-file read/edit timestamps with stale-superseding semantics.
#[derive(Clone)]
pub struct FileMetadataManager {
    task_id: Arc<str>,
    store: Arc<dyn TaskMetadataStore>,
}

impl FileMetadataManager {
    pub fn new(task_id: &str, store: Arc<dyn TaskMetadataStore>) -> Self {
        Self {
            task_id: Arc::from(task_id),
            store,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn store(&self) -> Arc<dyn TaskMetadataStore> {
        self.store.clone()
    }

    /// Record an operation on `path`, superseding prior entries.
    ///
    /// Timestamps inherited from prior entries are clamped so they never move
    /// backwards, even if the caller supplies an older `now`.
    pub async fn record_operation(
        &self,
        path: &str,
        source: RecordSource,
        now: TimestampMs,
    ) -> anyhow::Result<()> {
        let mut metadata = self.store.get_task_metadata(&self.task_id).await?;

        let mut entry = FileMetadataEntry {
            path: path.to_string(),
            record_state: RecordState::Active,
            record_source: source,
            agent_read_date: metadata.latest_date(path, |e| e.agent_read_date),
            agent_edit_date: metadata.latest_date(path, |e| e.agent_edit_date),
            user_edit_date: metadata.latest_date(path, |e| e.user_edit_date),
        };

        let bump = |slot: &mut Option<TimestampMs>| {
            *slot = Some(slot.map_or(now, |prev| prev.max(now)));
        };
        match source {
            RecordSource::ReadTool | RecordSource::FileMentioned => {
                bump(&mut entry.agent_read_date);
            }
            RecordSource::AgentEdited => {
                bump(&mut entry.agent_read_date);
                bump(&mut entry.agent_edit_date);
            }
            RecordSource::UserEdited => {
                bump(&mut entry.user_edit_date);
            }
        }

        for existing in &mut metadata.files_in_context {
            if existing.path == path {
                existing.record_state = RecordState::Stale;
            }
        }
        metadata.files_in_context.push(entry);

        self.store
            .save_task_metadata(&self.task_id, &metadata)
            .await?;
        debug!(task_id = %self.task_id, path, ?source, "file metadata recorded");
        Ok(())
    }

    pub async fn load(&self) -> anyhow::Result<TaskMetadata> {
        self.store.get_task_metadata(&self.task_id).await
    }
}
