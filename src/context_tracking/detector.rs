//! Post-Checkpoint Edit Detection
//!
//! Given a restore timestamp, find files touched afterwards by unioning two
//! best-effort sources: the persisted metadata (edit dates newer than the
//! timestamp) and the discarded message window (tool payloads denoting file
//! writes). A miss here costs the user a warning, not data, so malformed
//! records are skipped silently.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;

use crate::host::TaskMetadataStore;
use crate::messages::{TaskMessage, TimestampMs};

#[derive(Clone)]
pub struct CheckpointDetector {
    task_id: Arc<str>,
    store: Arc<dyn TaskMetadataStore>,
}

impl CheckpointDetector {
    pub fn new(task_id: &str, store: Arc<dyn TaskMetadataStore>) -> Self {
        Self {
            task_id: Arc::from(task_id),
            store,
        }
    }

    /// Files edited strictly after `timestamp`, deduplicated and sorted.
    pub async fn detect_edited_files(
        &self,
        timestamp: TimestampMs,
        discarded_messages: &[TaskMessage],
    ) -> Vec<String> {
        let mut found: BTreeSet<String> = BTreeSet::new();

        match self.store.get_task_metadata(&self.task_id).await {
            Ok(metadata) => {
                for entry in metadata.files_in_context {
                    let agent_edit = entry.agent_edit_date.is_some_and(|d| d > timestamp);
                    let user_edit = entry.user_edit_date.is_some_and(|d| d > timestamp);
                    if agent_edit || user_edit {
                        found.insert(entry.path);
                    }
                }
            }
            Err(e) => {
                warn!(task_id = %self.task_id, error = %e, "metadata scan skipped");
            }
        }

        for message in discarded_messages {
            if let Some(path) = message
                .tool_payload()
                .as_ref()
                .and_then(|p| p.edited_path())
            {
                found.insert(path.to_string());
            }
        }

        found.into_iter().collect()
    }
}
