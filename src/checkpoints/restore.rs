//! Checkpoint Restoration
//!
//! [`CheckpointRestorer`] drives the restore state machine: resolve the
//! target message, reset the workspace when the mode asks for it, and only
//! on success hand over to [`RestorationCoordinator`], which truncates the
//! three histories and raises stale-file warnings. A failed workspace reset
//! leaves conversation state byte-identical to its pre-restore value.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::CheckpointConfig;
use crate::context_tracking::detector::CheckpointDetector;
use crate::context_tracking::warnings::WarningPersistence;
use crate::errors::CheckpointError;
use crate::host::TaskController;
use crate::messages::{
    now_ms, ApiMetrics, MessageStateCoordinator, TaskMessage, TimestampMs,
};

use super::init::TrackerInitializer;
use super::state::CheckpointManagerState;
use super::ui::CheckpointUICoordinator;
use super::validator::nearest_hash_at_or_before;

/// What a restore operation rolls back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreMode {
    /// Roll the conversation back; workspace files stay as they are, and
    /// edits made after the checkpoint become stale-file warnings.
    Task,
    /// Reset workspace files to the checkpoint. The message and API
    /// histories are still rewound to the target so the conversation and
    /// the files agree on what happened.
    Workspace,
    /// Both.
    TaskAndWorkspace,
}

impl RestoreMode {
    pub fn touches_workspace(self) -> bool {
        matches!(self, RestoreMode::Workspace | RestoreMode::TaskAndWorkspace)
    }

    pub fn touches_task(self) -> bool {
        matches!(self, RestoreMode::Task | RestoreMode::TaskAndWorkspace)
    }
}

/// Outcome handed back to the embedding task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskStateUpdate {
    /// API-history range removed by this restore, if any.
    pub deleted_range: Option<(usize, usize)>,
    /// Error message for the user; `None` on success or silent abort.
    pub error: Option<String>,
    /// True when the task was cancelled and must re-initialize.
    pub cancelled: bool,
}

/// Truncates histories and raises warnings after a restore succeeded.
pub struct RestorationCoordinator {
    messages: MessageStateCoordinator,
    detector: CheckpointDetector,
    warnings: WarningPersistence,
}

impl RestorationCoordinator {
    pub fn new(
        messages: MessageStateCoordinator,
        detector: CheckpointDetector,
        warnings: WarningPersistence,
    ) -> Self {
        Self {
            messages,
            detector,
            warnings,
        }
    }

    /// Roll the three histories back to message `index` at timestamp `ts`.
    /// Returns the API-history range that was removed.
    pub async fn finalize(
        &self,
        index: usize,
        ts: TimestampMs,
        mode: RestoreMode,
    ) -> anyhow::Result<Option<(usize, usize)>> {
        // The stored index points at the previous pairing boundary, so the
        // triggering user message plus its reply sit at index+1 and index+2.
        let history_index = self
            .messages
            .conversation_history_index_at(index)
            .unwrap_or(0);
        let keep_api = history_index + 2;
        let api_len = self.messages.api_history_len();
        let deleted_range = if keep_api < api_len {
            Some((keep_api, api_len - 1))
        } else {
            None
        };

        self.messages.truncate_api_history(keep_api);
        self.messages.truncate_context_history(ts);

        let discarded = self.messages.messages_after(index);
        let mut deleted_metrics = ApiMetrics::default();
        for message in &discarded {
            if let Some(metrics) = message.api_metrics() {
                deleted_metrics.absorb(&metrics);
            }
        }

        // Workspace files were not rolled back on a task-only restore, so
        // edits made after `ts` are now orphaned relative to the restored
        // log. Persist a warning for the user.
        if mode == RestoreMode::Task {
            let stale = self.detector.detect_edited_files(ts, &discarded).await;
            if !stale.is_empty() {
                info!(
                    task_id = %self.messages.task_id(),
                    files = stale.len(),
                    "post-checkpoint edits detected on task-only restore"
                );
                self.warnings
                    .record(self.messages.task_id(), stale)
                    .await;
            }
        }

        self.messages.truncate_messages(index + 1);
        self.messages.set_deleted_range_marker(ts, deleted_range);

        // Re-attribute cost/tokens of the discarded requests to a visible
        // ledger entry instead of silently dropping them.
        if !deleted_metrics.is_zero() {
            self.messages
                .append_message(TaskMessage::deleted_api_reqs(now_ms(), &deleted_metrics));
        }

        Ok(deleted_range)
    }
}

/// Top-level restore flow.
pub struct CheckpointRestorer {
    config: CheckpointConfig,
    state: Arc<CheckpointManagerState>,
    messages: MessageStateCoordinator,
    init: Arc<TrackerInitializer>,
    coordinator: RestorationCoordinator,
    ui: CheckpointUICoordinator,
    controller: Arc<dyn TaskController>,
}

impl CheckpointRestorer {
    pub fn new(
        config: CheckpointConfig,
        state: Arc<CheckpointManagerState>,
        messages: MessageStateCoordinator,
        init: Arc<TrackerInitializer>,
        coordinator: RestorationCoordinator,
        ui: CheckpointUICoordinator,
        controller: Arc<dyn TaskController>,
    ) -> Self {
        Self {
            config,
            state,
            messages,
            init,
            coordinator,
            ui,
            controller,
        }
    }

    /// Restore to the message at `ts` (shifted back by `offset` messages
    /// when given). Never panics or propagates: failures come back as an
    /// error field on the update with conversation state untouched.
    pub async fn restore(
        &self,
        ts: TimestampMs,
        mode: RestoreMode,
        offset: Option<usize>,
    ) -> TaskStateUpdate {
        match self.try_restore(ts, mode, offset).await {
            Ok(update) => update,
            Err(e) => {
                error!(task_id = %self.messages.task_id(), error = %format!("{e:#}"), "restore failed");
                self.ui.relinquish_control();
                self.ui.error(&format!("Failed to restore checkpoint: {e:#}"));
                TaskStateUpdate {
                    error: Some(format!("{e:#}")),
                    ..Default::default()
                }
            }
        }
    }

    async fn try_restore(
        &self,
        ts: TimestampMs,
        mode: RestoreMode,
        offset: Option<usize>,
    ) -> anyhow::Result<TaskStateUpdate> {
        let messages = self.messages.messages_snapshot();
        let index = messages
            .iter()
            .position(|m| m.ts == ts)
            .and_then(|i| i.checked_sub(offset.unwrap_or(0)));
        let Some(index) = index else {
            warn!(task_id = %self.messages.task_id(), ts, "restore target message not found");
            return Ok(TaskStateUpdate::default());
        };
        let target = &messages[index];

        if mode.touches_workspace() {
            if let Err(e) = self.restore_workspace(&messages, index, offset).await {
                // Partial-failure policy: the workspace step failed, so the
                // conversation state must stay exactly as it was.
                warn!(task_id = %self.messages.task_id(), error = %e, "workspace restore aborted");
                self.ui.error(&e.to_string());
                self.ui.relinquish_control();
                return Ok(TaskStateUpdate::default());
            }
        }

        let deleted_range = self
            .coordinator
            .finalize(index, target.ts, mode)
            .await?;
        self.state.set_deleted_range(deleted_range);

        if mode.touches_workspace() {
            // Task-only restores leave the workspace where it was, so no
            // checkpoint is newly checked out.
            self.messages.set_checked_out(target.ts);
        }
        self.messages.persist().await?;

        self.ui.success(match mode {
            RestoreMode::Task => "Conversation restored to checkpoint",
            RestoreMode::Workspace => "Workspace files restored to checkpoint",
            RestoreMode::TaskAndWorkspace => "Conversation and workspace restored to checkpoint",
        });

        // The task cannot keep running against history it no longer owns.
        self.controller.cancel_task();
        Ok(TaskStateUpdate {
            deleted_range,
            error: None,
            cancelled: true,
        })
    }

    /// Reset the workspace to the checkpoint covering `index`.
    async fn restore_workspace(
        &self,
        messages: &[TaskMessage],
        index: usize,
        offset: Option<usize>,
    ) -> crate::errors::Result<()> {
        if !self.config.enabled {
            return Err(CheckpointError::Disabled);
        }
        let Some(handle) = self.init.check_and_init().await else {
            let reason = self
                .state
                .last_error()
                .unwrap_or_else(|| "initialization did not complete".to_string());
            return Err(CheckpointError::InitFailure(reason));
        };

        let target = &messages[index];
        let hash = match &target.last_checkpoint_hash {
            Some(hash) => hash.clone(),
            None => {
                // Fallback chain: the selected message has no hash of its
                // own, so restore to the nearest prior checkpoint. This can
                // land on a different checkpoint than the user picked, so
                // name the hash actually used.
                match nearest_hash_at_or_before(messages, index) {
                    Some(hash) => {
                        warn!(
                            task_id = %self.messages.task_id(),
                            hash = %hash,
                            offset = offset.unwrap_or(0),
                            "selected message has no checkpoint hash, using nearest prior"
                        );
                        self.ui.info(&format!(
                            "Selected message has no checkpoint; restoring to earlier checkpoint {hash}"
                        ));
                        hash
                    }
                    None => {
                        return Err(CheckpointError::MissingHash {
                            timestamp: target.ts,
                        })
                    }
                }
            }
        };

        handle.reset_head(&hash).await.map_err(|e| {
            error!(
                task_id = %self.messages.task_id(),
                hash = %hash,
                error = %format!("{e:#}"),
                "workspace reset failed"
            );
            CheckpointError::EngineFailure {
                task_id: self.messages.task_id().to_string(),
                message: format!("{e:#}"),
            }
        })
    }
}
