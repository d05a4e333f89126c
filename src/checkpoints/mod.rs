//! Checkpoint Orchestration
//!
//! [`CheckpointManager`] is the per-task public surface: save, restore,
//! diff, has-new-changes and commit. Internally it delegates to one struct
//! per responsibility (initializer, saver, validator, diff presenter,
//! restorer) that all share the same [`state::CheckpointManagerState`].
//! Every task owns its own manager; there is no process-wide registry.

pub mod diff;
pub mod init;
pub mod restore;
pub mod saver;
pub mod state;
pub mod ui;
pub mod validator;

use std::sync::Arc;
use tracing::warn;

use crate::config::CheckpointConfig;
use crate::context_tracking::detector::CheckpointDetector;
use crate::context_tracking::warnings::WarningPersistence;
use crate::engine::SnapshotEngine;
use crate::host::{
    DiffViewer, HistoryPersistence, NotificationSink, TaskController, TaskMetadataStore,
    WorkspaceStateStore,
};
use crate::messages::{MessageStateCoordinator, TaskHistory, TimestampMs};
use crate::workspace::WorkspaceResolver;

use diff::CheckpointDiffPresenter;
use init::TrackerInitializer;
use restore::{CheckpointRestorer, RestorationCoordinator};
pub use restore::{RestoreMode, TaskStateUpdate};
use saver::CheckpointSaver;
use state::CheckpointManagerState;
use ui::CheckpointUICoordinator;
use validator::CheckpointValidator;

/// Everything a task must provide to stand up checkpointing.
pub struct CheckpointManagerParams {
    pub task_id: String,
    pub config: CheckpointConfig,
    pub engine: Arc<dyn SnapshotEngine>,
    pub resolver: WorkspaceResolver,
    pub history: Arc<parking_lot::Mutex<TaskHistory>>,
    pub history_store: Arc<dyn HistoryPersistence>,
    pub metadata_store: Arc<dyn TaskMetadataStore>,
    pub warning_store: Arc<dyn WorkspaceStateStore>,
    pub notifications: Arc<dyn NotificationSink>,
    pub diff_viewer: Arc<dyn DiffViewer>,
    pub controller: Arc<dyn TaskController>,
}

/// Public checkpoint API for one task.
pub struct CheckpointManager {
    state: Arc<CheckpointManagerState>,
    messages: MessageStateCoordinator,
    init: Arc<TrackerInitializer>,
    saver: CheckpointSaver,
    validator: CheckpointValidator,
    presenter: CheckpointDiffPresenter,
    restorer: CheckpointRestorer,
    ui: CheckpointUICoordinator,
}

impl CheckpointManager {
    pub fn new(params: CheckpointManagerParams) -> Self {
        let state = Arc::new(CheckpointManagerState::new());
        let ui = CheckpointUICoordinator::new(params.notifications, params.diff_viewer);
        let messages = MessageStateCoordinator::new(
            &params.task_id,
            params.history,
            params.history_store,
        );
        let init = Arc::new(TrackerInitializer::new(
            &params.task_id,
            params.config.clone(),
            params.engine,
            params.resolver,
            ui.clone(),
            state.clone(),
        ));
        let saver = CheckpointSaver::new(
            params.config.clone(),
            state.clone(),
            messages.clone(),
            init.clone(),
        );
        let validator = CheckpointValidator::new(messages.clone(), init.clone());
        let presenter = CheckpointDiffPresenter::new(
            messages.clone(),
            validator.clone(),
            init.clone(),
            ui.clone(),
        );
        let detector = CheckpointDetector::new(&params.task_id, params.metadata_store);
        let warnings = WarningPersistence::new(params.warning_store);
        let coordinator = RestorationCoordinator::new(messages.clone(), detector, warnings);
        let restorer = CheckpointRestorer::new(
            params.config,
            state.clone(),
            messages.clone(),
            init.clone(),
            coordinator,
            ui.clone(),
            params.controller,
        );

        Self {
            state,
            messages,
            init,
            saver,
            validator,
            presenter,
            restorer,
            ui,
        }
    }

    /// Take a checkpoint. Errors on the critical completion path are
    /// surfaced to the user; the call itself never fails the task.
    pub async fn save_checkpoint(
        &self,
        is_completion_checkpoint: bool,
        completion_message_ts: Option<TimestampMs>,
    ) {
        if let Err(e) = self
            .saver
            .save(is_completion_checkpoint, completion_message_ts)
            .await
        {
            warn!(task_id = %self.messages.task_id(), error = %format!("{e:#}"), "checkpoint save failed");
            self.ui
                .error(&format!("Failed to save checkpoint: {e:#}"));
        }
    }

    /// Restore to the checkpoint covering the message at `ts`.
    pub async fn restore_checkpoint(
        &self,
        ts: TimestampMs,
        mode: RestoreMode,
        offset: Option<usize>,
    ) -> TaskStateUpdate {
        self.restorer.restore(ts, mode, offset).await
    }

    /// Show a multi-file diff for the checkpoint covering `ts`.
    pub async fn present_diff(&self, ts: TimestampMs, since_last_completion: bool) {
        if let Err(e) = self.presenter.present(ts, since_last_completion).await {
            warn!(task_id = %self.messages.task_id(), error = %format!("{e:#}"), "diff presentation failed");
            self.ui.error(&format!("Failed to compute diff: {e:#}"));
        }
    }

    /// Whether the workspace changed since the last completion checkpoint.
    pub async fn has_new_changes(&self) -> bool {
        self.validator.has_new_changes_since_last_completion().await
    }

    /// Commit the working tree directly, returning the new hash.
    pub async fn commit(&self) -> Option<String> {
        let handle = self.init.check_and_init().await?;
        match handle.commit().await {
            Ok(hash) => hash,
            Err(e) => {
                warn!(task_id = %self.messages.task_id(), error = %format!("{e:#}"), "commit failed");
                None
            }
        }
    }

    /// Hash covering the message at `ts`, walking back to the nearest prior
    /// checkpoint when the message has none of its own.
    pub fn find_checkpoint_for_message(
        &self,
        ts: TimestampMs,
        offset: Option<usize>,
    ) -> Option<String> {
        self.validator.find_checkpoint_for_message(ts, offset)
    }

    pub fn deleted_range(&self) -> Option<(usize, usize)> {
        self.state.deleted_range()
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.last_error()
    }
}
