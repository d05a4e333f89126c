//! Checkpoint Diff Presentation
//!
//! Resolves which two hashes to compare and asks the host's diff viewer to
//! show the result. Two modes: the checkpoint against the working tree
//! (point-diff), or everything since the last task completion.

use std::sync::Arc;
use tracing::warn;

use crate::errors::CheckpointError;
use crate::host::FileDiff;
use crate::messages::{MessageStateCoordinator, TimestampMs};

use super::init::TrackerInitializer;
use super::ui::CheckpointUICoordinator;
use super::validator::{completion_baseline_hash, CheckpointValidator};

pub struct CheckpointDiffPresenter {
    messages: MessageStateCoordinator,
    validator: CheckpointValidator,
    init: Arc<TrackerInitializer>,
    ui: CheckpointUICoordinator,
}

impl CheckpointDiffPresenter {
    pub fn new(
        messages: MessageStateCoordinator,
        validator: CheckpointValidator,
        init: Arc<TrackerInitializer>,
        ui: CheckpointUICoordinator,
    ) -> Self {
        Self {
            messages,
            validator,
            init,
            ui,
        }
    }

    /// Show a multi-file diff for the checkpoint covering `ts`.
    ///
    /// With `since_last_completion` the left side is the completion
    /// baseline; otherwise the checkpoint is compared against the working
    /// tree. Missing hashes and engine failures are surfaced to the user;
    /// an empty diff is informational, not an error.
    pub async fn present(&self, ts: TimestampMs, since_last_completion: bool) -> anyhow::Result<()> {
        let Some(hash) = self.validator.find_checkpoint_for_message(ts, None) else {
            self.ui
                .error(&CheckpointError::MissingHash { timestamp: ts }.to_string());
            return Ok(());
        };
        let Some(handle) = self.init.check_and_init().await else {
            self.ui.error("Checkpoints are not available");
            return Ok(());
        };

        let (diffs, title) = if since_last_completion {
            let snapshot = self.messages.messages_snapshot();
            let index = snapshot
                .iter()
                .position(|m| m.ts == ts)
                .unwrap_or(snapshot.len());
            let Some(baseline) = completion_baseline_hash(&snapshot, index) else {
                self.ui
                    .error("No previous completion checkpoint to compare against");
                return Ok(());
            };
            let diffs = handle.diff_set(&baseline, Some(&hash)).await?;
            (diffs, "Changes since last completion")
        } else {
            let diffs = handle.diff_set(&hash, None).await?;
            (diffs, "Changes since checkpoint")
        };

        if diffs.is_empty() {
            self.ui.info("No changes found");
            return Ok(());
        }

        let panes: Vec<FileDiff> = diffs
            .into_iter()
            .map(|d| FileDiff {
                file_path: d.path,
                left_content: d.before,
                right_content: d.after,
            })
            .collect();
        if let Err(e) = self.ui.open_diff(title, panes).await {
            warn!(task_id = %self.messages.task_id(), error = %e, "diff viewer failed");
            self.ui.error("Failed to open the diff view");
        }
        Ok(())
    }
}
