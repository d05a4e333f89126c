//! Checkpoint Queries
//!
//! Read-only lookups over the message log and the snapshot engine:
//! resolving the checkpoint hash covering a message (checkpoints are sparse,
//! so this walks backward to the nearest prior hash) and deciding whether
//! the workspace changed since the last task completion.

use std::sync::Arc;
use tracing::warn;

use crate::messages::{MessageKind, MessageStateCoordinator, TaskMessage, TimestampMs};

use super::init::TrackerInitializer;

#[derive(Clone)]
pub struct CheckpointValidator {
    messages: MessageStateCoordinator,
    init: Arc<TrackerInitializer>,
}

impl CheckpointValidator {
    pub fn new(messages: MessageStateCoordinator, init: Arc<TrackerInitializer>) -> Self {
        Self { messages, init }
    }

    /// Hash covering the message at `ts`, optionally shifted back by
    /// `offset` messages first. Falls back to the nearest prior hash.
    pub fn find_checkpoint_for_message(
        &self,
        ts: TimestampMs,
        offset: Option<usize>,
    ) -> Option<String> {
        let messages = self.messages.messages_snapshot();
        let index = messages.iter().position(|m| m.ts == ts)?;
        let index = index.checked_sub(offset.unwrap_or(0))?;
        nearest_hash_at_or_before(&messages, index)
    }

    /// Whether any file changed between the last completion checkpoint and
    /// the one before it (or the very first checkpoint when there is no
    /// earlier completion). Missing hashes and engine failures degrade to
    /// `false`; "no changes" is the conservative answer.
    pub async fn has_new_changes_since_last_completion(&self) -> bool {
        let messages = self.messages.messages_snapshot();
        let Some((latest_index, latest_hash)) = latest_completion_hash(&messages) else {
            return false;
        };
        let Some(baseline_hash) = completion_baseline_hash(&messages, latest_index) else {
            return false;
        };
        let Some(handle) = self.init.check_and_init().await else {
            return false;
        };
        match handle.diff_count(&baseline_hash, &latest_hash).await {
            Ok(count) => count > 0,
            Err(e) => {
                warn!(task_id = %self.messages.task_id(), error = %e, "diff count failed");
                false
            }
        }
    }
}

/// Nearest checkpoint hash at or before `index`.
pub(crate) fn nearest_hash_at_or_before(messages: &[TaskMessage], index: usize) -> Option<String> {
    messages
        .get(..=index)?
        .iter()
        .rev()
        .find_map(|m| m.last_checkpoint_hash.clone())
}

/// The latest completion-result message carrying a hash, with its index.
fn latest_completion_hash(messages: &[TaskMessage]) -> Option<(usize, String)> {
    messages
        .iter()
        .enumerate()
        .rev()
        .find(|(_, m)| m.kind == MessageKind::CompletionResult)
        .and_then(|(i, m)| m.last_checkpoint_hash.clone().map(|h| (i, h)))
}

/// Baseline for "changes since last completion": the previous completion's
/// hash, or the very first checkpoint hash when this is the first
/// completion.
pub(crate) fn completion_baseline_hash(
    messages: &[TaskMessage],
    before_index: usize,
) -> Option<String> {
    let previous_completion = messages[..before_index]
        .iter()
        .rev()
        .find(|m| m.kind == MessageKind::CompletionResult)
        .and_then(|m| m.last_checkpoint_hash.clone());
    previous_completion
        .or_else(|| messages.iter().find_map(|m| m.last_checkpoint_hash.clone()))
}
