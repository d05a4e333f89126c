//! Checkpoint Creation
//!
//! Two save flavors with distinct de-duplication rules:
//! - **Regular**: append a marker message, then commit in the background and
//!   attach the hash once known. Back-to-back saves collapse into one marker;
//!   a failed commit leaves the marker hashless but still useful.
//! - **Completion**: commit synchronously and attach the hash to the
//!   completion-result message. A completion checkpoint without a hash would
//!   make restore silently non-functional, so missing hashes are errors
//!   here. Repeated completion signals within the last three messages are
//!   suppressed.

use anyhow::{anyhow, bail};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::CheckpointConfig;
use crate::errors::CheckpointError;
use crate::messages::{now_ms, MessageKind, MessageStateCoordinator, TaskMessage, TimestampMs};

use super::init::TrackerInitializer;
use super::state::CheckpointManagerState;

/// How many trailing messages are examined for a prior completion hash.
const COMPLETION_DEDUP_WINDOW: usize = 3;

pub struct CheckpointSaver {
    config: CheckpointConfig,
    state: Arc<CheckpointManagerState>,
    messages: MessageStateCoordinator,
    init: Arc<TrackerInitializer>,
}

impl CheckpointSaver {
    pub fn new(
        config: CheckpointConfig,
        state: Arc<CheckpointManagerState>,
        messages: MessageStateCoordinator,
        init: Arc<TrackerInitializer>,
    ) -> Self {
        Self {
            config,
            state,
            messages,
            init,
        }
    }

    pub async fn save(
        &self,
        is_completion_checkpoint: bool,
        completion_message_ts: Option<TimestampMs>,
    ) -> anyhow::Result<()> {
        if !self.config.enabled {
            debug!(task_id = %self.messages.task_id(), "checkpoints disabled, save skipped");
            return Ok(());
        }
        if self.state.last_error_is_timeout() {
            debug!(
                task_id = %self.messages.task_id(),
                "save suppressed after init timeout this session"
            );
            return Ok(());
        }

        // Only the newest checkpoint can ever be checked out.
        self.messages.clear_checked_out_flags();

        if is_completion_checkpoint {
            self.save_completion(completion_message_ts).await
        } else {
            self.save_regular().await
        }
    }

    async fn save_regular(&self) -> anyhow::Result<()> {
        if self.messages.last_message_kind() == Some(MessageKind::CheckpointCreated) {
            debug!(
                task_id = %self.messages.task_id(),
                "last message is already a checkpoint marker, save skipped"
            );
            return Ok(());
        }

        let marker_ts = now_ms();
        self.messages
            .append_message(TaskMessage::checkpoint_marker(marker_ts));

        // Commit off the hot path. The marker message is already valid;
        // attaching the hash later only makes it restorable.
        let init = self.init.clone();
        let messages = self.messages.clone();
        tokio::spawn(async move {
            let Some(handle) = init.check_and_init().await else {
                warn!(
                    task_id = %messages.task_id(),
                    "checkpoint commit skipped, engine unavailable"
                );
                return;
            };
            match handle.commit().await {
                Ok(Some(hash)) => {
                    if messages.attach_hash(marker_ts, &hash) {
                        if let Err(e) = messages.persist().await {
                            warn!(task_id = %messages.task_id(), error = %e, "failed to persist checkpoint hash");
                        }
                    }
                }
                Ok(None) => {
                    debug!(task_id = %messages.task_id(), "engine had nothing to commit");
                }
                Err(e) => {
                    warn!(task_id = %messages.task_id(), error = %e, "checkpoint commit failed");
                }
            }
        });
        Ok(())
    }

    async fn save_completion(&self, completion_message_ts: Option<TimestampMs>) -> anyhow::Result<()> {
        let snapshot = self.messages.messages_snapshot();
        let already_checkpointed = snapshot
            .iter()
            .rev()
            .take(COMPLETION_DEDUP_WINDOW)
            .any(|m| m.kind == MessageKind::CompletionResult && m.last_checkpoint_hash.is_some());
        if already_checkpointed {
            debug!(
                task_id = %self.messages.task_id(),
                "recent completion already has a checkpoint, save skipped"
            );
            return Ok(());
        }

        let handle = self.init.check_and_init().await.ok_or_else(|| {
            CheckpointError::InitFailure(
                self.state
                    .last_error()
                    .unwrap_or_else(|| "initialization did not complete".to_string()),
            )
        })?;

        let hash = handle
            .commit()
            .await
            .map_err(|e| CheckpointError::EngineFailure {
                task_id: self.messages.task_id().to_string(),
                message: format!("{e:#}"),
            })?
            .ok_or_else(|| CheckpointError::EngineFailure {
                task_id: self.messages.task_id().to_string(),
                message: "completion checkpoint commit produced no hash".to_string(),
            })?;

        let target_ts = completion_message_ts
            .or_else(|| {
                snapshot
                    .iter()
                    .rev()
                    .find(|m| m.kind == MessageKind::CompletionResult)
                    .map(|m| m.ts)
            })
            .ok_or_else(|| anyhow!("no completion-result message to attach checkpoint to"))?;

        if !self.messages.attach_hash(target_ts, &hash) {
            bail!("completion message at {target_ts} not found");
        }
        self.messages.persist().await?;
        info!(
            task_id = %self.messages.task_id(),
            hash = %hash,
            "completion checkpoint saved"
        );
        Ok(())
    }
}
