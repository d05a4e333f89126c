//! Task Message Log & History Coordination
//!
//! The task owns three independently-mutable histories:
//! - the ordered message log shown to the user (checkpoint markers live here)
//! - the API conversation history sent to the model
//! - the context-compaction history
//!
//! [`MessageStateCoordinator`] is the only mutation path for all three.
//! Checkpoint hashes are attached to messages by the saver, checked-out flags
//! are recalculated on save/restore, and restores truncate all three stores
//! through this facade so the invariants stay in one place.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::host::HistoryPersistence;

/// Millisecond timestamps are the unique ordering key of the message log.
pub type TimestampMs = i64;

/// Current wall-clock time in milliseconds.
pub fn now_ms() -> TimestampMs {
    Utc::now().timestamp_millis()
}

/// What a message in the task log represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Plain conversational text.
    Text,
    /// Marker recording that a checkpoint was taken at this point.
    CheckpointCreated,
    /// The agent signalled task completion.
    CompletionResult,
    /// An API request was issued; `text` carries serialized [`ApiMetrics`].
    ApiReqStarted,
    /// Synthetic ledger entry re-attributing metrics of discarded requests.
    DeletedApiReqs,
    /// A tool invocation; `text` carries a serialized [`ToolPayload`].
    ToolUse,
}

/// Tool identifiers that matter for stale-file detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    EditedExistingFile,
    NewFileCreated,
    ReadFile,
    ListFiles,
    SearchFiles,
}

/// Payload of a `ToolUse` message, stored as JSON in `text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPayload {
    pub tool: ToolKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ToolPayload {
    /// Path touched by a file edit or creation, if this payload is one.
    pub fn edited_path(&self) -> Option<&str> {
        match self.tool {
            ToolKind::EditedExistingFile | ToolKind::NewFileCreated => self.path.as_deref(),
            _ => None,
        }
    }
}

/// Token/cost accounting for one API request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiMetrics {
    #[serde(default)]
    pub tokens_in: u64,
    #[serde(default)]
    pub tokens_out: u64,
    #[serde(default)]
    pub cache_writes: u64,
    #[serde(default)]
    pub cache_reads: u64,
    #[serde(default)]
    pub cost: f64,
}

impl ApiMetrics {
    pub fn is_zero(&self) -> bool {
        self.tokens_in == 0
            && self.tokens_out == 0
            && self.cache_writes == 0
            && self.cache_reads == 0
            && self.cost == 0.0
    }

    pub fn absorb(&mut self, other: &ApiMetrics) {
        self.tokens_in += other.tokens_in;
        self.tokens_out += other.tokens_out;
        self.cache_writes += other.cache_writes;
        self.cache_reads += other.cache_reads;
        self.cost += other.cost;
    }
}

/// An entry in the task's ordered message log.
///
/// `ts` is the unique ordering key. At most one message ever has
/// `is_checkpoint_checked_out == true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    pub ts: TimestampMs,
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checkpoint_hash: Option<String>,
    #[serde(default)]
    pub is_checkpoint_checked_out: bool,
    /// Index of the last API-history entry paired before this message.
    #[serde(default)]
    pub conversation_history_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_history_deleted_range: Option<(usize, usize)>,
}

impl TaskMessage {
    pub fn new(ts: TimestampMs, kind: MessageKind) -> Self {
        Self {
            ts,
            kind,
            text: None,
            last_checkpoint_hash: None,
            is_checkpoint_checked_out: false,
            conversation_history_index: 0,
            conversation_history_deleted_range: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.last_checkpoint_hash = Some(hash.into());
        self
    }

    pub fn with_history_index(mut self, index: usize) -> Self {
        self.conversation_history_index = index;
        self
    }

    /// Checkpoint marker appended by the saver.
    pub fn checkpoint_marker(ts: TimestampMs) -> Self {
        Self::new(ts, MessageKind::CheckpointCreated)
    }

    pub fn tool_use(ts: TimestampMs, payload: &ToolPayload) -> Self {
        let text = serde_json::to_string(payload).unwrap_or_default();
        Self::new(ts, MessageKind::ToolUse).with_text(text)
    }

    pub fn api_req_started(ts: TimestampMs, metrics: &ApiMetrics) -> Self {
        let text = serde_json::to_string(metrics).unwrap_or_default();
        Self::new(ts, MessageKind::ApiReqStarted).with_text(text)
    }

    pub fn deleted_api_reqs(ts: TimestampMs, metrics: &ApiMetrics) -> Self {
        let text = serde_json::to_string(metrics).unwrap_or_default();
        Self::new(ts, MessageKind::DeletedApiReqs).with_text(text)
    }

    /// Parse the tool payload from `text`. Malformed payloads yield `None`;
    /// detection over messages is best-effort.
    pub fn tool_payload(&self) -> Option<ToolPayload> {
        if self.kind != MessageKind::ToolUse {
            return None;
        }
        self.text
            .as_deref()
            .and_then(|t| serde_json::from_str(t).ok())
    }

    /// Parse API metrics from `text` for request-accounting messages.
    pub fn api_metrics(&self) -> Option<ApiMetrics> {
        if !matches!(
            self.kind,
            MessageKind::ApiReqStarted | MessageKind::DeletedApiReqs
        ) {
            return None;
        }
        self.text
            .as_deref()
            .and_then(|t| serde_json::from_str(t).ok())
    }
}

/// One entry of the API conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiMessage {
    pub role: String,
    pub content: String,
}

/// One entry of the context-compaction history, keyed by timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextHistoryEntry {
    pub ts: TimestampMs,
    pub note: String,
}

/// All task history mutated by this subsystem, persisted as one unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskHistory {
    pub messages: Vec<TaskMessage>,
    pub api_history: Vec<ApiMessage>,
    pub context_history: Vec<ContextHistoryEntry>,
}

/// Read/write facade over the task's histories.
///
/// All mutation of the message log, API history and context history goes
/// through here; callers hold no locks of their own. The inner mutex is never
/// held across an await point.
#[derive(Clone)]
pub struct MessageStateCoordinator {
    task_id: Arc<str>,
    history: Arc<parking_lot::Mutex<TaskHistory>>,
    store: Arc<dyn HistoryPersistence>,
}

impl MessageStateCoordinator {
    pub fn new(
        task_id: &str,
        history: Arc<parking_lot::Mutex<TaskHistory>>,
        store: Arc<dyn HistoryPersistence>,
    ) -> Self {
        Self {
            task_id: Arc::from(task_id),
            history,
            store,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn messages_snapshot(&self) -> Vec<TaskMessage> {
        self.history.lock().messages.clone()
    }

    pub fn history_snapshot(&self) -> TaskHistory {
        self.history.lock().clone()
    }

    pub fn message_index_at(&self, ts: TimestampMs) -> Option<usize> {
        self.history.lock().messages.iter().position(|m| m.ts == ts)
    }

    pub fn last_message_kind(&self) -> Option<MessageKind> {
        self.history.lock().messages.last().map(|m| m.kind)
    }

    pub fn append_message(&self, message: TaskMessage) {
        self.history.lock().messages.push(message);
    }

    /// Attach a checkpoint hash to the message with the given timestamp.
    /// Returns false when no such message exists.
    pub fn attach_hash(&self, ts: TimestampMs, hash: &str) -> bool {
        let mut history = self.history.lock();
        match history.messages.iter_mut().find(|m| m.ts == ts) {
            Some(message) => {
                message.last_checkpoint_hash = Some(hash.to_string());
                true
            }
            None => false,
        }
    }

    /// Clear `is_checkpoint_checked_out` everywhere. Run before every save
    /// so only the newest checkpoint can ever be checked out.
    pub fn clear_checked_out_flags(&self) {
        let mut history = self.history.lock();
        for message in &mut history.messages {
            message.is_checkpoint_checked_out = false;
        }
    }

    /// Mark exactly one message as checked out, clearing all others.
    pub fn set_checked_out(&self, ts: TimestampMs) {
        let mut history = self.history.lock();
        for message in &mut history.messages {
            message.is_checkpoint_checked_out = message.ts == ts;
        }
    }

    pub fn api_history_len(&self) -> usize {
        self.history.lock().api_history.len()
    }

    pub fn truncate_messages(&self, len: usize) {
        self.history.lock().messages.truncate(len);
    }

    pub fn truncate_api_history(&self, len: usize) {
        self.history.lock().api_history.truncate(len);
    }

    /// Drop context-history entries recorded after `ts`.
    pub fn truncate_context_history(&self, ts: TimestampMs) {
        self.history.lock().context_history.retain(|e| e.ts <= ts);
    }

    /// Clone the messages that a restore to `index` would discard.
    pub fn messages_after(&self, index: usize) -> Vec<TaskMessage> {
        let history = self.history.lock();
        if index + 1 >= history.messages.len() {
            return Vec::new();
        }
        history.messages[index + 1..].to_vec()
    }

    pub fn conversation_history_index_at(&self, index: usize) -> Option<usize> {
        self.history
            .lock()
            .messages
            .get(index)
            .map(|m| m.conversation_history_index)
    }

    pub fn set_deleted_range_marker(
        &self,
        ts: TimestampMs,
        range: Option<(usize, usize)>,
    ) {
        let mut history = self.history.lock();
        if let Some(message) = history.messages.iter_mut().find(|m| m.ts == ts) {
            message.conversation_history_deleted_range = range;
        }
    }

    /// Persist all three histories through the host store.
    pub async fn persist(&self) -> anyhow::Result<()> {
        let snapshot = self.history_snapshot();
        self.store.persist(&self.task_id, &snapshot).await?;
        debug!(task_id = %self.task_id, messages = snapshot.messages.len(), "task history persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct NullStore;

    #[async_trait]
    impl HistoryPersistence for NullStore {
        async fn persist(&self, _task_id: &str, _history: &TaskHistory) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn coordinator(messages: Vec<TaskMessage>) -> MessageStateCoordinator {
        let history = Arc::new(parking_lot::Mutex::new(TaskHistory {
            messages,
            ..Default::default()
        }));
        MessageStateCoordinator::new("task-1", history, Arc::new(NullStore))
    }

    #[test]
    fn test_set_checked_out_is_exclusive() {
        let coord = coordinator(vec![
            TaskMessage::checkpoint_marker(1).with_hash("h1"),
            TaskMessage::checkpoint_marker(2).with_hash("h2"),
        ]);
        coord.set_checked_out(1);
        coord.set_checked_out(2);
        let flagged: Vec<_> = coord
            .messages_snapshot()
            .into_iter()
            .filter(|m| m.is_checkpoint_checked_out)
            .collect();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].ts, 2);
    }

    #[test]
    fn test_attach_hash_to_missing_message() {
        let coord = coordinator(vec![TaskMessage::checkpoint_marker(1)]);
        assert!(!coord.attach_hash(99, "h"));
        assert!(coord.attach_hash(1, "h"));
        assert_eq!(
            coord.messages_snapshot()[0].last_checkpoint_hash.as_deref(),
            Some("h")
        );
    }

    #[test]
    fn test_messages_after_end_of_log() {
        let coord = coordinator(vec![
            TaskMessage::new(1, MessageKind::Text),
            TaskMessage::new(2, MessageKind::Text),
        ]);
        assert!(coord.messages_after(1).is_empty());
        assert_eq!(coord.messages_after(0).len(), 1);
    }

    #[test]
    fn test_tool_payload_roundtrip() {
        let payload = ToolPayload {
            tool: ToolKind::EditedExistingFile,
            path: Some("src/main.rs".to_string()),
        };
        let message = TaskMessage::tool_use(5, &payload);
        assert_eq!(message.tool_payload(), Some(payload));
    }

    #[test]
    fn test_tool_payload_malformed_is_none() {
        let message = TaskMessage::new(5, MessageKind::ToolUse).with_text("not json");
        assert!(message.tool_payload().is_none());
    }

    #[test]
    fn test_edited_path_only_for_write_tools() {
        let read = ToolPayload {
            tool: ToolKind::ReadFile,
            path: Some("a.rs".to_string()),
        };
        assert!(read.edited_path().is_none());
        let created = ToolPayload {
            tool: ToolKind::NewFileCreated,
            path: Some("b.rs".to_string()),
        };
        assert_eq!(created.edited_path(), Some("b.rs"));
    }

    #[test]
    fn test_api_metrics_absorb() {
        let mut total = ApiMetrics::default();
        assert!(total.is_zero());
        total.absorb(&ApiMetrics {
            tokens_in: 10,
            tokens_out: 5,
            cache_writes: 1,
            cache_reads: 2,
            cost: 0.25,
        });
        total.absorb(&ApiMetrics {
            tokens_in: 1,
            ..Default::default()
        });
        assert_eq!(total.tokens_in, 11);
        assert_eq!(total.tokens_out, 5);
        assert!((total.cost - 0.25).abs() < f64::EPSILON);
        assert!(!total.is_zero());
    }

    #[test]
    fn test_truncate_context_history_by_timestamp() {
        let history = Arc::new(parking_lot::Mutex::new(TaskHistory {
            context_history: vec![
                ContextHistoryEntry {
                    ts: 1,
                    note: "a".to_string(),
                },
                ContextHistoryEntry {
                    ts: 5,
                    note: "b".to_string(),
                },
                ContextHistoryEntry {
                    ts: 9,
                    note: "c".to_string(),
                },
            ],
            ..Default::default()
        }));
        let coord = MessageStateCoordinator::new("t", history.clone(), Arc::new(NullStore));
        coord.truncate_context_history(5);
        assert_eq!(history.lock().context_history.len(), 2);
    }
}
