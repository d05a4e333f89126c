//! Agent/User Edit Disambiguation
//!
//! The watcher reports every filesystem change, including the agent's own
//! writes. Callers mark a path as agent-edited synchronously before the write
//! syscall; when the watcher event arrives the marker is consumed and the
//! event dropped. Unmarked events are user edits and land in the
//! recently-modified set, which the agent drains before its next edit.

use parking_lot::Mutex;
use std::collections::HashSet;

#[derive(Default)]
pub struct FileStateDetector {
    edited_by_agent: Mutex<HashSet<String>>,
    recently_modified: Mutex<HashSet<String>>,
}

impl FileStateDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Must be called before the write that will trigger the watcher.
    pub fn mark_edited_by_agent(&self, path: &str) {
        self.edited_by_agent.lock().insert(path.to_string());
    }

    /// Consume the agent-edit marker for a path. Returns true when the
    /// change was the agent's own write.
    pub fn consume_agent_edit(&self, path: &str) -> bool {
        self.edited_by_agent.lock().remove(path)
    }

    pub fn note_user_modified(&self, path: &str) {
        self.recently_modified.lock().insert(path.to_string());
    }

    pub fn get_and_clear_recently_modified(&self) -> Vec<String> {
        let mut set = self.recently_modified.lock();
        let mut files: Vec<String> = set.drain().collect();
        files.sort();
        files
    }

    pub fn has_pending_user_edits(&self) -> bool {
        !self.recently_modified.lock().is_empty()
    }
}
