//! Checkpoint UI Coordination
//!
//! Thin facade over the host's notification sink and diff viewer so the
//! orchestration code never talks to presentation concerns directly.

use std::sync::Arc;

use crate::host::{DiffViewer, FileDiff, NotificationSink};

#[derive(Clone)]
pub struct CheckpointUICoordinator {
    sink: Arc<dyn NotificationSink>,
    viewer: Arc<dyn DiffViewer>,
}

impl CheckpointUICoordinator {
    pub fn new(sink: Arc<dyn NotificationSink>, viewer: Arc<dyn DiffViewer>) -> Self {
        Self { sink, viewer }
    }

    pub fn info(&self, message: &str) {
        self.sink.info(message);
    }

    pub fn error(&self, message: &str) {
        self.sink.error(message);
    }

    pub fn success(&self, message: &str) {
        self.sink.success(message);
    }

    pub fn relinquish_control(&self) {
        self.sink.relinquish_control();
    }

    pub async fn open_diff(&self, title: &str, diffs: Vec<FileDiff>) -> anyhow::Result<()> {
        self.viewer.open_multi_file_diff(title, diffs).await
    }
}
