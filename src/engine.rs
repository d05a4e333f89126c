//! Snapshot Engine Interface
//!
//! The underlying git snapshot machinery lives outside this crate. Everything
//! here talks to it through these traits: create a per-task handle, commit the
//! working tree into an opaque hash, reset back to a hash, and diff between
//! hashes. Checkpoint hashes are owned by the engine; messages only reference
//! them.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// One file's contribution to a diff between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    pub path: String,
    pub before: String,
    pub after: String,
}

/// A per-task handle onto the snapshot engine.
#[async_trait]
pub trait SnapshotHandle: Send + Sync {
    /// Snapshot the current workspace state. Returns `None` when the engine
    /// decided there was nothing to commit.
    async fn commit(&self) -> anyhow::Result<Option<String>>;

    /// Reset the workspace to a previously committed hash.
    async fn reset_head(&self, hash: &str) -> anyhow::Result<()>;

    /// Full-content diff. `rhs = None` means "working tree vs `lhs`".
    async fn diff_set(&self, lhs: &str, rhs: Option<&str>) -> anyhow::Result<Vec<DiffEntry>>;

    /// Number of files changed between two hashes.
    async fn diff_count(&self, lhs: &str, rhs: &str) -> anyhow::Result<usize>;
}

/// Factory for per-task snapshot handles.
#[async_trait]
pub trait SnapshotEngine: Send + Sync {
    async fn create(
        &self,
        task_id: &str,
        enabled: bool,
        workspace: &Path,
    ) -> anyhow::Result<Arc<dyn SnapshotHandle>>;
}
