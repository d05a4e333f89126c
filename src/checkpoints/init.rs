//! Snapshot Engine Initialization
//!
//! Single-flight, time-budgeted initialization of the per-task engine
//! handle. Concurrent callers converge on one shared future; the first
//! caller installs it via an atomic check-and-set on the manager state.
//!
//! Two independent budgets apply: after the warning budget an advisory is
//! emitted exactly once, after the hard budget the wait is abandoned with
//! the distinguished timeout error. Abandoning the wait drops the engine
//! future; if the underlying work completes anyway its result is discarded.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::CheckpointConfig;
use crate::engine::{SnapshotEngine, SnapshotHandle};
use crate::errors::CheckpointError;
use crate::workspace::WorkspaceResolver;

use super::state::{CheckpointManagerState, InitProbe};
use super::ui::CheckpointUICoordinator;

pub struct TrackerInitializer {
    task_id: Arc<str>,
    config: CheckpointConfig,
    engine: Arc<dyn SnapshotEngine>,
    resolver: WorkspaceResolver,
    ui: CheckpointUICoordinator,
    state: Arc<CheckpointManagerState>,
}

impl TrackerInitializer {
    pub fn new(
        task_id: &str,
        config: CheckpointConfig,
        engine: Arc<dyn SnapshotEngine>,
        resolver: WorkspaceResolver,
        ui: CheckpointUICoordinator,
        state: Arc<CheckpointManagerState>,
    ) -> Self {
        Self {
            task_id: Arc::from(task_id),
            config,
            engine,
            resolver,
            ui,
            state,
        }
    }

    /// Return the engine handle, initializing it if necessary.
    ///
    /// Failures are non-fatal: the error is recorded on the manager state
    /// and `None` is returned, leaving the task running without checkpoints.
    pub async fn check_and_init(&self) -> Option<Arc<dyn SnapshotHandle>> {
        if !self.config.enabled {
            return None;
        }
        match self.state.probe_or_begin_init(|| self.init_future()) {
            InitProbe::Ready(handle) => Some(handle),
            InitProbe::InFlight(shared) | InitProbe::Started(shared) => shared.await,
        }
    }

    fn init_future(&self) -> BoxFuture<'static, Option<Arc<dyn SnapshotHandle>>> {
        let task_id = self.task_id.clone();
        let engine = self.engine.clone();
        let resolver = self.resolver.clone();
        let ui = self.ui.clone();
        let state = self.state.clone();
        let warn_budget = self.config.init_warning_budget();
        let hard_budget = self.config.init_hard_budget();
        let enabled = self.config.enabled;

        async move {
            let workspace = resolver.resolve();
            info!(task_id = %task_id, workspace = %workspace.display(), "initializing snapshot engine");

            let create = engine.create(&task_id, enabled, &workspace);
            tokio::pin!(create);
            let warn_timer = tokio::time::sleep(warn_budget);
            tokio::pin!(warn_timer);
            let hard_timer = tokio::time::sleep(hard_budget);
            tokio::pin!(hard_timer);

            let mut warned = false;
            let outcome: Result<Arc<dyn SnapshotHandle>, String> = loop {
                tokio::select! {
                    result = &mut create => {
                        break result
                            .map_err(|e| CheckpointError::InitFailure(format!("{e:#}")).to_string());
                    }
                    _ = &mut warn_timer, if !warned => {
                        warned = true;
                        ui.info("Checkpoints are taking longer than expected to initialize...");
                    }
                    _ = &mut hard_timer => {
                        break Err(CheckpointError::InitTimeout.to_string());
                    }
                }
            };

            match outcome {
                Ok(handle) => {
                    info!(task_id = %task_id, "snapshot engine initialized");
                    state.finish_init(Ok(handle.clone()));
                    Some(handle)
                }
                Err(message) => {
                    warn!(task_id = %task_id, error = %message, "snapshot engine initialization failed");
                    state.finish_init(Err(message));
                    None
                }
            }
        }
        .boxed()
    }
}
