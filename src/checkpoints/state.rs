//! Checkpoint Orchestration State
//!
//! Mutable per-task state shared by the initializer, saver and restorer:
//! the engine handle once initialization succeeds, the last recorded error,
//! the deleted conversation-history range from the most recent restore, and
//! the in-flight initialization future.
//!
//! `handle` and `pending_init` are mutually exclusive over time. The probe
//! below checks and sets both under one lock so two callers can never both
//! observe "no handle, no future" and start two initializations.

use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::engine::SnapshotHandle;
use crate::errors::is_init_timeout;

/// The shared single-flight initialization future.
pub type SharedInit = Shared<BoxFuture<'static, Option<Arc<dyn SnapshotHandle>>>>;

/// Result of an atomic check-and-set against the init state.
pub enum InitProbe {
    /// A handle already exists; no work to do.
    Ready(Arc<dyn SnapshotHandle>),
    /// Someone else is initializing; await their result.
    InFlight(SharedInit),
    /// This caller won the race and owns the new initialization.
    Started(SharedInit),
}

#[derive(Default)]
struct Inner {
    handle: Option<Arc<dyn SnapshotHandle>>,
    last_error: Option<String>,
    deleted_range: Option<(usize, usize)>,
    pending_init: Option<SharedInit>,
}

#[derive(Default)]
pub struct CheckpointManagerState {
    inner: Mutex<Inner>,
}

impl CheckpointManagerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> Option<Arc<dyn SnapshotHandle>> {
        self.inner.lock().handle.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().last_error.clone()
    }

    pub fn record_error(&self, message: impl Into<String>) {
        self.inner.lock().last_error = Some(message.into());
    }

    /// Whether the last recorded error was the distinguished hard timeout,
    /// which suppresses further save attempts this session.
    pub fn last_error_is_timeout(&self) -> bool {
        self.inner
            .lock()
            .last_error
            .as_deref()
            .is_some_and(is_init_timeout)
    }

    pub fn deleted_range(&self) -> Option<(usize, usize)> {
        self.inner.lock().deleted_range
    }

    pub fn set_deleted_range(&self, range: Option<(usize, usize)>) {
        self.inner.lock().deleted_range = range;
    }

    /// Atomically either return the existing handle, join the in-flight
    /// initialization, or install the future built by `make` as the new
    /// in-flight initialization.
    pub fn probe_or_begin_init<F>(&self, make: F) -> InitProbe
    where
        F: FnOnce() -> BoxFuture<'static, Option<Arc<dyn SnapshotHandle>>>,
    {
        use futures::FutureExt;
        let mut inner = self.inner.lock();
        if let Some(handle) = &inner.handle {
            return InitProbe::Ready(handle.clone());
        }
        if let Some(pending) = &inner.pending_init {
            return InitProbe::InFlight(pending.clone());
        }
        let shared = make().shared();
        inner.pending_init = Some(shared.clone());
        InitProbe::Started(shared)
    }

    /// Record the outcome of an initialization and clear the in-flight slot.
    pub fn finish_init(&self, outcome: Result<Arc<dyn SnapshotHandle>, String>) {
        let mut inner = self.inner.lock();
        inner.pending_init = None;
        match outcome {
            Ok(handle) => {
                inner.handle = Some(handle);
                inner.last_error = None;
            }
            Err(message) => {
                inner.last_error = Some(message);
            }
        }
    }
}
