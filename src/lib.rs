//! Backtrack - Undo/Redo for Autonomous Coding Agents
//!
//! Snapshots the workspace on every agent turn, lets the user roll the
//! conversation and/or workspace back to any checkpoint, diffs between
//! checkpoints, and detects when files were changed outside the agent's
//! control so stale context is never silently reused.
//!
//! The crate coordinates three independently-mutable stores (the message
//! log, the API conversation history, and workspace git state) under
//! cooperative concurrency, and guarantees that a partially failed restore
//! never mutates conversation state.
//!
//! The git snapshot machinery, UI, and persistence backends are external:
//! they plug in through the traits in [`engine`] and [`host`].
//!
//! # Quick Start
//!
//! ```ignore
//! use backtrack::checkpoints::{CheckpointManager, CheckpointManagerParams, RestoreMode};
//!
//! let manager = CheckpointManager::new(params);
//! manager.save_checkpoint(false, None).await;
//! let update = manager.restore_checkpoint(ts, RestoreMode::TaskAndWorkspace, None).await;
//! ```

pub mod checkpoints;
pub mod config;
pub mod context_tracking;
pub mod engine;
pub mod errors;
pub mod host;
pub mod messages;
pub mod telemetry;
pub mod workspace;

pub use checkpoints::{CheckpointManager, CheckpointManagerParams, RestoreMode, TaskStateUpdate};
pub use config::CheckpointConfig;
pub use context_tracking::FileContextTracker;
pub use errors::{CheckpointError, Result};
