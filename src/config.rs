//! Checkpoint Configuration
//!
//! Settings controlling checkpoint behavior per task:
//! - Whether checkpoints are enabled at all
//! - Initialization time budgets (advisory warning vs. hard abort)
//! - File watcher debounce window

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Master switch. When false every checkpoint operation is a silent no-op.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// After this many seconds of initialization, emit a one-time
    /// "taking longer than expected" advisory. Non-fatal.
    #[serde(default = "default_init_warning_secs")]
    pub init_warning_secs: u64,

    /// Hard ceiling on initialization. Exceeding it aborts with a timeout
    /// error that suppresses further attempts for the session.
    #[serde(default = "default_init_timeout_secs")]
    pub init_timeout_secs: u64,

    /// Watcher events for the same path within this window are coalesced.
    #[serde(default = "default_watcher_debounce_ms")]
    pub watcher_debounce_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_init_warning_secs() -> u64 {
    7
}

fn default_init_timeout_secs() -> u64 {
    15
}

fn default_watcher_debounce_ms() -> u64 {
    100
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            init_warning_secs: default_init_warning_secs(),
            init_timeout_secs: default_init_timeout_secs(),
            watcher_debounce_ms: default_watcher_debounce_ms(),
        }
    }
}

impl CheckpointConfig {
    pub fn init_warning_budget(&self) -> Duration {
        Duration::from_secs(self.init_warning_secs)
    }

    pub fn init_hard_budget(&self) -> Duration {
        Duration::from_secs(self.init_timeout_secs)
    }

    pub fn watcher_debounce(&self) -> Duration {
        Duration::from_millis(self.watcher_debounce_ms)
    }
}
