use thiserror::Error;

/// Message used for hard-timeout init failures.
///
/// The saver string-matches against the recorded last error to suppress
/// repeated slow initialization attempts within the same session, so this
/// text must stay distinguishable from other init failures.
pub const INIT_TIMEOUT_MESSAGE: &str = "Checkpoint initialization timed out";

/// The central error type for the checkpoint subsystem.
///
/// Variants map onto the propagation policy: `Disabled` and
/// `MetadataFailure` are always swallowed after logging, `InitTimeout`
/// suppresses further init attempts for the session, and the remaining
/// variants surface to the user via the notification sink.
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Checkpoints are disabled for this task")]
    Disabled,

    #[error("{INIT_TIMEOUT_MESSAGE}")]
    InitTimeout,

    #[error("Checkpoint initialization failed: {0}")]
    InitFailure(String),

    #[error("No checkpoint hash found for message at {timestamp}")]
    MissingHash { timestamp: i64 },

    #[error("Snapshot engine call failed for task {task_id}: {message}")]
    EngineFailure { task_id: String, message: String },

    #[error("File context metadata operation failed: {0}")]
    MetadataFailure(String),
}

pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Check whether a recorded error message came from a hard init timeout.
pub fn is_init_timeout(message: &str) -> bool {
    message.contains(INIT_TIMEOUT_MESSAGE)
}
