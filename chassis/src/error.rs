//! Error types returned by the runtime and its registries.

use thiserror::Error;

/// Lifecycle states of a [`ServiceRuntime`](crate::ServiceRuntime).
/// Transitions are monotonic: Created → Running → Stopping → Stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Running,
    Stopping,
    Stopped,
}

impl LifecycleState {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            LifecycleState::Created => 0,
            LifecycleState::Running => 1,
            LifecycleState::Stopping => 2,
            LifecycleState::Stopped => 3,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => LifecycleState::Created,
            1 => LifecycleState::Running,
            2 => LifecycleState::Stopping,
            _ => LifecycleState::Stopped,
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LifecycleState::Created => "created",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Errors returned by [`ServiceRuntime::run`](crate::ServiceRuntime::run).
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A lifecycle operation was attempted from the wrong state.
    #[error("invalid lifecycle transition: expected {expected}, runtime is {actual}")]
    InvalidState {
        expected: LifecycleState,
        actual: LifecycleState,
    },

    /// The logging bootstrap failed before the runtime entered Running.
    /// The only error class that aborts `run()`.
    #[error("logging bootstrap failed: {0}")]
    FatalInit(#[source] LoggingError),
}

/// Errors returned by the callback registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallbackError {
    #[error("a callback is already registered")]
    AlreadyRegistered,

    #[error("callback token does not match the active registration")]
    StaleToken,

    #[error("callback registry is closed")]
    RegistryClosed,
}

/// Errors returned by the logging bootstrap.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoggingError {
    #[error("logging is already initialized")]
    AlreadyInitialized,

    #[error("invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("unknown write style '{0}', expected auto, always, never or json")]
    InvalidWriteStyle(String),

    #[error("failed to install global subscriber: {0}")]
    InitFailed(String),
}
