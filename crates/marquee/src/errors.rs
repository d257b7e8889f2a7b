//! Error types shared across the marquee control plane.

use thiserror::Error;

/// Errors reported by a display surface implementation.
///
/// These describe failures of the external rendering resource itself;
/// they are folded into [`DisplayError`] when they surface through a
/// display actor's public operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    /// The surface failed to load the requested content.
    #[error("{0}")]
    LoadFailed(String),

    /// Script execution inside the surface failed.
    #[error("script execution failed: {0}")]
    ScriptFailed(String),

    /// The surface has already been torn down.
    #[error("surface has been closed")]
    Closed,

    /// Any other backend-specific failure.
    #[error("{0}")]
    Backend(String),
}

/// Errors produced by a display actor's public operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DisplayError {
    /// A queued operation was superseded before it started.
    #[error("Aborted, due to reason: \"{0}\"")]
    Aborted(String),

    /// The surface failed to load the effective content.
    #[error("Failed to load content: {0}")]
    Load(String),

    /// The surface's rendering process terminated abnormally.
    #[error("Renderer process terminated: {0}")]
    Process(String),

    /// A surface call failed outside of a content load.
    #[error("Display surface error: {0}")]
    Surface(#[from] SurfaceError),

    /// The operation's completion channel was dropped.
    #[error("Operation channel closed")]
    ChannelClosed,

    /// The display has been closed and accepts no further operations.
    #[error("Display has been closed")]
    Closed,
}

/// Errors returned by [`ControllerHandle`](crate::controller::ControllerHandle)
/// when the reconciliation controller task is no longer running.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    #[error("reconciliation controller is not running")]
    Stopped,
}
