//! The display surface boundary.
//!
//! A display surface is the external, opaque windowing/rendering resource a
//! display actor controls. The control plane only ever talks to it through
//! the [`DisplaySurface`] trait and consumes its [`SurfaceEvent`] stream;
//! actual rendering is out of scope. [`headless::HeadlessSurface`] is a
//! reference implementation that probes content over HTTP without rendering
//! anything.

pub mod headless;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::DisplaySpec;
use crate::errors::SurfaceError;
use crate::status::StatusObject;

/// Window geometry in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// What a surface should load: a resolved URL or nothing at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadTarget {
    Url(String),
    Blank,
}

/// Why a surface's rendering process went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// The process exited on purpose with a zero exit code.
    CleanExit,
    Crashed(String),
    Killed,
    OutOfMemory,
    LaunchFailed(String),
}

impl TerminationReason {
    pub fn is_clean(&self) -> bool {
        matches!(self, TerminationReason::CleanExit)
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::CleanExit => write!(f, "clean exit"),
            TerminationReason::Crashed(detail) => write!(f, "crashed ({detail})"),
            TerminationReason::Killed => write!(f, "killed"),
            TerminationReason::OutOfMemory => write!(f, "out of memory"),
            TerminationReason::LaunchFailed(detail) => write!(f, "launch failed ({detail})"),
        }
    }
}

/// Events emitted by a surface towards its owning display actor.
#[derive(Debug, Clone)]
pub enum SurfaceEvent {
    /// The user resized the window; carries the new bounds.
    Resized(Bounds),
    /// The user moved the window; carries the new bounds.
    Moved(Bounds),
    Maximized,
    Unmaximized,
    FocusGained,
    /// The surface was closed from the outside.
    Closed,
    /// The renderer stopped responding.
    Unresponsive,
    /// The renderer recovered after being unresponsive.
    Responsive,
    /// The rendering process terminated.
    RendererGone(TerminationReason),
    /// Content running inside the surface reported its own status.
    StatusReported(StatusObject),
    /// A console line from the content, for diagnostics.
    ConsoleMessage(String),
}

/// The operations a display actor drives a surface with.
///
/// All calls are opaque async operations that may suspend for an unbounded
/// time; implementations must tolerate being called after `close` (calls
/// should fail with [`SurfaceError::Closed`], except `close` itself, which
/// is idempotent).
#[async_trait]
pub trait DisplaySurface: Send + Sync {
    async fn set_bounds(&self, bounds: Bounds) -> Result<(), SurfaceError>;
    async fn set_fullscreen(&self, fullscreen: bool) -> Result<(), SurfaceError>;
    async fn set_always_on_top(&self, on_top: bool) -> Result<(), SurfaceError>;
    async fn set_zoom(&self, factor: f64) -> Result<(), SurfaceError>;
    async fn set_title(&self, title: &str) -> Result<(), SurfaceError>;

    /// Navigates the surface to the given target, resolving when the load
    /// has settled (successfully or not).
    async fn load(&self, target: LoadTarget) -> Result<(), SurfaceError>;

    /// Injects a stylesheet into the currently loaded content.
    async fn inject_style(&self, css: &str) -> Result<(), SurfaceError>;

    /// Executes a script inside the currently loaded content.
    async fn execute_script(&self, source: &str) -> Result<serde_json::Value, SurfaceError>;

    async fn current_url(&self) -> Option<String>;

    /// Tears the surface down. Idempotent.
    async fn close(&self) -> Result<(), SurfaceError>;
}

/// Creates surfaces with their initial geometry, one per display actor.
#[async_trait]
pub trait SurfaceFactory: Send + Sync {
    async fn create(
        &self,
        id: &str,
        spec: &DisplaySpec,
    ) -> Result<(Arc<dyn DisplaySurface>, mpsc::Receiver<SurfaceEvent>), SurfaceError>;
}

impl Bounds {
    /// Initial bounds for a spec, with unset positions defaulting to the
    /// screen origin.
    pub fn from_spec(spec: &DisplaySpec) -> Self {
        Self {
            x: spec.x.unwrap_or(0),
            y: spec.y.unwrap_or(0),
            width: spec.width,
            height: spec.height,
        }
    }
}
