//! # Marquee
//!
//! Marquee is a control plane for fleets of independent display surfaces:
//! externally-owned rendering windows that show web content. It tracks a
//! desired state for every display, converges the live fleet onto it, and
//! reports composed per-display status upward so it can be served over a
//! remote-control protocol.
//!
//! ## Architecture
//!
//! Marquee is built around these key components:
//!
//! * [`trigger::CoalescingTrigger`]: collapses bursts of async work into a
//!   bounded number of debounced executions
//! * [`queue::OpQueue`]: per-actor FIFO serializer with supersession of
//!   not-yet-started work
//! * [`display::DisplayActor`]: one display's content state machine, with a
//!   generation counter that makes superseded loads inert
//! * [`controller::ReconciliationController`]: diffs desired-state
//!   snapshots against the live actor map
//!
//! The remote-control gateway lives in the `marquee-server` crate; the
//! actual rendering surface is abstracted behind
//! [`surface::DisplaySurface`] and is not part of this crate's concern
//! beyond the [`surface::headless`] reference implementation.

pub mod config;
pub mod controller;
pub mod display;
pub mod errors;
pub mod logging;
pub mod messages;
pub mod queue;
pub mod shutdown;
pub mod status;
pub mod surface;
pub mod trigger;

pub use config::{DesiredState, DisplaySpec, SharedSettings, DEFAULT_API_PORT};
pub use controller::{ControllerHandle, ReconciliationController, RECONCILE_SETTLE_TIME};
pub use display::{ContentRef, DisplayActor, DisplayEvent};
pub use errors::{ControllerError, DisplayError, SurfaceError};
pub use messages::{ControllerCommand, ControllerEvent};
pub use queue::OpQueue;
pub use shutdown::{ShutdownController, ShutdownReceiver, ShutdownSignal};
pub use status::{AggregateStatus, StatusCode, StatusObject};
pub use surface::{
    Bounds, DisplaySurface, LoadTarget, SurfaceEvent, SurfaceFactory, TerminationReason,
};
pub use trigger::CoalescingTrigger;
