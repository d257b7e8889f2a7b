//! Command and event types for the reconciliation controller.

use tokio::sync::oneshot;

use crate::config::{DesiredState, DisplaySpec};
use crate::display::{DisplayActor, DisplayEvent};
use crate::status::AggregateStatus;

/// Commands processed by the controller's command loop.
pub enum ControllerCommand {
    /// Bring the live display set in line with a desired-state snapshot.
    Reconcile {
        snapshot: DesiredState,
        done_tx: oneshot::Sender<()>,
    },
    GetDisplay {
        id: String,
        response_tx: oneshot::Sender<Option<DisplayActor>>,
    },
    ListDisplays {
        response_tx: oneshot::Sender<Vec<String>>,
    },
    AllDisplays {
        response_tx: oneshot::Sender<Vec<(String, DisplayActor)>>,
    },
    GetAggregateStatus {
        response_tx: oneshot::Sender<AggregateStatus>,
    },
    /// Forwarded outbound event of one display actor.
    DisplayEvent { id: String, event: DisplayEvent },
    /// Close every display and stop the controller loop.
    Shutdown { done_tx: oneshot::Sender<()> },
}

impl ControllerCommand {
    pub fn to_log(&self) -> String {
        match self {
            ControllerCommand::Reconcile { snapshot, .. } => {
                format!("Reconcile: {} desired displays", snapshot.displays.len())
            }
            ControllerCommand::GetDisplay { id, .. } => format!("GetDisplay: {id}"),
            ControllerCommand::ListDisplays { .. } => "ListDisplays".to_string(),
            ControllerCommand::AllDisplays { .. } => "AllDisplays".to_string(),
            ControllerCommand::GetAggregateStatus { .. } => "GetAggregateStatus".to_string(),
            ControllerCommand::DisplayEvent { id, event } => {
                format!("DisplayEvent for {id}: {event:?}")
            }
            ControllerCommand::Shutdown { .. } => "Shutdown".to_string(),
        }
    }
}

/// Events emitted upward by the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    /// The aggregate status changed (a display's status, or the set of
    /// displays itself).
    StatusChanged(AggregateStatus),
    /// A display's spec was modified interactively and should be persisted
    /// by the config source.
    PersistRequested { id: String, spec: DisplaySpec },
    /// A display went away outside of reconciliation.
    DisplayClosed { id: String },
}

impl std::fmt::Debug for ControllerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_log())
    }
}
