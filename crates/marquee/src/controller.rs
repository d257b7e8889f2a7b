//! Reconciliation controller.
//!
//! Owns the map of display id to live [`DisplayActor`] and brings it in
//! line with incoming [`DesiredState`] snapshots: new ids are created and
//! initialized, existing ids get `update_spec`, ids absent from the
//! snapshot are closed and dropped. Reconciliation passes are debounced
//! through a [`CoalescingTrigger`] so rapid successive snapshots collapse
//! into one pass.
//!
//! The live map is owned exclusively by the controller task; every other
//! component goes through a [`ControllerHandle`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{DesiredState, SharedSettings};
use crate::display::{DisplayActor, DisplayEvent};
use crate::errors::ControllerError;
use crate::messages::{ControllerCommand, ControllerEvent};
use crate::status::{AggregateStatus, StatusObject};
use crate::surface::SurfaceFactory;
use crate::trigger::CoalescingTrigger;

/// How long to wait for snapshot updates to settle before reconciling.
pub const RECONCILE_SETTLE_TIME: Duration = Duration::from_millis(200);

struct DisplayEntry {
    actor: DisplayActor,
    /// Forwards the actor's outbound events into the command loop; ends on
    /// its own when the actor's event channel closes.
    #[allow(dead_code)]
    forwarder: JoinHandle<()>,
}

pub struct ReconciliationController {
    displays: HashMap<String, DisplayEntry>,
    statuses: std::collections::BTreeMap<String, StatusObject>,
    shared: SharedSettings,
    factory: Arc<dyn SurfaceFactory>,
    command_tx: mpsc::Sender<ControllerCommand>,
    command_rx: mpsc::Receiver<ControllerCommand>,
    event_tx: mpsc::UnboundedSender<ControllerEvent>,
}

/// Clonable handle to a running controller.
#[derive(Clone)]
pub struct ControllerHandle {
    command_tx: mpsc::Sender<ControllerCommand>,
    reconcile_trigger: CoalescingTrigger<DesiredState>,
}

impl ReconciliationController {
    /// Starts the controller task and returns a handle plus the stream of
    /// upward events.
    pub fn spawn(
        factory: Arc<dyn SurfaceFactory>,
    ) -> (ControllerHandle, mpsc::UnboundedReceiver<ControllerEvent>) {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let controller = Self {
            displays: HashMap::new(),
            statuses: Default::default(),
            shared: SharedSettings::default(),
            factory,
            command_tx: command_tx.clone(),
            command_rx,
            event_tx,
        };
        tokio::spawn(controller.run());

        let reconcile_trigger = {
            let command_tx = command_tx.clone();
            CoalescingTrigger::new(
                RECONCILE_SETTLE_TIME,
                move |snapshot: DesiredState| {
                    let command_tx = command_tx.clone();
                    async move {
                        let (done_tx, done_rx) = oneshot::channel();
                        command_tx
                            .send(ControllerCommand::Reconcile { snapshot, done_tx })
                            .await
                            .map_err(|_| anyhow::anyhow!("controller loop stopped"))?;
                        done_rx
                            .await
                            .map_err(|_| anyhow::anyhow!("reconcile pass dropped"))?;
                        Ok(())
                    }
                },
                |err| error!("reconciliation failed: {err:#}"),
            )
        };

        (
            ControllerHandle {
                command_tx,
                reconcile_trigger,
            },
            event_rx,
        )
    }

    async fn run(mut self) {
        info!("reconciliation controller started");
        while let Some(command) = self.command_rx.recv().await {
            debug!("controller received command: {}", command.to_log());
            match command {
                ControllerCommand::Reconcile { snapshot, done_tx } => {
                    self.reconcile(snapshot).await;
                    let _ = done_tx.send(());
                }
                ControllerCommand::GetDisplay { id, response_tx } => {
                    let actor = self.displays.get(&id).map(|entry| entry.actor.clone());
                    let _ = response_tx.send(actor);
                }
                ControllerCommand::ListDisplays { response_tx } => {
                    let mut ids: Vec<String> = self.displays.keys().cloned().collect();
                    ids.sort();
                    let _ = response_tx.send(ids);
                }
                ControllerCommand::AllDisplays { response_tx } => {
                    let actors = self
                        .displays
                        .iter()
                        .map(|(id, entry)| (id.clone(), entry.actor.clone()))
                        .collect();
                    let _ = response_tx.send(actors);
                }
                ControllerCommand::GetAggregateStatus { response_tx } => {
                    let _ = response_tx.send(self.aggregate_status());
                }
                ControllerCommand::DisplayEvent { id, event } => {
                    self.handle_display_event(id, event);
                }
                ControllerCommand::Shutdown { done_tx } => {
                    self.close_all().await;
                    let _ = done_tx.send(());
                    break;
                }
            }
        }
        info!("reconciliation controller stopped");
    }

    /// One reconciliation pass. After it completes, the live id set equals
    /// the snapshot's enabled id set (modulo surface creation failures,
    /// which are logged and retried on the next pass).
    async fn reconcile(&mut self, snapshot: DesiredState) {
        self.shared = snapshot.shared.clone();

        let mut to_remove: HashSet<String> = self.displays.keys().cloned().collect();

        for (id, spec) in &snapshot.displays {
            if !spec.enabled {
                continue;
            }
            to_remove.remove(id);

            if let Some(entry) = self.displays.get(id) {
                let update = entry.actor.update_spec(spec.clone(), self.shared.clone());
                let id = id.clone();
                tokio::spawn(async move {
                    if let Err(err) = update.await {
                        warn!(display = %id, "spec update failed: {err}");
                    }
                });
                continue;
            }

            info!(display = %id, "creating display");
            match self.factory.create(id, spec).await {
                Ok((surface, surface_events)) => {
                    let (actor, mut events_rx) = DisplayActor::spawn(
                        id.clone(),
                        spec.clone(),
                        self.shared.clone(),
                        surface,
                        surface_events,
                    );

                    let forwarder = {
                        let command_tx = self.command_tx.clone();
                        let id = id.clone();
                        tokio::spawn(async move {
                            while let Some(event) = events_rx.recv().await {
                                let forwarded = ControllerCommand::DisplayEvent {
                                    id: id.clone(),
                                    event,
                                };
                                if command_tx.send(forwarded).await.is_err() {
                                    break;
                                }
                            }
                        })
                    };

                    let init = actor.init();
                    {
                        let id = id.clone();
                        tokio::spawn(async move {
                            if let Err(err) = init.await {
                                warn!(display = %id, "initial load failed: {err}");
                            }
                        });
                    }

                    self.statuses.insert(id.clone(), actor.status());
                    self.displays
                        .insert(id.clone(), DisplayEntry { actor, forwarder });
                }
                Err(err) => {
                    error!(display = %id, "failed to create display surface: {err}");
                }
            }
        }

        for id in to_remove {
            info!(display = %id, "removing display");
            if let Some(entry) = self.displays.remove(&id) {
                self.statuses.remove(&id);
                let close = entry.actor.close();
                tokio::spawn(async move {
                    if let Err(err) = close.await {
                        warn!(display = %id, "error while closing display: {err}");
                    }
                });
            }
        }

        self.emit_status();
    }

    fn handle_display_event(&mut self, id: String, event: DisplayEvent) {
        match event {
            DisplayEvent::StatusChanged(status) => {
                if let Some(entry) = self.statuses.get_mut(&id) {
                    *entry = status;
                    self.emit_status();
                }
            }
            DisplayEvent::SpecModified(spec) => {
                let _ = self
                    .event_tx
                    .send(ControllerEvent::PersistRequested { id, spec });
            }
            DisplayEvent::FocusGained => {
                debug!(display = %id, "display gained focus");
            }
            DisplayEvent::Closed => {
                // Our own removals drop the entry before the event arrives;
                // a hit here means the display went away on its own.
                if self.displays.remove(&id).is_some() {
                    warn!(display = %id, "display closed");
                    self.statuses.remove(&id);
                    let _ = self
                        .event_tx
                        .send(ControllerEvent::DisplayClosed { id: id.clone() });
                    self.emit_status();
                }
            }
        }
    }

    fn aggregate_status(&self) -> AggregateStatus {
        AggregateStatus {
            app: StatusObject::good(),
            displays: self.statuses.clone(),
        }
    }

    fn emit_status(&self) {
        let _ = self
            .event_tx
            .send(ControllerEvent::StatusChanged(self.aggregate_status()));
    }

    async fn close_all(&mut self) {
        info!("closing {} displays", self.displays.len());
        let closing: Vec<_> = self
            .displays
            .drain()
            .map(|(id, entry)| (id, entry.actor.close()))
            .collect();
        self.statuses.clear();
        for (id, close) in closing {
            if let Err(err) = close.await {
                warn!(display = %id, "error while closing display: {err}");
            }
        }
    }
}

impl ControllerHandle {
    /// Hands a new desired-state snapshot to the controller. Non-blocking;
    /// rapid successive calls collapse into one debounced pass.
    pub fn apply(&self, snapshot: DesiredState) {
        self.reconcile_trigger.trigger(snapshot);
    }

    pub async fn get_display(&self, id: &str) -> Result<Option<DisplayActor>, ControllerError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(ControllerCommand::GetDisplay {
                id: id.to_string(),
                response_tx,
            })
            .await
            .map_err(|_| ControllerError::Stopped)?;
        response_rx.await.map_err(|_| ControllerError::Stopped)
    }

    pub async fn list_displays(&self) -> Result<Vec<String>, ControllerError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(ControllerCommand::ListDisplays { response_tx })
            .await
            .map_err(|_| ControllerError::Stopped)?;
        response_rx.await.map_err(|_| ControllerError::Stopped)
    }

    pub async fn all_displays(&self) -> Result<Vec<(String, DisplayActor)>, ControllerError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(ControllerCommand::AllDisplays { response_tx })
            .await
            .map_err(|_| ControllerError::Stopped)?;
        response_rx.await.map_err(|_| ControllerError::Stopped)
    }

    pub async fn aggregate_status(&self) -> Result<AggregateStatus, ControllerError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(ControllerCommand::GetAggregateStatus { response_tx })
            .await
            .map_err(|_| ControllerError::Stopped)?;
        response_rx.await.map_err(|_| ControllerError::Stopped)
    }

    /// Closes every display and stops the controller loop.
    pub async fn shutdown(&self) -> Result<(), ControllerError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.command_tx
            .send(ControllerCommand::Shutdown { done_tx })
            .await
            .map_err(|_| ControllerError::Stopped)?;
        done_rx.await.map_err(|_| ControllerError::Stopped)
    }
}
