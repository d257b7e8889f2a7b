//! Display actors.
//!
//! A [`DisplayActor`] owns one display's desired content, its composed
//! status, and the surface that renders it. All public operations are
//! serialized through the actor's own [`OpQueue`], so they never interleave
//! against the surface; content-changing operations additionally bump a
//! monotonic generation counter at issue time, which makes the continuations
//! of any in-flight load inert the moment they are superseded. There is no
//! forced cancellation: an abandoned load simply stops applying side effects
//! when it resumes.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{DisplaySpec, SharedSettings};
use crate::errors::{DisplayError, SurfaceError};
use crate::queue::OpQueue;
use crate::status::{StatusCode, StatusObject};
use crate::surface::{Bounds, DisplaySurface, LoadTarget, SurfaceEvent, TerminationReason};

const UNRESPONSIVE_MESSAGE: &str = "Display is unresponsive";

/// The content a display should show.
///
/// Modeled as an explicit variant instead of a nullable string so "no
/// override" and "override to nothing" cannot be confused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentRef {
    /// Show this reference (absolute, or relative to the shared base URL).
    Explicit(String),
    /// Fall back to the spec's default URL.
    UseDefault,
    /// Show nothing.
    Blank,
}

/// Events emitted by a display actor towards the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayEvent {
    StatusChanged(StatusObject),
    /// The surface itself changed the geometry (user drag/resize); carries
    /// the updated spec so it can be persisted.
    SpecModified(DisplaySpec),
    FocusGained,
    Closed,
}

struct DisplayState {
    spec: DisplaySpec,
    shared: SharedSettings,
    content: ContentRef,
    own_status: StatusObject,
    content_status: Option<StatusObject>,
    composed: StatusObject,
    closed: bool,
}

struct DisplayInner {
    id: String,
    queue: OpQueue,
    surface: Arc<dyn DisplaySurface>,
    generation: AtomicU64,
    state: Mutex<DisplayState>,
    events_tx: mpsc::UnboundedSender<DisplayEvent>,
}

/// Handle to one display actor. Cheap to clone; all clones share the same
/// queue, state and generation counter.
#[derive(Clone)]
pub struct DisplayActor {
    inner: Arc<DisplayInner>,
}

impl DisplayActor {
    /// Creates the actor and starts its surface event pump.
    ///
    /// The returned receiver carries the actor's outbound events; the
    /// controller subscribes to it once at creation.
    pub fn spawn(
        id: String,
        spec: DisplaySpec,
        shared: SharedSettings,
        surface: Arc<dyn DisplaySurface>,
        surface_events: mpsc::Receiver<SurfaceEvent>,
    ) -> (Self, mpsc::UnboundedReceiver<DisplayEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(DisplayInner {
            id,
            queue: OpQueue::new(),
            surface,
            generation: AtomicU64::new(0),
            state: Mutex::new(DisplayState {
                spec,
                shared,
                content: ContentRef::UseDefault,
                own_status: StatusObject::good(),
                content_status: None,
                composed: StatusObject::good(),
                closed: false,
            }),
            events_tx,
        });
        spawn_event_pump(inner.clone(), surface_events);
        (Self { inner }, events_rx)
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn spec(&self) -> DisplaySpec {
        self.inner.state.lock().unwrap().spec.clone()
    }

    /// The externally visible (composed) status.
    pub fn status(&self) -> StatusObject {
        self.inner.state.lock().unwrap().composed.clone()
    }

    pub fn current_content(&self) -> ContentRef {
        self.inner.state.lock().unwrap().content.clone()
    }

    /// Applies the initial presentation and loads the initial content.
    pub fn init(&self) -> impl Future<Output = Result<(), DisplayError>> {
        let generation = self.inner.bump_generation();
        let inner = self.inner.clone();
        self.inner.queue.enqueue(async move {
            inner.check_open()?;
            inner.apply_presentation().await?;
            inner.reload_with(generation).await
        })
    }

    /// Switches the display to `content`. A no-op when the reference is
    /// unchanged; supersedes any queued-but-not-started operations.
    pub fn set_content(
        &self,
        content: ContentRef,
    ) -> impl Future<Output = Result<(), DisplayError>> {
        let generation = self.inner.bump_generation();
        let inner = self.inner.clone();
        self.inner.queue.enqueue_superseding("new content", async move {
            {
                let mut state = inner.state.lock().unwrap();
                if state.closed {
                    return Err(DisplayError::Closed);
                }
                if state.content == content {
                    return Ok(());
                }
                state.content = content;
            }
            inner.reload_with(generation).await
        })
    }

    /// Reloads the current effective content.
    pub fn reload(&self) -> impl Future<Output = Result<(), DisplayError>> {
        let generation = self.inner.bump_generation();
        let inner = self.inner.clone();
        self.inner.queue.enqueue(async move {
            inner.check_open()?;
            inner.reload_with(generation).await
        })
    }

    /// Blanks the display.
    pub fn stop(&self) -> impl Future<Output = Result<(), DisplayError>> {
        self.set_content(ContentRef::Blank)
    }

    /// Replaces the spec, re-applying presentation and reloading as needed.
    pub fn update_spec(
        &self,
        spec: DisplaySpec,
        shared: SharedSettings,
    ) -> impl Future<Output = Result<(), DisplayError>> {
        let inner = self.inner.clone();
        self.inner.queue.enqueue(async move {
            let (old_spec, old_target) = {
                let state = inner.state.lock().unwrap();
                if state.closed {
                    return Err(DisplayError::Closed);
                }
                (state.spec.clone(), effective_target(&state))
            };
            let new_target = {
                let mut state = inner.state.lock().unwrap();
                state.spec = spec.clone();
                state.shared = shared;
                effective_target(&state)
            };

            let presentation_changed = spec != old_spec;
            let reload_needed =
                new_target != old_target || spec.content_decoration_differs(&old_spec);
            if !presentation_changed && !reload_needed {
                return Ok(());
            }

            if presentation_changed {
                inner.apply_presentation().await?;
            }
            if reload_needed {
                let generation = inner.bump_generation();
                inner.reload_with(generation).await?;
            }
            Ok(())
        })
    }

    /// Runs a script inside the currently loaded content.
    pub fn execute_script(
        &self,
        source: String,
    ) -> impl Future<Output = Result<serde_json::Value, DisplayError>> {
        let inner = self.inner.clone();
        let (value_tx, value_rx) = oneshot::channel();
        let done = self.inner.queue.enqueue(async move {
            inner.check_open()?;
            let value = inner.surface.execute_script(&source).await?;
            let _ = value_tx.send(value);
            Ok(())
        });
        async move {
            done.await?;
            value_rx.await.map_err(|_| DisplayError::ChannelClosed)
        }
    }

    /// Tears down the surface and the actor's event stream. Idempotent;
    /// supersedes any queued-but-not-started operations.
    pub fn close(&self) -> impl Future<Output = Result<(), DisplayError>> {
        self.inner.bump_generation();
        let inner = self.inner.clone();
        self.inner.queue.enqueue_superseding("closing", async move {
            let already_closed = {
                let mut state = inner.state.lock().unwrap();
                std::mem::replace(&mut state.closed, true)
            };
            if already_closed {
                return Ok(());
            }
            if let Err(err) = inner.surface.close().await {
                warn!(display = %inner.id, "error closing surface: {err}");
            }
            let _ = inner.events_tx.send(DisplayEvent::Closed);
            Ok(())
        })
    }

    /// Side channel for content running inside the surface to report its
    /// own status. Not queued; the composition rule applies immediately.
    pub fn report_external_status(&self, status: StatusObject) {
        self.inner
            .update_status(|state| state.content_status = Some(status));
    }

    /// Invoked when the surface's rendering process terminated. A clean,
    /// intentional exit does not change the status.
    pub fn receive_process_failure(&self, reason: &TerminationReason) {
        self.inner.process_failure(reason);
    }
}

impl DisplayInner {
    fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) != generation
    }

    fn check_open(&self) -> Result<(), DisplayError> {
        if self.state.lock().unwrap().closed {
            Err(DisplayError::Closed)
        } else {
            Ok(())
        }
    }

    /// Mutates the status fields and emits `StatusChanged` when the
    /// composed status actually changed.
    fn update_status<F: FnOnce(&mut DisplayState)>(&self, mutate: F) {
        let changed = {
            let mut state = self.state.lock().unwrap();
            mutate(&mut state);
            let composed = StatusObject::compose(&state.own_status, state.content_status.as_ref());
            if composed == state.composed {
                None
            } else {
                state.composed = composed.clone();
                Some(composed)
            }
        };
        if let Some(status) = changed {
            debug!(
                display = %self.id,
                code = ?status.status_code,
                message = %status.message,
                "status changed"
            );
            let _ = self.events_tx.send(DisplayEvent::StatusChanged(status));
        }
    }

    fn set_own_status(&self, status: StatusObject) {
        self.update_status(|state| state.own_status = status);
    }

    fn process_failure(&self, reason: &TerminationReason) {
        if reason.is_clean() {
            return;
        }
        self.set_own_status(StatusObject::error(format!(
            "Renderer process terminated: {reason}"
        )));
    }

    /// Pushes the spec's window presentation to the surface.
    async fn apply_presentation(&self) -> Result<(), DisplayError> {
        let (bounds, fullscreen, on_top, zoom) = {
            let state = self.state.lock().unwrap();
            (
                Bounds::from_spec(&state.spec),
                state.spec.full_screen,
                state.spec.on_top,
                state.spec.zoom,
            )
        };
        self.surface.set_bounds(bounds).await?;
        self.surface.set_fullscreen(fullscreen).await?;
        // On-top is only honored in fullscreen, so a window restored out of
        // fullscreen does not stay glued over everything else.
        self.surface.set_always_on_top(fullscreen && on_top).await?;
        if let Some(zoom) = zoom {
            self.surface.set_zoom(zoom).await?;
        }
        Ok(())
    }

    /// Loads the current effective content. `generation` must be the value
    /// stamped when the content change was issued; side effects are only
    /// applied while it is still current.
    async fn reload_with(&self, generation: u64) -> Result<(), DisplayError> {
        self.update_status(|state| state.content_status = None);

        let target = {
            let state = self.state.lock().unwrap();
            if state.closed {
                return Err(DisplayError::Closed);
            }
            effective_target(&state)
        };
        info!(display = %self.id, target = ?target, "loading content");

        let load_target = match &target {
            Some(url) => LoadTarget::Url(url.clone()),
            None => LoadTarget::Blank,
        };
        match self.surface.load(load_target).await {
            Ok(()) => {
                if self.is_stale(generation) {
                    debug!(display = %self.id, "load superseded, skipping side effects");
                    return Ok(());
                }
                if let Err(err) = self.apply_content_decoration(generation, target.as_deref()).await
                {
                    warn!(display = %self.id, "failed to apply content decoration: {err}");
                }
                if !self.is_stale(generation) {
                    self.set_own_status(StatusObject::good());
                }
                Ok(())
            }
            Err(err) => {
                let detail = err.to_string();
                if !self.is_stale(generation) {
                    self.set_own_status(StatusObject::error(format!(
                        "Failed to load content: {detail}"
                    )));
                }
                Err(DisplayError::Load(detail))
            }
        }
    }

    /// Applies the in-content side effects of a successful load. Every step
    /// re-checks the generation after the preceding await.
    async fn apply_content_decoration(
        &self,
        generation: u64,
        url: Option<&str>,
    ) -> Result<(), SurfaceError> {
        let (css, overlay) = {
            let state = self.state.lock().unwrap();
            let overlay = state
                .spec
                .display_debug
                .then(|| debug_overlay_script(&self.id, url));
            (decoration_css(&state.spec), overlay)
        };

        self.surface.inject_style(&css).await?;
        if self.is_stale(generation) {
            return Ok(());
        }
        if let Some(script) = overlay {
            self.surface.execute_script(&script).await?;
            if self.is_stale(generation) {
                return Ok(());
            }
        }
        self.surface
            .set_title(&format!("Marquee display {}", self.id))
            .await?;
        Ok(())
    }
}

/// Resolves the actor's content reference to the URL the surface should
/// load, or `None` for a blank display.
fn effective_target(state: &DisplayState) -> Option<String> {
    let reference = match &state.content {
        ContentRef::Blank => None,
        ContentRef::Explicit(reference) => Some(reference.clone()),
        ContentRef::UseDefault => state.spec.default_url.clone(),
    };
    reference.map(|reference| resolve_content_url(&reference, state.shared.base_url.as_deref()))
}

/// Joins a relative content reference with the shared base URL; absolute
/// references pass through untouched.
fn resolve_content_url(reference: &str, base_url: Option<&str>) -> String {
    match Url::parse(reference) {
        Ok(_) => reference.to_string(),
        Err(url::ParseError::RelativeUrlWithoutBase) => match base_url {
            Some(base) => match Url::parse(base).and_then(|base| base.join(reference)) {
                Ok(joined) => joined.to_string(),
                Err(err) => {
                    warn!("cannot join \"{reference}\" with base \"{base}\": {err}");
                    reference.to_string()
                }
            },
            None => reference.to_string(),
        },
        Err(_) => reference.to_string(),
    }
}

fn decoration_css(spec: &DisplaySpec) -> String {
    let mut css = String::from(
        "body { cursor: none; }\n::-webkit-scrollbar { display: none; }\n",
    );
    if let Some(color) = &spec.background_color {
        css.push_str(&format!("html, body {{ background-color: {color}; }}\n"));
    }
    css
}

fn debug_overlay_script(id: &str, url: Option<&str>) -> String {
    let label = match url {
        Some(url) => format!("{id}: {url}"),
        None => id.to_string(),
    };
    format!(
        "(() => {{\n\
         const el = document.createElement('div');\n\
         el.textContent = {label:?};\n\
         el.style.cssText = 'position:fixed;top:0;left:0;z-index:99999;\
         padding:2px 6px;background:rgba(0,0,0,0.6);color:#0f0;\
         font:12px monospace;pointer-events:none;';\n\
         document.body.appendChild(el);\n\
         }})();"
    )
}

/// Consumes the surface's event stream for the lifetime of the actor.
fn spawn_event_pump(inner: Arc<DisplayInner>, mut surface_events: mpsc::Receiver<SurfaceEvent>) {
    tokio::spawn(async move {
        while let Some(event) = surface_events.recv().await {
            match event {
                SurfaceEvent::Resized(bounds) | SurfaceEvent::Moved(bounds) => {
                    let modified = {
                        let mut state = inner.state.lock().unwrap();
                        if state.spec.full_screen {
                            // Keep the stored geometry so leaving fullscreen
                            // restores the previous window placement.
                            None
                        } else {
                            state.spec.x = Some(bounds.x);
                            state.spec.y = Some(bounds.y);
                            state.spec.width = bounds.width;
                            state.spec.height = bounds.height;
                            Some(state.spec.clone())
                        }
                    };
                    if let Some(spec) = modified {
                        let _ = inner.events_tx.send(DisplayEvent::SpecModified(spec));
                    }
                }
                SurfaceEvent::Maximized | SurfaceEvent::Unmaximized => {
                    debug!(display = %inner.id, "maximize state changed");
                }
                SurfaceEvent::FocusGained => {
                    let _ = inner.events_tx.send(DisplayEvent::FocusGained);
                }
                SurfaceEvent::Closed => {
                    let was_closed = {
                        let mut state = inner.state.lock().unwrap();
                        std::mem::replace(&mut state.closed, true)
                    };
                    if !was_closed {
                        warn!(display = %inner.id, "surface closed externally");
                        let _ = inner.events_tx.send(DisplayEvent::Closed);
                    }
                }
                SurfaceEvent::Unresponsive => {
                    inner.set_own_status(StatusObject::warning(UNRESPONSIVE_MESSAGE));
                }
                SurfaceEvent::Responsive => {
                    // Only clear the warning this event set; a load error
                    // must survive renderer recovery.
                    inner.update_status(|state| {
                        if state.own_status.status_code == StatusCode::Warning
                            && state.own_status.message == UNRESPONSIVE_MESSAGE
                        {
                            state.own_status = StatusObject::good();
                        }
                    });
                }
                SurfaceEvent::RendererGone(reason) => {
                    inner.process_failure(&reason);
                }
                SurfaceEvent::StatusReported(status) => {
                    inner.update_status(|state| state.content_status = Some(status));
                }
                SurfaceEvent::ConsoleMessage(line) => {
                    debug!(display = %inner.id, "console: {line}");
                }
            }
        }
        debug!(display = %inner.id, "surface event stream ended");
    });
}
