//! Headless reference surface.
//!
//! Probes content over HTTP instead of rendering it: `load` performs a GET
//! against the target and fails with the transport or HTTP error, so display
//! status tracking works end-to-end without a rendering engine. Style and
//! script injection are accepted and recorded as no-ops.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::DisplaySpec;
use crate::errors::SurfaceError;
use crate::surface::{Bounds, DisplaySurface, LoadTarget, SurfaceEvent, SurfaceFactory};

const LOAD_TIMEOUT: Duration = Duration::from_secs(30);

struct HeadlessState {
    bounds: Bounds,
    fullscreen: bool,
    on_top: bool,
    zoom: f64,
    title: String,
    current_url: Option<String>,
    closed: bool,
}

pub struct HeadlessSurface {
    id: String,
    client: reqwest::Client,
    events_tx: mpsc::Sender<SurfaceEvent>,
    state: Mutex<HeadlessState>,
}

impl HeadlessSurface {
    fn check_open(&self) -> Result<(), SurfaceError> {
        if self.state.lock().unwrap().closed {
            Err(SurfaceError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DisplaySurface for HeadlessSurface {
    async fn set_bounds(&self, bounds: Bounds) -> Result<(), SurfaceError> {
        self.check_open()?;
        self.state.lock().unwrap().bounds = bounds;
        Ok(())
    }

    async fn set_fullscreen(&self, fullscreen: bool) -> Result<(), SurfaceError> {
        self.check_open()?;
        self.state.lock().unwrap().fullscreen = fullscreen;
        Ok(())
    }

    async fn set_always_on_top(&self, on_top: bool) -> Result<(), SurfaceError> {
        self.check_open()?;
        self.state.lock().unwrap().on_top = on_top;
        Ok(())
    }

    async fn set_zoom(&self, factor: f64) -> Result<(), SurfaceError> {
        self.check_open()?;
        self.state.lock().unwrap().zoom = factor;
        Ok(())
    }

    async fn set_title(&self, title: &str) -> Result<(), SurfaceError> {
        self.check_open()?;
        self.state.lock().unwrap().title = title.to_string();
        Ok(())
    }

    async fn load(&self, target: LoadTarget) -> Result<(), SurfaceError> {
        self.check_open()?;
        match target {
            LoadTarget::Blank => {
                self.state.lock().unwrap().current_url = None;
                Ok(())
            }
            LoadTarget::Url(url) => {
                let response = self
                    .client
                    .get(&url)
                    .send()
                    .await
                    .map_err(|err| SurfaceError::LoadFailed(err.to_string()))?;
                response
                    .error_for_status()
                    .map_err(|err| SurfaceError::LoadFailed(err.to_string()))?;
                debug!(display = %self.id, %url, "content probe succeeded");
                self.state.lock().unwrap().current_url = Some(url);
                Ok(())
            }
        }
    }

    async fn inject_style(&self, _css: &str) -> Result<(), SurfaceError> {
        self.check_open()
    }

    async fn execute_script(&self, _source: &str) -> Result<serde_json::Value, SurfaceError> {
        self.check_open()?;
        Ok(serde_json::Value::Null)
    }

    async fn current_url(&self) -> Option<String> {
        self.state.lock().unwrap().current_url.clone()
    }

    async fn close(&self) -> Result<(), SurfaceError> {
        let already_closed = {
            let mut state = self.state.lock().unwrap();
            std::mem::replace(&mut state.closed, true)
        };
        if !already_closed {
            let _ = self.events_tx.try_send(SurfaceEvent::Closed);
        }
        Ok(())
    }
}

pub struct HeadlessSurfaceFactory {
    client: reqwest::Client,
}

impl HeadlessSurfaceFactory {
    pub fn new() -> Result<Self, SurfaceError> {
        let client = reqwest::Client::builder()
            .timeout(LOAD_TIMEOUT)
            .build()
            .map_err(|err| SurfaceError::Backend(err.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SurfaceFactory for HeadlessSurfaceFactory {
    async fn create(
        &self,
        id: &str,
        spec: &DisplaySpec,
    ) -> Result<(Arc<dyn DisplaySurface>, mpsc::Receiver<SurfaceEvent>), SurfaceError> {
        let (events_tx, events_rx) = mpsc::channel(16);
        let surface = Arc::new(HeadlessSurface {
            id: id.to_string(),
            client: self.client.clone(),
            events_tx,
            state: Mutex::new(HeadlessState {
                bounds: Bounds::from_spec(spec),
                fullscreen: spec.full_screen,
                on_top: spec.on_top,
                zoom: spec.zoom.unwrap_or(1.0),
                title: String::new(),
                current_url: None,
                closed: false,
            }),
        });
        Ok((surface, events_rx))
    }
}
