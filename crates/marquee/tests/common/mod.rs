//! Recording fake surfaces for driving display actors in tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use marquee::config::DisplaySpec;
use marquee::errors::SurfaceError;
use marquee::surface::{Bounds, DisplaySurface, LoadTarget, SurfaceEvent, SurfaceFactory};

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCall {
    SetBounds(Bounds),
    SetFullscreen(bool),
    SetAlwaysOnTop(bool),
    SetZoom(f64),
    SetTitle(String),
    Load(LoadTarget),
    InjectStyle(String),
    ExecuteScript(String),
    Close,
}

/// Behavior knobs shared between a factory and every surface it creates.
pub struct FakeSurfaceConfig {
    pub load_delay: Mutex<Duration>,
    pub fail_urls: Mutex<HashMap<String, String>>,
}

pub struct FakeSurface {
    pub id: String,
    config: Arc<FakeSurfaceConfig>,
    calls: Mutex<Vec<SurfaceCall>>,
    events_tx: mpsc::Sender<SurfaceEvent>,
    closed: Mutex<bool>,
}

impl FakeSurface {
    pub fn recorded(&self) -> Vec<SurfaceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn loads(&self) -> Vec<LoadTarget> {
        self.recorded()
            .into_iter()
            .filter_map(|call| match call {
                SurfaceCall::Load(target) => Some(target),
                _ => None,
            })
            .collect()
    }

    pub fn count_styles(&self) -> usize {
        self.recorded()
            .iter()
            .filter(|call| matches!(call, SurfaceCall::InjectStyle(_)))
            .count()
    }

    /// Pushes a surface event towards the owning actor.
    pub async fn emit(&self, event: SurfaceEvent) {
        self.events_tx.send(event).await.expect("actor event pump gone");
    }

    fn record(&self, call: SurfaceCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_open(&self) -> Result<(), SurfaceError> {
        if *self.closed.lock().unwrap() {
            Err(SurfaceError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DisplaySurface for FakeSurface {
    async fn set_bounds(&self, bounds: Bounds) -> Result<(), SurfaceError> {
        self.check_open()?;
        self.record(SurfaceCall::SetBounds(bounds));
        Ok(())
    }

    async fn set_fullscreen(&self, fullscreen: bool) -> Result<(), SurfaceError> {
        self.check_open()?;
        self.record(SurfaceCall::SetFullscreen(fullscreen));
        Ok(())
    }

    async fn set_always_on_top(&self, on_top: bool) -> Result<(), SurfaceError> {
        self.check_open()?;
        self.record(SurfaceCall::SetAlwaysOnTop(on_top));
        Ok(())
    }

    async fn set_zoom(&self, factor: f64) -> Result<(), SurfaceError> {
        self.check_open()?;
        self.record(SurfaceCall::SetZoom(factor));
        Ok(())
    }

    async fn set_title(&self, title: &str) -> Result<(), SurfaceError> {
        self.check_open()?;
        self.record(SurfaceCall::SetTitle(title.to_string()));
        Ok(())
    }

    async fn load(&self, target: LoadTarget) -> Result<(), SurfaceError> {
        self.check_open()?;
        self.record(SurfaceCall::Load(target.clone()));
        let delay = *self.config.load_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let LoadTarget::Url(url) = &target {
            if let Some(detail) = self.config.fail_urls.lock().unwrap().get(url) {
                return Err(SurfaceError::LoadFailed(detail.clone()));
            }
        }
        Ok(())
    }

    async fn inject_style(&self, css: &str) -> Result<(), SurfaceError> {
        self.check_open()?;
        self.record(SurfaceCall::InjectStyle(css.to_string()));
        Ok(())
    }

    async fn execute_script(&self, source: &str) -> Result<serde_json::Value, SurfaceError> {
        self.check_open()?;
        self.record(SurfaceCall::ExecuteScript(source.to_string()));
        Ok(serde_json::Value::Null)
    }

    async fn current_url(&self) -> Option<String> {
        self.loads().into_iter().rev().find_map(|target| match target {
            LoadTarget::Url(url) => Some(url),
            LoadTarget::Blank => None,
        })
    }

    async fn close(&self) -> Result<(), SurfaceError> {
        *self.closed.lock().unwrap() = true;
        self.record(SurfaceCall::Close);
        Ok(())
    }
}

pub struct FakeSurfaceFactory {
    config: Arc<FakeSurfaceConfig>,
    surfaces: Mutex<HashMap<String, Arc<FakeSurface>>>,
}

impl FakeSurfaceFactory {
    pub fn new() -> Arc<Self> {
        Self::with_load_delay(Duration::ZERO)
    }

    pub fn with_load_delay(load_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            config: Arc::new(FakeSurfaceConfig {
                load_delay: Mutex::new(load_delay),
                fail_urls: Mutex::new(HashMap::new()),
            }),
            surfaces: Mutex::new(HashMap::new()),
        })
    }

    /// Makes every load of `url` fail with `detail`, on all surfaces.
    pub fn fail_url(&self, url: &str, detail: &str) {
        self.config
            .fail_urls
            .lock()
            .unwrap()
            .insert(url.to_string(), detail.to_string());
    }

    pub fn created_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.surfaces.lock().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn surface(&self, id: &str) -> Arc<FakeSurface> {
        self.surfaces
            .lock()
            .unwrap()
            .get(id)
            .unwrap_or_else(|| panic!("no surface created for \"{id}\""))
            .clone()
    }
}

#[async_trait]
impl SurfaceFactory for FakeSurfaceFactory {
    async fn create(
        &self,
        id: &str,
        _spec: &DisplaySpec,
    ) -> Result<(Arc<dyn DisplaySurface>, mpsc::Receiver<SurfaceEvent>), SurfaceError> {
        let (events_tx, events_rx) = mpsc::channel(16);
        let surface = Arc::new(FakeSurface {
            id: id.to_string(),
            config: self.config.clone(),
            calls: Mutex::new(Vec::new()),
            events_tx,
            closed: Mutex::new(false),
        });
        self.surfaces
            .lock()
            .unwrap()
            .insert(id.to_string(), surface.clone());
        Ok((surface, events_rx))
    }
}
