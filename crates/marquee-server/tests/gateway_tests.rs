//! End-to-end tests for the control API, driving a real axum server over
//! loopback with an instant fake surface behind the controller.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use marquee::config::{DesiredState, DisplaySpec, SharedSettings};
use marquee::controller::ReconciliationController;
use marquee::errors::SurfaceError;
use marquee::messages::ControllerEvent;
use marquee::surface::{Bounds, DisplaySurface, LoadTarget, SurfaceEvent, SurfaceFactory};
use marquee_server::ApiGateway;

/// A surface whose loads settle instantly; URLs containing "fail" error out.
struct InstantSurface {
    loads: Mutex<Vec<LoadTarget>>,
    scripts: Mutex<Vec<String>>,
}

#[async_trait]
impl DisplaySurface for InstantSurface {
    async fn set_bounds(&self, _bounds: Bounds) -> Result<(), SurfaceError> {
        Ok(())
    }
    async fn set_fullscreen(&self, _fullscreen: bool) -> Result<(), SurfaceError> {
        Ok(())
    }
    async fn set_always_on_top(&self, _on_top: bool) -> Result<(), SurfaceError> {
        Ok(())
    }
    async fn set_zoom(&self, _factor: f64) -> Result<(), SurfaceError> {
        Ok(())
    }
    async fn set_title(&self, _title: &str) -> Result<(), SurfaceError> {
        Ok(())
    }
    async fn load(&self, target: LoadTarget) -> Result<(), SurfaceError> {
        self.loads.lock().unwrap().push(target.clone());
        match target {
            LoadTarget::Url(url) if url.contains("fail") => {
                Err(SurfaceError::LoadFailed("connection refused".into()))
            }
            _ => Ok(()),
        }
    }
    async fn inject_style(&self, _css: &str) -> Result<(), SurfaceError> {
        Ok(())
    }
    async fn execute_script(&self, source: &str) -> Result<Value, SurfaceError> {
        self.scripts.lock().unwrap().push(source.to_string());
        Ok(Value::Null)
    }
    async fn current_url(&self) -> Option<String> {
        None
    }
    async fn close(&self) -> Result<(), SurfaceError> {
        Ok(())
    }
}

#[derive(Default)]
struct InstantFactory {
    surfaces: Mutex<HashMap<String, Arc<InstantSurface>>>,
}

impl InstantFactory {
    fn surface(&self, id: &str) -> Arc<InstantSurface> {
        self.surfaces.lock().unwrap()[id].clone()
    }

    fn url_loads(&self, id: &str) -> Vec<String> {
        self.surface(id)
            .loads
            .lock()
            .unwrap()
            .iter()
            .filter_map(|target| match target {
                LoadTarget::Url(url) => Some(url.clone()),
                LoadTarget::Blank => None,
            })
            .collect()
    }
}

#[async_trait]
impl SurfaceFactory for InstantFactory {
    async fn create(
        &self,
        id: &str,
        _spec: &DisplaySpec,
    ) -> Result<(Arc<dyn DisplaySurface>, mpsc::Receiver<SurfaceEvent>), SurfaceError> {
        let (_events_tx, events_rx) = mpsc::channel(16);
        let surface = Arc::new(InstantSurface {
            loads: Mutex::new(Vec::new()),
            scripts: Mutex::new(Vec::new()),
        });
        self.surfaces
            .lock()
            .unwrap()
            .insert(id.to_string(), surface.clone());
        Ok((surface, events_rx))
    }
}

fn fleet_snapshot(ids: &[&str]) -> DesiredState {
    let mut displays = BTreeMap::new();
    for id in ids {
        displays.insert(
            id.to_string(),
            DisplaySpec {
                default_url: None,
                ..DisplaySpec::default()
            },
        );
    }
    DesiredState {
        api_port: None,
        api_key: None,
        freeze: false,
        shared: SharedSettings::default(),
        displays,
    }
}

/// Starts a controller with the given displays plus a gateway bound to an
/// ephemeral port, wired together like the server binary does it.
async fn start_fleet(
    ids: &[&str],
    api_key: Option<&str>,
) -> (SocketAddr, Arc<InstantFactory>, ApiGateway) {
    let factory = Arc::new(InstantFactory::default());
    let (controller, mut events) = ReconciliationController::spawn(factory.clone());
    controller.apply(fleet_snapshot(ids));

    let gateway = ApiGateway::new(controller, 0, api_key.map(str::to_string));
    {
        let gateway = gateway.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let ControllerEvent::StatusChanged(status) = event {
                    gateway.set_status(status);
                }
            }
        });
    }

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = gateway.router();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    // Let the debounced reconcile pass run.
    tokio::time::sleep(Duration::from_millis(400)).await;
    (addr, factory, gateway)
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn play_loads_content_and_reports_good_status() {
    let (addr, factory, _gateway) = start_fleet(&["left"], None).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/api/play/left"))
        .json(&json!({ "url": "https://example.com/show", "jsCode": "start()" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "ok");
    assert_eq!(factory.url_loads("left"), vec!["https://example.com/show"]);
    assert!(factory
        .surface("left")
        .scripts
        .lock()
        .unwrap()
        .contains(&"start()".to_string()));

    tokio::time::sleep(Duration::from_millis(100)).await;
    let status: Value = client
        .get(format!("http://{addr}/api/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["displays"]["left"]["statusCode"], "good");
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn failing_load_returns_500_and_reports_error_status() {
    let (addr, _factory, _gateway) = start_fleet(&["left"], None).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/api/play/left"))
        .json(&json!({ "url": "https://fail.example/" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
    assert!(response.text().await.unwrap().contains("connection refused"));

    tokio::time::sleep(Duration::from_millis(100)).await;
    let status: Value = client
        .get(format!("http://{addr}/api/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["displays"]["left"]["statusCode"], "error");
    assert!(status["displays"]["left"]["message"]
        .as_str()
        .unwrap()
        .contains("connection refused"));
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn malformed_input_is_rejected_without_touching_displays() {
    let (addr, factory, _gateway) = start_fleet(&["left"], None).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/api/play/left"))
        .json(&json!({ "url": 42 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    assert_eq!(response.text().await.unwrap(), "url must be a string");
    assert!(factory.url_loads("left").is_empty());

    let response = client
        .post(format!("http://{addr}/api/execute/left"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    assert_eq!(response.text().await.unwrap(), "jsCode must be a string");
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn display_list_is_served_over_http_and_ws() {
    let (addr, _factory, _gateway) = start_fleet(&["left", "right"], None).await;
    let client = reqwest::Client::new();

    let listed: Vec<String> = client
        .get(format!("http://{addr}/api/displays"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed, vec!["left", "right"]);

    let reply = tokio::task::spawn_blocking(move || {
        let (mut socket, _response) =
            tungstenite::connect(format!("ws://{addr}/ws")).expect("ws connect");
        // Skip the connect-time status push.
        socket.read().unwrap();
        socket
            .send(tungstenite::Message::text(
                json!({ "type": "list", "msgId": 1 }).to_string(),
            ))
            .unwrap();
        let reply: Value =
            serde_json::from_str(socket.read().unwrap().to_text().unwrap()).unwrap();
        reply
    })
    .await
    .unwrap();
    assert_eq!(reply["replyTo"], 1);
    assert_eq!(reply["result"], json!(["left", "right"]));
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn unknown_display_is_not_found() {
    let (addr, _factory, _gateway) = start_fleet(&["left"], None).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/api/restart/ghost"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    assert_eq!(
        response.text().await.unwrap(),
        "displayId ghost not found"
    );
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn auth_failure_is_403_and_leaves_displays_untouched() {
    let (addr, factory, _gateway) = start_fleet(&["left"], Some("s3cret")).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/api/play/left"))
        .json(&json!({ "url": "https://example.com/" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
    assert!(factory.url_loads("left").is_empty());

    // The key is accepted from the query string or the body.
    let response = client
        .post(format!("http://{addr}/api/play/left?apiKey=s3cret"))
        .json(&json!({ "url": "https://example.com/" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = client
        .post(format!("http://{addr}/api/stop/left"))
        .json(&json!({ "apiKey": "s3cret" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn all_token_fans_out_to_every_display() {
    let (addr, factory, _gateway) = start_fleet(&["left", "right"], None).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/api/play/$all"))
        .json(&json!({ "url": "https://example.com/everywhere" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        factory.url_loads("left"),
        vec!["https://example.com/everywhere"]
    );
    assert_eq!(
        factory.url_loads("right"),
        vec!["https://example.com/everywhere"]
    );
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn partial_fan_out_failures_list_the_failing_display() {
    let (addr, factory, _gateway) = start_fleet(&["left", "right"], None).await;
    let client = reqwest::Client::new();

    // Park the right display on failing content, then restart everything.
    client
        .post(format!("http://{addr}/api/play/right"))
        .json(&json!({ "url": "https://fail.example/" }))
        .send()
        .await
        .unwrap();

    let response = client
        .post(format!("http://{addr}/api/restart/$all"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
    let body = response.text().await.unwrap();
    assert!(body.contains("right:"), "body: {body}");
    assert!(!body.contains("left:"), "body: {body}");
    // The healthy sibling still restarted: its initial blank load plus the
    // reload issued by the fan-out.
    assert_eq!(factory.surface("left").loads.lock().unwrap().len(), 2);
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn websocket_pushes_status_and_correlates_replies() {
    let (addr, factory, _gateway) = start_fleet(&["left"], Some("s3cret")).await;

    let outcome = tokio::task::spawn_blocking(move || {
        let (mut socket, _response) =
            tungstenite::connect(format!("ws://{addr}/ws")).expect("ws connect");

        // The current status is pushed immediately on connect.
        let first: Value =
            serde_json::from_str(socket.read().unwrap().to_text().unwrap()).unwrap();

        // A command with a bad key gets an error reply with our msgId.
        socket
            .send(tungstenite::Message::text(
                json!({
                    "type": "playurl", "msgId": 7, "apiKey": "wrong",
                    "displayId": "left", "url": "https://example.com/ws"
                })
                .to_string(),
            ))
            .unwrap();
        let denied: Value =
            serde_json::from_str(socket.read().unwrap().to_text().unwrap()).unwrap();

        // The same command with the right key succeeds.
        socket
            .send(tungstenite::Message::text(
                json!({
                    "type": "playurl", "msgId": 8, "apiKey": "s3cret",
                    "displayId": "left", "url": "https://example.com/ws"
                })
                .to_string(),
            ))
            .unwrap();
        let accepted: Value =
            serde_json::from_str(socket.read().unwrap().to_text().unwrap()).unwrap();

        (first, denied, accepted)
    })
    .await
    .unwrap();

    let (first, denied, accepted) = outcome;
    assert_eq!(first["type"], "status");
    assert!(first["status"]["displays"].get("left").is_some());

    assert_eq!(denied["type"], "reply");
    assert_eq!(denied["replyTo"], 7);
    assert!(denied["error"].as_str().unwrap().starts_with("[403]"));

    assert_eq!(accepted["type"], "reply");
    assert_eq!(accepted["replyTo"], 8);
    assert_eq!(accepted["error"], Value::Null);
    assert_eq!(accepted["result"], "ok");

    assert_eq!(factory.url_loads("left"), vec!["https://example.com/ws"]);
}
