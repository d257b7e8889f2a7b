//! The API gateway.
//!
//! Serves the control protocol over one axum server: request/response
//! routes under `/api` and a WebSocket push channel at `/ws`. All command
//! dispatch goes through the reconciliation controller's lookup and the
//! target actors' own queues; the gateway never touches display state
//! directly. Status broadcasts are debounced through a
//! [`CoalescingTrigger`] so a bulk status change produces one push.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::future::join_all;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use marquee::controller::ControllerHandle;
use marquee::display::{ContentRef, DisplayActor};
use marquee::errors::DisplayError;
use marquee::shutdown::ShutdownReceiver;
use marquee::status::AggregateStatus;
use marquee::trigger::CoalescingTrigger;

use crate::api::{
    optional_str, required_str, shape_reply, ApiResponse, ServerMessage, ALL_DISPLAYS,
};

/// How long to wait for status changes to settle before broadcasting.
pub const STATUS_SETTLE_TIME: Duration = Duration::from_secs(3);

struct GatewayInner {
    controller: ControllerHandle,
    port: u16,
    api_key: Option<String>,
    status: RwLock<AggregateStatus>,
    clients: Mutex<HashMap<Uuid, mpsc::UnboundedSender<ServerMessage>>>,
}

impl GatewayInner {
    fn broadcast_status(&self) {
        let message = ServerMessage::Status {
            status: self.status.read().unwrap().clone(),
        };
        let mut clients = self.clients.lock().unwrap();
        clients.retain(|_, sender| sender.send(message.clone()).is_ok());
        debug!("broadcast status to {} clients", clients.len());
    }
}

#[derive(Clone)]
pub struct ApiGateway {
    inner: Arc<GatewayInner>,
    broadcast: CoalescingTrigger<()>,
}

impl ApiGateway {
    pub fn new(controller: ControllerHandle, port: u16, api_key: Option<String>) -> Self {
        let inner = Arc::new(GatewayInner {
            controller,
            port,
            api_key,
            status: RwLock::new(AggregateStatus::default()),
            clients: Mutex::new(HashMap::new()),
        });
        let broadcast = {
            let inner = inner.clone();
            CoalescingTrigger::new(
                STATUS_SETTLE_TIME,
                move |_: ()| {
                    let inner = inner.clone();
                    async move {
                        inner.broadcast_status();
                        Ok(())
                    }
                },
                |err| error!("status broadcast failed: {err:#}"),
            )
        };
        Self { inner, broadcast }
    }

    /// Updates the status snapshot synchronously and schedules (never
    /// blocks on) a broadcast to connected push clients.
    pub fn set_status(&self, status: AggregateStatus) {
        *self.inner.status.write().unwrap() = status;
        self.broadcast.trigger(());
    }

    /// Serves the control API until a shutdown signal arrives.
    pub async fn run(&self, mut shutdown: ShutdownReceiver) -> anyhow::Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.inner.port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("control API listening on {}", listener.local_addr()?);
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                shutdown.wait_for_shutdown().await;
            })
            .await?;
        Ok(())
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api", get(api_index))
            .route("/api/status", get(http_status))
            .route("/api/displays", get(http_list))
            .route("/api/play/{display_id}", post(http_play))
            .route("/api/restart/{display_id}", post(http_restart))
            .route("/api/stop/{display_id}", post(http_stop))
            .route("/api/execute/{display_id}", post(http_execute))
            .route("/ws", get(ws_upgrade))
            .fallback(fallback)
            .with_state(self.clone())
    }

    fn authorize(&self, query_key: Option<&str>, body_key: Option<&str>) -> Result<(), ApiResponse> {
        match &self.inner.api_key {
            None => Ok(()),
            Some(expected)
                if query_key == Some(expected.as_str())
                    || body_key == Some(expected.as_str()) =>
            {
                Ok(())
            }
            Some(_) => {
                warn!("[403] rejected control request");
                Err(ApiResponse::forbidden())
            }
        }
    }

    async fn resolve_targets(
        &self,
        display_id: &str,
    ) -> Result<Vec<(String, DisplayActor)>, ApiResponse> {
        if display_id == ALL_DISPLAYS {
            return self
                .inner
                .controller
                .all_displays()
                .await
                .map_err(|err| ApiResponse::internal(err.to_string()));
        }
        match self.inner.controller.get_display(display_id).await {
            Ok(Some(actor)) => Ok(vec![(display_id.to_string(), actor)]),
            Ok(None) => Err(ApiResponse::not_found(display_id)),
            Err(err) => Err(ApiResponse::internal(err.to_string())),
        }
    }

    /// Runs `op` against the target, or against every live display for the
    /// `$all` token. Sibling failures never abort each other; the response
    /// lists every failing display.
    async fn fan_out<F, Fut>(&self, display_id: &str, op: F) -> ApiResponse
    where
        F: Fn(DisplayActor) -> Fut,
        Fut: Future<Output = Result<(), DisplayError>>,
    {
        let targets = match self.resolve_targets(display_id).await {
            Ok(targets) => targets,
            Err(response) => return response,
        };
        let results = join_all(targets.into_iter().map(|(id, actor)| {
            let operation = op(actor);
            async move { (id, operation.await) }
        }))
        .await;

        let failures: Vec<String> = results
            .into_iter()
            .filter_map(|(id, result)| result.err().map(|err| format!("{id}: {err}")))
            .collect();
        if failures.is_empty() {
            ApiResponse::ok()
        } else {
            ApiResponse::internal(failures.join("; "))
        }
    }

    async fn api_list(&self) -> ApiResponse {
        match self.inner.controller.list_displays().await {
            Ok(ids) => ApiResponse::ok_json(serde_json::json!(ids)),
            Err(err) => ApiResponse::internal(err.to_string()),
        }
    }

    async fn api_play(
        &self,
        display_id: &str,
        url: String,
        js_code: Option<String>,
    ) -> ApiResponse {
        self.fan_out(display_id, |actor| {
            let url = url.clone();
            let js_code = js_code.clone();
            async move {
                actor.set_content(ContentRef::Explicit(url)).await?;
                if let Some(source) = js_code {
                    actor.execute_script(source).await?;
                }
                Ok(())
            }
        })
        .await
    }

    async fn api_restart(&self, display_id: &str) -> ApiResponse {
        self.fan_out(display_id, |actor| async move { actor.reload().await })
            .await
    }

    async fn api_stop(&self, display_id: &str) -> ApiResponse {
        self.fan_out(display_id, |actor| async move { actor.stop().await })
            .await
    }

    async fn api_execute(&self, display_id: &str, source: String) -> ApiResponse {
        self.fan_out(display_id, |actor| {
            let source = source.clone();
            async move { actor.execute_script(source).await.map(|_| ()) }
        })
        .await
    }

    async fn handle_socket(self, socket: WebSocket) {
        let connection_id = Uuid::new_v4();
        info!(%connection_id, "control client connected");

        let (mut sink, mut stream) = socket.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();
        self.inner
            .clients
            .lock()
            .unwrap()
            .insert(connection_id, out_tx.clone());

        let writer = tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(err) => {
                        error!("failed to encode push message: {err}");
                        continue;
                    }
                };
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        });

        // Push the current status immediately on connect.
        let _ = out_tx.send(ServerMessage::Status {
            status: self.inner.status.read().unwrap().clone(),
        });

        while let Some(Ok(message)) = stream.next().await {
            if let Message::Text(text) = message {
                let gateway = self.clone();
                let reply_tx = out_tx.clone();
                tokio::spawn(async move {
                    gateway.handle_client_message(text.as_str(), reply_tx).await;
                });
            }
        }

        self.inner.clients.lock().unwrap().remove(&connection_id);
        writer.abort();
        info!(%connection_id, "control client disconnected");
    }

    async fn handle_client_message(
        &self,
        text: &str,
        reply_tx: mpsc::UnboundedSender<ServerMessage>,
    ) {
        let envelope: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(err) => {
                warn!("error parsing control message: {err}");
                return;
            }
        };
        let Some(msg_id) = envelope.get("msgId").and_then(Value::as_u64) else {
            warn!("control message without numeric msgId, dropping");
            return;
        };

        let response = self.dispatch_message(&envelope).await;
        let _ = reply_tx.send(shape_reply(msg_id, response));
    }

    /// Processes one push-channel command exactly like its HTTP
    /// counterpart, including authentication and field validation.
    async fn dispatch_message(&self, envelope: &Value) -> ApiResponse {
        if let Err(response) = self.authorize(
            None,
            envelope.get("apiKey").and_then(Value::as_str),
        ) {
            return response;
        }

        let Some(msg_type) = envelope.get("type").and_then(Value::as_str) else {
            return ApiResponse::bad_request("type must be a string");
        };

        // Commands without a target.
        match msg_type {
            "list" => return self.api_list().await,
            "status" => {
                let status = self.inner.status.read().unwrap().clone();
                return match serde_json::to_value(&status) {
                    Ok(value) => ApiResponse::ok_json(value),
                    Err(err) => ApiResponse::internal(err.to_string()),
                };
            }
            _ => {}
        }

        let display_id = match required_str(envelope, "displayId") {
            Ok(display_id) => display_id,
            Err(response) => return response,
        };

        match msg_type {
            "playurl" => {
                let url = match required_str(envelope, "url") {
                    Ok(url) => url,
                    Err(response) => return response,
                };
                let js_code = match optional_str(envelope, "jsCode") {
                    Ok(js_code) => js_code,
                    Err(response) => return response,
                };
                self.api_play(&display_id, url, js_code).await
            }
            "restart" => self.api_restart(&display_id).await,
            "stop" => self.api_stop(&display_id).await,
            "execute" => {
                let source = match required_str(envelope, "jsCode") {
                    Ok(source) => source,
                    Err(response) => return response,
                };
                self.api_execute(&display_id, source).await
            }
            other => ApiResponse::bad_request(format!("unknown command \"{other}\"")),
        }
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        match self.result {
            Some(result) => (status, Json(result)).into_response(),
            None => (status, self.body).into_response(),
        }
    }
}

async fn api_index() -> &'static str {
    "GET /api/status\n\
     GET /api/displays\n\
     POST /api/play/{displayId} body: {\"url\": \"\", \"jsCode\": \"\"}\n\
     POST /api/restart/{displayId}\n\
     POST /api/stop/{displayId}\n\
     POST /api/execute/{displayId} body: {\"jsCode\": \"\"}\n"
}

async fn fallback() -> ApiResponse {
    ApiResponse {
        code: 404,
        body: "Page not found".to_string(),
        result: None,
    }
}

fn body_value(bytes: &[u8]) -> Result<Value, ApiResponse> {
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(bytes).map_err(|_| ApiResponse::bad_request("body must be valid JSON"))
}

fn body_key(body: &Value) -> Option<&str> {
    body.get("apiKey").and_then(Value::as_str)
}

async fn http_status(
    State(gateway): State<ApiGateway>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if let Err(response) = gateway.authorize(query.get("apiKey").map(String::as_str), None) {
        return response.into_response();
    }
    let status = gateway.inner.status.read().unwrap().clone();
    Json(status).into_response()
}

async fn http_list(
    State(gateway): State<ApiGateway>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if let Err(response) = gateway.authorize(query.get("apiKey").map(String::as_str), None) {
        return response.into_response();
    }
    gateway.api_list().await.into_response()
}

async fn http_play(
    State(gateway): State<ApiGateway>,
    Path(display_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    body: axum::body::Bytes,
) -> Response {
    let body = match body_value(&body) {
        Ok(body) => body,
        Err(response) => return response.into_response(),
    };
    if let Err(response) =
        gateway.authorize(query.get("apiKey").map(String::as_str), body_key(&body))
    {
        return response.into_response();
    }
    let url = match required_str(&body, "url") {
        Ok(url) => url,
        Err(response) => return response.into_response(),
    };
    let js_code = match optional_str(&body, "jsCode") {
        Ok(js_code) => js_code,
        Err(response) => return response.into_response(),
    };
    gateway.api_play(&display_id, url, js_code).await.into_response()
}

async fn http_restart(
    State(gateway): State<ApiGateway>,
    Path(display_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    body: axum::body::Bytes,
) -> Response {
    let body = match body_value(&body) {
        Ok(body) => body,
        Err(response) => return response.into_response(),
    };
    if let Err(response) =
        gateway.authorize(query.get("apiKey").map(String::as_str), body_key(&body))
    {
        return response.into_response();
    }
    gateway.api_restart(&display_id).await.into_response()
}

async fn http_stop(
    State(gateway): State<ApiGateway>,
    Path(display_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    body: axum::body::Bytes,
) -> Response {
    let body = match body_value(&body) {
        Ok(body) => body,
        Err(response) => return response.into_response(),
    };
    if let Err(response) =
        gateway.authorize(query.get("apiKey").map(String::as_str), body_key(&body))
    {
        return response.into_response();
    }
    gateway.api_stop(&display_id).await.into_response()
}

async fn http_execute(
    State(gateway): State<ApiGateway>,
    Path(display_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    body: axum::body::Bytes,
) -> Response {
    let body = match body_value(&body) {
        Ok(body) => body,
        Err(response) => return response.into_response(),
    };
    if let Err(response) =
        gateway.authorize(query.get("apiKey").map(String::as_str), body_key(&body))
    {
        return response.into_response();
    }
    let source = match required_str(&body, "jsCode") {
        Ok(source) => source,
        Err(response) => return response.into_response(),
    };
    gateway.api_execute(&display_id, source).await.into_response()
}

async fn ws_upgrade(State(gateway): State<ApiGateway>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| gateway.handle_socket(socket))
}
