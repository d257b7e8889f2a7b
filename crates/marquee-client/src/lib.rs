//! # Marquee Client
//!
//! Client library for the marquee control API. Wraps the request/response
//! side of the protocol: listing status and driving displays with
//! play/restart/stop/execute commands. The push channel is a plain
//! WebSocket endpoint (`/ws`) and is not wrapped here.

use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::debug;

use marquee::status::AggregateStatus;

#[derive(Error, Debug)]
pub enum ClientError {
    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-success code.
    #[error("server returned {code}: {body}")]
    Api { code: u16, body: String },
}

/// A client for one marquee server.
pub struct ControlClient {
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl ControlClient {
    /// Creates a client for a server at `base_url`, e.g.
    /// `http://127.0.0.1:5270`.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            http: reqwest::Client::new(),
        }
    }

    /// Fetches the aggregate status snapshot.
    pub async fn status(&self) -> Result<AggregateStatus, ClientError> {
        let mut request = self.http.get(format!("{}/api/status", self.base_url));
        if let Some(key) = &self.api_key {
            request = request.query(&[("apiKey", key)]);
        }
        let response = request.send().await?;
        let code = response.status().as_u16();
        let body = response.text().await?;
        if code != 200 {
            return Err(ClientError::Api { code, body });
        }
        serde_json::from_str(&body).map_err(|err| ClientError::Api {
            code,
            body: format!("unparseable status response: {err}"),
        })
    }

    /// Lists the ids of all live displays.
    pub async fn list_displays(&self) -> Result<Vec<String>, ClientError> {
        let mut request = self.http.get(format!("{}/api/displays", self.base_url));
        if let Some(key) = &self.api_key {
            request = request.query(&[("apiKey", key)]);
        }
        let response = request.send().await?;
        let code = response.status().as_u16();
        let body = response.text().await?;
        if code != 200 {
            return Err(ClientError::Api { code, body });
        }
        serde_json::from_str(&body).map_err(|err| ClientError::Api {
            code,
            body: format!("unparseable display list: {err}"),
        })
    }

    /// Plays a content reference on a display (or `$all`), optionally
    /// running a script after the load.
    pub async fn play(
        &self,
        display_id: &str,
        url: &str,
        js_code: Option<&str>,
    ) -> Result<(), ClientError> {
        let mut body = Map::new();
        body.insert("url".to_string(), json!(url));
        if let Some(source) = js_code {
            body.insert("jsCode".to_string(), json!(source));
        }
        self.post_command("play", display_id, body).await
    }

    /// Reloads a display's current content.
    pub async fn restart(&self, display_id: &str) -> Result<(), ClientError> {
        self.post_command("restart", display_id, Map::new()).await
    }

    /// Blanks a display.
    pub async fn stop(&self, display_id: &str) -> Result<(), ClientError> {
        self.post_command("stop", display_id, Map::new()).await
    }

    /// Runs a script inside a display's content.
    pub async fn execute(&self, display_id: &str, js_code: &str) -> Result<(), ClientError> {
        let mut body = Map::new();
        body.insert("jsCode".to_string(), json!(js_code));
        self.post_command("execute", display_id, body).await
    }

    async fn post_command(
        &self,
        command: &str,
        display_id: &str,
        mut body: Map<String, Value>,
    ) -> Result<(), ClientError> {
        if let Some(key) = &self.api_key {
            body.insert("apiKey".to_string(), json!(key));
        }
        let url = format!("{}/api/{command}/{display_id}", self.base_url);
        debug!(%url, "sending control command");
        let response = self.http.post(&url).json(&body).send().await?;
        let code = response.status().as_u16();
        if code == 200 {
            Ok(())
        } else {
            let body = response.text().await?;
            Err(ClientError::Api { code, body })
        }
    }
}
