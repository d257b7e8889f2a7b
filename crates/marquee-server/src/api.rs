//! Wire types for the control protocol.
//!
//! The request/response side speaks plain HTTP with JSON bodies; the push
//! side sends [`ServerMessage`]s over a WebSocket. Client push messages are
//! JSON envelopes with a `type` tag, a client-chosen `msgId` correlation id
//! and an optional `apiKey`, validated field by field so a wrong-typed
//! field produces a 400 without touching any display.

use serde::Serialize;
use serde_json::Value;

use marquee::status::AggregateStatus;

/// Reserved target id that fans a command out to every live display.
pub const ALL_DISPLAYS: &str = "$all";

/// Outcome of one control command, shared by the HTTP and WebSocket paths.
/// Commands that return data (list, status) carry it in `result`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub code: u16,
    pub body: String,
    pub result: Option<Value>,
}

impl ApiResponse {
    pub fn ok() -> Self {
        Self {
            code: 200,
            body: "ok".to_string(),
            result: None,
        }
    }

    pub fn ok_json(result: Value) -> Self {
        Self {
            code: 200,
            body: "ok".to_string(),
            result: Some(result),
        }
    }

    pub fn bad_request(body: impl Into<String>) -> Self {
        Self {
            code: 400,
            body: body.into(),
            result: None,
        }
    }

    pub fn forbidden() -> Self {
        Self {
            code: 403,
            body: "apiKey missing or is invalid.".to_string(),
            result: None,
        }
    }

    pub fn not_found(display_id: &str) -> Self {
        Self {
            code: 404,
            body: format!("displayId {display_id} not found"),
            result: None,
        }
    }

    pub fn internal(body: impl Into<String>) -> Self {
        Self {
            code: 500,
            body: body.into(),
            result: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == 200
    }
}

/// Messages pushed to WebSocket clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Full aggregate status snapshot.
    Status { status: AggregateStatus },
    /// Reply to a client command, echoing its correlation id.
    Reply {
        #[serde(rename = "replyTo")]
        reply_to: u64,
        error: Option<String>,
        result: Option<Value>,
    },
}

/// Builds the reply message for a processed client command.
pub fn shape_reply(msg_id: u64, response: ApiResponse) -> ServerMessage {
    if response.is_ok() {
        let result = response
            .result
            .unwrap_or(Value::String(response.body));
        ServerMessage::Reply {
            reply_to: msg_id,
            error: None,
            result: Some(result),
        }
    } else {
        ServerMessage::Reply {
            reply_to: msg_id,
            error: Some(format!("[{}] {}", response.code, response.body)),
            result: None,
        }
    }
}

/// Extracts a required string field, rejecting wrong types with a 400.
pub fn required_str(body: &Value, field: &str) -> Result<String, ApiResponse> {
    match body.get(field) {
        Some(Value::String(value)) => Ok(value.clone()),
        _ => Err(ApiResponse::bad_request(format!(
            "{field} must be a string"
        ))),
    }
}

/// Extracts an optional string field, rejecting wrong types with a 400.
pub fn optional_str(body: &Value, field: &str) -> Result<Option<String>, ApiResponse> {
    match body.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(ApiResponse::bad_request(format!(
            "{field} must be a string"
        ))),
    }
}
