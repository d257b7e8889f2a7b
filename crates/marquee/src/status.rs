//! Display status model and composition.
//!
//! Each display actor carries two status sources: its own status (derived
//! from load results and surface health) and an optional status reported by
//! the content running inside the surface. The externally visible status is
//! the composition of the two, computed by [`StatusObject::compose`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Severity-ordered status code. `Good < Warning < Error`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum StatusCode {
    #[default]
    Good,
    Warning,
    Error,
}

/// A status code together with a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StatusObject {
    #[serde(rename = "statusCode")]
    pub status_code: StatusCode,
    pub message: String,
}

impl StatusObject {
    pub fn good() -> Self {
        Self {
            status_code: StatusCode::Good,
            message: String::new(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            status_code: StatusCode::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status_code: StatusCode::Error,
            message: message.into(),
        }
    }

    /// Composes an actor's own status with the content-reported status.
    ///
    /// The content-reported status wins only when it is strictly worse than
    /// the own status; on a tie the own status (and its message) is kept.
    pub fn compose(own: &StatusObject, content: Option<&StatusObject>) -> StatusObject {
        match content {
            Some(reported) if reported.status_code > own.status_code => reported.clone(),
            _ => own.clone(),
        }
    }
}

/// The full status snapshot broadcast to control clients: the process-level
/// status plus one entry per live display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AggregateStatus {
    pub app: StatusObject,
    pub displays: BTreeMap<String, StatusObject>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_are_severity_ordered() {
        assert!(StatusCode::Good < StatusCode::Warning);
        assert!(StatusCode::Warning < StatusCode::Error);
    }

    #[test]
    fn own_status_wins_on_tie() {
        let own = StatusObject::warning("own warning");
        let content = StatusObject::warning("content warning");
        let composed = StatusObject::compose(&own, Some(&content));
        assert_eq!(composed.message, "own warning");
        assert_eq!(composed.status_code, StatusCode::Warning);
    }

    #[test]
    fn own_warning_beats_content_good() {
        let own = StatusObject::warning("degraded");
        let content = StatusObject::good();
        let composed = StatusObject::compose(&own, Some(&content));
        assert_eq!(composed, own);
    }

    #[test]
    fn content_error_overrides_own_good() {
        let own = StatusObject::good();
        let content = StatusObject::error("content broke");
        let composed = StatusObject::compose(&own, Some(&content));
        assert_eq!(composed.status_code, StatusCode::Error);
        assert_eq!(composed.message, "content broke");
    }

    #[test]
    fn missing_content_status_keeps_own() {
        let own = StatusObject::error("load failed");
        assert_eq!(StatusObject::compose(&own, None), own);
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let status = StatusObject::warning("slow");
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["statusCode"], "warning");
        assert_eq!(json["message"], "slow");
    }
}
