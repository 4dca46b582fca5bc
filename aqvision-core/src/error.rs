//! Error taxonomy shared by the proxy and the insight client.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{error, warn};

/// Failures surfaced by the aggregation proxy. Each variant maps onto the
/// HTTP status its JSON error body is served with.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Missing or malformed query/body parameters.
    #[error("{0}")]
    InvalidRequest(String),

    /// A third-party API answered with a non-success status.
    #[error("{message} (upstream status {status})")]
    Upstream {
        status: u16,
        message: String,
        details: Option<Value>,
    },

    /// A required credential is absent from the server configuration.
    #[error("{0}")]
    Misconfigured(String),

    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to decode upstream response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ProxyError {
    pub fn upstream(status: reqwest::StatusCode, message: impl Into<String>) -> Self {
        Self::Upstream {
            status: status.as_u16(),
            message: message.into(),
            details: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::Misconfigured(_) | Self::Transport(_) | Self::Decode(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// JSON body sent to the caller. Upstream failures keep a generic message
    /// and only expose `details` when the provider attached them.
    pub fn body(&self) -> Value {
        match self {
            Self::Upstream {
                message,
                details: Some(details),
                ..
            } => json!({ "error": message, "details": details }),
            Self::Upstream { message, .. } => json!({ "error": message }),
            other => json!({ "error": other.to_string() }),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{self}");
        } else {
            warn!("{self}");
        }
        (status, Json(self.body())).into_response()
    }
}

/// Failures raised by the insight client before anything is rendered.
#[derive(Debug, Error)]
pub enum InsightError {
    #[error("Could not fetch essential live data from servers.")]
    Unavailable,

    #[error("Live data is incomplete for this location.")]
    IncompleteData,

    #[error("{message}")]
    Completion { status: u16, message: String },

    #[error("Request to the proxy failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to encode insight context: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(
        "Unknown insight type '{0}'. Supported types: summary, health, action, cigarette, school, mask."
    )]
    UnknownKind(String),
}
