#![forbid(unsafe_code)]

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Every way a relay request can fail. Each variant maps to exactly one HTTP
/// status; the display text is what the client sees.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("{0}")]
    BadRequest(String),

    /// The resolver API call failed or returned something that is not JSON.
    #[error("Failed to fetch video information: {0}")]
    Resolve(String),

    /// The embed page could not be fetched.
    #[error("Error streaming video: {0}")]
    Upstream(String),

    #[error("Could not extract video information")]
    Extraction,

    #[error("Invalid stream URL")]
    InvalidStream,

    #[error("Error streaming video: {0}")]
    Proxy(String),

    #[error("Not Found")]
    NotFound,
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::InvalidStream => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Resolve(_) | Self::Upstream(_) | Self::Extraction | Self::Proxy(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Resolver failures answer a `fetch().json()` call in the browser, so
    /// they keep the JSON envelope; everything else is plain text.
    fn is_json(&self) -> bool {
        matches!(self, Self::BadRequest(_) | Self::Resolve(_))
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(%status, error = %self, "request failed");
        } else {
            tracing::debug!(%status, error = %self, "request rejected");
        }

        if self.is_json() {
            let body = json!({
                "status": "error",
                "message": self.to_string(),
            });
            (status, Json(body)).into_response()
        } else {
            (status, self.to_string()).into_response()
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
