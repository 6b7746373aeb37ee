//! HTTP error responses

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use leafid_core::{Error, ErrorKind};
use serde_json::json;

use crate::server::views;

/// Error returned by the JSON API handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed request (missing form field, bad JSON, unreadable body)
    #[error("{0}")]
    BadRequest(String),

    /// Resource disabled or absent
    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Core(#[from] Error),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Status code, error type and client-facing message.
    ///
    /// Internal failures are logged here and reported with a generic
    /// message.
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "invalid_request", msg.clone()),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            Self::Core(err) => {
                let kind = err.kind();
                metrics::counter!("leafid_errors_total", "kind" => kind.as_str()).increment(1);
                match kind {
                    ErrorKind::InvalidImage => {
                        (StatusCode::BAD_REQUEST, kind.as_str(), err.to_string())
                    }
                    ErrorKind::RecordNotFound => {
                        (StatusCode::NOT_FOUND, kind.as_str(), err.to_string())
                    }
                    _ => {
                        tracing::error!("Request failed: {}", err);
                        (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            ErrorKind::Internal.as_str(),
                            "internal error while identifying the image".to_string(),
                        )
                    }
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = self.parts();

        let body = json!({
            "error": {
                "message": message,
                "type": kind,
            }
        });

        (status, Json(body)).into_response()
    }
}

/// Error returned by the HTML handlers: the same mapping as [`ApiError`],
/// rendered as a page that repeats the upload form
#[derive(Debug)]
pub struct PageError(pub ApiError);

impl From<ApiError> for PageError {
    fn from(err: ApiError) -> Self {
        Self(err)
    }
}

impl From<Error> for PageError {
    fn from(err: Error) -> Self {
        Self(ApiError::Core(err))
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let (status, _, message) = self.0.parts();
        (status, Html(views::error_page(&message))).into_response()
    }
}
