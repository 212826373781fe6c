//! Error type returned by views, rendered as a JSON error response.

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::binding::BindError;
use crate::diesel_runtime::SessionError;

#[derive(Debug)]
pub enum ViewError {
    NotFound,
    BadRequest(String),
    MissingSession(String),
    Binding(BindError),
    Session(SessionError),
    Serialization(serde_json::Error),
}

impl ViewError {
    pub fn status(&self) -> StatusCode {
        match self {
            ViewError::NotFound => StatusCode::NOT_FOUND,
            ViewError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ViewError::MissingSession(_)
            | ViewError::Binding(_)
            | ViewError::Session(_)
            | ViewError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ViewError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewError::NotFound => write!(f, "Not found"),
            ViewError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ViewError::MissingSession(key) => {
                write!(f, "No database session under key '{}' on this request", key)
            }
            ViewError::Binding(e) => write!(f, "{}", e),
            ViewError::Session(e) => write!(f, "{}", e),
            ViewError::Serialization(e) => write!(f, "Serialization error: {}", e),
        }
    }
}

impl std::error::Error for ViewError {}

impl From<BindError> for ViewError {
    fn from(e: BindError) -> Self {
        ViewError::Binding(e)
    }
}

impl From<SessionError> for ViewError {
    fn from(e: SessionError) -> Self {
        ViewError::Session(e)
    }
}

impl From<serde_json::Error> for ViewError {
    fn from(e: serde_json::Error) -> Self {
        ViewError::Serialization(e)
    }
}

impl IntoResponse for ViewError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!("view failed: {}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(serde_json::json!({
            "error": message
        }))).into_response()
    }
}
