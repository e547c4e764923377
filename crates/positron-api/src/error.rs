//! Handler error type.
//!
//! Every 500 carries the same fixed payload; the detail only goes to the log.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use positron_types::api::{ErrorBody, GENERIC_SERVER_ERROR};

use crate::gemini::UpstreamError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("upstream model error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("unusable generate request: {0}")]
    InvalidHistory(String),

    #[error("store error: {0:#}")]
    Store(#[from] anyhow::Error),

    #[error("missing or invalid identity token")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ApiError::Upstream(_)
            | ApiError::InvalidHistory(_)
            | ApiError::Store(_)
            | ApiError::Internal(_) => {
                error!("{}", self);
                (StatusCode::INTERNAL_SERVER_ERROR, GENERIC_SERVER_ERROR.to_string())
            }
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
