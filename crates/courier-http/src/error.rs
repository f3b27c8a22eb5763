use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{error, warn};

use courier_core::Error;

/// Error returned by route handlers.
#[derive(Debug)]
pub enum ApiError {
    Core(Error),
    /// The request body could not be read (bad multipart stream, size limit).
    Rejected(StatusCode, String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Core(err) => match err {
                Error::InvalidRequest(_)
                | Error::InvalidIdentity(_)
                | Error::EmptyMessageSet
                | Error::NoActiveSession(_)
                | Error::SessionExists(_)
                | Error::AlreadyActive(_) => StatusCode::BAD_REQUEST,
                Error::NotFound(_) => StatusCode::NOT_FOUND,
                Error::Transport(_) => StatusCode::BAD_GATEWAY,
                Error::Config(_) | Error::Io(_) | Error::Json(_) | Error::External(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::Rejected(status, _) => *status,
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError::Core(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            ApiError::Core(err) => err.to_string(),
            ApiError::Rejected(_, msg) => msg.clone(),
        };
        if status.is_server_error() {
            error!(%status, error = %message, "request failed");
        } else {
            warn!(%status, error = %message, "request rejected");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}
