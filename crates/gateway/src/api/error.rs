//! Maps [`sa_domain::error::Error`] onto HTTP status codes (spec §7
//! "Propagation policy"), mirroring the teacher's `api_error()` helper.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};

use sa_domain::error::Error;

pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            Error::SessionBusy(_) => StatusCode::CONFLICT,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::WorkspaceEscape(_)
            | Error::DenyPatternMatch(_)
            | Error::SchemaValidation(_)
            | Error::InvalidRange(_) => StatusCode::BAD_REQUEST,
            Error::InvalidTransition { .. } => StatusCode::CONFLICT,
            Error::FileNotFound(_) => StatusCode::NOT_FOUND,
            Error::ExecutionTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}
