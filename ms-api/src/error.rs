use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use ms_base::{Error, Kind};

/// Thin wrapper so we can implement axum's `IntoResponse` for `ms_base::Error`
/// without running into the orphan rule (both the trait and the error type
/// live outside this crate).
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.kind() {
            Kind::Validation => StatusCode::BAD_REQUEST,
            Kind::NotFound => StatusCode::NOT_FOUND,
            Kind::Conflict => StatusCode::CONFLICT,
            Kind::Capacity => StatusCode::PAYLOAD_TOO_LARGE,
            Kind::Transport | Kind::Fatal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({
            "status": "error",
            "errorType": format!("{:?}", self.0.kind()),
            "error": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}
