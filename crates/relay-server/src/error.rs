//! HTTP mapping for relay errors: `{"ok": false, "error": "..."}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{debug, error};

use relay_core::RelayError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub ok: bool,
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError(pub RelayError);

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        if self.0.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.0.to_string();

        if status.is_server_error() {
            error!(kind = self.0.error_kind(), message = %message, "relay request failed");
        } else {
            debug!(kind = self.0.error_kind(), message = %message, "relay request rejected");
        }

        let body = ErrorBody {
            ok: false,
            error: message,
        };
        (status, Json(body)).into_response()
    }
}
