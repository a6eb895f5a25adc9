#![allow(dead_code)]
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Success envelope used by the orders and trades routes.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Error envelope used by the orders and trades routes.
#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub success: bool,
    pub error: String,
    pub message: String,
}

/// Application error carrying an HTTP status and an error kind.
///
/// The settlement, balance and asset routes render the plain
/// `{error, message, statusCode}` body; the orders and trades routes render
/// the `{success:false, error, message}` envelope.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub error: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlainErrorBody {
    error: String,
    message: String,
    status_code: u16,
}

impl AppError {
    pub fn new(status: StatusCode, error: &str, message: &str) -> Self {
        Self {
            status,
            error: error.to_string(),
            message: message.to_string(),
        }
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Bad Request", message)
    }

    pub fn validation(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Validation Error", message)
    }

    pub fn insufficient_balance(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Insufficient Balance", message)
    }

    pub fn not_found(message: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "Not Found", message)
    }

    pub fn internal(message: &str) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal Server Error",
            message,
        )
    }

    /// Render with the `{success:false, error, message}` envelope.
    pub fn into_envelope_response(self) -> Response {
        let body = ApiErrorBody {
            success: false,
            error: self.error,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = PlainErrorBody {
            error: self.error,
            message: self.message,
            status_code: self.status.as_u16(),
        };
        (self.status, Json(body)).into_response()
    }
}
