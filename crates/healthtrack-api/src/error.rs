//! Health tracker API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use healthtrack_bus::BusError;
use healthtrack_core::DomainError;
use healthtrack_monitor::{HealthError, MetricsError};
use serde::Serialize;
use thiserror::Error;

/// Startup and runtime errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Neither the write store nor the read store answered at startup.
    #[error("both stores are unreachable")]
    StoresUnreachable,

    /// Store setup or migration error.
    #[error("store error: {0}")]
    Store(#[from] DomainError),

    /// The event bus could not be set up.
    #[error("event bus error: {0}")]
    Bus(#[from] BusError),

    /// The health registry rejected a service.
    #[error("health error: {0}")]
    Health(#[from] HealthError),

    /// The metrics registry could not be built.
    #[error("metrics error: {0}")]
    Metrics(#[from] MetricsError),

    /// Tracing or OpenTelemetry setup failed.
    #[error("telemetry error: {0}")]
    Telemetry(String),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// HTTP-layer error that implements `IntoResponse`.
#[derive(Debug)]
pub enum ApiError {
    /// A domain failure from the store.
    Domain(DomainError),
    /// The caller did not identify itself.
    Unauthenticated(String),
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self::Domain(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::Unauthenticated(message) => {
                (StatusCode::UNAUTHORIZED, "unauthenticated", message)
            }
            ApiError::Domain(err) => {
                let (status, code) = match &err {
                    DomainError::RecordNotFound { .. } => {
                        (StatusCode::NOT_FOUND, "record_not_found")
                    }
                    DomainError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
                    DomainError::Infrastructure(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "infrastructure_error")
                    }
                };
                (status, code, err.to_string())
            }
        };

        let body = ErrorBody {
            error: error_code,
            message,
        };

        (status, Json(body)).into_response()
    }
}
