//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use coachsync_core::error::DomainError;
use coachsync_reconcile::SweepError;
use coachsync_user_sync::UserSyncError;
use serde::Serialize;
use thiserror::Error;

/// Startup and runtime errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection, pool, or migration error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),

    /// Tracing or trace export could not be initialized.
    #[error("telemetry error: {0}")]
    Telemetry(String),
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
#[derive(Debug, Error)]
pub enum ApiError {
    /// Repository or port failure.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Fast-lane user sync failure.
    #[error(transparent)]
    UserSync(#[from] UserSyncError),

    /// Reconciliation sweep failure.
    #[error(transparent)]
    Sweep(#[from] SweepError),

    /// Operator endpoint called without a valid admin token.
    #[error("operator endpoints require a valid admin token")]
    Forbidden,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Domain(err) | Self::UserSync(UserSyncError::Store(err)) => domain_status(err),
            Self::UserSync(UserSyncError::Signature(_)) => {
                (StatusCode::UNAUTHORIZED, "invalid_signature")
            }
            Self::UserSync(UserSyncError::InvalidPayload(_)) => {
                (StatusCode::BAD_REQUEST, "validation_error")
            }
            Self::UserSync(UserSyncError::External(_)) | Self::Sweep(SweepError::External { .. }) => {
                (StatusCode::BAD_GATEWAY, "upstream_error")
            }
            Self::Sweep(SweepError::Store { source, .. }) => domain_status(source),
            Self::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
        }
    }
}

fn domain_status(err: &DomainError) -> (StatusCode, &'static str) {
    match err {
        DomainError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        DomainError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
        DomainError::Infrastructure(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "infrastructure_error")
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = ErrorBody {
            error: error_code,
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use coachsync_core::error::ExternalStoreError;
    use coachsync_reconcile::SweepStep;
    use coachsync_user_sync::SignatureError;

    fn status_of(err: impl Into<ApiError>) -> StatusCode {
        let response = err.into().into_response();
        response.status()
    }

    #[test]
    fn test_not_found_maps_to_404() {
        assert_eq!(
            status_of(DomainError::NotFound("dead letter 7".into())),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_validation_maps_to_400() {
        assert_eq!(
            status_of(DomainError::Validation("bad input".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(UserSyncError::InvalidPayload("not json".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_infrastructure_maps_to_500() {
        assert_eq!(
            status_of(DomainError::Infrastructure("db down".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(UserSyncError::Store(DomainError::Infrastructure("db down".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_signature_failure_maps_to_401() {
        assert_eq!(
            status_of(UserSyncError::Signature(SignatureError::Mismatch)),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(UserSyncError::Signature(SignatureError::Missing)),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_spreadsheet_store_failure_maps_to_502() {
        assert_eq!(
            status_of(SweepError::External {
                step: SweepStep::Users,
                source: ExternalStoreError::RateLimited,
            }),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_forbidden_maps_to_403() {
        assert_eq!(status_of(ApiError::Forbidden), StatusCode::FORBIDDEN);
    }
}
