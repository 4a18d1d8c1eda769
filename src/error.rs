use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{attendance::AttendanceError, report::ReportError, store::StoreError};

/// JSON error body returned by every `/api` handler.
#[derive(Serialize, ToSchema)]
#[schema(example = json!({
    "error": "invalid_payload",
    "message": "invalid QR code",
    "retryable": false
}))]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    pub retryable: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Attendance(#[from] AttendanceError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(&'static str),

    #[error("{0}")]
    Store(StoreError),
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Conflict => Self::Conflict("resource already exists"),
            StoreError::NotFound => Self::NotFound("resource not found"),
            other => Self::Store(other),
        }
    }
}

impl ApiError {
    fn code(&self) -> &'static str {
        match self {
            ApiError::Attendance(e) => match e {
                AttendanceError::InvalidPayload => "invalid_payload",
                AttendanceError::IdentityNotFound => "identity_not_found",
                AttendanceError::InactiveIdentity => "inactive_identity",
                AttendanceError::NotEligible => "not_eligible",
                AttendanceError::CheckOutNotAfterCheckIn { .. } => "checkout_not_after_checkin",
                AttendanceError::PersistenceUnavailable(_) => "persistence_unavailable",
                AttendanceError::Storage(_) => "internal_error",
            },
            ApiError::Report(e) => match e {
                ReportError::InvalidRange { .. } => "invalid_range",
                ReportError::RangeTooLong { .. } => "range_too_long",
                ReportError::Store(StoreError::Unavailable(_)) => "persistence_unavailable",
                ReportError::Store(_) => "internal_error",
            },
            ApiError::BadRequest(_) => "bad_request",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::Store(StoreError::Unavailable(_)) => "persistence_unavailable",
            ApiError::Store(_) => "internal_error",
        }
    }

    fn retryable(&self) -> bool {
        self.status_code() == StatusCode::SERVICE_UNAVAILABLE
    }

    fn message(&self) -> String {
        // Never leak SQL details to the scanner UI.
        if self.status_code() == StatusCode::INTERNAL_SERVER_ERROR {
            return "Internal Server Error".to_string();
        }
        self.to_string()
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Attendance(e) => match e {
                AttendanceError::InvalidPayload => StatusCode::BAD_REQUEST,
                AttendanceError::IdentityNotFound => StatusCode::NOT_FOUND,
                AttendanceError::InactiveIdentity | AttendanceError::NotEligible => {
                    StatusCode::FORBIDDEN
                }
                AttendanceError::CheckOutNotAfterCheckIn { .. } => StatusCode::CONFLICT,
                AttendanceError::PersistenceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                AttendanceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Report(e) => match e {
                ReportError::InvalidRange { .. } | ReportError::RangeTooLong { .. } => {
                    StatusCode::BAD_REQUEST
                }
                ReportError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
                ReportError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "Request failed");
        }

        HttpResponse::build(status).json(ErrorBody {
            error: self.code(),
            message: self.message(),
            retryable: self.retryable(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_errors_map_to_statuses() {
        let cases = [
            (AttendanceError::InvalidPayload, StatusCode::BAD_REQUEST),
            (AttendanceError::IdentityNotFound, StatusCode::NOT_FOUND),
            (AttendanceError::InactiveIdentity, StatusCode::FORBIDDEN),
            (
                AttendanceError::PersistenceUnavailable("pool timed out".to_string()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status_code(), status);
        }
    }

    #[test]
    fn only_unavailable_is_retryable() {
        let unavailable = ApiError::from(StoreError::Unavailable("io".to_string()));
        assert!(unavailable.retryable());
        assert_eq!(unavailable.code(), "persistence_unavailable");

        let conflict = ApiError::from(StoreError::Conflict);
        assert!(!conflict.retryable());
        assert_eq!(conflict.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn internal_errors_hide_details() {
        let error = ApiError::from(AttendanceError::Storage(StoreError::Corrupt(
            "kind 'x'".to_string(),
        )));
        assert_eq!(error.message(), "Internal Server Error");
    }
}
