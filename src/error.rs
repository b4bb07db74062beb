use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use serde_with::skip_serializing_none;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{
    dao::storage::StorageError,
    services::{completion::CompletionError, identity::IdentityError},
    state::session_machine::{AbortError, ApplyError, PlanError},
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend failed the operation.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// No authenticated user.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Requested resource was not found (or is not owned by the caller).
    #[error("not found: {0}")]
    NotFound(String),
    /// Operation exceeded its timeout limit.
    #[error("operation timed out")]
    Timeout,
    /// Identity provider failure.
    #[error("identity provider error")]
    Identity(#[source] IdentityError),
    /// Completion service failure.
    #[error("completion service error")]
    Completion {
        /// Underlying failure.
        #[source]
        source: CompletionError,
        /// Whether diagnostic details may be sent to the client.
        expose_details: bool,
    },
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<IdentityError> for ServiceError {
    fn from(err: IdentityError) -> Self {
        ServiceError::Identity(err)
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("{0}")]
    BadRequest(String),
    /// Unauthorized access attempt.
    #[error("{0}")]
    Unauthorized(String),
    /// Upstream quota exhausted; the message carries a remediation hint.
    #[error("{0}")]
    PaymentRequired(String),
    /// Requested resource not found.
    #[error("{0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("{0}")]
    Conflict(String),
    /// Upstream rate limit reached.
    #[error("{0}")]
    TooManyRequests(String),
    /// Upstream service answered with something unusable.
    #[error("{message}")]
    BadGateway {
        /// Client facing message.
        message: String,
        /// Diagnostic details, only set outside production.
        details: Option<String>,
    },
    /// Service unavailable or degraded.
    #[error("{0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("{0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => {
                AppError::ServiceUnavailable("storage unavailable (degraded mode)".into())
            }
            ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::InvalidState(message) => AppError::Conflict(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::Timeout => AppError::ServiceUnavailable("operation timed out".into()),
            ServiceError::Identity(source) => match source {
                IdentityError::InvalidToken | IdentityError::ExchangeRejected { .. } => {
                    AppError::Unauthorized(source.to_string())
                }
                other => AppError::ServiceUnavailable(other.to_string()),
            },
            ServiceError::Completion {
                source,
                expose_details,
            } => {
                let details = expose_details.then(|| source.diagnostic()).flatten();
                match source {
                    CompletionError::NotConfigured => AppError::ServiceUnavailable(
                        "AI coaching is not configured: set OPENAI_API_KEY on the server".into(),
                    ),
                    CompletionError::QuotaExceeded { .. } => AppError::PaymentRequired(format!(
                        "{source}. Check the plan and billing settings of the completion service account"
                    )),
                    CompletionError::RateLimited { .. } => AppError::TooManyRequests(format!(
                        "{source}. Wait a moment before requesting another report"
                    )),
                    other => AppError::BadGateway {
                        message: other.to_string(),
                        details,
                    },
                }
            }
        }
    }
}

#[skip_serializing_none]
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    details: Option<String>,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::PaymentRequired(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::BadGateway { .. } => StatusCode::BAD_GATEWAY,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let details = match &self {
            AppError::BadGateway { details, .. } => details.clone(),
            _ => None,
        };

        let payload = Json(ErrorBody {
            error: self.to_string(),
            details,
        });

        (status, payload).into_response()
    }
}

impl From<PlanError> for ServiceError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::AlreadyPending => {
                ServiceError::InvalidState("another action is still being processed".into())
            }
            PlanError::InvalidTransition(invalid) => {
                ServiceError::InvalidState(invalid.to_string())
            }
            PlanError::Capture(capture) => ServiceError::InvalidInput(capture.to_string()),
        }
    }
}

impl From<ApplyError> for ServiceError {
    fn from(err: ApplyError) -> Self {
        match err {
            ApplyError::NoPending => ServiceError::InvalidState("no transition is pending".into()),
            ApplyError::IdMismatch { .. } => {
                ServiceError::InvalidState("pending transition does not match".into())
            }
            ApplyError::PhaseMismatch { expected, actual } => ServiceError::InvalidState(format!(
                "session changed during transition (expected {expected:?}, got {actual:?})"
            )),
            ApplyError::VersionMismatch { expected, actual } => {
                ServiceError::InvalidState(format!(
                    "session version mismatch during transition (expected {expected}, got {actual})"
                ))
            }
        }
    }
}

impl From<AbortError> for ServiceError {
    fn from(err: AbortError) -> Self {
        match err {
            AbortError::NoPending => ServiceError::InvalidState("no pending transition".into()),
            AbortError::IdMismatch { .. } => {
                ServiceError::InvalidState("transition plan does not match".into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: ServiceError) -> StatusCode {
        AppError::from(err).status()
    }

    #[test]
    fn domain_errors_map_to_expected_statuses() {
        assert_eq!(
            status_of(ServiceError::InvalidInput("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ServiceError::Unauthorized("x".into())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(ServiceError::NotFound("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(PlanError::AlreadyPending.into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(ServiceError::Degraded),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(ServiceError::Timeout),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn completion_failures_are_told_apart() {
        let completion = |source, expose_details| ServiceError::Completion {
            source,
            expose_details,
        };

        assert_eq!(
            status_of(completion(
                CompletionError::QuotaExceeded {
                    message: "insufficient_quota".into()
                },
                false
            )),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            status_of(completion(
                CompletionError::RateLimited {
                    message: "slow down".into()
                },
                false
            )),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_of(completion(CompletionError::NotConfigured, false)),
            StatusCode::SERVICE_UNAVAILABLE
        );

        let shape = || CompletionError::ResponseShape {
            reason: "missing field `detail`".into(),
            raw: Some("{}".into()),
        };
        match AppError::from(completion(shape(), true)) {
            AppError::BadGateway { details, .. } => assert!(details.is_some()),
            other => panic!("unexpected {other:?}"),
        }
        match AppError::from(completion(shape(), false)) {
            AppError::BadGateway { details, .. } => assert!(details.is_none()),
            other => panic!("unexpected {other:?}"),
        }
    }
}
