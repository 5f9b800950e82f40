use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use party_db::{Constraint, ValidationError};
use party_types::api::{ErrorBody, ErrorCode};

#[derive(Debug, Error)]
pub enum ApiError {
    /// The address could not be resolved by the geocoder.
    #[error("could not geocode address: {0}")]
    Geocode(String),

    #[error("{0}")]
    Validation(String),

    /// No usable credentials on the request.
    #[error("{0}")]
    Unauthenticated(&'static str),

    /// Credentials are fine but the user may not touch this resource.
    #[error("User is not authorized")]
    NotAuthorized,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("internal error")]
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Geocode(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated(_) | ApiError::NotAuthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ApiError::Geocode(_) => ErrorCode::Unknown,
            ApiError::Validation(_) => ErrorCode::Validation,
            ApiError::Unauthenticated(_) | ApiError::NotAuthorized => ErrorCode::Unauthorized,
            ApiError::NotFound(_) => ErrorCode::NotFound,
            ApiError::Conflict(_) => ErrorCode::Conflict,
            ApiError::Internal(_) => ErrorCode::Internal,
        }
    }
}

/// Storage errors: rejected rows become validation/conflict errors, the rest
/// are internal.
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(invalid) = err.downcast_ref::<ValidationError>() {
            return ApiError::Validation(invalid.to_string());
        }
        match Constraint::of(&err) {
            Some(Constraint::Unique) => ApiError::Conflict("already exists".into()),
            Some(Constraint::ForeignKey) => ApiError::Validation("referenced record does not exist".into()),
            Some(Constraint::Check | Constraint::NotNull) => {
                ApiError::Validation(format!("rejected by schema: {}", err))
            }
            Some(Constraint::Other) | None => ApiError::Internal(err),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = match &self {
            ApiError::Internal(e) => {
                error!("Internal error: {:#}", e);
                "internal error".to_string()
            }
            other => other.to_string(),
        };

        (
            status,
            Json(ErrorBody {
                error_code: self.code(),
                message,
            }),
        )
            .into_response()
    }
}
