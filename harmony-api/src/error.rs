//! Error → HTTP response mapping

use crate::types::ErrorBody;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use harmony_core::error::{Classify, ErrorKind};
use std::fmt;
use tracing::{debug, error};

/// Any failure a handler can return, reduced to its kind and message
#[derive(Debug)]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn status(&self) -> StatusCode {
        status_for(self.kind)
    }
}

impl<E> From<E> for ApiError
where
    E: Classify + fmt::Display,
{
    fn from(err: E) -> Self {
        ApiError::new(err.kind(), err.to_string())
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation | ErrorKind::Invalid | ErrorKind::Expired => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Capacity | ErrorKind::PartiallyApplied | ErrorKind::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(kind = %self.kind, error = %self.message, "Request failed");
        } else {
            debug!(kind = %self.kind, error = %self.message, "Request rejected");
        }

        let body = ErrorBody {
            error: self.message,
            kind: self.kind.as_str().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harmony_core::error::ValidationError;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorKind::Unauthorized), StatusCode::FORBIDDEN);
        assert_eq!(status_for(ErrorKind::Expired), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::Timeout), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(status_for(ErrorKind::PartiallyApplied), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_from_classified_error() {
        let err: ApiError = ValidationError::new("mail", "missing @").into();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
