use crate::{core::CoreError, session::codec::CodecError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum PassportError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl PassportError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Core rejections keep their class; transport failures are internal.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Core(CoreError::Rpc { status, .. }) => match status {
                401 | 403 => StatusCode::UNAUTHORIZED,
                400..=499 => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::BadRequest(message) | Self::Unauthorized(message) => message.clone(),
            Self::Core(CoreError::Rpc { message, .. }) if self.status().is_client_error() => {
                message.clone()
            }
            _ => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for PassportError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!("{}", self);
        } else {
            debug!("{}", self);
        }

        (status, Json(json!({ "message": self.public_message() }))).into_response()
    }
}

impl From<CodecError> for PassportError {
    fn from(err: CodecError) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_status_classes() {
        assert_eq!(
            PassportError::from(CoreError::rpc(404, "nope")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PassportError::from(CoreError::rpc(403, "nope")).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            PassportError::from(CoreError::rpc(502, "nope")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            PassportError::from(CoreError::Decode("x".to_string())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_details_are_hidden() {
        assert_eq!(
            PassportError::internal("db password wrong").public_message(),
            "Internal server error"
        );
        assert_eq!(
            PassportError::from(CoreError::rpc(409, "already bound")).public_message(),
            "already bound"
        );
    }
}
