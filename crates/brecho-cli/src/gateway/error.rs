//! HTTP mapping of domain errors.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use brecho_core::BrechoError;

pub type ApiResult<T> = Result<T, ApiError>;

/// Errors returned by gateway handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Domain(#[from] BrechoError),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Domain(e) => match e {
                BrechoError::Extraction { .. }
                | BrechoError::InvalidArgument(_)
                | BrechoError::DimensionMismatch { .. } => StatusCode::BAD_REQUEST,
                BrechoError::DeadlineExceeded { .. } => StatusCode::REQUEST_TIMEOUT,
                BrechoError::Upstream { .. } => StatusCode::BAD_GATEWAY,
                BrechoError::EmbeddingProviderUnavailable { .. }
                | BrechoError::IndexBackendUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Domain(e) => e.code(),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::BadRequest(format!("invalid multipart body: {}", err.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{} ({})", self, self.code());
        } else {
            tracing::debug!("Rejected request: {}", self);
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}
