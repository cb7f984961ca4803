//! Mapping from relay failures to HTTP responses.

use axum::extract::multipart::MultipartError;
use axum::extract::rejection::BytesRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use surveychat_core::error::{Error, ProviderError};
use tracing::{error, warn};

/// JSON body of every failed request.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            body: None,
        }
    }

    fn with_body(error: impl Into<String>, body: String) -> Self {
        Self {
            error: error.into(),
            body: Some(body),
        }
    }
}

/// A handler failure.
#[derive(Debug)]
pub enum ApiError {
    /// Anything raised while relaying a turn.
    Relay(Error),
    /// The request body could not be read (oversized, malformed multipart).
    Rejected { status: StatusCode, message: String },
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Relay(Error::Validation(message.into()))
    }

    pub fn body(rejection: BytesRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }

    pub fn multipart(err: MultipartError) -> Self {
        Self::Rejected {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self::Relay(err)
    }
}

/// Upstream statuses are passed through when they are errors; anything else
/// coming back as a failure is a bad gateway.
fn forwarded(status: u16) -> StatusCode {
    StatusCode::from_u16(status)
        .ok()
        .filter(|s| s.is_client_error() || s.is_server_error())
        .unwrap_or(StatusCode::BAD_GATEWAY)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Rejected { status, message } => (status, ErrorResponse::new(message)),
            ApiError::Relay(Error::Validation(message)) => {
                (StatusCode::BAD_REQUEST, ErrorResponse::new(message))
            }
            ApiError::Relay(Error::Assembly(e)) => {
                (StatusCode::BAD_REQUEST, ErrorResponse::new(e.to_string()))
            }
            ApiError::Relay(Error::Provider(ProviderError::Upload {
                status,
                body_snippet,
            })) => (
                forwarded(status),
                ErrorResponse::with_body("File upload failed", body_snippet),
            ),
            ApiError::Relay(Error::Provider(ProviderError::Upstream {
                status,
                body_snippet,
            })) => (
                forwarded(status),
                ErrorResponse::with_body(format!("Completion API error {status}"), body_snippet),
            ),
            ApiError::Relay(Error::Provider(ProviderError::Transport(reason))) => {
                warn!(reason = %reason, "Upstream unreachable");
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorResponse::new("Upstream service unreachable"),
                )
            }
            ApiError::Relay(Error::Provider(ProviderError::InvalidResponse(reason))) => {
                warn!(reason = %reason, "Upstream sent an unusable response");
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorResponse::new("Upstream service sent an invalid response"),
                )
            }
            ApiError::Relay(Error::Internal(reason)) => {
                error!(reason = %reason, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Internal Server Error"),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
