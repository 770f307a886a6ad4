//! Collapse request failures into the plain-text error contract.

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::IngestError;

/// Header carrying the internal failure code next to the generic body
pub static ERROR_CODE_HEADER: HeaderName = HeaderName::from_static("x-error-code");

pub const DOWNLOAD_FAILURE_MESSAGE: &str = "An error occurred while downloading the video";
pub const TRANSCRIBE_FAILURE_MESSAGE: &str = "An error occurred while transcribing the audio";

/// Failure of one endpoint, rendered as `500` with a fixed message
#[derive(Debug)]
pub struct ApiError {
    error: IngestError,
    message: &'static str,
}

impl ApiError {
    pub fn download(error: IngestError) -> Self {
        Self {
            error,
            message: DOWNLOAD_FAILURE_MESSAGE,
        }
    }

    pub fn transcribe(error: IngestError) -> Self {
        Self {
            error,
            message: TRANSCRIBE_FAILURE_MESSAGE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.error.code();

        tracing::error!(error = %self.error, code = code, "Request failed");

        (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(ERROR_CODE_HEADER.clone(), HeaderValue::from_static(code))],
            self.message,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_carries_code_header() {
        let response = ApiError::download(IngestError::Upload("disk full".to_string())).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[&ERROR_CODE_HEADER], "upload_error");
        assert_eq!(response.headers().get("x-error-code").map(|v| v.as_bytes()), Some(&b"upload_error"[..]));
    }
}
