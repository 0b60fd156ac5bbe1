//! Response envelope shared by every endpoint, carried over from the
//! node-status API's `ApiResponse`/`ApiErrorResponse` pattern.

use civitas_types::CoreError;
use serde::Serialize;

#[derive(Serialize)]
pub struct ApiErrorResponse {
    pub error: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ApiErrorResponse {
    pub fn new(error: &'static str, message: impl Into<String>) -> Self {
        Self {
            error,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<&CoreError> for ApiErrorResponse {
    fn from(err: &CoreError) -> Self {
        ApiErrorResponse::new(err.wire_code(), err.to_string())
    }
}

#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiErrorResponse>,
    pub timestamp: i64,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T, now: i64) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: now,
        }
    }

    pub fn error(error: ApiErrorResponse, now: i64) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            timestamp: now,
        }
    }
}

/// Maps a [`CoreError`] to the HTTP status the wire identifier implies.
/// Fatal errors never reach this path in steady state (spec §7) — they
/// surface as `InternalError` only if one somehow does.
pub fn status_for_error(err: &CoreError) -> axum::http::StatusCode {
    use axum::http::StatusCode;
    use civitas_types::CoreError::*;
    match err {
        BadEncoding(_) | FieldOutOfRange(_) => StatusCode::BAD_REQUEST,
        UnknownCommitment | UnknownRequest => StatusCode::NOT_FOUND,
        AttestationInvalid(_) | AttestationExpired | AttestationReuse | UnderAge | DuplicateRequest => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        AlreadyRegistered { .. } => StatusCode::CONFLICT,
        TreeFull | DuplicateCommitment | NullifierReused | StaleRoot | ScopeMismatch => {
            StatusCode::CONFLICT
        }
        ProofRejected => StatusCode::UNPROCESSABLE_ENTITY,
        Overloaded => StatusCode::SERVICE_UNAVAILABLE,
        Timeout => StatusCode::GATEWAY_TIMEOUT,
        IoError(_) | Config(_) | Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
