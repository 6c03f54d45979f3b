use std::fmt;

use serde::Deserialize;
use thiserror::Error;

/// Connect status codes, serialized in their snake_case wire form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Code {
    Canceled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl Code {
    /// Code implied by an HTTP status when the body carries no Connect error.
    pub fn from_http_status(status: reqwest::StatusCode) -> Self {
        match status.as_u16() {
            400 => Code::Internal,
            401 => Code::Unauthenticated,
            403 => Code::PermissionDenied,
            404 => Code::Unimplemented,
            429 | 502..=504 => Code::Unavailable,
            _ => Code::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Code::Canceled => "canceled",
            Code::Unknown => "unknown",
            Code::InvalidArgument => "invalid_argument",
            Code::DeadlineExceeded => "deadline_exceeded",
            Code::NotFound => "not_found",
            Code::AlreadyExists => "already_exists",
            Code::PermissionDenied => "permission_denied",
            Code::ResourceExhausted => "resource_exhausted",
            Code::FailedPrecondition => "failed_precondition",
            Code::Aborted => "aborted",
            Code::OutOfRange => "out_of_range",
            Code::Unimplemented => "unimplemented",
            Code::Internal => "internal",
            Code::Unavailable => "unavailable",
            Code::DataLoss => "data_loss",
            Code::Unauthenticated => "unauthenticated",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("{code}: {message}")]
    Status { code: Code, message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Message of {0} bytes does not fit in an envelope")]
    MessageTooLarge(usize),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error body of a failed Connect call.
#[derive(Debug, Deserialize)]
pub(crate) struct WireError {
    pub code: Code,
    #[serde(default)]
    pub message: String,
}

impl RpcError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Build an error from a non-2xx unary response.
    /// Prefers the Connect error body, falling back to the HTTP status.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        match serde_json::from_str::<WireError>(body) {
            Ok(err) => RpcError::Status {
                code: err.code,
                message: err.message,
            },
            Err(_) => RpcError::Status {
                code: Code::from_http_status(status),
                message: format!("HTTP {}: {}", status, Self::truncate_body(body)),
            },
        }
    }

    pub fn code(&self) -> Code {
        match self {
            RpcError::Status { code, .. } => *code,
            RpcError::Transport(e) if e.is_timeout() => Code::DeadlineExceeded,
            RpcError::Transport(_) => Code::Unavailable,
            RpcError::Encode(_) | RpcError::Decode(_) | RpcError::InvalidResponse(_) => {
                Code::Internal
            }
            RpcError::MessageTooLarge(_) => Code::ResourceExhausted,
        }
    }

    pub fn is_unauthenticated(&self) -> bool {
        self.code() == Code::Unauthenticated
    }
}
