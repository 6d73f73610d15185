//! Error taxonomy for calls against a cluster API server
//!
//! Every call that crosses the kube boundary is classified into one of a
//! handful of kinds so callers can decide between "tolerate", "compensate"
//! and "surface" without matching on raw HTTP status codes.

use thiserror::Error;

/// Result alias for cluster API calls
pub type ApiResult<T> = Result<T, ApiError>;

/// Classification of a cluster API failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// Object already exists (HTTP 409 / AlreadyExists)
    AlreadyExists,
    /// Object does not exist (HTTP 404)
    NotFound,
    /// Caller is not allowed to perform the operation (HTTP 403)
    Forbidden,
    /// Credentials were rejected (HTTP 401)
    Unauthenticated,
    /// Anything else: transport failures, timeouts, 5xx, decode errors
    Other,
}

impl std::fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ApiErrorKind::AlreadyExists => "already exists",
            ApiErrorKind::NotFound => "not found",
            ApiErrorKind::Forbidden => "forbidden",
            ApiErrorKind::Unauthenticated => "unauthenticated",
            ApiErrorKind::Other => "unavailable",
        };
        f.write_str(s)
    }
}

/// A classified cluster API failure
#[derive(Debug, Clone, Error)]
#[error("cluster api {kind}: {message}")]
pub struct ApiError {
    /// Failure classification
    pub kind: ApiErrorKind,
    /// HTTP status code when the server answered
    pub code: Option<u16>,
    /// Server or transport message
    pub message: String,
}

impl ApiError {
    /// Build an error of the given kind
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
        }
    }

    /// Shorthand for an `AlreadyExists` error
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::AlreadyExists,
            code: Some(409),
            message: message.into(),
        }
    }

    /// Shorthand for a `NotFound` error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::NotFound,
            code: Some(404),
            message: message.into(),
        }
    }

    /// Shorthand for an unclassified failure (network, 5xx)
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Other, message)
    }

    /// Returns true if the object already exists
    pub fn is_already_exists(&self) -> bool {
        self.kind == ApiErrorKind::AlreadyExists
    }

    /// Returns true if the object was not found
    pub fn is_not_found(&self) -> bool {
        self.kind == ApiErrorKind::NotFound
    }

    /// Returns true if retrying the call later may succeed
    pub fn is_retryable(&self) -> bool {
        self.kind == ApiErrorKind::Other
    }

    fn classify(code: u16, reason: &str) -> ApiErrorKind {
        match (code, reason) {
            (409, _) | (_, "AlreadyExists") => ApiErrorKind::AlreadyExists,
            (404, _) | (_, "NotFound") => ApiErrorKind::NotFound,
            (403, _) => ApiErrorKind::Forbidden,
            (401, _) => ApiErrorKind::Unauthenticated,
            _ => ApiErrorKind::Other,
        }
    }
}

impl From<kube::Error> for ApiError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) => Self {
                kind: Self::classify(resp.code, &resp.reason),
                code: Some(resp.code),
                message: resp.message,
            },
            other => Self::other(other.to_string()),
        }
    }
}
