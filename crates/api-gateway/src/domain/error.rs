//! Gateway error type and its HTTP status mapping.
//!
//! | error | status |
//! |---|---|
//! | `InvalidRequest`, `MalformedEntity`, `UnsupportedPayloadType` | 400 |
//!
//! Bus errors map to `UpstreamFailure`, except an invalid URI, which is the
//! client's `InvalidRequest`.
//! | `UnknownKey` | 401 |
//! | `PermissionDenied` | 403 |
//! | `NoSuchMethod` | 404 |
//! | `UpstreamFailure` | 502 |
//! | `BusUnavailable` | 503 |
//! | `Cancelled` | 504 |
//! | everything else | 500 |

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use shared_bus::{BusError, DescriptorError, EntityError};

/// Errors surfaced by the registry, dispatcher and endpoint.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// Identity material could not be parsed
    #[error("malformed entity: {0}")]
    MalformedEntity(#[from] EntityError),

    /// API key is missing from the registry (or its record is unreadable)
    #[error("unknown API key")]
    UnknownKey,

    /// The key's capability set does not allow the operation
    #[error("permission denied: {0} not allowed for this key")]
    PermissionDenied(&'static str),

    /// Operation not available on this endpoint
    #[error("no such method: {0}")]
    NoSuchMethod(String),

    /// No live bus connection for the key's identity
    #[error("no bus connection for entity {0}")]
    BusUnavailable(String),

    /// Request cancelled or its deadline passed
    #[error("request cancelled")]
    Cancelled,

    /// The bus reported an error
    #[error("bus call failed: {0}")]
    UpstreamFailure(BusError),

    /// A payload object could not be decoded
    #[error("could not decode payload object: {0}")]
    DecodeFailure(String),

    /// Target descriptor is outside the supported encodings
    #[error("unsupported payload type {0}")]
    UnsupportedPayloadType(String),

    /// Request envelope or parameters are invalid
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Registry store failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Server socket bind error
    #[error("server bind error: {0}")]
    Bind(String),

    /// Internal server error
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::MalformedEntity(_) | Self::UnsupportedPayloadType(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::UnknownKey => StatusCode::UNAUTHORIZED,
            Self::PermissionDenied(_) => StatusCode::FORBIDDEN,
            Self::NoSuchMethod(_) => StatusCode::NOT_FOUND,
            Self::UpstreamFailure(_) => StatusCode::BAD_GATEWAY,
            Self::BusUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Cancelled => StatusCode::GATEWAY_TIMEOUT,
            Self::DecodeFailure(_)
            | Self::Storage(_)
            | Self::Config(_)
            | Self::Bind(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON frame used on streaming sessions.
    pub fn to_frame(&self) -> serde_json::Value {
        serde_json::json!({
            "error": self.to_string(),
            "status": self.status().as_u16(),
        })
    }
}

impl From<BusError> for GatewayError {
    fn from(e: BusError) -> Self {
        match e {
            // a client-supplied URI the bus will not accept
            BusError::InvalidUri { .. } => GatewayError::InvalidRequest(e.to_string()),
            other => GatewayError::UpstreamFailure(other),
        }
    }
}

impl From<DescriptorError> for GatewayError {
    fn from(e: DescriptorError) -> Self {
        GatewayError::InvalidRequest(e.to_string())
    }
}

impl From<rocksdb::Error> for GatewayError {
    fn from(e: rocksdb::Error) -> Self {
        GatewayError::Storage(e.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;
