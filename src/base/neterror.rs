use crate::base::status;
use crate::http::method::Method;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum NetError {
    // Synthetic outcomes (no real HTTP exchange happened)
    #[error("connect error")]
    ConnectError,
    #[error("duplicate request")]
    DuplicateRequest,
    #[error("request canceled")]
    RequestCanceled,

    // Transport Errors
    #[error("Connection to {host}:{port} failed: {reason}")]
    ConnectionFailed {
        host: String,
        port: u16,
        reason: String,
    },
    #[error("Connection aborted")]
    ConnectionAborted,
    #[error("Connection timed out")]
    ConnectionTimedOut,
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Disallowed URL scheme: {0}")]
    DisallowedUrlScheme(String),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
    #[error("Failed to read {path}: {reason}")]
    FileRead { path: String, reason: String },
    #[error("Response body unavailable")]
    HttpBodyError,

    // Cache Errors
    #[error("Cache I/O failed for {key}: {reason}")]
    CacheIo { key: String, reason: String },
    #[error("Cache keys must match [a-z0-9_-]{{1,64}}: \"{0}\"")]
    InvalidCacheKey(String),

    // Parse Errors
    #[error("Parse failed: {0}")]
    Parse(String),
    #[error("Response body is not valid UTF-8")]
    InvalidUtf8,
    #[error("Content decoding failed: {0}")]
    ContentDecodingFailed(String),

    // Usage Errors
    #[error("The request has been frozen")]
    RequestFrozen,
    #[error("Already executed")]
    AlreadyExecuted,
    #[error("Method {0} must have a request body")]
    MissingRequestBody(Method),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Interceptor pipeline exhausted")]
    PipelineExhausted,

    #[error("HTTP {code}: {message}")]
    Status { code: i32, message: String },
}

impl NetError {
    /// Integer state reported to listeners alongside the message.
    pub fn code(&self) -> i32 {
        match self {
            NetError::DuplicateRequest => status::DUPLICATE_REQUEST,
            NetError::RequestCanceled => status::REQUEST_CANCELED,
            NetError::Status { code, .. } => *code,
            _ => status::CONNECT_ERROR,
        }
    }

    /// True for failures raised while talking to the network.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            NetError::ConnectError
                | NetError::ConnectionFailed { .. }
                | NetError::ConnectionAborted
                | NetError::ConnectionTimedOut
                | NetError::ConnectionClosed(_)
                | NetError::InvalidResponse(_)
                | NetError::DisallowedUrlScheme(_)
                | NetError::HttpBodyError
        )
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, NetError::RequestCanceled)
    }
}
