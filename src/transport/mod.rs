//! The transport seam.
//!
//! A [`Connection`] performs one exchange for one call. The terminal stage
//! of the pipeline drives it in order: `connect`, `write_headers`,
//! `write_body` (body methods only), `response_head`, and for a 200
//! response `response_body`. `cancel` may be called from any thread at any
//! time and must make pending I/O fail.

pub mod hyperconn;

use crate::base::neterror::NetError;
use crate::http::{Headers, Request, RequestBody, ResponseBody};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use hyperconn::{HyperConnection, HyperConnectionFactory};

/// Timeouts handed to every connection a client creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportOptions {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(10),
        }
    }
}

/// Status line and headers of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub code: i32,
    pub message: String,
    pub headers: Headers,
}

#[async_trait]
pub trait Connection: Send + Sync {
    /// Open the connection for the (fully resolved) request.
    async fn connect(&self, request: &Request) -> Result<(), NetError>;

    async fn write_headers(&self, headers: &Headers) -> Result<(), NetError>;

    async fn write_body(&self, body: &RequestBody) -> Result<(), NetError>;

    async fn response_head(&self) -> Result<ResponseHead, NetError>;

    /// The body stream, described by the response `headers`.
    async fn response_body(&self, headers: &Headers) -> Result<Option<ResponseBody>, NetError>;

    /// Abort pending and future I/O, which then fails with
    /// `NetError::RequestCanceled`.
    fn cancel(&self);

    /// Release the underlying resources. Safe to call more than once.
    fn close(&self);
}

/// Creates one connection per call.
pub trait ConnectionFactory: Send + Sync {
    fn create(&self, options: &TransportOptions) -> Arc<dyn Connection>;
}
