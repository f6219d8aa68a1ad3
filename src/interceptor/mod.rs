//! The interceptor pipeline.
//!
//! A call runs its request through an ordered list of stages assembled once
//! per client:
//!
//! ```text
//! head stages -> bridge -> tail stages (cache first) -> gzip -> connect
//! ```
//!
//! Each stage receives a [`Step`] holding the stage list, its position, the
//! current request and the call's connection. Calling [`Step::proceed`]
//! hands a (possibly modified) request to the next stage and yields the
//! response coming back, which the stage may transform before returning
//! it. A stage that never proceeds short-circuits the exchange.

pub mod bridge;
pub mod connect;
pub mod gzip;
pub mod logging;

use crate::base::neterror::NetError;
use crate::http::{Request, RequestBuilder, Response};
use crate::transport::Connection;
use async_trait::async_trait;
use std::sync::Arc;

pub use bridge::BridgeInterceptor;
pub use connect::ConnectInterceptor;
pub use gzip::GzipInterceptor;
pub use logging::LoggingInterceptor;

#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn intercept(&self, step: Step<'_>) -> Result<Response, NetError>;
}

/// One position in the pipeline.
///
/// `proceed` consumes the step, so a stage can hand the request on at most
/// once.
pub struct Step<'a> {
    stages: &'a [Arc<dyn Interceptor>],
    index: usize,
    request: Request,
    connection: &'a dyn Connection,
}

impl<'a> Step<'a> {
    pub(crate) fn new(
        stages: &'a [Arc<dyn Interceptor>],
        request: Request,
        connection: &'a dyn Connection,
    ) -> Self {
        Self {
            stages,
            index: 0,
            request,
            connection,
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn connection(&self) -> &'a dyn Connection {
        self.connection
    }

    /// Position of the next stage `proceed` will invoke.
    pub fn index(&self) -> usize {
        self.index
    }

    /// A mutable copy of the current request for forwarding a modified one.
    pub fn request_builder(&self) -> RequestBuilder {
        self.request.to_builder()
    }

    /// Invoke the next stage with `request`. The request is frozen on the
    /// way down.
    pub async fn proceed(self, request: Request) -> Result<Response, NetError> {
        let stage = self
            .stages
            .get(self.index)
            .ok_or(NetError::PipelineExhausted)?;
        let next = Step {
            stages: self.stages,
            index: self.index + 1,
            request: request.freeze(),
            connection: self.connection,
        };
        stage.intercept(next).await
    }

    /// Invoke the next stage with the current request unchanged.
    pub async fn forward(self) -> Result<Response, NetError> {
        let request = self.request.clone();
        self.proceed(request).await
    }
}

/// Drive `request` through `stages` from the first one.
pub(crate) async fn run(
    stages: &[Arc<dyn Interceptor>],
    request: Request,
    connection: &dyn Connection,
) -> Result<Response, NetError> {
    Step::new(stages, request, connection).forward().await
}
