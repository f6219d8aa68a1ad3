//! One bound execution of a request.

use crate::base::callstate::CallState;
use crate::base::neterror::NetError;
use crate::http::{BodyStream, Request, Response, ResponseBody};
use crate::interceptor;
use crate::transport::Connection;
use crate::urlrequest::context::RequestContext;
use crate::urlrequest::dispatcher::Dispatcher;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

/// Notifications for an enqueued call.
///
/// `on_start` runs on the enqueuing task before `enqueue` returns. Exactly
/// one of `on_response` or `on_failure` follows on a worker, then
/// `on_finish`, whatever the outcome. An error returned by `on_response` is
/// passed to `on_failure`.
#[async_trait]
pub trait Callback: Send + Sync {
    fn on_start(&self) {}

    async fn on_response(&self, call: &Call, response: Response) -> Result<(), NetError>;

    fn on_failure(&self, call: &Call, error: NetError);

    fn on_finish(&self) {}
}

struct CallInner {
    request: Request,
    context: Arc<RequestContext>,
    connection: Arc<dyn Connection>,
    executed: AtomicBool,
    canceled: AtomicBool,
    state: AtomicU8,
}

/// A request bound to a client and to its own connection.
///
/// A call runs once, either inline with [`Call::execute`] or through the
/// dispatcher with [`Call::enqueue`]. Use [`Call::fresh`] to run the same
/// request again. Clones share the same execution.
#[derive(Clone)]
pub struct Call {
    inner: Arc<CallInner>,
}

impl Call {
    pub(crate) fn new(context: Arc<RequestContext>, request: Request) -> Self {
        let connection = context.connections().create(context.transport());
        Self {
            inner: Arc::new(CallInner {
                request: request.freeze(),
                context,
                connection,
                executed: AtomicBool::new(false),
                canceled: AtomicBool::new(false),
                state: AtomicU8::new(CallState::Created.as_u8()),
            }),
        }
    }

    /// The frozen request.
    pub fn request(&self) -> &Request {
        &self.inner.request
    }

    pub fn state(&self) -> CallState {
        CallState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    pub fn is_executed(&self) -> bool {
        self.inner.executed.load(Ordering::SeqCst)
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::SeqCst)
    }

    /// Cancel the call. Pending I/O on its connection fails and the
    /// failure is reported as [`NetError::RequestCanceled`].
    pub fn cancel(&self) {
        if self.inner.canceled.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(tag = %self.request().tag(), url = %self.request().url(), "Canceling call");
        self.inner.connection.cancel();
        if !self.state().is_terminal() {
            self.set_state(CallState::Canceled);
        }
    }

    /// A new, unexecuted call for the same request.
    pub fn fresh(&self) -> Call {
        Call::new(self.inner.context.clone(), self.inner.request.clone())
    }

    /// Run the pipeline on the current task.
    ///
    /// The call is registered with the dispatcher for the duration so that
    /// tag cancellation reaches it; an equal call already running inline
    /// makes this fail with [`NetError::DuplicateRequest`]. The connection
    /// is closed when this returns, or, for a response with a body, once
    /// that body is dropped.
    pub async fn execute(&self) -> Result<Response, NetError> {
        if self.inner.executed.swap(true, Ordering::SeqCst) {
            return Err(NetError::AlreadyExecuted);
        }
        let dispatcher = self.dispatcher();
        if !dispatcher.executed(self) {
            self.settle(CallState::Failed);
            self.close();
            return Err(NetError::DuplicateRequest);
        }
        let mut registration = SyncRegistration {
            dispatcher,
            call: self,
            close: true,
        };

        if self.is_canceled() {
            self.settle(CallState::Canceled);
            return Err(NetError::RequestCanceled);
        }
        self.set_state(CallState::Executing);
        match self.proceed().await {
            Ok(response) => {
                self.settle(CallState::Completed);
                registration.close = response.body().is_none();
                Ok(self.close_with_body(response))
            }
            Err(e) => {
                tracing::debug!(url = %self.request().url(), error = %e, "Call failed");
                self.settle(CallState::Failed);
                Err(e)
            }
        }
    }

    /// Hand the call to the dispatcher. `callback.on_start` runs before
    /// this returns.
    pub fn enqueue(&self, callback: Arc<dyn Callback>) -> Result<(), NetError> {
        if self.inner.executed.swap(true, Ordering::SeqCst) {
            return Err(NetError::AlreadyExecuted);
        }
        callback.on_start();
        self.set_state(CallState::Waiting);
        self.dispatcher().enqueue(AsyncCall {
            call: self.clone(),
            callback,
        });
        Ok(())
    }

    /// True when both handles refer to the same execution.
    pub(crate) fn same(&self, other: &Call) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn set_state(&self, state: CallState) {
        self.inner.state.store(state.as_u8(), Ordering::SeqCst);
    }

    /// Record a terminal state; a canceled call stays canceled.
    fn settle(&self, state: CallState) {
        let state = if self.is_canceled() {
            CallState::Canceled
        } else {
            state
        };
        self.set_state(state);
    }

    fn dispatcher(&self) -> &Arc<Dispatcher> {
        self.inner.context.dispatcher()
    }

    fn close(&self) {
        self.inner.connection.close();
    }

    /// Hand the connection over to the response body.
    fn close_with_body(&self, mut response: Response) -> Response {
        let Some(body) = response.take_body() else {
            return response;
        };
        let (stream, content_type, content_length, charset) = body.into_parts();
        let stream = ClosingStream {
            stream,
            connection: self.inner.connection.clone(),
        };
        response
            .into_builder()
            .body(ResponseBody::from_stream(
                stream,
                content_type,
                content_length,
                charset,
            ))
            .build()
    }

    async fn proceed(&self) -> Result<Response, NetError> {
        interceptor::run(
            self.inner.context.stages(),
            self.inner.request.clone(),
            self.inner.connection.as_ref(),
        )
        .await
        .map_err(|e| {
            if self.is_canceled() {
                NetError::RequestCanceled
            } else {
                e
            }
        })
    }
}

/// Calls are equal when their requests are equal and they are in the same
/// execution and cancellation state, so independently built calls for the
/// same request collide in the dispatcher.
impl PartialEq for Call {
    fn eq(&self, other: &Self) -> bool {
        self.inner.request == other.inner.request
            && self.is_executed() == other.is_executed()
            && self.is_canceled() == other.is_canceled()
    }
}

impl std::fmt::Debug for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Call")
            .field("request", &self.inner.request)
            .field("state", &self.state())
            .field("canceled", &self.is_canceled())
            .finish()
    }
}

struct SyncRegistration<'a> {
    dispatcher: &'a Dispatcher,
    call: &'a Call,
    close: bool,
}

impl Drop for SyncRegistration<'_> {
    fn drop(&mut self) {
        self.dispatcher.finished_sync(self.call);
        if self.close {
            self.call.close();
        }
    }
}

/// A body stream that closes its connection when dropped.
struct ClosingStream {
    stream: BodyStream,
    connection: Arc<dyn Connection>,
}

impl Stream for ClosingStream {
    type Item = Result<Bytes, NetError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.stream.poll_next_unpin(cx)
    }
}

impl Drop for ClosingStream {
    fn drop(&mut self) {
        self.connection.close();
    }
}

/// An enqueued call with its callback.
pub(crate) struct AsyncCall {
    call: Call,
    callback: Arc<dyn Callback>,
}

impl AsyncCall {
    pub(crate) fn call(&self) -> &Call {
        &self.call
    }

    /// Run on a worker. Finish notification, dispatcher bookkeeping and
    /// connection close happen on every path, including a dropped task.
    pub(crate) async fn run(self) {
        let AsyncCall { call, callback } = self;
        let _completion = Completion {
            call: &call,
            callback: callback.as_ref(),
        };

        if call.is_canceled() {
            call.settle(CallState::Canceled);
            callback.on_failure(&call, NetError::RequestCanceled);
            return;
        }
        call.set_state(CallState::Executing);
        match call.proceed().await {
            Ok(response) => match callback.on_response(&call, response).await {
                Ok(()) => call.settle(CallState::Completed),
                Err(e) => {
                    tracing::debug!(url = %call.request().url(), error = %e, "Response handling failed");
                    call.settle(CallState::Failed);
                    callback.on_failure(&call, e);
                }
            },
            Err(e) => {
                tracing::debug!(url = %call.request().url(), error = %e, "Call failed");
                call.settle(CallState::Failed);
                callback.on_failure(&call, e);
            }
        }
    }

    /// Complete a call that never ran.
    pub(crate) fn reject(self, error: NetError) {
        let state = if error.is_canceled() {
            CallState::Canceled
        } else {
            CallState::Failed
        };
        self.call.set_state(state);
        self.callback.on_failure(&self.call, error);
        self.callback.on_finish();
        self.call.close();
    }
}

struct Completion<'a> {
    call: &'a Call,
    callback: &'a dyn Callback,
}

impl Drop for Completion<'_> {
    fn drop(&mut self) {
        self.callback.on_finish();
        self.call.dispatcher().finished_async(self.call);
        self.call.close();
    }
}
