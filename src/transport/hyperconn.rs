//! Plaintext HTTP/1.1 connection over hyper.
//!
//! One TCP connection per exchange, driven by a spawned hyper connection
//! task. The request is sent when the response head is first asked for.

use crate::base::context::{IoResultExt, MutexExt};
use crate::base::neterror::NetError;
use crate::http::request::checked_url;
use crate::http::{Headers, Request, RequestBody, ResponseBody};
use crate::transport::{Connection, ConnectionFactory, ResponseHead, TransportOptions};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use http::HeaderMap;
use http_body_util::{BodyStream, Full};
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Cancellation shared between the connection and its body stream.
#[derive(Default)]
struct CancelSignal {
    canceled: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Run `fut` unless cancellation arrives first, which fails it with
    /// `RequestCanceled`.
    async fn guard<T, F>(&self, fut: F) -> Result<T, NetError>
    where
        F: Future<Output = Result<T, NetError>>,
    {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.canceled.load(Ordering::SeqCst) {
            return Err(NetError::RequestCanceled);
        }
        tokio::select! {
            _ = notified => Err(NetError::RequestCanceled),
            result = fut => result,
        }
    }
}

async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, NetError>
where
    F: Future<Output = Result<T, NetError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| NetError::ConnectionTimedOut)?
}

struct Target {
    method: http::Method,
    uri: http::Uri,
}

#[derive(Default)]
struct Exchange {
    target: Option<Target>,
    sender: Option<http1::SendRequest<Full<Bytes>>>,
    driver: Option<JoinHandle<()>>,
    headers: HeaderMap,
    body: Bytes,
    incoming: Option<Incoming>,
}

pub struct HyperConnection {
    options: TransportOptions,
    cancel: Arc<CancelSignal>,
    exchange: Mutex<Exchange>,
}

impl HyperConnection {
    pub fn new(options: TransportOptions) -> Self {
        Self {
            options,
            cancel: Arc::new(CancelSignal::default()),
            exchange: Mutex::new(Exchange::default()),
        }
    }
}

#[async_trait]
impl Connection for HyperConnection {
    async fn connect(&self, request: &Request) -> Result<(), NetError> {
        let url = checked_url(request.url())?;
        if url.scheme() != "http" {
            return Err(NetError::DisallowedUrlScheme(url.scheme().to_string()));
        }
        let host = url
            .host_str()
            .ok_or_else(|| NetError::InvalidUrl(url.to_string()))?
            .to_string();
        let port = url.port_or_known_default().unwrap_or(80);
        let uri: http::Uri = url[url::Position::BeforePath..url::Position::AfterQuery]
            .parse()
            .map_err(|_| NetError::InvalidUrl(url.to_string()))?;

        let stream = self
            .cancel
            .guard(with_timeout(self.options.connect_timeout, async {
                TcpStream::connect((host.as_str(), port))
                    .await
                    .connection_context(&host, port)
            }))
            .await?;

        let io = TokioIo::new(stream);
        let (sender, conn) = self
            .cancel
            .guard(with_timeout(self.options.connect_timeout, async {
                http1::handshake(io)
                    .await
                    .map_err(|e| NetError::ConnectionFailed {
                        host: host.clone(),
                        port,
                        reason: e.to_string(),
                    })
            }))
            .await?;

        let driver = tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!(error = %e, "HTTP/1.1 connection ended with error");
            }
        });

        tracing::debug!(host = %host, port, "Connected");
        let mut exchange = self.exchange.locked();
        exchange.target = Some(Target {
            method: request.method().to_http(),
            uri,
        });
        exchange.sender = Some(sender);
        exchange.driver = Some(driver);
        Ok(())
    }

    async fn write_headers(&self, headers: &Headers) -> Result<(), NetError> {
        self.exchange.locked().headers = headers.to_header_map();
        Ok(())
    }

    async fn write_body(&self, body: &RequestBody) -> Result<(), NetError> {
        self.exchange.locked().body = body.data().clone();
        Ok(())
    }

    async fn response_head(&self) -> Result<ResponseHead, NetError> {
        let (mut sender, target, headers, body) = {
            let mut exchange = self.exchange.locked();
            let sender = exchange
                .sender
                .take()
                .ok_or_else(|| NetError::ConnectionClosed("not connected".to_string()))?;
            let target = exchange
                .target
                .take()
                .ok_or_else(|| NetError::ConnectionClosed("request already sent".to_string()))?;
            (
                sender,
                target,
                std::mem::take(&mut exchange.headers),
                std::mem::take(&mut exchange.body),
            )
        };

        let mut request = http::Request::builder()
            .method(target.method)
            .uri(target.uri)
            .body(Full::new(body))
            .map_err(|e| NetError::InvalidUrl(e.to_string()))?;
        *request.headers_mut() = headers;

        let response = self
            .cancel
            .guard(with_timeout(self.options.read_timeout, async {
                sender
                    .send_request(request)
                    .await
                    .map_err(|e| NetError::ConnectionClosed(e.to_string()))
            }))
            .await?;

        let (parts, incoming) = response.into_parts();
        let message = parts
            .extensions
            .get::<hyper::ext::ReasonPhrase>()
            .map(|reason| String::from_utf8_lossy(reason.as_bytes()).into_owned())
            .or_else(|| parts.status.canonical_reason().map(str::to_string))
            .unwrap_or_default();

        {
            let mut exchange = self.exchange.locked();
            exchange.sender = Some(sender);
            exchange.incoming = Some(incoming);
        }

        Ok(ResponseHead {
            code: i32::from(parts.status.as_u16()),
            message,
            headers: Headers::from_header_map(&parts.headers),
        })
    }

    async fn response_body(&self, headers: &Headers) -> Result<Option<ResponseBody>, NetError> {
        let Some(incoming) = self.exchange.locked().incoming.take() else {
            return Ok(None);
        };

        let cancel = self.cancel.clone();
        let read_timeout = self.options.read_timeout;
        let frames = Box::pin(BodyStream::new(incoming));
        let stream = futures::stream::unfold(Some(frames), move |state| {
            let cancel = cancel.clone();
            async move {
                let mut frames = state?;
                loop {
                    let next = cancel
                        .guard(with_timeout(read_timeout, async { Ok(frames.next().await) }))
                        .await;
                    match next {
                        Err(e) => return Some((Err(e), None)),
                        Ok(None) => return None,
                        Ok(Some(Err(e))) => {
                            return Some((Err(NetError::ConnectionClosed(e.to_string())), None))
                        }
                        Ok(Some(Ok(frame))) => {
                            // Trailers carry no body bytes.
                            if let Ok(data) = frame.into_data() {
                                return Some((Ok(data), Some(frames)));
                            }
                        }
                    }
                }
            }
        });

        Ok(Some(ResponseBody::from_headers(stream, headers)))
    }

    fn cancel(&self) {
        self.cancel.cancel();
    }

    fn close(&self) {
        let mut exchange = self.exchange.locked();
        exchange.sender = None;
        exchange.incoming = None;
        if let Some(driver) = exchange.driver.take() {
            driver.abort();
        }
    }
}

/// Creates [`HyperConnection`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct HyperConnectionFactory;

impl ConnectionFactory for HyperConnectionFactory {
    fn create(&self, options: &TransportOptions) -> Arc<dyn Connection> {
        Arc::new(HyperConnection::new(*options))
    }
}
