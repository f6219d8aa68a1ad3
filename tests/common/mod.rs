//! Scripted in-memory transport and recording callbacks shared by the
//! integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use netpipe::http::{Headers, Request, RequestBody, Response, ResponseBody};
use netpipe::transport::{Connection, ConnectionFactory, ResponseHead, TransportOptions};
use netpipe::urlrequest::{Call, Callback};
use netpipe::{Client, ClientBuilder, NetError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Semaphore};

pub const BASE_URL: &str = "http://test.local/";

/// What the scripted server answers.
#[derive(Debug, Clone)]
pub enum Reply {
    Status {
        code: i32,
        message: String,
        headers: Vec<(String, String)>,
        body: Option<Bytes>,
    },
    Fail(NetError),
}

impl Reply {
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Reply::Status {
            code: 200,
            message: "OK".into(),
            headers: vec![("Content-Type".into(), "text/plain; charset=utf-8".into())],
            body: Some(body.into()),
        }
    }

    pub fn status(code: i32, message: &str) -> Self {
        Reply::Status {
            code,
            message: message.into(),
            headers: Vec::new(),
            body: Some(Bytes::from_static(b"error page")),
        }
    }

    pub fn fail(error: NetError) -> Self {
        Reply::Fail(error)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let Reply::Status { headers, .. } = &mut self {
            headers.push((name.into(), value.into()));
        }
        self
    }
}

struct NetState {
    routes: Mutex<HashMap<String, Reply>>,
    fallback: Mutex<Reply>,
    connects: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
    gated: AtomicBool,
    gate: Semaphore,
    seen: Mutex<Vec<Request>>,
}

/// A scripted network. Replies are chosen by URL path; when gated, each
/// response head waits for one [`MockNet::release`] permit.
#[derive(Clone)]
pub struct MockNet {
    state: Arc<NetState>,
}

impl Default for MockNet {
    fn default() -> Self {
        Self::new()
    }
}

impl MockNet {
    pub fn new() -> Self {
        Self {
            state: Arc::new(NetState {
                routes: Mutex::new(HashMap::new()),
                fallback: Mutex::new(Reply::ok("hello")),
                connects: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                gated: AtomicBool::new(false),
                gate: Semaphore::new(0),
                seen: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Reply used for paths without a route.
    pub fn reply(&self, reply: Reply) {
        *self.state.fallback.lock().unwrap() = reply;
    }

    pub fn route(&self, path: &str, reply: Reply) {
        self.state.routes.lock().unwrap().insert(path.into(), reply);
    }

    /// Hold every later response until released.
    pub fn gate(&self) {
        self.state.gated.store(true, Ordering::SeqCst);
    }

    pub fn release(&self, permits: usize) {
        self.state.gate.add_permits(permits);
    }

    /// Number of exchanges that reached the network.
    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Connections opened and not yet closed.
    pub fn active(&self) -> usize {
        self.state.active.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.state.peak.load(Ordering::SeqCst)
    }

    /// Requests as the connect stage handed them to the transport.
    pub fn seen(&self) -> Vec<Request> {
        self.state.seen.lock().unwrap().clone()
    }

    fn lookup(&self, url: &str) -> Reply {
        let path = url::Url::parse(url)
            .map(|u| u.path().to_string())
            .unwrap_or_default();
        let routes = self.state.routes.lock().unwrap();
        routes
            .get(&path)
            .cloned()
            .unwrap_or_else(|| self.state.fallback.lock().unwrap().clone())
    }
}

impl ConnectionFactory for MockNet {
    fn create(&self, _: &TransportOptions) -> Arc<dyn Connection> {
        let (cancel, _) = watch::channel(false);
        Arc::new(MockConnection {
            net: self.clone(),
            reply: Mutex::new(None),
            url: Mutex::new(String::new()),
            cancel,
            opened: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }
}

struct MockConnection {
    net: MockNet,
    reply: Mutex<Option<Reply>>,
    url: Mutex<String>,
    cancel: watch::Sender<bool>,
    opened: AtomicBool,
    closed: AtomicBool,
}

impl MockConnection {
    fn canceled(&self) -> bool {
        *self.cancel.borrow()
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn connect(&self, request: &Request) -> Result<(), NetError> {
        if self.canceled() {
            return Err(NetError::RequestCanceled);
        }
        let state = &self.net.state;
        state.seen.lock().unwrap().push(request.clone());
        *self.url.lock().unwrap() = request.url().to_string();
        state.connects.fetch_add(1, Ordering::SeqCst);
        let active = state.active.fetch_add(1, Ordering::SeqCst) + 1;
        state.peak.fetch_max(active, Ordering::SeqCst);
        self.opened.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn write_headers(&self, _: &Headers) -> Result<(), NetError> {
        Ok(())
    }

    async fn write_body(&self, _: &RequestBody) -> Result<(), NetError> {
        Ok(())
    }

    async fn response_head(&self) -> Result<ResponseHead, NetError> {
        if self.net.state.gated.load(Ordering::SeqCst) {
            let mut canceled = self.cancel.subscribe();
            tokio::select! {
                permit = self.net.state.gate.acquire() => {
                    permit.map_err(|_| NetError::ConnectionAborted)?.forget();
                }
                _ = async {
                    let _ = canceled.wait_for(|c| *c).await;
                } => return Err(NetError::RequestCanceled),
            }
        }
        if self.canceled() {
            return Err(NetError::RequestCanceled);
        }
        let url = self.url.lock().unwrap().clone();
        let reply = self.net.lookup(&url);
        *self.reply.lock().unwrap() = Some(reply.clone());
        match reply {
            Reply::Fail(e) => Err(e),
            Reply::Status {
                code,
                message,
                headers: pairs,
                ..
            } => {
                let mut headers = Headers::new();
                for (name, value) in &pairs {
                    headers.append(name, value).unwrap();
                }
                Ok(ResponseHead {
                    code,
                    message,
                    headers,
                })
            }
        }
    }

    async fn response_body(&self, headers: &Headers) -> Result<Option<ResponseBody>, NetError> {
        let body = match self.reply.lock().unwrap().take() {
            Some(Reply::Status { body: Some(b), .. }) => b,
            _ => return Ok(None),
        };
        Ok(Some(ResponseBody::from_bytes(
            body,
            headers.content_type().map(str::to_string),
            headers.charset().map(str::to_string),
        )))
    }

    fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    fn close(&self) {
        if self.opened.load(Ordering::SeqCst) && !self.closed.swap(true, Ordering::SeqCst) {
            self.net.state.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// A client builder wired to `net`.
pub fn client(net: &MockNet) -> ClientBuilder {
    Client::builder(BASE_URL).connection_factory(net.clone())
}

pub fn get(path: &str) -> Request {
    Request::builder().path(path).build().unwrap()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start,
    Response(i32, String),
    Failure(NetError),
    Finish,
}

/// Records the notifications of one enqueued call.
pub struct Recorder {
    events: Mutex<Vec<Event>>,
    finished: watch::Sender<usize>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        let (finished, _) = watch::channel(0);
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            finished,
        })
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn finish_count(&self) -> usize {
        *self.finished.borrow()
    }

    pub async fn wait_finished(&self) {
        let mut rx = self.finished.subscribe();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|n| *n > 0))
            .await
            .expect("call did not finish in time")
            .unwrap();
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl Callback for Recorder {
    fn on_start(&self) {
        self.push(Event::Start);
    }

    async fn on_response(&self, _: &Call, response: Response) -> Result<(), NetError> {
        let code = response.code();
        let has_body = response.body().is_some();
        let text = if has_body {
            response.text().await?
        } else {
            String::new()
        };
        self.push(Event::Response(code, text));
        Ok(())
    }

    fn on_failure(&self, _: &Call, error: NetError) {
        self.push(Event::Failure(error));
    }

    fn on_finish(&self) {
        self.push(Event::Finish);
        self.finished.send_modify(|n| *n += 1);
    }
}

/// Poll `condition` until it holds or five seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
