//! Typed requests.
//!
//! A [`Parser`] turns a successful response into a value. A
//! [`TypedRequest`] pairs a plain [`Request`] with a parser and an optional
//! [`Listener`]; listener notifications are handed to the client's
//! [`Delivery`] context rather than run on the worker.

use crate::base::context::{IoResultExt, MutexExt};
use crate::base::neterror::NetError;
use crate::base::status;
use crate::http::{Request, Response};
use crate::urlrequest::call::{Call, Callback};
use crate::urlrequest::delivery::Delivery;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
#[cfg(feature = "json")]
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;

#[async_trait]
pub trait Parser<T>: Send + Sync {
    /// Convert a 200 response that carries a body.
    async fn parse(&self, response: Response) -> Result<T, NetError>;
}

/// The body decoded as UTF-8 text.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringParser;

#[async_trait]
impl Parser<String> for StringParser {
    async fn parse(&self, response: Response) -> Result<String, NetError> {
        response.text().await
    }
}

/// The raw body.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytesParser;

#[async_trait]
impl Parser<Bytes> for BytesParser {
    async fn parse(&self, response: Response) -> Result<Bytes, NetError> {
        response.bytes().await
    }
}

/// The body deserialized from JSON.
#[cfg(feature = "json")]
pub struct JsonParser<T> {
    _marker: PhantomData<fn() -> T>,
}

#[cfg(feature = "json")]
impl<T> JsonParser<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

#[cfg(feature = "json")]
impl<T> Default for JsonParser<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "json")]
#[async_trait]
impl<T> Parser<T> for JsonParser<T>
where
    T: serde::de::DeserializeOwned + Send + 'static,
{
    async fn parse(&self, response: Response) -> Result<T, NetError> {
        response.json().await
    }
}

/// Streams the body into a file and yields its path. Parent directories
/// are created as needed.
#[derive(Debug, Clone)]
pub struct FileParser {
    path: PathBuf,
}

impl FileParser {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl Parser<PathBuf> for FileParser {
    async fn parse(&self, mut response: Response) -> Result<PathBuf, NetError> {
        let body = response.take_body().ok_or(NetError::HttpBodyError)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .file_context(parent)?;
        }
        let mut file = tokio::fs::File::create(&self.path)
            .await
            .file_context(&self.path)?;
        let mut stream = body.into_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await.file_context(&self.path)?;
        }
        file.flush().await.file_context(&self.path)?;
        Ok(self.path.clone())
    }
}

/// Notifications for a typed request, run through the client's delivery
/// context. `on_start` and `on_finish` always pair up.
pub trait Listener<T>: Send + Sync {
    fn on_start(&self) {}

    fn on_success(&self, data: T);

    /// `code` is the HTTP status or a negative sentinel from
    /// [`crate::base::status`].
    fn on_failure(&self, code: i32, message: &str);

    fn on_finish(&self) {}
}

/// A request with the parser for its payload type.
pub struct TypedRequest<T> {
    request: Request,
    parser: Arc<dyn Parser<T>>,
    listener: Option<Arc<dyn Listener<T>>>,
}

impl<T> TypedRequest<T> {
    pub fn new(request: Request, parser: impl Parser<T> + 'static) -> Self {
        Self {
            request,
            parser: Arc::new(parser),
            listener: None,
        }
    }

    pub fn listener(mut self, listener: impl Listener<T> + 'static) -> Self {
        self.listener = Some(Arc::new(listener));
        self
    }

    pub fn shared_listener(mut self, listener: Arc<dyn Listener<T>>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn parser(&self) -> &Arc<dyn Parser<T>> {
        &self.parser
    }

    pub(crate) fn into_parts(
        self,
    ) -> (Request, Arc<dyn Parser<T>>, Option<Arc<dyn Listener<T>>>) {
        (self.request, self.parser, self.listener)
    }
}

/// Parse `response`, treating anything but a 200 with a body as a failure.
pub(crate) async fn parse_response<T>(
    parser: &dyn Parser<T>,
    response: Response,
) -> Result<T, NetError> {
    if response.code() != status::OK || response.body().is_none() {
        return Err(NetError::Status {
            code: response.code(),
            message: response.message().to_string(),
        });
    }
    parser.parse(response).await
}

/// The message half of a listener failure.
fn failure_message(error: &NetError) -> String {
    match error {
        NetError::Status { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

/// Adapts a parser and listener to [`Callback`]. The outcome is kept until
/// `on_finish` and then delivered in one notification.
pub(crate) struct ParserCallback<T> {
    parser: Arc<dyn Parser<T>>,
    listener: Option<Arc<dyn Listener<T>>>,
    delivery: Arc<dyn Delivery>,
    outcome: Mutex<Option<Result<T, NetError>>>,
}

impl<T> ParserCallback<T> {
    pub(crate) fn new(
        parser: Arc<dyn Parser<T>>,
        listener: Option<Arc<dyn Listener<T>>>,
        delivery: Arc<dyn Delivery>,
    ) -> Self {
        Self {
            parser,
            listener,
            delivery,
            outcome: Mutex::new(None),
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Callback for ParserCallback<T> {
    fn on_start(&self) {
        if let Some(listener) = self.listener.clone() {
            self.delivery.deliver(Box::new(move || listener.on_start()));
        }
    }

    async fn on_response(&self, _call: &Call, response: Response) -> Result<(), NetError> {
        let parsed = parse_response(self.parser.as_ref(), response).await;
        match parsed {
            Err(e @ NetError::Status { .. }) => {
                *self.outcome.locked() = Some(Err(e));
                Ok(())
            }
            Err(e) => Err(e),
            Ok(data) => {
                *self.outcome.locked() = Some(Ok(data));
                Ok(())
            }
        }
    }

    fn on_failure(&self, _call: &Call, error: NetError) {
        *self.outcome.locked() = Some(Err(error));
    }

    fn on_finish(&self) {
        let Some(listener) = self.listener.clone() else {
            return;
        };
        let outcome = self.outcome.locked().take();
        self.delivery.deliver(Box::new(move || {
            match outcome {
                Some(Ok(data)) => listener.on_success(data),
                Some(Err(e)) => listener.on_failure(e.code(), &failure_message(&e)),
                None => listener.on_failure(status::CONNECT_ERROR, status::CONNECT_ERROR_MSG),
            }
            listener.on_finish();
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ResponseBody;
    use tempfile::TempDir;

    fn ok(body: &'static str) -> Response {
        Response::builder()
            .body(ResponseBody::from_bytes(body, Some("text/plain".into()), None))
            .build()
    }

    #[tokio::test]
    async fn test_string_parser() {
        let text = parse_response(&StringParser, ok("hello")).await.unwrap();
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn test_non_200_is_status_error() {
        let response = Response::builder().code(404).message("Not Found").build();
        let err = parse_response(&StringParser, response).await.unwrap_err();
        assert_eq!(
            err,
            NetError::Status {
                code: 404,
                message: "Not Found".into()
            }
        );
        assert_eq!(err.code(), 404);
        assert_eq!(failure_message(&err), "Not Found");
    }

    #[tokio::test]
    async fn test_missing_body_is_status_error() {
        let response = Response::builder().build();
        let err = parse_response(&BytesParser, response).await.unwrap_err();
        assert!(matches!(err, NetError::Status { code: 200, .. }));
    }

    #[cfg(feature = "json")]
    #[tokio::test]
    async fn test_json_parser() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Item {
            id: u32,
        }
        let item: Item = parse_response(&JsonParser::new(), ok(r#"{"id":7}"#))
            .await
            .unwrap();
        assert_eq!(item, Item { id: 7 });

        let err = parse_response(&JsonParser::<Item>::new(), ok("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, NetError::Parse(_)));
    }

    #[tokio::test]
    async fn test_file_parser_creates_parents() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested/out.txt");
        let path = parse_response(&FileParser::new(&target), ok("saved"))
            .await
            .unwrap();
        assert_eq!(path, target);
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "saved");
    }
}
