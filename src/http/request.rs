//! Request description and builder.
//!
//! A [`Request`] is a value object. Once a call takes it the request is
//! frozen and [`Request::new_builder`] refuses to derive a mutable copy.

use crate::base::neterror::NetError;
use crate::http::headers::Headers;
use crate::http::method::Method;
use crate::http::multipart::generate_boundary;
use crate::http::parameters::Parameters;
use crate::http::progress::DownloadListener;
use crate::http::requestbody::RequestBody;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A file attached to a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileBody {
    pub name: String,
    pub content_type: String,
    pub path: PathBuf,
}

impl FileBody {
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            path: path.as_ref().to_path_buf(),
        }
    }
}

/// Check that `url` is an absolute http(s) URL.
pub(crate) fn checked_url(url: &str) -> Result<url::Url, NetError> {
    let parsed = url::Url::parse(url).map_err(|e| NetError::InvalidUrl(format!("{}: {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        _ => Err(NetError::InvalidUrl(format!(
            "{}: the scheme must be http or https",
            url
        ))),
    }
}

#[derive(Clone)]
pub struct Request {
    pub(crate) url: String,
    pub(crate) path: String,
    pub(crate) method: Method,
    pub(crate) params: Parameters,
    pub(crate) files: Vec<FileBody>,
    pub(crate) headers: Headers,
    pub(crate) body: Option<RequestBody>,
    pub(crate) download_listener: Option<Arc<dyn DownloadListener>>,
    pub(crate) boundary: String,
    pub(crate) tag: Option<String>,
    pub(crate) frozen: bool,
}

impl Request {
    pub fn builder() -> RequestBuilder {
        RequestBuilder::new()
    }

    /// Absolute URL; empty means the client's base URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Path resolved against the URL by the bridging stage.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn files(&self) -> &[FileBody] {
        &self.files
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The explicitly set body, if any.
    pub fn body(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }

    pub fn download_listener(&self) -> Option<&Arc<dyn DownloadListener>> {
        self.download_listener.as_ref()
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Cancellation tag. Defaults to the boundary token.
    pub fn tag(&self) -> &str {
        self.tag.as_deref().unwrap_or(&self.boundary)
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// A mutable copy of this request.
    pub fn new_builder(&self) -> Result<RequestBuilder, NetError> {
        if self.frozen {
            return Err(NetError::RequestFrozen);
        }
        Ok(self.to_builder())
    }

    /// Derive a builder regardless of the frozen flag. Pipeline stages use
    /// this to forward a modified copy.
    pub(crate) fn to_builder(&self) -> RequestBuilder {
        RequestBuilder {
            url: self.url.clone(),
            path: self.path.clone(),
            method: self.method,
            params: self.params.clone(),
            files: self.files.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
            download_listener: self.download_listener.clone(),
            boundary: self.boundary.clone(),
            tag: self.tag.clone(),
            error: None,
        }
    }

    pub(crate) fn freeze(mut self) -> Self {
        self.frozen = true;
        self
    }

    /// The body to send: the explicit one, else one built from the
    /// parameters and files.
    pub(crate) async fn request_body(&self) -> Result<Option<RequestBody>, NetError> {
        if let Some(body) = &self.body {
            return Ok(Some(body.clone()));
        }
        RequestBody::build(&self.params, &self.files, &self.boundary).await
    }
}

/// Equality ignores the boundary token and the frozen flag so that two
/// independently built requests for the same exchange compare equal.
impl PartialEq for Request {
    fn eq(&self, other: &Self) -> bool {
        let same_listener = match (&self.download_listener, &other.download_listener) {
            (None, None) => true,
            (Some(a), Some(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
            _ => false,
        };
        same_listener
            && self.url == other.url
            && self.path == other.path
            && self.method == other.method
            && self.params == other.params
            && self.files == other.files
            && self.headers == other.headers
            && self.body == other.body
            && self.tag == other.tag
    }
}

impl Eq for Request {}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("url", &self.url)
            .field("path", &self.path)
            .field("method", &self.method)
            .field("params", &self.params)
            .field("files", &self.files)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("download_listener", &self.download_listener.is_some())
            .field("boundary", &self.boundary)
            .field("tag", &self.tag)
            .field("frozen", &self.frozen)
            .finish()
    }
}

/// Fluent builder for [`Request`].
///
/// The first invalid input is remembered and returned by [`build`].
///
/// [`build`]: RequestBuilder::build
pub struct RequestBuilder {
    url: String,
    path: String,
    method: Method,
    params: Parameters,
    files: Vec<FileBody>,
    headers: Headers,
    body: Option<RequestBody>,
    download_listener: Option<Arc<dyn DownloadListener>>,
    boundary: String,
    tag: Option<String>,
    error: Option<NetError>,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self {
            url: String::new(),
            path: String::new(),
            method: Method::Get,
            params: Parameters::new(),
            files: Vec::new(),
            headers: Headers::new(),
            body: None,
            download_listener: None,
            boundary: generate_boundary(),
            tag: None,
            error: None,
        }
    }

    fn fail(&mut self, err: NetError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    /// Absolute http(s) URL. When unset the client's base URL is used.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        match checked_url(&url) {
            Ok(_) => self.url = url,
            Err(e) => self.fail(e),
        }
        self
    }

    pub fn clear_url(mut self) -> Self {
        self.url.clear();
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn clear_path(mut self) -> Self {
        self.path.clear();
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn get(self) -> Self {
        self.method(Method::Get)
    }

    pub fn head(self) -> Self {
        self.method(Method::Head)
    }

    pub fn trace(self) -> Self {
        self.method(Method::Trace)
    }

    pub fn options(self) -> Self {
        self.method(Method::Options)
    }

    pub fn delete(self) -> Self {
        self.method(Method::Delete)
    }

    pub fn post(self) -> Self {
        self.method(Method::Post)
    }

    pub fn put(self) -> Self {
        self.method(Method::Put)
    }

    pub fn patch(self) -> Self {
        self.method(Method::Patch)
    }

    pub fn add(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.add(name, value);
        self
    }

    pub fn add_if_absent(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.add_if_absent(name, value);
        self
    }

    pub fn set(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.set(name, value);
        self
    }

    pub fn remove(mut self, name: &str) -> Self {
        self.params.remove(name);
        self
    }

    /// Replace all parameters.
    pub fn params(mut self, params: Parameters) -> Self {
        self.params = params;
        self
    }

    pub fn clear_params(mut self) -> Self {
        self.params.clear();
        self
    }

    /// Attach a file. The file must exist when the builder is used.
    pub fn add_file(
        mut self,
        name: impl Into<String>,
        content_type: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> Self {
        let path = path.as_ref();
        if !path.is_file() {
            self.fail(NetError::FileRead {
                path: path.display().to_string(),
                reason: "not a file".to_string(),
            });
            return self;
        }
        self.files.push(FileBody::new(name, content_type, path));
        self
    }

    pub fn clear_files(mut self) -> Self {
        self.files.clear();
        self
    }

    /// Set a header, replacing existing values.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let Err(e) = self.headers.insert(name, value) {
            self.fail(e);
        }
        self
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        if let Err(e) = self.headers.append(name, value) {
            self.fail(e);
        }
        self
    }

    pub fn add_header_if_absent(mut self, name: &str, value: &str) -> Self {
        if let Err(e) = self.headers.insert_if_absent(name, value) {
            self.fail(e);
        }
        self
    }

    pub fn remove_header(mut self, name: &str) -> Self {
        self.headers.remove(name);
        self
    }

    /// Replace all headers.
    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn clear_headers(mut self) -> Self {
        self.headers = Headers::new();
        self
    }

    /// Send `body` instead of one built from parameters and files.
    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn download_listener(mut self, listener: Arc<dyn DownloadListener>) -> Self {
        self.download_listener = Some(listener);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub(crate) fn set_url_unchecked(mut self, url: String) -> Self {
        self.url = url;
        self
    }

    pub(crate) fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn build(self) -> Result<Request, NetError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        Ok(Request {
            url: self.url,
            path: self.path,
            method: self.method,
            params: self.params,
            files: self.files,
            headers: self.headers,
            body: self.body,
            download_listener: self.download_listener,
            boundary: self.boundary,
            tag: self.tag,
            frozen: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let req = Request::builder().build().unwrap();
        assert_eq!(req.method(), Method::Get);
        assert!(req.url().is_empty());
        assert!(!req.is_frozen());
        assert_eq!(req.tag(), req.boundary());
    }

    #[test]
    fn test_rejects_non_http_url() {
        let err = Request::builder().url("ftp://example.com").build().unwrap_err();
        assert!(matches!(err, NetError::InvalidUrl(_)));
    }

    #[test]
    fn test_first_error_wins() {
        let err = Request::builder()
            .header("Bad Header", "x")
            .url("nope")
            .build()
            .unwrap_err();
        assert!(matches!(err, NetError::InvalidHeader(_)));
    }

    #[test]
    fn test_frozen_rejects_new_builder() {
        let req = Request::builder().url("http://a.com").build().unwrap();
        assert!(req.new_builder().is_ok());
        let frozen = req.freeze();
        assert!(matches!(frozen.new_builder(), Err(NetError::RequestFrozen)));
    }

    #[test]
    fn test_equality_ignores_boundary() {
        let a = Request::builder().url("http://a.com").add("k", "v").build().unwrap();
        let b = Request::builder().url("http://a.com").add("k", "v").build().unwrap();
        assert_ne!(a.boundary(), b.boundary());
        assert_eq!(a, b);
        assert_eq!(a.clone().freeze(), b);
    }

    #[test]
    fn test_equality_respects_tag_and_params() {
        let a = Request::builder().url("http://a.com").tag("x").build().unwrap();
        let b = Request::builder().url("http://a.com").tag("y").build().unwrap();
        let c = Request::builder().url("http://a.com").add("k", "v").build().unwrap();
        assert_ne!(a, b);
        assert_ne!(b, c);
    }

    #[test]
    fn test_listener_identity() {
        let listener: Arc<dyn DownloadListener> = Arc::new(|_: u64, _: u64, _: u8| {});
        let other: Arc<dyn DownloadListener> = Arc::new(|_: u64, _: u64, _: u8| {});
        let a = Request::builder()
            .download_listener(listener.clone())
            .build()
            .unwrap();
        let b = Request::builder().download_listener(listener).build().unwrap();
        let c = Request::builder().download_listener(other).build().unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_add_missing_file_fails() {
        let err = Request::builder()
            .post()
            .add_file("f", "text/plain", "/nonexistent/netpipe/upload")
            .build()
            .unwrap_err();
        assert!(matches!(err, NetError::FileRead { .. }));
    }

    #[tokio::test]
    async fn test_explicit_body_wins() {
        let req = Request::builder()
            .post()
            .add("k", "v")
            .body(RequestBody::new("application/json", "{}"))
            .build()
            .unwrap();
        let body = req.request_body().await.unwrap().unwrap();
        assert_eq!(body.content_type(), "application/json");
    }
}
