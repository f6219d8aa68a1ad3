//! HTTP Response with body access.

use crate::base::neterror::NetError;
use crate::base::status;
use crate::http::headers::Headers;
use crate::http::responsebody::ResponseBody;
use bytes::Bytes;

/// The outcome of an exchange, real or synthetic.
///
/// `code` is an HTTP status for real exchanges and one of the negative
/// sentinels in [`status`] otherwise.
#[derive(Debug)]
pub struct Response {
    code: i32,
    message: String,
    headers: Headers,
    body: Option<ResponseBody>,
}

impl Response {
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder::default()
    }

    /// The response returned when no exchange could take place and no
    /// cached copy exists.
    pub fn connect_error() -> Self {
        Self {
            code: status::CONNECT_ERROR,
            message: status::CONNECT_ERROR_MSG.to_string(),
            headers: Headers::new(),
            body: None,
        }
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> Option<&ResponseBody> {
        self.body.as_ref()
    }

    pub fn is_successful(&self) -> bool {
        self.code == status::OK
    }

    /// Take the response body for consumption.
    /// Can only be called once - subsequent calls return None.
    pub fn take_body(&mut self) -> Option<ResponseBody> {
        self.body.take()
    }

    pub fn into_builder(self) -> ResponseBuilder {
        ResponseBuilder {
            code: self.code,
            message: self.message,
            headers: self.headers,
            body: self.body,
        }
    }

    /// Convenience method to consume body as bytes.
    pub async fn bytes(mut self) -> Result<Bytes, NetError> {
        self.body.take().ok_or(NetError::HttpBodyError)?.bytes().await
    }

    /// Convenience method to consume body as text.
    pub async fn text(mut self) -> Result<String, NetError> {
        self.body.take().ok_or(NetError::HttpBodyError)?.text().await
    }

    /// Convenience method to consume body as JSON.
    #[cfg(feature = "json")]
    pub async fn json<T: serde::de::DeserializeOwned>(mut self) -> Result<T, NetError> {
        self.body.take().ok_or(NetError::HttpBodyError)?.json().await
    }
}

#[derive(Debug)]
pub struct ResponseBuilder {
    code: i32,
    message: String,
    headers: Headers,
    body: Option<ResponseBody>,
}

impl Default for ResponseBuilder {
    fn default() -> Self {
        Self {
            code: status::OK,
            message: "OK".to_string(),
            headers: Headers::new(),
            body: None,
        }
    }
}

impl ResponseBuilder {
    pub fn code(mut self, code: i32) -> Self {
        self.code = code;
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn body(mut self, body: ResponseBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn clear_body(mut self) -> Self {
        self.body = None;
        self
    }

    pub fn take_body(&mut self) -> Option<ResponseBody> {
        self.body.take()
    }

    pub fn build(self) -> Response {
        Response {
            code: self.code,
            message: self.message,
            headers: self.headers,
            body: self.body,
        }
    }
}
