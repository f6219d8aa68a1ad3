//! Response body streaming.

use crate::base::neterror::NetError;
use crate::http::headers::Headers;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use futures::Stream;
use std::fmt;

/// A lazily read stream of body chunks.
pub type BodyStream = BoxStream<'static, Result<Bytes, NetError>>;

/// Response body with its declared metadata.
///
/// The stream is read at most once; every accessor that reads it consumes
/// the body.
pub struct ResponseBody {
    stream: BodyStream,
    content_type: Option<String>,
    content_length: Option<u64>,
    charset: Option<String>,
}

impl ResponseBody {
    pub fn from_stream<S>(
        stream: S,
        content_type: Option<String>,
        content_length: Option<u64>,
        charset: Option<String>,
    ) -> Self
    where
        S: Stream<Item = Result<Bytes, NetError>> + Send + 'static,
    {
        Self {
            stream: stream.boxed(),
            content_type,
            content_length,
            charset,
        }
    }

    /// A body whose metadata is read from the response headers.
    pub fn from_headers<S>(stream: S, headers: &Headers) -> Self
    where
        S: Stream<Item = Result<Bytes, NetError>> + Send + 'static,
    {
        Self::from_stream(
            stream,
            headers.content_type().map(str::to_string),
            headers.content_length(),
            headers.charset().map(str::to_string),
        )
    }

    /// An in-memory body; the declared length is the buffer size.
    pub fn from_bytes(
        bytes: impl Into<Bytes>,
        content_type: Option<String>,
        charset: Option<String>,
    ) -> Self {
        let bytes = bytes.into();
        let len = bytes.len() as u64;
        Self::from_stream(
            stream::once(async move { Ok(bytes) }),
            content_type,
            Some(len),
            charset,
        )
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// The declared length, if the producer announced one.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn charset(&self) -> Option<&str> {
        self.charset.as_deref()
    }

    /// Split into metadata and stream so a stage can wrap the stream.
    pub fn into_parts(self) -> (BodyStream, Option<String>, Option<u64>, Option<String>) {
        (
            self.stream,
            self.content_type,
            self.content_length,
            self.charset,
        )
    }

    pub fn into_stream(self) -> BodyStream {
        self.stream
    }

    /// Read entire body as bytes.
    pub async fn bytes(self) -> Result<Bytes, NetError> {
        let capacity = self
            .content_length
            .and_then(|len| usize::try_from(len).ok())
            .unwrap_or(0)
            .min(8 * 1024 * 1024);
        let buf = self
            .stream
            .try_fold(BytesMut::with_capacity(capacity), |mut buf, chunk| async move {
                buf.extend_from_slice(&chunk);
                Ok(buf)
            })
            .await?;
        Ok(buf.freeze())
    }

    /// Read body as UTF-8 string.
    pub async fn text(self) -> Result<String, NetError> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|_| NetError::InvalidUtf8)
    }

    /// Read body as JSON, deserializing to type T.
    #[cfg(feature = "json")]
    pub async fn json<T: serde::de::DeserializeOwned>(self) -> Result<T, NetError> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| NetError::Parse(e.to_string()))
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .field("charset", &self.charset)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_bytes() {
        let body = ResponseBody::from_bytes("hello", Some("text/plain".into()), None);
        assert_eq!(body.content_length(), Some(5));
        assert_eq!(body.content_type(), Some("text/plain"));
        assert_eq!(body.text().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_stream_concatenates_chunks() {
        let chunks = vec![Ok(Bytes::from("ab")), Ok(Bytes::from("cd"))];
        let body = ResponseBody::from_stream(stream::iter(chunks), None, None, None);
        assert_eq!(body.bytes().await.unwrap(), Bytes::from("abcd"));
    }

    #[tokio::test]
    async fn test_stream_error_surfaces() {
        let chunks = vec![Ok(Bytes::from("ab")), Err(NetError::ConnectionAborted)];
        let body = ResponseBody::from_stream(stream::iter(chunks), None, None, None);
        assert_eq!(body.bytes().await.unwrap_err(), NetError::ConnectionAborted);
    }

    #[tokio::test]
    async fn test_invalid_utf8() {
        let body = ResponseBody::from_bytes(vec![0xff, 0xfe], None, None);
        assert_eq!(body.text().await.unwrap_err(), NetError::InvalidUtf8);
    }

    #[tokio::test]
    async fn test_metadata_from_headers() {
        let mut headers = Headers::new();
        headers
            .insert("Content-Type", "application/json; charset=utf-8")
            .unwrap();
        headers.insert("Content-Length", "2").unwrap();
        let body = ResponseBody::from_headers(stream::iter(vec![Ok(Bytes::from("{}"))]), &headers);
        assert_eq!(body.content_type(), Some("application/json"));
        assert_eq!(body.charset(), Some("utf-8"));
        assert_eq!(body.content_length(), Some(2));
    }

    #[cfg(feature = "json")]
    #[tokio::test]
    async fn test_json() {
        let body = ResponseBody::from_bytes(r#"{"id":7}"#, None, None);
        let value: serde_json::Value = body.json().await.unwrap();
        assert_eq!(value["id"], 7);
    }
}
