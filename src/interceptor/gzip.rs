//! Transparent gzip content coding.

use crate::base::neterror::NetError;
use crate::http::{BodyStream, Response, ResponseBody};
use crate::interceptor::{Interceptor, Step};
use async_trait::async_trait;
use bytes::Bytes;
use flate2::write::GzDecoder;
use futures::StreamExt;
use std::io::Write;

/// Requests gzip when the caller expressed no encoding preference, and
/// decodes gzip responses it asked for.
#[derive(Debug, Clone, Copy)]
pub struct GzipInterceptor {
    enabled: bool,
}

impl GzipInterceptor {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

#[async_trait]
impl Interceptor for GzipInterceptor {
    async fn intercept(&self, step: Step<'_>) -> Result<Response, NetError> {
        if !self.enabled {
            return step.forward().await;
        }

        let headers = step.request().headers();
        let transparent = !headers.contains("Accept-Encoding") && !headers.contains("Range");
        if !transparent {
            return step.forward().await;
        }

        let request = step
            .request_builder()
            .add_header("Accept-Encoding", "gzip")
            .build()?;
        let mut response = step.proceed(request).await?;

        let gzipped = response
            .headers()
            .value("Content-Encoding")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("gzip"));
        if !gzipped {
            return Ok(response);
        }
        let Some(body) = response.take_body() else {
            return Ok(response);
        };

        let mut builder = response.into_builder();
        builder.headers_mut().remove("Content-Encoding");
        builder.headers_mut().remove("Content-Length");
        let (stream, content_type, _, charset) = body.into_parts();
        let body = ResponseBody::from_stream(gunzip(stream), content_type, None, charset);
        Ok(builder.body(body).build())
    }
}

fn decode_error(e: std::io::Error) -> NetError {
    NetError::ContentDecodingFailed(e.to_string())
}

/// Decode a gzip body chunk by chunk.
pub(crate) fn gunzip(stream: BodyStream) -> BodyStream {
    futures::stream::unfold(
        Some((stream, GzDecoder::new(Vec::new()))),
        |state| async move {
            let (mut stream, mut decoder) = state?;
            loop {
                match stream.next().await {
                    Some(Ok(chunk)) => {
                        if let Err(e) = decoder.write_all(&chunk) {
                            return Some((Err(decode_error(e)), None));
                        }
                        let out = std::mem::take(decoder.get_mut());
                        if !out.is_empty() {
                            return Some((Ok(Bytes::from(out)), Some((stream, decoder))));
                        }
                    }
                    Some(Err(e)) => return Some((Err(e), None)),
                    None => {
                        return match decoder.finish() {
                            Ok(rest) if rest.is_empty() => None,
                            Ok(rest) => Some((Ok(Bytes::from(rest)), None)),
                            Err(e) => Some((Err(decode_error(e)), None)),
                        };
                    }
                }
            }
        },
    )
    .boxed()
}
