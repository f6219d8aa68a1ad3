use crate::base::neterror::NetError;
use crate::http::{Response, ResponseBody};
use crate::interceptor::{Interceptor, Step};
use async_trait::async_trait;
use std::time::Instant;

const TEXTUAL_MARKERS: [&str; 5] = ["charset", "text", "htm", "json", "urlencoded"];

/// Logs each exchange through `tracing`.
///
/// Textual response bodies are buffered so they can be logged, and the
/// response is rebuilt around the buffer with a matching `Content-Length`.
/// Install it as a tail stage to see the bridged request.
#[derive(Debug, Clone)]
pub struct LoggingInterceptor {
    log_bodies: bool,
}

impl Default for LoggingInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingInterceptor {
    pub fn new() -> Self {
        Self { log_bodies: true }
    }

    /// Skip buffering and logging of response bodies.
    pub fn without_bodies() -> Self {
        Self { log_bodies: false }
    }

    fn is_textual(content_type: &str) -> bool {
        let content_type = content_type.to_ascii_lowercase();
        TEXTUAL_MARKERS.iter().any(|m| content_type.contains(m))
    }
}

#[async_trait]
impl Interceptor for LoggingInterceptor {
    async fn intercept(&self, step: Step<'_>) -> Result<Response, NetError> {
        let request = step.request().clone();
        let start = Instant::now();
        let result = step.forward().await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            method = %request.method(),
            url = %request.url(),
            elapsed_ms,
            "Exchange finished"
        );
        for (name, value) in request.headers().iter() {
            tracing::debug!(name = %name, value = ?value, "request header");
        }
        if request.method().has_body() {
            for (name, value) in request.params().iter() {
                tracing::debug!(name, value, "request parameter");
            }
            for file in request.files() {
                tracing::debug!(name = %file.name, path = %file.path.display(), "request file");
            }
        }

        let mut response = match result {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(error = %e, "Exchange failed");
                return Err(e);
            }
        };

        tracing::debug!(code = response.code(), message = %response.message(), "response");
        for (name, value) in response.headers().iter() {
            tracing::debug!(name = %name, value = ?value, "response header");
        }

        if !self.log_bodies {
            return Ok(response);
        }
        let textual = response
            .headers()
            .value("Content-Type")
            .is_some_and(Self::is_textual);
        if !textual {
            return Ok(response);
        }
        let Some(body) = response.take_body() else {
            return Ok(response);
        };

        let content_type = body.content_type().map(str::to_string);
        let charset = body.charset().map(str::to_string);
        let bytes = body.bytes().await?;
        tracing::debug!(content = %String::from_utf8_lossy(&bytes), "response content");

        let mut builder = response.into_builder();
        builder
            .headers_mut()
            .insert("Content-Length", &bytes.len().to_string())?;
        Ok(builder
            .body(ResponseBody::from_bytes(bytes, content_type, charset))
            .build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_textual_filter() {
        assert!(LoggingInterceptor::is_textual("text/plain"));
        assert!(LoggingInterceptor::is_textual("application/json"));
        assert!(LoggingInterceptor::is_textual("application/octet-stream; charset=utf-8"));
        assert!(LoggingInterceptor::is_textual("application/x-www-form-urlencoded"));
        assert!(!LoggingInterceptor::is_textual("image/png"));
    }
}
