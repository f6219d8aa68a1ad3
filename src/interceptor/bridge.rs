//! Turns a caller's request into one the transport can send.

use crate::base::neterror::NetError;
use crate::cookies::HeaderStore;
use crate::http::progress::with_progress;
use crate::http::request::checked_url;
use crate::http::{Request, Response};
use crate::interceptor::{Interceptor, Step};
use async_trait::async_trait;
use std::sync::Arc;
use url::Url;

pub struct BridgeInterceptor {
    base_url: String,
    user_agent: String,
    header_store: Option<Arc<dyn HeaderStore>>,
}

impl BridgeInterceptor {
    pub fn new(
        base_url: impl Into<String>,
        user_agent: impl Into<String>,
        header_store: Option<Arc<dyn HeaderStore>>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            user_agent: user_agent.into(),
            header_store,
        }
    }

    async fn bridge(&self, request: &Request) -> Result<(Request, String), NetError> {
        let mut url = resolve_url(&self.base_url, request)?;
        let mut builder = request.to_builder();

        if !request.method().has_body() {
            if let Some(query) = request.params().to_query() {
                let query = match url.query() {
                    Some(existing) if !existing.is_empty() => format!("{}&{}", existing, query),
                    _ => query,
                };
                url.set_query(Some(&query));
                builder = builder.clear_params();
            }
        } else if let Some(body) = request.request_body().await? {
            let headers = builder.headers_mut();
            headers.insert("Content-Type", body.content_type())?;
            if body.content_length() > 0 {
                headers.insert("Content-Length", &body.content_length().to_string())?;
                headers.remove("Transfer-Encoding");
            } else {
                headers.insert("Transfer-Encoding", "chunked")?;
                headers.remove("Content-Length");
            }
            // Attach the built body so later stages do not rebuild it
            builder = builder.body(body);
        }

        let url_string = url.to_string();
        if let Some(store) = &self.header_store {
            let stored = store.load_for_request(&url_string);
            let headers = builder.headers_mut();
            for (name, value) in &stored {
                if !headers.contains(name.as_str()) {
                    headers.set(name.clone(), value.clone());
                }
            }
        }

        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(NetError::InvalidUrl(url_string)),
        };
        let headers = builder.headers_mut();
        headers.insert_if_absent("Host", &host)?;
        headers.insert_if_absent("Connection", "Keep-Alive")?;
        headers.insert_if_absent("User-Agent", &self.user_agent)?;

        let bridged = builder
            .set_url_unchecked(url_string.clone())
            .clear_path()
            .build()?;
        Ok((bridged, url_string))
    }
}

/// The request URL (or `base_url` when empty) with the request path
/// resolved against it.
pub(crate) fn resolve_url(base_url: &str, request: &Request) -> Result<Url, NetError> {
    let base = if request.url().is_empty() {
        base_url
    } else {
        request.url()
    };
    let url = checked_url(base)?;
    if request.path().is_empty() {
        return Ok(url);
    }
    let joined = url
        .join(request.path())
        .map_err(|e| NetError::InvalidUrl(format!("{} + {}: {}", url, request.path(), e)))?;
    checked_url(joined.as_str())
}

#[async_trait]
impl Interceptor for BridgeInterceptor {
    async fn intercept(&self, step: Step<'_>) -> Result<Response, NetError> {
        let (bridged, url) = self.bridge(step.request()).await?;
        let listener = step.request().download_listener().cloned();

        let mut response = step.proceed(bridged).await?;

        if let Some(store) = &self.header_store {
            store.save_from_response(&url, response.headers());
        }
        if let Some(listener) = listener {
            if let Some(body) = response.take_body() {
                let body = with_progress(body, listener);
                response = response.into_builder().body(body).build();
            }
        }
        Ok(response)
    }
}
