//! Cache stage: serves and persists responses of body-less requests.

use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use crate::cache::cachecontrol::{self, MaxAge, CACHE_DATE_HEADER};
use crate::cache::diskcache::DiskCache;
use crate::http::{Headers, Request, Response, ResponseBody};
use crate::interceptor::bridge::resolve_url;
use crate::interceptor::{Interceptor, Step};
use async_trait::async_trait;
use bytes::Bytes;
use md5::{Digest, Md5};
use std::io::{Read, Write};
use url::form_urlencoded;

const BODY_SUFFIX: &str = "_body";
const HEADER_SUFFIX: &str = "_header";

/// Looks up and stores responses in a [`DiskCache`].
///
/// Freshness is driven by the request's `X-Max-Age` header. Responses other
/// than a 200 with a body, and transport failures, fall back to any cached
/// copy or to [`Response::connect_error`].
pub struct CacheInterceptor {
    cache: DiskCache,
    base_url: String,
    ignored_names: Vec<String>,
    force_cached: bool,
}

impl CacheInterceptor {
    pub fn new(cache: DiskCache) -> Self {
        Self {
            cache,
            base_url: String::new(),
            ignored_names: Vec::new(),
            force_cached: false,
        }
    }

    /// Base URL for requests that only carry a path.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Query parameter names left out of the cache key.
    pub fn ignored_query_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Never touch the network; answer from the cache or with a connect
    /// error.
    pub fn force_cached(mut self, force: bool) -> Self {
        self.force_cached = force;
        self
    }

    pub fn cache(&self) -> &DiskCache {
        &self.cache
    }

    /// Stable key of `request`: the MD5 of its resolved URL without query,
    /// followed by the sorted query and parameter pairs minus ignored names.
    pub fn stable_key(&self, request: &Request) -> Result<String, NetError> {
        let mut url = resolve_url(&self.base_url, request)?;
        let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        if let Some(query) = request.params().to_query() {
            pairs.extend(form_urlencoded::parse(query.as_bytes()).into_owned());
        }
        pairs.retain(|(name, _)| !self.ignored_names.iter().any(|i| i == name));
        pairs.sort();

        url.set_query(None);
        url.set_fragment(None);
        let mut identity = url.to_string();
        if !pairs.is_empty() {
            identity.push('?');
            identity.push_str(
                &form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(&pairs)
                    .finish(),
            );
        }
        Ok(hex::encode(Md5::digest(identity.as_bytes())))
    }

    async fn load(&self, key: &str) -> Option<Response> {
        let cache = self.cache.clone();
        let owned_key = key.to_string();
        let result = tokio::task::spawn_blocking(move || read_entry(&cache, &owned_key))
            .await
            .map_err(|e| NetError::CacheIo {
                key: key.to_string(),
                reason: e.to_string(),
            })
            .and_then(|r| r);
        match result {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!(error = %e, "Cache read failed");
                None
            }
        }
    }

    async fn fallback(&self, key: &str) -> Response {
        match self.load(key).await {
            Some(cached) => {
                tracing::debug!(key, "Serving cached response after network failure");
                cached
            }
            None => Response::connect_error(),
        }
    }

    /// Buffer a 200 response, persist it and return it with a matching
    /// `Content-Length`.
    async fn store(&self, key: &str, mut response: Response) -> Result<Response, NetError> {
        let Some(body) = response.take_body() else {
            return Ok(self.fallback(key).await);
        };
        let content_type = body.content_type().map(str::to_string);
        let charset = body.charset().map(str::to_string);
        let bytes = match body.bytes().await {
            Ok(bytes) => bytes,
            Err(e) if e.is_transport() => {
                tracing::debug!(key, error = %e, "Response body failed, falling back to cache");
                return Ok(self.fallback(key).await);
            }
            Err(e) => return Err(e),
        };

        let mut builder = response.into_builder();
        builder
            .headers_mut()
            .replace_if_exists("Content-Length", &bytes.len().to_string())?;

        let mut stored = builder.headers_mut().clone();
        stored.insert(CACHE_DATE_HEADER, &cachecontrol::now_millis().to_string())?;
        let cache = self.cache.clone();
        let owned_key = key.to_string();
        let payload = bytes.clone();
        let saved =
            tokio::task::spawn_blocking(move || write_entry(&cache, &owned_key, &stored, &payload))
                .await;
        match saved {
            Ok(Ok(())) => tracing::debug!(key, bytes = bytes.len(), "Cached response"),
            Ok(Err(e)) => tracing::warn!(key, error = %e, "Cache write failed"),
            Err(e) => tracing::warn!(key, error = %e, "Cache write task failed"),
        }

        Ok(builder
            .body(ResponseBody::from_bytes(bytes, content_type, charset))
            .build())
    }
}

#[async_trait]
impl Interceptor for CacheInterceptor {
    async fn intercept(&self, step: Step<'_>) -> Result<Response, NetError> {
        if step.request().method().has_body() {
            return step.forward().await;
        }
        let key = match self.stable_key(step.request()) {
            Ok(key) => key,
            Err(e) => {
                tracing::debug!(error = %e, "Request is not cacheable");
                return step.forward().await;
            }
        };

        if self.force_cached {
            return Ok(match self.load(&key).await {
                Some(cached) => cached,
                None => {
                    tracing::debug!(key, "Forced cache miss");
                    Response::connect_error()
                }
            });
        }

        let max_age = MaxAge::from_headers(step.request().headers());
        if max_age.consults_cache() {
            if let Some(cached) = self.load(&key).await {
                let saved = cachecontrol::cache_date(cached.headers());
                if max_age.is_fresh(saved, cachecontrol::now_millis()) {
                    tracing::debug!(key, "Cache hit");
                    return Ok(cached);
                }
                tracing::debug!(key, "Cached response is stale");
            }
        }

        match step.forward().await {
            Ok(response) if response.code() == 200 && response.body().is_some() => {
                self.store(&key, response).await
            }
            Ok(response) => {
                tracing::debug!(key, code = response.code(), "Unusable network response");
                Ok(self.fallback(&key).await)
            }
            Err(e) if e.is_transport() => {
                tracing::debug!(key, error = %e, "Network failed");
                Ok(self.fallback(&key).await)
            }
            Err(e) => Err(e),
        }
    }
}

fn read_entry(cache: &DiskCache, key: &str) -> Result<Option<Response>, NetError> {
    let header_key = format!("{}{}", key, HEADER_SUFFIX);
    let body_key = format!("{}{}", key, BODY_SUFFIX);
    let header_entry = cache.entry(&header_key)?;
    let body_entry = cache.entry(&body_key)?;

    let (Some(mut header_reader), Some(mut body_reader)) =
        (header_entry.open_reader()?, body_entry.open_reader()?)
    else {
        return Ok(None);
    };

    let mut text = String::new();
    let mut data = Vec::new();
    let read = header_reader
        .read_to_string(&mut text)
        .cache_context(&header_key)
        .and_then(|_| body_reader.read_to_end(&mut data).cache_context(&body_key));
    if let Err(e) = read {
        drop(header_reader);
        drop(body_reader);
        header_entry.require_delete();
        body_entry.require_delete();
        return Err(e);
    }

    let headers = Headers::parse_multiline(&text);
    let body = ResponseBody::from_bytes(
        Bytes::from(data),
        headers.content_type().map(str::to_string),
        headers.charset().map(str::to_string),
    );
    Ok(Some(
        Response::builder()
            .code(200)
            .message("OK")
            .headers(headers)
            .body(body)
            .build(),
    ))
}

fn write_entry(
    cache: &DiskCache,
    key: &str,
    headers: &Headers,
    data: &[u8],
) -> Result<(), NetError> {
    let header_key = format!("{}{}", key, HEADER_SUFFIX);
    let body_key = format!("{}{}", key, BODY_SUFFIX);
    let header_entry = cache.entry(&header_key)?;
    let body_entry = cache.entry(&body_key)?;

    // Both halves commit together or not at all.
    let Some(mut body_writer) = body_entry.open_writer()? else {
        tracing::debug!(key, "Cache entry is being written elsewhere");
        return Ok(());
    };
    let mut header_writer = match header_entry.open_writer() {
        Ok(Some(writer)) => writer,
        Ok(None) => {
            tracing::debug!(key, "Cache entry is being written elsewhere");
            body_writer.abort();
            return Ok(());
        }
        Err(e) => {
            body_writer.abort();
            return Err(e);
        }
    };
    if let Err(e) = body_writer
        .write_all(data)
        .and_then(|_| body_writer.flush())
    {
        header_writer.abort();
        return Err(e).cache_context(&body_key);
    }
    if let Err(e) = header_writer
        .write_all(headers.to_multiline().as_bytes())
        .and_then(|_| header_writer.flush())
    {
        body_writer.abort();
        return Err(e).cache_context(&header_key);
    }
    Ok(())
}
