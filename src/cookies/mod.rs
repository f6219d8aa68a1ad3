//! Externally persisted headers.
//!
//! The bridging stage asks a [`HeaderStore`] for headers to merge into every
//! outgoing request and hands it the headers of every response. The usual
//! implementation is a cookie jar ([`CookieJar`]).

pub mod jar;

use crate::http::Headers;

pub use jar::{CookieJar, StoredCookie};

pub trait HeaderStore: Send + Sync {
    /// Headers to add to a request for `url`. Headers the request already
    /// carries are not overridden.
    fn load_for_request(&self, url: &str) -> Headers;

    /// Observe the response headers of an exchange with `url`.
    fn save_from_response(&self, url: &str, headers: &Headers);
}
