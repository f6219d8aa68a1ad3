//! # netpipe
//!
//! An HTTP client engine built around an interceptor pipeline.
//!
//! A [`Request`] is turned into a [`Call`](urlrequest::Call) by a
//! [`Client`]. Every call runs the same ordered stage list:
//!
//! ```text
//! head stages -> bridge -> cache -> tail stages -> gzip -> connect
//! ```
//!
//! Calls run inline with `execute` or through the client's
//! [`Dispatcher`](urlrequest::Dispatcher), which bounds how many enqueued
//! calls run at once, rejects duplicates and cancels calls by tag. The
//! optional disk cache persists 200 responses of body-less requests and
//! answers from them according to the request's `X-Max-Age` header.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use netpipe::{Client, Request};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), netpipe::NetError> {
//!     let client = Client::builder("http://example.com/").build()?;
//!     let request = Request::builder().path("status").build()?;
//!     let response = client.execute(request).await?;
//!     println!("{} {}", response.code(), response.text().await?);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error type, status sentinels and call states
//! - [`cache`] - Disk cache and the cache stage
//! - [`cookies`] - Header store seam and cookie jar
//! - [`http`] - Request and response model
//! - [`interceptor`] - The pipeline and its built-in stages
//! - [`parser`] - Typed requests and response parsers
//! - [`transport`] - Connection seam and the hyper transport
//! - [`urlrequest`] - Calls, dispatcher, configuration and delivery

pub mod base;
pub mod cache;
pub mod client;
pub mod cookies;
pub mod http;
pub mod interceptor;
pub mod parser;
pub mod transport;
pub mod urlrequest;

pub use base::neterror::NetError;
pub use client::{Client, ClientBuilder};
pub use http::{Headers, Method, Request, RequestBuilder, Response};
