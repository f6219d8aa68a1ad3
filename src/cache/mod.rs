//! Persistent response cache.
//!
//! [`DiskCache`] is the size-bounded file store shared by every call of a
//! client; [`CacheInterceptor`] is the pipeline stage that consults it.

pub mod cachecontrol;
pub mod diskcache;
pub mod interceptor;

pub use cachecontrol::MaxAge;
pub use diskcache::{DiskCache, Entry, EntryReader, EntryWriter};
pub use interceptor::CacheInterceptor;
