//! Calls and their scheduling.
//!
//! A [`Call`] binds one frozen request to a client's [`RequestContext`] and
//! its own connection. The [`Dispatcher`] bounds how many enqueued calls
//! run at once, rejects duplicates and cancels calls by tag.

pub mod call;
pub mod context;
pub mod delivery;
pub mod dispatcher;

pub use call::{Call, Callback};
pub use context::{CacheConfig, ClientConfig, RequestContext};
pub use delivery::{ChannelDelivery, Delivery, DeliveryQueue, InlineDelivery};
pub use dispatcher::Dispatcher;
