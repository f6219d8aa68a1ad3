//! Base types and error handling.
//!
//! - [`NetError`](neterror::NetError): the crate-wide error type
//! - [`status`]: synthetic status codes for exchanges that never happened
//! - [`CallState`](callstate::CallState): lifecycle of a call

pub mod callstate;
pub mod context;
pub mod neterror;
pub mod status;
