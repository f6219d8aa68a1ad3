//! Synthetic status sentinels.
//!
//! Used as response codes and failure states when no real HTTP exchange
//! took place. Each code is paired with a fixed message.

pub const CONNECT_ERROR: i32 = -100;
pub const CONNECT_ERROR_MSG: &str = "connect error";

pub const DUPLICATE_REQUEST: i32 = -101;
pub const DUPLICATE_REQUEST_MSG: &str = "duplicate request";

pub const REQUEST_CANCELED: i32 = -102;
pub const REQUEST_CANCELED_MSG: &str = "request canceled";

/// The only status for which a response body is read.
pub const OK: i32 = 200;
