//! Request/response model.

pub mod headers;
pub mod method;
pub mod multipart;
pub mod parameters;
pub mod progress;
pub mod request;
pub mod requestbody;
pub mod response;
pub mod responsebody;

// Re-exports for convenience
pub use headers::Headers;
pub use method::Method;
pub use parameters::Parameters;
pub use progress::DownloadListener;
pub use request::{FileBody, Request, RequestBuilder};
pub use requestbody::RequestBody;
pub use response::{Response, ResponseBuilder};
pub use responsebody::{BodyStream, ResponseBody};
