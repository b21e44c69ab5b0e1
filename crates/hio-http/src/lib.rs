//! # hio-http
//!
//! HTTP/1.1 request parsing and response serialization, kept as thin
//! collaborator contracts so the workspace builds and runs end-to-end
//! without coupling the ring/task layers to a wire format.

mod request;
mod response;

pub use request::{parse_request, Request};
pub use response::Response;
