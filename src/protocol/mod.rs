//! HTTP protocol implementation
//!
//! Handles request parsing, request dispatch and response generation.

pub mod handlers;
pub mod parser;
pub mod render;
pub mod request;
pub mod responses;

pub use handlers::{Served, handle_request};
pub use parser::{Limits, read_request};
pub use request::{Method, Request, Version};
pub use responses::{ResponseHead, Status};
