//! Client connection handling
//!
//! Runs the request loop for one accepted connection.

pub mod handler;

pub use handler::handle_client;
