//! Logging middleware
//!
//! Provides connection and access logging.

use log::{debug, info};
use std::net::SocketAddr;

use crate::protocol::request::Request;
use crate::protocol::responses::Status;

/// Log a client connection
pub fn log_connection(client_addr: &SocketAddr) {
    debug!("Client connected: {}", client_addr);
}

/// One access-log line per answered request
pub fn log_request(client_addr: &SocketAddr, request: &Request, status: Status, bytes: u64) {
    info!(
        "{} \"{} {}\" {} {}",
        client_addr,
        request.method.as_str(),
        request.target(),
        status.code(),
        bytes
    );
}

/// Log a client disconnect
pub fn log_disconnect(client_addr: &SocketAddr, requests: usize) {
    debug!(
        "Client {} disconnected after {} requests",
        client_addr, requests
    );
}
