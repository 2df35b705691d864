//! Shared, read-only state handed to every connection.

use crate::protocol::parser::Limits;
use crate::server::config::ServerConfig;
use crate::storage::ServerRoot;

#[derive(Debug)]
pub struct ServerContext {
    pub root: ServerRoot,
    pub config: ServerConfig,
}

impl ServerContext {
    pub fn new(root: ServerRoot, config: ServerConfig) -> Self {
        Self { root, config }
    }

    pub fn limits(&self) -> Limits {
        Limits {
            max_request_line: self.config.max_request_line,
            max_headers: self.config.max_headers,
        }
    }
}
