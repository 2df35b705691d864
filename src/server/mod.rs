//! Server core functionality
//!
//! This module contains the listener, configuration and the state shared
//! by all connections.

pub mod config;
pub mod context;
pub mod core;

pub use config::ServerConfig;
pub use context::ServerContext;
pub use self::core::Server;
