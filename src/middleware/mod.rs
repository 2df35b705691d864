//! Server middleware
//!
//! Provides access logging.

pub mod logging;
