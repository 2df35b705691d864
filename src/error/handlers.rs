//! Error handlers
//!
//! Maps request errors onto HTTP statuses and logs them.

use log::{debug, error, warn};

use crate::error::types::{ParseError, ServeError};
use crate::protocol::responses::Status;

/// Log a request error at a level matching its severity
pub fn handle_error(err: &ServeError) {
    match err {
        ServeError::Io(_) => error!("Request failed: {}", err),
        ServeError::Forbidden(_) | ServeError::PermissionDenied(_) => {
            warn!("Request refused: {}", err)
        }
        _ => debug!("Request rejected: {}", err),
    }
}

/// Convert error to HTTP status
pub fn error_to_status(err: &ServeError) -> Status {
    match err {
        ServeError::InvalidInput(_) => Status::BadRequest,
        ServeError::Forbidden(_) => Status::Forbidden,
        ServeError::NotFound(_) => Status::NotFound,
        ServeError::PermissionDenied(_) => Status::Forbidden,
        ServeError::Io(_) => Status::InternalServerError,
        ServeError::MethodNotAllowed(_) => Status::MethodNotAllowed,
        ServeError::RangeNotSatisfiable(_) => Status::RangeNotSatisfiable,
    }
}

/// Convert a request head parse failure to HTTP status, `None` for I/O faults
/// where no response can be sent.
pub fn parse_error_to_status(err: &ParseError) -> Option<Status> {
    match err {
        ParseError::Malformed(_) => Some(Status::BadRequest),
        ParseError::RequestLineTooLong(_) => Some(Status::UriTooLong),
        ParseError::HeadersTooLarge => Some(Status::HeaderFieldsTooLarge),
        ParseError::UnsupportedVersion(_) => Some(Status::VersionNotSupported),
        ParseError::Io(_) => None,
    }
}
