//! Transfer module
//!
//! Streams file contents to clients, optionally restricted to a byte range,
//! and whole directories as gzip-compressed tar archives.

pub mod archive;
pub mod deadline;
pub mod file_ops;
pub mod range;

pub use archive::ArchiveStream;
pub use file_ops::FileStream;
pub use range::{ByteRange, RangeSpec, parse_range_header};
