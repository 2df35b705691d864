//! File system storage management
//!
//! Handles path resolution, directory listings and listing order.

pub mod operations;
pub mod results;
pub mod sorting;
pub mod validation;

pub use operations::{Child, list_directory, read_children};
pub use results::{Entry, EntryKind, Listing};
pub use sorting::{SortKey, SortOrder};
pub use validation::{ResolvedPath, ServerRoot};
