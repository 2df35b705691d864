//! Storage result types
//!
//! Defines the values produced by path resolution and directory listing.

use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One object inside a listed directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub kind: EntryKind,
    /// Size in bytes, `None` for directories.
    pub size: Option<u64>,
    pub modified: Option<SystemTime>,
    /// Guessed MIME type, `None` for directories.
    pub mime: Option<String>,
}

impl Entry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Result of a directory listing operation
#[derive(Debug, Clone)]
pub struct Listing {
    pub virtual_path: String,
    pub entries: Vec<Entry>,
    /// Entries left out because they could not be stat-ed, were not valid
    /// UTF-8, or were symlinks leading outside the root.
    pub skipped: usize,
}
