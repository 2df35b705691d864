//! Storage operations
//!
//! Builds directory listings for resolved paths.

use log::{info, warn};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ServeError;
use crate::storage::results::{Entry, EntryKind, Listing};
use crate::storage::sorting::{SortOrder, sort_entries};
use crate::storage::validation::{ResolvedPath, ServerRoot};

/// A directory item that passed the listing filters.
#[derive(Debug, Clone)]
pub struct Child {
    pub entry: Entry,
    /// Where the data lives: the item itself, or the canonical target of an
    /// in-root symlink.
    pub source: PathBuf,
}

/// Lists the contents of a resolved directory.
///
/// Entries that cannot be described are skipped with a warning and counted
/// in [`Listing::skipped`]; only failing to read the directory itself fails
/// the listing.
pub fn list_directory(
    root: &ServerRoot,
    directory: &ResolvedPath,
    order: SortOrder,
) -> Result<Listing, ServeError> {
    let virtual_path = &directory.virtual_path;
    if directory.kind != EntryKind::Directory {
        return Err(ServeError::NotFound(virtual_path.clone()));
    }

    let (children, skipped) = read_children(root, &directory.real_path, virtual_path)?;
    let mut entries: Vec<Entry> = children.into_iter().map(|child| child.entry).collect();
    sort_entries(&mut entries, order);

    info!(
        "Listed directory {} - {} entries, {} skipped",
        virtual_path,
        entries.len(),
        skipped
    );

    Ok(Listing {
        virtual_path: virtual_path.clone(),
        entries,
        skipped,
    })
}

/// Reads one directory level in directory order, applying the same filters
/// as listings: unreadable items, non-UTF-8 names, special files and
/// symlinks that are dangling or leave the root are skipped and counted.
pub fn read_children(
    root: &ServerRoot,
    directory: &Path,
    virtual_path: &str,
) -> Result<(Vec<Child>, usize), ServeError> {
    let read_dir = fs::read_dir(directory).map_err(|e| ServeError::from_io(e, virtual_path))?;

    let mut children = Vec::new();
    let mut skipped = 0;

    for item in read_dir {
        let item = match item {
            Ok(item) => item,
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {}", virtual_path, e);
                skipped += 1;
                continue;
            }
        };

        match describe_entry(root, &item.path(), item.file_name()) {
            Ok(child) => children.push(child),
            Err(reason) => {
                warn!(
                    "Skipping {:?} in {}: {}",
                    item.file_name(),
                    virtual_path,
                    reason
                );
                skipped += 1;
            }
        }
    }

    Ok((children, skipped))
}

/// Stats one directory item, following symlinks only while they stay inside the root.
fn describe_entry(root: &ServerRoot, path: &Path, file_name: OsString) -> Result<Child, String> {
    let name = file_name
        .into_string()
        .map_err(|_| "name is not valid UTF-8".to_string())?;

    let link_metadata = fs::symlink_metadata(path).map_err(|e| e.to_string())?;
    let (source, metadata) = if link_metadata.file_type().is_symlink() {
        let target = fs::canonicalize(path).map_err(|e| format!("dangling symlink: {e}"))?;
        if !root.contains(&target) {
            return Err("symlink leads outside the server root".into());
        }
        let metadata = fs::metadata(&target).map_err(|e| e.to_string())?;
        (target, metadata)
    } else {
        (path.to_path_buf(), link_metadata)
    };

    let modified = metadata.modified().ok();
    let entry = if metadata.is_dir() {
        Entry {
            name,
            kind: EntryKind::Directory,
            size: None,
            modified,
            mime: None,
        }
    } else if metadata.is_file() {
        let mime = mime_guess::from_path(&name)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Entry {
            name,
            kind: EntryKind::File,
            size: Some(metadata.len()),
            modified,
            mime: Some(mime),
        }
    } else {
        return Err("not a regular file or directory".into());
    };

    Ok(Child { entry, source })
}
