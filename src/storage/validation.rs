//! Path validation
//!
//! Resolves client request paths against the server root and enforces that
//! nothing outside the root is ever reachable, including through symlinks.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use percent_encoding::percent_decode_str;

use crate::error::{ServeError, StartupError};
use crate::storage::results::EntryKind;

/// The directory exposed by the server, canonicalized once at startup.
#[derive(Debug, Clone)]
pub struct ServerRoot {
    path: PathBuf,
}

/// A request path that resolved to an existing object inside the root.
#[derive(Debug, Clone)]
pub struct ResolvedPath {
    /// Canonical filesystem path, always inside the root.
    pub real_path: PathBuf,
    /// Normalized client-facing path, `/` for the root itself.
    pub virtual_path: String,
    pub kind: EntryKind,
}

impl ServerRoot {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StartupError> {
        let path = path.as_ref();
        let invalid = |reason: String| StartupError::InvalidRoot {
            path: path.to_path_buf(),
            reason,
        };

        let canonical = fs::canonicalize(path).map_err(|e| invalid(e.to_string()))?;
        if !canonical.is_dir() {
            return Err(invalid("not a directory".into()));
        }

        Ok(Self { path: canonical })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Component-wise containment check: `/srv/rootEVIL` is not inside `/srv/root`.
    pub fn contains(&self, candidate: &Path) -> bool {
        candidate.starts_with(&self.path)
    }

    /// Resolves an untrusted, percent-encoded request path.
    ///
    /// Fails with `InvalidInput` on undecodable input, `Forbidden` when the
    /// path would leave the root (lexically or through a symlink), and
    /// `NotFound`/`PermissionDenied`/`Io` when the target cannot be reached.
    /// Special files (sockets, fifos, devices) are reported as `NotFound`.
    pub fn resolve(&self, request_path: &str) -> Result<ResolvedPath, ServeError> {
        let segments = normalize_request_path(request_path)?;
        let virtual_path = virtual_path_of(&segments);

        let mut joined = self.path.clone();
        joined.extend(&segments);

        let canonical =
            fs::canonicalize(&joined).map_err(|e| ServeError::from_io(e, &virtual_path))?;
        if !self.contains(&canonical) {
            debug!(
                "{} resolved to {} outside of root",
                virtual_path,
                canonical.display()
            );
            return Err(ServeError::Forbidden(virtual_path));
        }

        let metadata =
            fs::metadata(&canonical).map_err(|e| ServeError::from_io(e, &virtual_path))?;
        let kind = if metadata.is_dir() {
            EntryKind::Directory
        } else if metadata.is_file() {
            EntryKind::File
        } else {
            return Err(ServeError::NotFound(virtual_path));
        };

        Ok(ResolvedPath {
            real_path: canonical,
            virtual_path,
            kind,
        })
    }
}

/// Decodes and lexically normalizes a request path into its segments.
///
/// Empty and `.` segments are dropped and `..` pops the previous segment.
/// A `..` that would climb above the root is rejected as `Forbidden`.
pub fn normalize_request_path(raw: &str) -> Result<Vec<String>, ServeError> {
    let decoded = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| ServeError::InvalidInput("path is not valid UTF-8".into()))?;

    if decoded.contains('\0') {
        return Err(ServeError::InvalidInput("path contains NUL".into()));
    }

    let mut segments: Vec<String> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                if segments.pop().is_none() {
                    return Err(ServeError::Forbidden(raw.to_string()));
                }
            }
            other => segments.push(other.to_string()),
        }
    }

    Ok(segments)
}

/// Joins normalized segments into a client-facing path.
pub fn virtual_path_of(segments: &[String]) -> String {
    format!("/{}", segments.join("/"))
}
