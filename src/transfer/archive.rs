//! Directory archives
//!
//! Packs a directory tree into a `.tgz` on the blocking pool and hands the
//! compressed bytes to the connection task in chunks, so archives of any
//! size stream without being buffered whole.

use flate2::Compression;
use flate2::write::GzEncoder;
use log::{debug, info, warn};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{ServeError, TransferError};
use crate::storage::operations::read_children;
use crate::storage::results::EntryKind;
use crate::storage::validation::{ResolvedPath, ServerRoot};
use crate::transfer::deadline::{flush_within, write_all_within};

/// Chunks in flight between the archiver and the socket.
const CHANNEL_DEPTH: usize = 4;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveStats {
    pub files: usize,
    pub directories: usize,
    pub skipped: usize,
}

/// A directory archive being produced in the background.
///
/// Dropping the stream closes the channel, which makes the archiver's next
/// write fail and releases every file it holds open.
#[derive(Debug)]
pub struct ArchiveStream {
    chunks: mpsc::Receiver<Vec<u8>>,
    archiver: JoinHandle<io::Result<ArchiveStats>>,
    virtual_path: String,
    file_name: String,
}

impl ArchiveStream {
    /// Starts archiving `directory`; entries are filtered exactly like listings.
    pub fn start(
        root: &ServerRoot,
        directory: &ResolvedPath,
        chunk_size: usize,
    ) -> Result<Self, ServeError> {
        if directory.kind != EntryKind::Directory {
            return Err(ServeError::NotFound(directory.virtual_path.clone()));
        }

        let base_name = archive_base_name(&directory.real_path);
        let file_name = format!("{base_name}.tgz");
        let (tx, chunks) = mpsc::channel(CHANNEL_DEPTH);

        let root = root.clone();
        let source = directory.real_path.clone();
        let archiver = tokio::task::spawn_blocking(move || {
            let out = ChunkSender::new(tx, chunk_size);
            write_archive(&root, &source, Path::new(&base_name), out)
        });

        debug!("Started archive of {}", directory.virtual_path);

        Ok(Self {
            chunks,
            archiver,
            virtual_path: directory.virtual_path.clone(),
            file_name,
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Forwards archive bytes into `writer` until the archive is complete.
    ///
    /// The body length is unknown up front, so callers delimit it by closing
    /// the connection.
    pub async fn copy_to<W>(mut self, writer: &mut W, write_timeout: Duration) -> Result<u64, TransferError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut sent = 0u64;
        while let Some(chunk) = self.chunks.recv().await {
            write_all_within(writer, &chunk, write_timeout)
                .await
                .map_err(|source| TransferError::Write { source, sent })?;
            sent += chunk.len() as u64;
        }

        let stats = match self.archiver.await {
            Ok(Ok(stats)) => stats,
            Ok(Err(source)) => return Err(TransferError::Read { source, sent }),
            Err(join) => {
                return Err(TransferError::Read {
                    source: io::Error::other(join),
                    sent,
                });
            }
        };

        flush_within(writer, write_timeout)
            .await
            .map_err(|source| TransferError::Write { source, sent })?;

        info!(
            "Directory archive completed: {} ({} files, {} directories, {} skipped, {} bytes)",
            self.virtual_path, stats.files, stats.directories, stats.skipped, sent
        );
        Ok(sent)
    }
}

fn archive_base_name(directory: &Path) -> String {
    directory
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "root".to_string())
}

/// Writes `source` as a gzip-compressed tar whose entries sit under `prefix`.
pub fn write_archive<W: Write>(
    root: &ServerRoot,
    source: &Path,
    prefix: &Path,
    out: W,
) -> io::Result<ArchiveStats> {
    let mut builder = tar::Builder::new(GzEncoder::new(out, Compression::default()));
    let mut stats = ArchiveStats::default();

    builder.append_dir(prefix, source)?;
    stats.directories += 1;

    let mut ancestors = vec![source.to_path_buf()];
    append_children(&mut builder, root, source, prefix, &mut ancestors, &mut stats)?;

    let mut out = builder.into_inner()?.finish()?;
    out.flush()?;
    Ok(stats)
}

fn append_children<W: Write>(
    builder: &mut tar::Builder<W>,
    root: &ServerRoot,
    directory: &Path,
    name: &Path,
    ancestors: &mut Vec<PathBuf>,
    stats: &mut ArchiveStats,
) -> io::Result<()> {
    let label = name.to_string_lossy();
    let (children, skipped) = match read_children(root, directory, &label) {
        Ok(found) => found,
        Err(e) => {
            warn!("Skipping unreadable directory {} in archive: {}", label, e);
            stats.skipped += 1;
            return Ok(());
        }
    };
    stats.skipped += skipped;

    for child in children {
        let child_name = name.join(&child.entry.name);

        if child.entry.is_dir() {
            // In-root symlinks may point back up the tree
            if ancestors.contains(&child.source) {
                warn!("Skipping {} in archive: directory cycle", child_name.display());
                stats.skipped += 1;
                continue;
            }
            builder.append_dir(&child_name, &child.source)?;
            stats.directories += 1;

            ancestors.push(child.source.clone());
            append_children(builder, root, &child.source, &child_name, ancestors, stats)?;
            ancestors.pop();
            continue;
        }

        match std::fs::File::open(&child.source) {
            Ok(mut file) => {
                builder.append_file(&child_name, &mut file)?;
                stats.files += 1;
            }
            Err(e) => {
                warn!("Skipping {} in archive: {}", child_name.display(), e);
                stats.skipped += 1;
            }
        }
    }

    Ok(())
}

/// Blocking writer that batches bytes into chunks for the connection task.
struct ChunkSender {
    tx: mpsc::Sender<Vec<u8>>,
    pending: Vec<u8>,
    chunk_size: usize,
}

impl ChunkSender {
    fn new(tx: mpsc::Sender<Vec<u8>>, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            tx,
            pending: Vec::with_capacity(chunk_size),
            chunk_size,
        }
    }

    fn send_pending(&mut self) -> io::Result<()> {
        let chunk = std::mem::replace(&mut self.pending, Vec::with_capacity(self.chunk_size));
        self.tx
            .blocking_send(chunk)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "archive consumer went away"))
    }
}

impl Write for ChunkSender {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        if self.pending.len() >= self.chunk_size {
            self.send_pending()?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.send_pending()
    }
}
