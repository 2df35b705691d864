//! Module `file_ops`
//!
//! Opens resolved files for download and copies them, whole or as a byte
//! range, into the client connection.

use log::{debug, info};
use std::io::SeekFrom;
use std::time::{Duration, SystemTime};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWrite};

use crate::error::{ServeError, TransferError};
use crate::storage::validation::ResolvedPath;
use crate::transfer::deadline::{flush_within, write_all_within};
use crate::transfer::range::{ByteRange, RangeSpec};

/// An open file ready to be streamed to a client.
///
/// The handle is owned here, so it is closed whenever the stream is dropped,
/// including when the copy is abandoned halfway.
#[derive(Debug)]
pub struct FileStream {
    file: File,
    virtual_path: String,
    file_name: String,
    total_length: u64,
    content_type: String,
    modified: Option<SystemTime>,
    range: Option<ByteRange>,
}

impl FileStream {
    /// Opens a resolved file and applies an optional range.
    ///
    /// Metadata is taken from the open handle, so a file removed after
    /// resolution reports `NotFound` rather than stale values.
    pub async fn open(
        resolved: &ResolvedPath,
        range: Option<RangeSpec>,
    ) -> Result<Self, ServeError> {
        let virtual_path = resolved.virtual_path.clone();
        let file = File::open(&resolved.real_path)
            .await
            .map_err(|e| ServeError::from_io(e, &virtual_path))?;
        let metadata = file
            .metadata()
            .await
            .map_err(|e| ServeError::from_io(e, &virtual_path))?;

        if !metadata.is_file() {
            return Err(ServeError::NotFound(virtual_path));
        }

        let total_length = metadata.len();
        let range = range.map(|spec| spec.resolve(total_length)).transpose()?;

        let file_name = resolved
            .real_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content_type = mime_guess::from_path(&resolved.real_path)
            .first_or_octet_stream()
            .to_string();

        debug!(
            "Opened {} ({} bytes, range {:?})",
            virtual_path, total_length, range
        );

        Ok(Self {
            file,
            virtual_path,
            file_name,
            total_length,
            content_type,
            modified: metadata.modified().ok(),
            range,
        })
    }

    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    /// Number of bytes the response body will carry.
    pub fn content_length(&self) -> u64 {
        self.range.map_or(self.total_length, |r| r.len())
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    pub fn range(&self) -> Option<ByteRange> {
        self.range
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Copies the selected bytes into `writer` in file order.
    ///
    /// Stops at the first failed write, or at a write the client leaves
    /// pending for longer than `write_timeout`. The file handle is released
    /// when `self` drops on return.
    pub async fn copy_to<W>(
        mut self,
        writer: &mut W,
        buffer_size: usize,
        write_timeout: Duration,
    ) -> Result<u64, TransferError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut total_bytes_sent = 0u64;
        let read_failed = |source, sent| TransferError::Read { source, sent };

        let start = self.range.map_or(0, |r| r.start);
        if start > 0 {
            self.file
                .seek(SeekFrom::Start(start))
                .await
                .map_err(|e| read_failed(e, 0))?;
        }

        let mut remaining = self.content_length();
        let mut buffer = vec![0u8; buffer_size.max(1)];

        while remaining > 0 {
            let want = remaining.min(buffer.len() as u64) as usize;
            let n = self
                .file
                .read(&mut buffer[..want])
                .await
                .map_err(|e| read_failed(e, total_bytes_sent))?;
            if n == 0 {
                return Err(read_failed(
                    std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "file shrank during transfer",
                    ),
                    total_bytes_sent,
                ));
            }

            write_all_within(writer, &buffer[..n], write_timeout)
                .await
                .map_err(|source| TransferError::Write {
                    source,
                    sent: total_bytes_sent,
                })?;

            remaining -= n as u64;
            total_bytes_sent += n as u64;
        }

        flush_within(writer, write_timeout)
            .await
            .map_err(|source| TransferError::Write {
                source,
                sent: total_bytes_sent,
            })?;

        info!(
            "File download completed: {} ({} bytes)",
            self.virtual_path, total_bytes_sent
        );
        Ok(total_bytes_sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ServerRoot;
    use std::fs;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tempfile::TempDir;

    /// Accepts `limit` bytes, then fails like a socket whose peer went away.
    struct BrokenPipe {
        accepted: Vec<u8>,
        limit: usize,
    }

    impl AsyncWrite for BrokenPipe {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            let room = self.limit - self.accepted.len();
            if room == 0 {
                return Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()));
            }
            let n = room.min(buf.len());
            self.accepted.extend_from_slice(&buf[..n]);
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn setup(contents: &[u8]) -> (TempDir, ServerRoot) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("data.bin"), contents).unwrap();
        let root = ServerRoot::new(dir.path()).unwrap();
        (dir, root)
    }

    const PATIENCE: Duration = Duration::from_secs(5);

    fn sample_bytes(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 251) as u8).collect()
    }

    #[tokio::test]
    async fn test_full_copy_matches_disk() {
        let bytes = sample_bytes(100_000);
        let (_dir, root) = setup(&bytes);
        let resolved = root.resolve("/data.bin").unwrap();

        let stream = FileStream::open(&resolved, None).await.unwrap();
        assert_eq!(stream.content_length(), bytes.len() as u64);
        assert_eq!(stream.content_type(), "application/octet-stream");

        let mut out = Vec::new();
        let sent = stream.copy_to(&mut out, 4096, PATIENCE).await.unwrap();
        assert_eq!(sent, bytes.len() as u64);
        assert_eq!(out, bytes);
    }

    #[tokio::test]
    async fn test_range_copy_matches_slice() {
        let bytes = sample_bytes(64);
        let (_dir, root) = setup(&bytes);
        let resolved = root.resolve("/data.bin").unwrap();

        let stream = FileStream::open(&resolved, Some(RangeSpec::FromTo(10, 19)))
            .await
            .unwrap();
        assert_eq!(stream.content_length(), 10);
        assert_eq!(stream.total_length(), 64);

        let mut out = Vec::new();
        stream.copy_to(&mut out, 3, PATIENCE).await.unwrap();
        assert_eq!(out, &bytes[10..20]);
    }

    #[tokio::test]
    async fn test_unsatisfiable_range_is_rejected_on_open() {
        let (_dir, root) = setup(b"short");
        let resolved = root.resolve("/data.bin").unwrap();
        let err = FileStream::open(&resolved, Some(RangeSpec::From(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, ServeError::RangeNotSatisfiable(5)));
    }

    #[tokio::test]
    async fn test_file_removed_after_resolution_is_not_found() {
        let (dir, root) = setup(b"soon gone");
        let resolved = root.resolve("/data.bin").unwrap();
        fs::remove_file(dir.path().join("data.bin")).unwrap();

        let err = FileStream::open(&resolved, None).await.unwrap_err();
        assert!(matches!(err, ServeError::NotFound(p) if p == "/data.bin"));
    }

    #[tokio::test]
    async fn test_disconnect_aborts_copy() {
        let bytes = sample_bytes(50_000);
        let (_dir, root) = setup(&bytes);
        let resolved = root.resolve("/data.bin").unwrap();

        let stream = FileStream::open(&resolved, None).await.unwrap();
        let mut writer = BrokenPipe {
            accepted: Vec::new(),
            limit: 1000,
        };
        let err = stream.copy_to(&mut writer, 256, PATIENCE).await.unwrap_err();

        assert!(matches!(err, TransferError::Write { .. }));
        // Three whole chunks went out before the fourth write failed
        assert_eq!(err.sent(), 768);
        assert_eq!(writer.accepted, &bytes[..1000]);
    }

    #[tokio::test]
    async fn test_client_that_stops_reading_times_out() {
        let bytes = sample_bytes(256 * 1024);
        let (_dir, root) = setup(&bytes);
        let resolved = root.resolve("/data.bin").unwrap();

        let stream = FileStream::open(&resolved, None).await.unwrap();
        // Peer stays open but never reads
        let (_peer, mut writer) = tokio::io::duplex(4096);

        let started = std::time::Instant::now();
        let err = stream
            .copy_to(&mut writer, 1024, Duration::from_millis(100))
            .await
            .unwrap_err();

        match err {
            TransferError::Write { source, sent } => {
                assert_eq!(source.kind(), std::io::ErrorKind::TimedOut);
                assert_eq!(sent, 4096);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
