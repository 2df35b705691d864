//! Time-bounded writes to the client.
//!
//! A peer that stops reading without closing fills the socket buffer and
//! would park a plain `write_all` forever.

use std::io;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

fn stalled(limit: Duration) -> io::Error {
    io::Error::new(
        io::ErrorKind::TimedOut,
        format!("client accepted no data for {limit:?}"),
    )
}

pub async fn write_all_within<W>(writer: &mut W, buf: &[u8], limit: Duration) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    timeout(limit, writer.write_all(buf))
        .await
        .map_err(|_| stalled(limit))?
}

pub async fn flush_within<W>(writer: &mut W, limit: Duration) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    timeout(limit, writer.flush())
        .await
        .map_err(|_| stalled(limit))?
}
