//! Request handlers for the browse server.
//!
//! Dispatches a parsed request to the resolver, then renders a listing page
//! for directories, streams file contents or a directory archive, and turns
//! every failure into a short plain-text error response.

use log::{error, info};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::handlers::{error_to_status, handle_error};
use crate::error::{ServeError, TransferError};
use crate::protocol::render::render_listing;
use crate::protocol::request::{Method, Request, Version};
use crate::protocol::responses::{ResponseHead, Status, http_date};
use crate::server::ServerContext;
use crate::storage::{EntryKind, Listing, ResolvedPath, SortOrder, list_directory};
use crate::transfer::{ArchiveStream, FileStream, parse_range_header};

/// What was sent back for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Served {
    pub status: Status,
    /// Body bytes written.
    pub bytes: u64,
    /// The connection must not be reused, e.g. after a cut-short stream.
    pub close: bool,
}

enum Target {
    Listing(Listing),
    File(ResolvedPath),
    Archive(ResolvedPath),
}

/// Answers one request.
///
/// Only fails when the response itself could not be written.
pub async fn handle_request<W>(
    request: &Request,
    context: &Arc<ServerContext>,
    writer: &mut W,
) -> io::Result<Served>
where
    W: AsyncWrite + Unpin,
{
    if request.method != Method::Get {
        let err = ServeError::MethodNotAllowed(request.method.as_str().to_string());
        return write_error(writer, request, &err).await;
    }
    if !request.path.starts_with('/') {
        let err = ServeError::InvalidInput(format!("no resource at {}", request.path));
        return write_error(writer, request, &err).await;
    }

    let order = request
        .query_param("sort")
        .and_then(|raw| SortOrder::parse(&raw))
        .unwrap_or_default();

    let download = request.query_param("download").is_some();

    match resolve_target(request.path.clone(), order, download, context).await {
        Ok(Target::Listing(listing)) => {
            let archive_link = context.config.directory_downloadable;
            serve_listing(writer, request, &listing, order, archive_link).await
        }
        Ok(Target::File(resolved)) => serve_file(writer, request, &resolved, context).await,
        Ok(Target::Archive(resolved)) => serve_archive(writer, request, &resolved, context).await,
        Err(err) => write_error(writer, request, &err).await,
    }
}

/// Resolution and listing touch the filesystem synchronously, so they run on
/// the blocking pool.
async fn resolve_target(
    path: String,
    order: SortOrder,
    download: bool,
    context: &Arc<ServerContext>,
) -> Result<Target, ServeError> {
    let context = Arc::clone(context);
    tokio::task::spawn_blocking(move || -> Result<Target, ServeError> {
        let resolved = context.root.resolve(&path)?;
        match resolved.kind {
            EntryKind::Directory if download => {
                if !context.config.directory_downloadable {
                    return Err(ServeError::NotFound(resolved.virtual_path));
                }
                Ok(Target::Archive(resolved))
            }
            EntryKind::Directory => {
                list_directory(&context.root, &resolved, order).map(Target::Listing)
            }
            EntryKind::File => Ok(Target::File(resolved)),
        }
    })
    .await
    .map_err(|e| ServeError::Io(io::Error::other(e)))?
}

async fn serve_listing<W>(
    writer: &mut W,
    request: &Request,
    listing: &Listing,
    order: SortOrder,
    archive_link: bool,
) -> io::Result<Served>
where
    W: AsyncWrite + Unpin,
{
    let body = render_listing(listing, order, archive_link);
    let head = ResponseHead::new(Status::Ok)
        .header("Content-Type", "text/html; charset=utf-8")
        .header("Content-Length", body.len().to_string());
    let head = with_connection(head, request);

    head.write_to(writer).await?;
    writer.write_all(body.as_bytes()).await?;
    writer.flush().await?;

    Ok(Served {
        status: head.status,
        bytes: body.len() as u64,
        close: false,
    })
}

async fn serve_file<W>(
    writer: &mut W,
    request: &Request,
    resolved: &ResolvedPath,
    context: &ServerContext,
) -> io::Result<Served>
where
    W: AsyncWrite + Unpin,
{
    let range = request.header("range").and_then(parse_range_header);
    let stream = match FileStream::open(resolved, range).await {
        Ok(stream) => stream,
        Err(err) => return write_error(writer, request, &err).await,
    };

    let head = match stream.range() {
        Some(range) => ResponseHead::new(Status::PartialContent)
            .header("Content-Range", range.content_range(stream.total_length())),
        None => ResponseHead::new(Status::Ok),
    };
    let mut head = head
        .header("Content-Type", stream.content_type())
        .header("Content-Length", stream.content_length().to_string())
        .header("Accept-Ranges", "bytes");
    if let Some(modified) = stream.modified().and_then(http_date) {
        head = head.header("Last-Modified", modified);
    }
    if request.query_param("download").is_some() {
        head = head.header("Content-Disposition", attachment(stream.file_name()));
    }
    let head = with_connection(head, request);
    head.write_to(writer).await?;

    let status = head.status;
    let content_length = stream.content_length();
    let config = &context.config;
    match stream
        .copy_to(writer, config.buffer_size, config.connection_timeout())
        .await
    {
        Ok(bytes) => Ok(Served {
            status,
            bytes,
            close: false,
        }),
        Err(err) => {
            match &err {
                TransferError::Write { .. } => info!(
                    "Client aborted download of {}: {}",
                    resolved.virtual_path, err
                ),
                TransferError::Read { .. } => error!(
                    "Streaming {} ({} bytes announced) failed: {}",
                    resolved.virtual_path, content_length, err
                ),
            }
            Ok(Served {
                status,
                bytes: err.sent(),
                close: true,
            })
        }
    }
}

/// Streams a directory as `.tgz`. The length is unknown when the head goes
/// out, so the body ends with the connection.
async fn serve_archive<W>(
    writer: &mut W,
    request: &Request,
    resolved: &ResolvedPath,
    context: &ServerContext,
) -> io::Result<Served>
where
    W: AsyncWrite + Unpin,
{
    let config = &context.config;
    let stream = match ArchiveStream::start(&context.root, resolved, config.archive_buffer_size) {
        Ok(stream) => stream,
        Err(err) => return write_error(writer, request, &err).await,
    };

    let head = ResponseHead::new(Status::Ok)
        .header("Content-Type", "application/gzip")
        .header("Content-Disposition", attachment(stream.file_name()))
        .header("Connection", "close");
    head.write_to(writer).await?;

    let bytes = match stream.copy_to(writer, config.connection_timeout()).await {
        Ok(bytes) => bytes,
        Err(err) => {
            match &err {
                TransferError::Write { .. } => info!(
                    "Client aborted archive of {}: {}",
                    resolved.virtual_path, err
                ),
                TransferError::Read { .. } => error!(
                    "Archiving {} failed: {}",
                    resolved.virtual_path, err
                ),
            }
            err.sent()
        }
    };

    Ok(Served {
        status: head.status,
        bytes,
        close: true,
    })
}

async fn write_error<W>(writer: &mut W, request: &Request, err: &ServeError) -> io::Result<Served>
where
    W: AsyncWrite + Unpin,
{
    handle_error(err);

    let mut head = ResponseHead::new(error_to_status(err));
    match err {
        ServeError::MethodNotAllowed(_) => head = head.header("Allow", "GET"),
        ServeError::RangeNotSatisfiable(len) => {
            head = head.header("Content-Range", format!("bytes */{len}"))
        }
        _ => {}
    }
    let head = with_connection(head, request);
    let bytes = write_status_body(writer, head).await?;

    Ok(Served {
        status: error_to_status(err),
        bytes,
        close: false,
    })
}

/// Writes `head` with a short plain-text body naming its status. Paths and
/// OS error text never reach the client.
pub async fn write_status_body<W>(writer: &mut W, head: ResponseHead) -> io::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let body = format!("{} {}\n", head.status.code(), head.status.reason());
    let head = head
        .header("Content-Type", "text/plain; charset=utf-8")
        .header("Content-Length", body.len().to_string());

    head.write_to(writer).await?;
    writer.write_all(body.as_bytes()).await?;
    writer.flush().await?;
    Ok(body.len() as u64)
}

fn with_connection(head: ResponseHead, request: &Request) -> ResponseHead {
    match (request.version, request.keep_alive()) {
        (Version::Http11, false) => head.header("Connection", "close"),
        (Version::Http10, true) => head.header("Connection", "keep-alive"),
        _ => head,
    }
}

/// `Content-Disposition` value with an ASCII fallback and an RFC 5987 name.
fn attachment(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| {
            if c == ' ' || (c.is_ascii_graphic() && c != '"' && c != '\\') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        utf8_percent_encode(file_name, NON_ALPHANUMERIC)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ServerConfig;
    use crate::storage::ServerRoot;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<ServerContext>) {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("numbers.txt"), b"0123456789abcdefghij").unwrap();
        fs::write(dir.path().join("sub/caf\u{e9}.txt"), b"coffee").unwrap();
        let root = ServerRoot::new(dir.path()).unwrap();
        let config = ServerConfig {
            buffer_size: 7,
            ..ServerConfig::default()
        };
        (dir, Arc::new(ServerContext::new(root, config)))
    }

    fn get(target: &str, headers: &[(&str, &str)]) -> Request {
        let (path, query) = match target.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (target.to_string(), None),
        };
        Request {
            method: Method::Get,
            path,
            query,
            version: Version::Http11,
            headers: headers
                .iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
        }
    }

    async fn run(request: Request, context: &Arc<ServerContext>) -> (Served, String, Vec<u8>) {
        let mut out = Vec::new();
        let served = handle_request(&request, context, &mut out).await.unwrap();
        let split = out.windows(4).position(|w| w == b"\r\n\r\n").unwrap();
        let head = String::from_utf8(out[..split].to_vec()).unwrap();
        (served, head, out[split + 4..].to_vec())
    }

    #[tokio::test]
    async fn test_directory_renders_listing() {
        let (_dir, context) = setup();
        let (served, head, body) = run(get("/", &[]), &context).await;

        assert_eq!(served.status, Status::Ok);
        assert!(head.starts_with("HTTP/1.1 200 OK"));
        assert!(head.contains("Content-Type: text/html; charset=utf-8"));
        let body = String::from_utf8(body).unwrap();
        let sub = body.find("href=\"/sub/\"").unwrap();
        let file = body.find("href=\"/numbers.txt\"").unwrap();
        assert!(sub < file);
    }

    #[tokio::test]
    async fn test_file_is_streamed_whole() {
        let (_dir, context) = setup();
        let (served, head, body) = run(get("/numbers.txt", &[]), &context).await;

        assert_eq!(served.status, Status::Ok);
        assert_eq!(served.bytes, 20);
        assert!(head.contains("Content-Length: 20"));
        assert!(head.contains("Content-Type: text/plain"));
        assert!(head.contains("Accept-Ranges: bytes"));
        assert!(head.contains("Last-Modified: "));
        assert_eq!(body, b"0123456789abcdefghij");
    }

    #[tokio::test]
    async fn test_range_returns_partial_content() {
        let (_dir, context) = setup();
        let (served, head, body) =
            run(get("/numbers.txt", &[("range", "bytes=10-19")]), &context).await;

        assert_eq!(served.status, Status::PartialContent);
        assert!(head.starts_with("HTTP/1.1 206 Partial Content"));
        assert!(head.contains("Content-Range: bytes 10-19/20"));
        assert!(head.contains("Content-Length: 10"));
        assert_eq!(body, b"abcdefghij");
    }

    #[tokio::test]
    async fn test_unsatisfiable_range() {
        let (_dir, context) = setup();
        let (served, head, _body) =
            run(get("/numbers.txt", &[("range", "bytes=50-")]), &context).await;

        assert_eq!(served.status, Status::RangeNotSatisfiable);
        assert!(head.contains("Content-Range: bytes */20"));
    }

    #[tokio::test]
    async fn test_traversal_is_forbidden_without_leaking_paths() {
        let (dir, context) = setup();
        let (served, _head, body) = run(get("/../etc/passwd", &[]), &context).await;

        assert_eq!(served.status, Status::Forbidden);
        let body = String::from_utf8(body).unwrap();
        assert_eq!(body, "403 Forbidden\n");
        assert!(!body.contains(&dir.path().display().to_string()));
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let (_dir, context) = setup();
        let (served, head, body) = run(get("/nope", &[]), &context).await;
        assert_eq!(served.status, Status::NotFound);
        assert!(head.contains("Content-Type: text/plain; charset=utf-8"));
        assert_eq!(body, b"404 Not Found\n");
    }

    #[tokio::test]
    async fn test_non_get_is_rejected() {
        let (_dir, context) = setup();
        let mut request = get("/numbers.txt", &[]);
        request.method = Method::Other("DELETE".into());
        let (served, head, _body) = run(request, &context).await;

        assert_eq!(served.status, Status::MethodNotAllowed);
        assert!(head.contains("Allow: GET"));
    }

    #[tokio::test]
    async fn test_asterisk_target() {
        let (_dir, context) = setup();
        let mut request = get("*", &[]);
        request.method = Method::Other("OPTIONS".into());
        let (served, head, _body) = run(request, &context).await;
        assert_eq!(served.status, Status::MethodNotAllowed);
        assert!(head.contains("Allow: GET"));

        let (served, _head, _body) = run(get("*", &[]), &context).await;
        assert_eq!(served.status, Status::BadRequest);
    }

    #[tokio::test]
    async fn test_download_sets_disposition() {
        let (_dir, context) = setup();
        let (_served, head, body) = run(get("/sub/caf%C3%A9.txt?download", &[]), &context).await;

        assert!(head.contains(
            "Content-Disposition: attachment; filename=\"caf_.txt\"; filename*=UTF-8''caf%C3%A9%2Etxt"
        ));
        assert_eq!(body, b"coffee");
    }

    #[tokio::test]
    async fn test_directory_download_streams_archive() {
        let (_dir, context) = setup();
        let (served, head, body) = run(get("/sub/?download", &[]), &context).await;

        assert_eq!(served.status, Status::Ok);
        assert!(served.close);
        assert!(head.contains("Content-Type: application/gzip"));
        assert!(head.contains("filename=\"sub.tgz\""));
        assert!(head.contains("Connection: close"));
        assert!(!head.contains("Content-Length"));
        assert_eq!(served.bytes, body.len() as u64);
        // gzip magic
        assert_eq!(&body[..2], &[0x1f, 0x8b]);
    }

    #[tokio::test]
    async fn test_directory_download_can_be_disabled() {
        let (dir, _context) = setup();
        let config = ServerConfig {
            directory_downloadable: false,
            ..ServerConfig::default()
        };
        let context = Arc::new(ServerContext::new(ServerRoot::new(dir.path()).unwrap(), config));

        let (served, _head, _body) = run(get("/sub/?download", &[]), &context).await;
        assert_eq!(served.status, Status::NotFound);

        let (_served, _head, body) = run(get("/", &[]), &context).await;
        assert!(!String::from_utf8(body).unwrap().contains("?download"));
    }

    #[tokio::test]
    async fn test_connection_close_is_echoed() {
        let (_dir, context) = setup();
        let (_served, head, _body) = run(get("/", &[("connection", "close")]), &context).await;
        assert!(head.contains("Connection: close"));
    }
}
