//! HTTP request parsing
//!
//! Reads a request head (request line plus headers) off a buffered stream,
//! enforcing size limits on every line.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::error::ParseError;
use crate::protocol::request::{Method, Request, Version};

/// Bounds applied while reading a request head.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_request_line: usize,
    pub max_headers: usize,
}

/// Reads the next request head.
///
/// Returns `Ok(None)` when the peer closed the connection before sending
/// anything. Blank lines ahead of the request line are skipped.
pub async fn read_request<R>(reader: &mut R, limits: Limits) -> Result<Option<Request>, ParseError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();

    let request_line = loop {
        match read_line_limited(reader, limits.max_request_line, &mut buf).await {
            Ok(None) => return Ok(None),
            Ok(Some(line)) if line.is_empty() => continue,
            Ok(Some(line)) => break line,
            Err(ParseError::HeadersTooLarge) => {
                return Err(ParseError::RequestLineTooLong(limits.max_request_line));
            }
            Err(e) => return Err(e),
        }
    };

    let (method, target, version) = parse_request_line(&request_line)?;
    let (path, query) = split_target(target)?;

    let mut headers = Vec::new();
    loop {
        let line = read_line_limited(reader, limits.max_request_line, &mut buf)
            .await?
            .ok_or_else(|| ParseError::Malformed("connection closed inside headers".into()))?;
        if line.is_empty() {
            break;
        }
        if headers.len() >= limits.max_headers {
            return Err(ParseError::HeadersTooLarge);
        }
        headers.push(parse_header_line(&line)?);
    }

    Ok(Some(Request {
        method,
        path,
        query,
        version,
        headers,
    }))
}

/// Reads one CRLF (or bare LF) terminated line of at most `limit` bytes.
async fn read_line_limited<R>(
    reader: &mut R,
    limit: usize,
    buf: &mut Vec<u8>,
) -> Result<Option<String>, ParseError>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let n = (&mut *reader)
        .take(limit as u64 + 2)
        .read_until(b'\n', buf)
        .await?;
    if n == 0 {
        return Ok(None);
    }
    if buf.last() != Some(&b'\n') {
        if buf.len() > limit {
            return Err(ParseError::HeadersTooLarge);
        }
        return Err(ParseError::Malformed("truncated line".into()));
    }

    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    if buf.len() > limit {
        return Err(ParseError::HeadersTooLarge);
    }

    String::from_utf8(std::mem::take(buf))
        .map(Some)
        .map_err(|_| ParseError::Malformed("non UTF-8 bytes in request head".into()))
}

pub fn parse_request_line(line: &str) -> Result<(Method, &str, Version), ParseError> {
    let mut parts = line.split_whitespace();
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ParseError::Malformed(format!("bad request line {line:?}")));
    };

    let version = match version {
        "HTTP/1.1" => Version::Http11,
        "HTTP/1.0" => Version::Http10,
        other if other.starts_with("HTTP/") => {
            return Err(ParseError::UnsupportedVersion(other.to_string()));
        }
        other => return Err(ParseError::Malformed(format!("bad version {other:?}"))),
    };

    Ok((Method::parse(method), target, version))
}

/// Splits an origin-form or absolute-form target into path and query.
/// The asterisk form (`OPTIONS * HTTP/1.1`) is kept as the path `*`.
fn split_target(target: &str) -> Result<(String, Option<String>), ParseError> {
    if target == "*" {
        return Ok((target.to_string(), None));
    }

    let origin = if let Some(rest) = target
        .strip_prefix("http://")
        .or_else(|| target.strip_prefix("https://"))
    {
        rest.find('/').map_or("/", |i| &rest[i..])
    } else {
        target
    };

    if !origin.starts_with('/') {
        return Err(ParseError::Malformed(format!("bad target {target:?}")));
    }

    let origin = origin.split('#').next().unwrap_or(origin);
    Ok(match origin.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (origin.to_string(), None),
    })
}

pub fn parse_header_line(line: &str) -> Result<(String, String), ParseError> {
    let (name, value) = line
        .split_once(':')
        .ok_or_else(|| ParseError::Malformed(format!("bad header {line:?}")))?;
    if name.is_empty() || name.contains(char::is_whitespace) {
        return Err(ParseError::Malformed(format!("bad header name {name:?}")));
    }
    Ok((name.to_ascii_lowercase(), value.trim().to_string()))
}
