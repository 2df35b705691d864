//! Listing page rendering
//!
//! Turns a [`Listing`] into a self-contained HTML page. Names are escaped
//! for HTML and percent-encoded in links.

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use std::fmt::Write;

use crate::protocol::responses::to_utc;
use crate::storage::{Entry, Listing, SortKey, SortOrder};

/// Characters escaped inside one path segment of an href.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'\'')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

const COLUMNS: [(SortKey, &str); 4] = [
    (SortKey::Name, "Name"),
    (SortKey::Size, "Size"),
    (SortKey::Modified, "Modified"),
    (SortKey::Type, "Type"),
];

/// Renders the listing page; `archive_link` adds a link to the directory's
/// `.tgz` download.
pub fn render_listing(listing: &Listing, order: SortOrder, archive_link: bool) -> String {
    let title = escape_html(&listing.virtual_path);
    let mut page = String::with_capacity(1024 + listing.entries.len() * 160);

    let _ = write!(
        page,
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <title>Index of {title}</title>\n</head>\n<body>\n<h1>Index of {title}</h1>\n"
    );
    if archive_link {
        page.push_str("<p><a href=\"?download\">Download as .tgz</a></p>\n");
    }
    page.push_str("<table>\n<thead><tr>");
    for (key, label) in COLUMNS {
        let _ = write!(
            page,
            "<th><a href=\"?sort={}\">{}</a></th>",
            order.toggled(key).as_query(),
            label
        );
    }
    page.push_str("</tr></thead>\n<tbody>\n");

    if let Some(parent) = parent_href(&listing.virtual_path) {
        let _ = writeln!(
            page,
            "<tr><td><a href=\"{parent}\">..</a></td><td></td><td></td><td></td></tr>"
        );
    }

    for entry in &listing.entries {
        render_row(&mut page, &listing.virtual_path, entry);
    }

    page.push_str("</tbody>\n</table>\n");
    if listing.skipped > 0 {
        let _ = writeln!(
            page,
            "<p>{} entries could not be shown.</p>",
            listing.skipped
        );
    }
    page.push_str("</body>\n</html>\n");
    page
}

fn render_row(page: &mut String, base: &str, entry: &Entry) {
    let name = escape_html(&entry.name);
    let mut href = entry_href(base, &entry.name);
    let (label, size, kind) = if entry.is_dir() {
        href.push('/');
        (format!("{name}/"), "-".to_string(), "directory".to_string())
    } else {
        (
            name,
            entry.size.map(format_size).unwrap_or_default(),
            escape_html(entry.mime.as_deref().unwrap_or("")),
        )
    };
    let modified = entry
        .modified
        .and_then(to_utc)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default();

    let _ = writeln!(
        page,
        "<tr><td><a href=\"{href}\">{label}</a></td><td>{size}</td><td>{modified}</td><td>{kind}</td></tr>"
    );
}

/// Absolute, percent-encoded link to a child of `base`.
pub fn entry_href(base: &str, name: &str) -> String {
    encode_segments(base.split('/').chain(std::iter::once(name)))
}

fn parent_href(virtual_path: &str) -> Option<String> {
    if virtual_path == "/" {
        return None;
    }
    let trimmed = virtual_path.trim_end_matches('/');
    let parent = &trimmed[..trimmed.rfind('/').unwrap_or(0)];
    let mut href = encode_segments(parent.split('/'));
    if href != "/" {
        href.push('/');
    }
    Some(href)
}

fn encode_segments<'a>(segments: impl Iterator<Item = &'a str>) -> String {
    let mut href = String::new();
    for segment in segments.filter(|s| !s.is_empty()) {
        href.push('/');
        href.extend(utf8_percent_encode(segment, SEGMENT));
    }
    if href.is_empty() {
        href.push('/');
    }
    href
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Human readable size using binary multiples.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}
